use crate::error::*;
use std::fmt::Display;
use std::time::Duration;
use tracing::{error, info, warn};

/// Classification shared by every error the engine surfaces.
///
/// Codes are stable strings; they end up in batch reports as well as logs.
pub trait ErrorExt: Display {
    fn error_code(&self) -> &'static str;
    fn is_retryable(&self) -> bool;
    fn user_friendly_message(&self) -> String;

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn log_error(&self) -> &Self
    where
        Self: Sized,
    {
        error!(code = self.error_code(), retryable = self.is_retryable(), "{}", self);
        self
    }

    fn log_warn(&self) -> &Self
    where
        Self: Sized,
    {
        warn!(code = self.error_code(), retryable = self.is_retryable(), "{}", self);
        self
    }
}

impl CoreError {
    /// The wrapped source error's code, e.g. `REDDIT_FORBIDDEN` rather than `REDDIT_API`.
    pub fn detailed_code(&self) -> &'static str {
        match self {
            CoreError::RedditApi(e) => e.error_code(),
            CoreError::Llm(e) => e.error_code(),
            CoreError::KeywordMetrics(e) => e.error_code(),
            CoreError::Config(e) => e.error_code(),
            other => other.error_code(),
        }
    }
}

impl ErrorExt for CoreError {
    fn error_code(&self) -> &'static str {
        match self {
            CoreError::RedditApi(_) => "REDDIT_API",
            CoreError::Llm(_) => "LLM",
            CoreError::KeywordMetrics(_) => "KEYWORD_METRICS",
            CoreError::Config(_) => "CONFIG",
            CoreError::Network(_) => "NETWORK",
            CoreError::InvalidInput { .. } => "INVALID_INPUT",
            CoreError::Timeout { .. } => "TIMEOUT",
            CoreError::Internal { .. } => "INTERNAL",
            CoreError::RequestFailed { .. } => "REQUEST_FAILED",
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => e.is_retryable(),
            CoreError::Llm(e) => e.is_retryable(),
            CoreError::KeywordMetrics(e) => e.is_retryable(),
            CoreError::Network(e) => e.is_timeout() || e.is_connect(),
            CoreError::Timeout { .. } => true,
            CoreError::RequestFailed {
                status_code: Some(code),
                ..
            } => *code >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RedditApi(e) => e.retry_after(),
            CoreError::Llm(e) => e.retry_after(),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.user_friendly_message(),
            CoreError::Llm(e) => e.user_friendly_message(),
            CoreError::KeywordMetrics(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Could not reach an upstream service. Check the network and rerun.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Rejected input: {}", message),
            CoreError::Timeout { seconds } => format!(
                "An upstream call gave up after {}s. Raise the timeout in [engine] or rerun later.",
                seconds
            ),
            CoreError::Internal { message } => format!("gapscout hit an internal error: {}", message),
            CoreError::RequestFailed { message, .. } => format!("Upstream request failed: {}", message),
        }
    }

    fn log_error(&self) -> &Self {
        error!(
            code = self.detailed_code(),
            retryable = self.is_retryable(),
            "{}",
            self
        );
        self
    }

    fn log_warn(&self) -> &Self {
        warn!(
            code = self.detailed_code(),
            retryable = self.is_retryable(),
            "{}",
            self
        );
        self
    }
}

impl ErrorExt for RedditApiError {
    fn error_code(&self) -> &'static str {
        match self {
            RedditApiError::AuthenticationFailed { .. } => "REDDIT_AUTH_FAILED",
            RedditApiError::RateLimitExceeded { .. } => "REDDIT_RATE_LIMIT",
            RedditApiError::Forbidden { .. } => "REDDIT_FORBIDDEN",
            RedditApiError::SubredditNotFound { .. } => "REDDIT_SUBREDDIT_NOT_FOUND",
            RedditApiError::ThreadNotFound { .. } => "REDDIT_THREAD_NOT_FOUND",
            RedditApiError::InvalidToken => "REDDIT_INVALID_TOKEN",
            RedditApiError::RequestTimeout => "REDDIT_TIMEOUT",
            RedditApiError::InvalidResponse { .. } => "REDDIT_INVALID_RESPONSE",
            RedditApiError::ServerError { .. } => "REDDIT_SERVER_ERROR",
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            RedditApiError::RateLimitExceeded { .. } | RedditApiError::RequestTimeout => true,
            RedditApiError::ServerError { status_code } => *status_code >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RedditApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } | RedditApiError::InvalidToken => {
                "Reddit rejected the app credentials. Check REDDIT_CLIENT_ID and REDDIT_CLIENT_SECRET."
                    .to_string()
            }
            RedditApiError::RateLimitExceeded { retry_after } => format!(
                "Reddit is throttling thread searches; wait {}s or lower max_threads.",
                retry_after
            ),
            RedditApiError::Forbidden { resource } => {
                format!("Reddit refused access to {}; the community may be private.", resource)
            }
            RedditApiError::SubredditNotFound { subreddit } => {
                format!("r/{} does not exist or is banned; drop it from the subreddit list.", subreddit)
            }
            RedditApiError::ThreadNotFound { thread_id } => {
                format!("Thread {} was removed or never existed.", thread_id)
            }
            RedditApiError::RequestTimeout => {
                "Reddit did not answer in time; gap signals could not be mined.".to_string()
            }
            RedditApiError::InvalidResponse { .. } | RedditApiError::ServerError { .. } => {
                "Reddit returned an unusable response; rerun later.".to_string()
            }
        }
    }
}

impl ErrorExt for LlmError {
    fn error_code(&self) -> &'static str {
        match self {
            LlmError::AuthenticationFailed { .. } => "LLM_AUTH_FAILED",
            LlmError::InvalidApiKey { .. } => "LLM_INVALID_API_KEY",
            LlmError::RateLimitExceeded { .. } => "LLM_RATE_LIMIT",
            LlmError::ModelNotAvailable { .. } => "LLM_MODEL_NOT_AVAILABLE",
            LlmError::ContentFiltered { .. } => "LLM_CONTENT_FILTERED",
            LlmError::ServiceUnavailable { .. } => "LLM_SERVICE_UNAVAILABLE",
            LlmError::RequestTimeout { .. } => "LLM_TIMEOUT",
            LlmError::InvalidResponseFormat { .. } => "LLM_INVALID_RESPONSE",
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimitExceeded { .. }
                | LlmError::ServiceUnavailable { .. }
                | LlmError::RequestTimeout { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimitExceeded { retry_after, .. } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        let fallback = "answer hints fall back to the template";
        match self {
            LlmError::AuthenticationFailed { provider } | LlmError::InvalidApiKey { provider } => {
                format!(
                    "{} rejected the API key; {}. Check ANTHROPIC_API_KEY or OPENAI_API_KEY.",
                    provider, fallback
                )
            }
            LlmError::RateLimitExceeded {
                provider,
                retry_after,
            } => format!("{} is throttling requests for {}s; {}.", provider, retry_after, fallback),
            LlmError::ModelNotAvailable { model } => {
                format!("Model {} is not served by this account; set llm.model.", model)
            }
            LlmError::ContentFiltered { reason } => {
                format!("The provider declined to write answer hints ({}); {}.", reason, fallback)
            }
            LlmError::ServiceUnavailable { provider } | LlmError::RequestTimeout { provider } => {
                format!("{} is unavailable right now; {}.", provider, fallback)
            }
            LlmError::InvalidResponseFormat { provider } => {
                format!("{} replied without usable text; {}.", provider, fallback)
            }
        }
    }
}

impl ErrorExt for KeywordMetricsError {
    fn error_code(&self) -> &'static str {
        match self {
            KeywordMetricsError::InvalidCredentials { .. } => "METRICS_INVALID_CREDENTIALS",
            KeywordMetricsError::NotFound { .. } => "METRICS_NOT_FOUND",
            KeywordMetricsError::TaskFailed { .. } => "METRICS_TASK_FAILED",
            KeywordMetricsError::QuotaExhausted { .. } => "METRICS_QUOTA_EXHAUSTED",
            KeywordMetricsError::ServerError { .. } => "METRICS_SERVER_ERROR",
            KeywordMetricsError::InvalidResponse { .. } => "METRICS_INVALID_RESPONSE",
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            KeywordMetricsError::ServerError { status_code } => *status_code >= 500,
            // 50xxx task codes are DataForSEO's internal errors
            KeywordMetricsError::TaskFailed { status_code, .. } => *status_code >= 50000,
            _ => false,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            KeywordMetricsError::InvalidCredentials { provider } => format!(
                "{} rejected DATAFORSEO_API_KEY; it must be login:password.",
                provider
            ),
            KeywordMetricsError::NotFound { keyword } => format!(
                "No search volume for '{}'; pass --volume and --difficulty instead.",
                keyword
            ),
            KeywordMetricsError::QuotaExhausted { provider } => {
                format!("The {} balance is used up; top it up to fetch volumes.", provider)
            }
            KeywordMetricsError::TaskFailed { message, .. } => {
                format!("Keyword lookup task failed: {}", message)
            }
            KeywordMetricsError::ServerError { .. } | KeywordMetricsError::InvalidResponse { .. } => {
                "The keyword data provider returned an unusable response; rerun later.".to_string()
            }
        }
    }
}

impl ErrorExt for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND",
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD",
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV",
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR",
        }
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => format!("No config file at {}.", path),
            ConfigError::MissingField { field } => format!("Set {} in the config file.", field),
            ConfigError::InvalidValue { field, value } => {
                format!("{} cannot be '{}'.", field, value)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => {
                format!("Export {} before running gapscout.", var_name)
            }
            ConfigError::Parse(e) => format!("Config file is not valid TOML: {}", e),
        }
    }
}

/// Logs a failure with its code and the hint shown to the operator.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if !self.report_errors {
            return;
        }
        error.log_error();
        info!(hint = %error.user_friendly_message(), "What to do next");
        if let Some(wait) = error.retry_after().filter(|_| error.is_retryable()) {
            info!(?wait, "Upstream asked to retry later");
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
