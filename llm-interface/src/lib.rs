pub mod claude;
pub mod openai;

pub use claude::ClaudeProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use gapscout_core::{CoreError, LlmError, LlmSettings};
use reqwest::{Response, StatusCode};
use std::sync::Arc;
use tracing::{error, info};

/// Free-text synthesis backed by a hosted model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, CoreError>;
}

/// Builds the configured provider, or `None` when no API key is available.
pub fn provider_from_settings(
    settings: &LlmSettings,
) -> Result<Option<Arc<dyn LlmProvider>>, CoreError> {
    let Some(api_key) = settings.api_key.clone() else {
        info!("No LLM API key configured, answer hints will use placeholders");
        return Ok(None);
    };

    let provider: Arc<dyn LlmProvider> = match settings.provider.as_str() {
        "claude" => {
            let mut provider = ClaudeProvider::new(api_key);
            if let Some(model) = &settings.model {
                provider = provider.with_model(model.clone());
            }
            Arc::new(provider)
        }
        "openai" => {
            let mut provider = OpenAiProvider::new(api_key);
            if let Some(model) = &settings.model {
                provider = provider.with_model(model.clone());
            }
            Arc::new(provider)
        }
        other => {
            return Err(CoreError::InvalidInput {
                message: format!("Unknown LLM provider: {}", other),
            })
        }
    };

    info!("Using {} for answer hints", provider.name());
    Ok(Some(provider))
}

/// Maps a non-success provider response onto [`LlmError`].
pub(crate) async fn error_from_response(provider: &str, model: &str, response: Response) -> CoreError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    error!("{} API error ({}): {}", provider, status, body);

    error_from_status(provider, model, status, retry_after)
}

pub(crate) fn error_from_status(
    provider: &str,
    model: &str,
    status: StatusCode,
    retry_after: Option<u64>,
) -> CoreError {
    let provider = provider.to_string();
    let error = match status.as_u16() {
        401 => LlmError::InvalidApiKey { provider },
        403 => LlmError::AuthenticationFailed { provider },
        404 => LlmError::ModelNotAvailable {
            model: model.to_string(),
        },
        429 => LlmError::RateLimitExceeded {
            provider,
            retry_after: retry_after.unwrap_or(30),
        },
        // 529 is Anthropic's "overloaded"
        code if code >= 500 => LlmError::ServiceUnavailable { provider },
        code => {
            return CoreError::RequestFailed {
                message: format!("{} rejected the request", provider),
                status_code: Some(code),
            }
        }
    };
    CoreError::Llm(error)
}

pub(crate) fn network_error(provider: &str, error: reqwest::Error) -> CoreError {
    if error.is_timeout() {
        CoreError::Llm(LlmError::RequestTimeout {
            provider: provider.to_string(),
        })
    } else {
        CoreError::Network(error)
    }
}
