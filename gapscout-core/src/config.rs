use crate::error::ConfigError;
use crate::retry::CallPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const SUPPORTED_LLM_PROVIDERS: &[&str] = &["claude", "openai"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GapscoutConfig {
    pub reddit: RedditSettings,
    pub dataforseo: DataForSeoSettings,
    pub llm: LlmSettings,
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for RedditSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            user_agent: concat!("gapscout/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataForSeoSettings {
    /// `login:password`, as issued by DataForSEO.
    pub api_key: Option<String>,
    /// Two-letter market, `us` or `au`.
    pub database: String,
    pub language_code: String,
}

impl Default for DataForSeoSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            database: "us".to_string(),
            language_code: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "claude".to_string(),
            api_key: None,
            model: None,
        }
    }
}

/// Timeout and retry budget for one kind of collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSettings {
    pub timeout_secs: u64,
    pub retries: u32,
}

impl CallSettings {
    pub const fn new(timeout_secs: u64, retries: u32) -> Self {
        Self {
            timeout_secs,
            retries,
        }
    }

    pub fn policy(&self) -> CallPolicy {
        CallPolicy::new(Duration::from_secs(self.timeout_secs), self.retries)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub subreddits: Vec<String>,
    pub max_threads: u32,
    pub batch_max_threads: u32,
    pub max_comments: u32,
    pub max_reply_depth: u32,
    pub comment_concurrency: usize,
    pub keyword_concurrency: usize,
    pub time_window: String,
    pub search: CallSettings,
    pub comments: CallSettings,
    pub llm: CallSettings,
    pub metrics: CallSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            subreddits: vec!["all".to_string()],
            max_threads: 25,
            batch_max_threads: 15,
            max_comments: 120,
            max_reply_depth: 2,
            comment_concurrency: 4,
            keyword_concurrency: 1,
            time_window: "year".to_string(),
            search: CallSettings::new(20, 1),
            comments: CallSettings::new(20, 0),
            llm: CallSettings::new(60, 0),
            metrics: CallSettings::new(30, 1),
        }
    }
}

impl GapscoutConfig {
    /// Loads a TOML file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        Ok(config)
    }

    /// `lookup` is injected so tests don't have to mutate the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut Option<String>, name: &str| {
            if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
                debug!("Config override from {}", name);
                *target = Some(value);
            }
        };

        set(&mut self.reddit.client_id, "REDDIT_CLIENT_ID");
        set(&mut self.reddit.client_secret, "REDDIT_CLIENT_SECRET");
        set(&mut self.reddit.username, "REDDIT_USERNAME");
        set(&mut self.reddit.password, "REDDIT_PASSWORD");
        set(&mut self.dataforseo.api_key, "DATAFORSEO_API_KEY");

        if let Some(agent) = lookup("REDDIT_USER_AGENT").filter(|v| !v.trim().is_empty()) {
            self.reddit.user_agent = agent;
        }
        if let Some(provider) = lookup("GAPSCOUT_LLM_PROVIDER").filter(|v| !v.trim().is_empty()) {
            self.llm.provider = provider.to_lowercase();
        }

        let key_var = match self.llm.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            _ => "ANTHROPIC_API_KEY",
        };
        set(&mut self.llm.api_key, key_var);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        let invalid = |field: &str, value: String| ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        };

        if engine.max_threads == 0 {
            return Err(invalid("engine.max_threads", "0".to_string()));
        }
        if engine.batch_max_threads == 0 {
            return Err(invalid("engine.batch_max_threads", "0".to_string()));
        }
        if engine.comment_concurrency == 0 {
            return Err(invalid("engine.comment_concurrency", "0".to_string()));
        }
        if engine.keyword_concurrency == 0 {
            return Err(invalid("engine.keyword_concurrency", "0".to_string()));
        }
        for (field, call) in [
            ("engine.search.timeout_secs", engine.search),
            ("engine.comments.timeout_secs", engine.comments),
            ("engine.llm.timeout_secs", engine.llm),
            ("engine.metrics.timeout_secs", engine.metrics),
        ] {
            if call.timeout_secs == 0 {
                return Err(invalid(field, "0".to_string()));
            }
        }
        if !SUPPORTED_LLM_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(invalid("llm.provider", self.llm.provider.clone()));
        }
        Ok(())
    }

    /// Returns a required setting or names the variable that would supply it.
    pub fn require<'a>(value: &'a Option<String>, var_name: &str) -> Result<&'a str, ConfigError> {
        value
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: var_name.to_string(),
            })
    }
}
