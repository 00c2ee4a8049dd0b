use crate::{error_from_response, network_error, LlmProvider};
use async_trait::async_trait;
use gapscout_core::{CoreError, LlmError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const PROVIDER: &str = "claude";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    temperature: f32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    fn text(&self) -> Option<String> {
        let text: Vec<&str> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect();

        if text.is_empty() {
            None
        } else {
            Some(text.join(""))
        }
    }
}

/// Anthropic Messages API.
pub struct ClaudeProvider {
    api_key: String,
    model: String,
    base_url: String,
    http: Client,
}

impl ClaudeProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: ANTHROPIC_API_URL.to_string(),
            http: Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, CoreError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: 1024,
            system,
            temperature: 0.0,
            messages: vec![WireMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!(model = %self.model, "Claude messages request");
        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, &self.model, response).await);
        }

        let body: MessagesResponse = response.json().await.map_err(|_| {
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: PROVIDER.to_string(),
            })
        })?;

        if body.stop_reason.as_deref() == Some("refusal") {
            return Err(CoreError::Llm(LlmError::ContentFiltered {
                reason: "model refused the prompt".to_string(),
            }));
        }

        body.text().ok_or_else(|| {
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: PROVIDER.to_string(),
            })
        })
    }
}
