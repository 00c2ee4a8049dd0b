use crate::{error_from_response, network_error, LlmProvider};
use async_trait::async_trait;
use gapscout_core::{CoreError, LlmError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const PROVIDER: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI Chat Completions API.
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
    http: Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENAI_API_URL.to_string(),
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

fn first_choice_text(response: ChatResponse) -> Result<String, CoreError> {
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        CoreError::Llm(LlmError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
        })
    })?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(CoreError::Llm(LlmError::ContentFiltered {
            reason: "content_filter".to_string(),
        }));
    }

    choice
        .message
        .content
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| {
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: PROVIDER.to_string(),
            })
        })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, CoreError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        debug!(model = %self.model, "OpenAI chat completion request");
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| network_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, &self.model, response).await);
        }

        let body: ChatResponse = response.json().await.map_err(|_| {
            CoreError::Llm(LlmError::InvalidResponseFormat {
                provider: PROVIDER.to_string(),
            })
        })?;
        first_choice_text(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ChatResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_first_choice_text() {
        let response = parse(json!({
            "choices": [
                { "message": { "role": "assistant", "content": "hello" }, "finish_reason": "stop" }
            ]
        }));
        assert_eq!(first_choice_text(response).unwrap(), "hello");
    }

    #[test]
    fn test_content_filter() {
        let response = parse(json!({
            "choices": [
                { "message": { "content": null }, "finish_reason": "content_filter" }
            ]
        }));
        assert!(matches!(
            first_choice_text(response),
            Err(CoreError::Llm(LlmError::ContentFiltered { .. }))
        ));
    }

    #[test]
    fn test_empty_choices() {
        let response = parse(json!({ "choices": [] }));
        assert!(matches!(
            first_choice_text(response),
            Err(CoreError::Llm(LlmError::InvalidResponseFormat { .. }))
        ));
    }
}
