use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ingest::{RagError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Generates an answer from an ordered list of role-tagged messages.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionBackend {
    /// Any OpenAI-compatible `/chat/completions` endpoint (OpenRouter by default).
    OpenAi,
    Ollama,
}

impl CompletionBackend {
    fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Clone)]
pub struct QueryLLM {
    backend: CompletionBackend,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

impl QueryLLM {
    pub fn new(backend: CompletionBackend, base_url: String, model: String) -> Self {
        Self {
            backend,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key: None,
            temperature: 0.7,
            max_tokens: 500,
            client: reqwest::Client::new(),
        }
    }

    pub fn default() -> Self {
        Self::new(
            CompletionBackend::OpenAi,
            "https://openrouter.ai/api/v1".to_string(),
            "meta-llama/llama-3.3-70b-instruct:free".to_string(),
        )
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> AnyResult<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build completion HTTP client")?;
        Ok(self)
    }

    async fn generate(&self, messages: &[ChatMessage]) -> AnyResult<String> {
        debug!(model = %self.model, messages = messages.len(), "requesting completion");

        let request = match self.backend {
            CompletionBackend::OpenAi => {
                let url = format!("{}/chat/completions", self.base_url);
                let mut request = self.client.post(&url).json(&OpenAiRequest {
                    model: &self.model,
                    messages,
                    temperature: self.temperature,
                    max_tokens: self.max_tokens,
                });
                if let Some(key) = &self.api_key {
                    request = request.bearer_auth(key);
                }
                request
            }
            CompletionBackend::Ollama => {
                let url = format!("{}/api/chat", self.base_url);
                self.client.post(&url).json(&OllamaRequest {
                    model: &self.model,
                    messages,
                    stream: false,
                    options: OllamaOptions {
                        temperature: self.temperature,
                        num_predict: self.max_tokens,
                    },
                })
            }
        };

        let response = request
            .send()
            .await
            .context("Failed to send completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion request failed: {status}: {body}");
        }

        match self.backend {
            CompletionBackend::OpenAi => {
                let parsed: OpenAiResponse = response
                    .json()
                    .await
                    .context("Failed to parse completion response")?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .context("Completion response contained no message content")
            }
            CompletionBackend::Ollama => {
                let parsed: OllamaResponse = response
                    .json()
                    .await
                    .context("Failed to parse completion response")?;
                Ok(parsed.message.content)
            }
        }
    }
}

#[async_trait]
impl CompletionProvider for QueryLLM {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.generate(messages)
            .await
            .map_err(|e| RagError::completion(self.backend.name(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "user", "content": "hi" }));
    }

    #[test]
    fn test_openai_response_without_content_parses() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let parsed: OpenAiResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_completion_failure() {
        let llm = QueryLLM::new(
            CompletionBackend::Ollama,
            "http://127.0.0.1:9".to_string(),
            "llama3".to_string(),
        );
        let err = llm.complete(&[ChatMessage::user("hello")]).await.unwrap_err();
        assert_eq!(err.kind(), "completion_failure");
    }
}
