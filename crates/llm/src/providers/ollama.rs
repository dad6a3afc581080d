//! Ollama chat client.
//!
//! Ollama API: https://github.com/ollama/ollama/blob/main/docs/api.md

use std::time::Duration;

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use notevault_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tracing::instrument;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
/// Local models can take a while on first load.
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<SamplingOptions>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    model: String,
    message: ReplyMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

/// `GET /api/tags`
#[derive(Debug, Deserialize)]
struct Tags {
    #[serde(default)]
    models: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

/// Client for a local (or LAN) Ollama server.
pub struct OllamaClient {
    base_url: String,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    fn chat_body<'a>(request: &'a LlmRequest) -> ChatBody<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &request.prompt,
        });

        let options = (request.temperature.is_some() || request.max_tokens.is_some()).then(|| {
            SamplingOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            }
        });

        ChatBody {
            model: &request.model,
            messages,
            stream: false,
            options,
        }
    }

    /// Turn a non-2xx reply into `AppError::Llm` carrying the body text.
    async fn check(response: reqwest::Response, what: &str) -> AppResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Llm(format!("Ollama {} failed ({}): {}", what, status, body)))
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&Self::chat_body(request))
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to reach Ollama: {}", e)))?;

        let reply: ChatReply = Self::check(response, "chat")
            .await?
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama reply: {}", e)))?;

        tracing::debug!("Ollama replied with {} chars", reply.message.content.len());

        Ok(LlmResponse {
            content: reply.message.content,
            model: reply.model,
            usage: LlmUsage::new(reply.prompt_eval_count, reply.eval_count),
        })
    }

    #[instrument(skip(self))]
    async fn list_models(&self) -> AppResult<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to list Ollama models: {}", e)))?;

        let tags: Tags = Self::check(response, "model listing")
            .await?
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Ollama tags: {}", e)))?;

        Ok(tags.models.into_iter().map(|tag| tag.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        assert_eq!(OllamaClient::new().base_url, "http://localhost:11434");
        let client = OllamaClient::with_base_url("http://gpu-box:11434/");
        assert_eq!(client.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_chat_body_puts_system_first() {
        let request = LlmRequest::new("Hello", "llama3")
            .with_system("Be brief")
            .with_temperature(0.7)
            .with_max_tokens(100);

        let body = serde_json::to_value(OllamaClient::chat_body(&request)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 100);
    }

    #[test]
    fn test_chat_body_without_sampling_options() {
        let request = LlmRequest::new("Hello", "llama3");
        let body = serde_json::to_value(OllamaClient::chat_body(&request)).unwrap();
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
        assert!(body.get("options").is_none());
    }

    #[test]
    fn test_reply_parsing() {
        let body = r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hi"},"done":true,"eval_count":3}"#;
        let reply: ChatReply = serde_json::from_str(body).unwrap();
        assert_eq!(reply.message.content, "Hi");
        assert_eq!(reply.prompt_eval_count, 0);
        assert_eq!(reply.eval_count, 3);
    }

    #[test]
    fn test_tags_parsing() {
        let body = r#"{"models":[{"name":"llama3.2:latest","size":1},{"name":"bge-reranker-v2-m3:latest"}]}"#;
        let tags: Tags = serde_json::from_str(body).unwrap();
        let names: Vec<_> = tags.models.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["llama3.2:latest", "bge-reranker-v2-m3:latest"]);
    }
}
