//! The `LlmClient` seam and its request/response values.

use notevault_core::AppResult;

/// One non-streaming completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub model: String,
    /// User turn
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system(self, system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..self
        }
    }

    pub fn with_temperature(self, temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            ..self
        }
    }

    pub fn with_max_tokens(self, max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            ..self
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    /// Model name as reported by the server
    pub model: String,
    pub usage: LlmUsage,
}

/// Token accounting; zero when the server does not report it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A chat model backend.
///
/// Drives answer generation, query rewriting and the reranking fallback.
/// `list_models` doubles as the model registry that decides whether a
/// dedicated reranking model is installed.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// e.g. "ollama", "openai"
    fn provider_name(&self) -> &str;

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;

    /// Model identifiers the backend can serve.
    async fn list_models(&self) -> AppResult<Vec<String>>;
}

/// Whether `wanted` appears in a provider's model listing.
///
/// Ollama reports `name:tag`; a bare configured name matches its `:latest` tag.
pub fn model_listed(models: &[String], wanted: &str) -> bool {
    models.iter().any(|listed| {
        listed == wanted || (!wanted.contains(':') && listed.strip_suffix(":latest") == Some(wanted))
    })
}
