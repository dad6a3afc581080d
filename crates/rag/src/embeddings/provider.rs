//! The embedder seam and its factory.

use crate::embeddings::providers::{MockProvider, OllamaProvider, OpenAiProvider};
use notevault_core::config::EmbeddingSettings;
use notevault_core::{AppError, AppResult};
use std::sync::Arc;

/// Turns text into fixed-length vectors.
///
/// Every vector a provider returns has `dimensions()` entries. Failures are
/// `AppError::Embedding`; callers treat them as the backend being unavailable.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// "mock", "ollama" or "openai"
    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding(format!("{} returned no vector", self.provider_name())))
    }
}

/// Build the embedder named by `settings.provider`.
///
/// `api_key` is only consulted by cloud backends.
pub fn create_provider(
    settings: &EmbeddingSettings,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    let endpoint = settings.endpoint.as_deref();

    let provider: Arc<dyn EmbeddingProvider> = match settings.provider.trim().to_lowercase().as_str() {
        "mock" => Arc::new(MockProvider::new(settings.dimensions)),
        "ollama" => Arc::new(OllamaProvider::new(
            endpoint,
            &settings.model,
            settings.dimensions,
            settings.batch_size,
        )?),
        "openai" => {
            let api_key = api_key.ok_or_else(|| {
                AppError::Config("openai embeddings need an API key (embedding.apiKeyEnv)".to_string())
            })?;
            Arc::new(OpenAiProvider::new(
                endpoint,
                api_key,
                &settings.model,
                settings.dimensions,
                settings.batch_size,
            )?)
        }
        other => {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: mock, ollama, openai",
                other
            )))
        }
    };

    tracing::debug!(
        provider = provider.provider_name(),
        model = provider.model_name(),
        dimensions = provider.dimensions(),
        "Embedding provider ready"
    );
    Ok(provider)
}
