//! Running library prompts against the chat model.

use notevault_core::{AppError, AppResult};
use notevault_llm::{model_listed, LlmClient, LlmRequest};
use notevault_prompt::PromptLibrary;
use std::collections::HashMap;
use std::sync::Arc;

/// A chat model plus the prompts it is driven with.
#[derive(Clone)]
pub struct Generator {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompts: Arc<PromptLibrary>,
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, prompts: Arc<PromptLibrary>) -> Self {
        Self {
            llm,
            model: model.into(),
            prompts,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether the provider's registry lists the configured model.
    pub async fn model_installed(&self) -> AppResult<bool> {
        let models = self.llm.list_models().await?;
        Ok(model_listed(&models, &self.model))
    }

    /// Render prompt `id` and return the trimmed completion.
    pub async fn run(
        &self,
        id: &str,
        variables: &[(&str, String)],
        temperature: f32,
    ) -> AppResult<String> {
        let variables: HashMap<String, String> = variables
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let built = self.prompts.render(id, variables)?;

        let mut request = LlmRequest::new(built.user, self.model.as_str()).with_temperature(temperature);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let response = self.llm.complete(&request).await?;
        let content = response.content.trim().to_string();
        if content.is_empty() {
            return Err(AppError::Llm(format!("Empty response for prompt {}", id)));
        }

        tracing::debug!(prompt = id, chars = content.len(), "Prompt completed");
        Ok(content)
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("provider", &self.llm.provider_name())
            .field("model", &self.model)
            .finish()
    }
}
