//! Result reranking with a fixed fallback chain.
//!
//! The variant is chosen once, when the retriever is built:
//! a dedicated reranking model if its server lists it, else the chat model
//! prompted to order passages, else nothing.

pub mod dedicated;
pub mod llm;

pub use self::dedicated::DedicatedReranker;
pub use self::llm::LlmReranker;

use crate::generation::Generator;
use crate::types::SearchResult;
use notevault_core::config::RetrievalSettings;
use notevault_core::{AppError, AppResult};
use notevault_llm::model_listed;
use std::collections::HashSet;
use tracing::{info, warn};

/// Input index and rerank score, best first.
pub type RerankOrder = Vec<(usize, f32)>;

#[derive(Debug)]
pub enum Reranker {
    DedicatedModel(DedicatedReranker),
    LlmFallback(LlmReranker),
    NoOp,
}

impl Reranker {
    /// Pick a reranker, degrading to `NoOp` on any error.
    pub async fn select(settings: &RetrievalSettings, generator: Option<&Generator>) -> Self {
        if !settings.rerank {
            return Reranker::NoOp;
        }

        match Self::try_select(settings, generator).await {
            Ok(reranker) => {
                info!("Using {} reranker", reranker.name());
                reranker
            }
            Err(e) => {
                warn!("Reranking disabled: {}", e);
                Reranker::NoOp
            }
        }
    }

    async fn try_select(
        settings: &RetrievalSettings,
        generator: Option<&Generator>,
    ) -> AppResult<Self> {
        let generator = generator
            .ok_or_else(|| AppError::RerankerInit("no language model client".to_string()))?;

        if let Some(model) = non_empty(settings.reranker_model.as_deref()) {
            match non_empty(settings.reranker_endpoint.as_deref()) {
                Some(endpoint) => {
                    let dedicated = DedicatedReranker::new(endpoint, model)?;
                    let models = dedicated.list_models().await.map_err(|e| {
                        AppError::RerankerInit(format!("model registry unavailable: {}", e))
                    })?;
                    if model_listed(&models, model) {
                        return Ok(Reranker::DedicatedModel(dedicated));
                    }
                    info!(
                        "Reranker model {} is not served by {}, falling back to the chat model",
                        model, endpoint
                    );
                }
                None => info!(
                    "Reranker model {} has no rerankerEndpoint, falling back to the chat model",
                    model
                ),
            }
        }

        if generator.model().trim().is_empty() {
            return Err(AppError::RerankerInit("no chat model configured".to_string()));
        }

        Ok(Reranker::LlmFallback(LlmReranker::new(generator.clone())))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Reranker::DedicatedModel(_) => "dedicated",
            Reranker::LlmFallback(_) => "llm",
            Reranker::NoOp => "none",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Reranker::NoOp)
    }

    /// New order for `results`, or `None` for `NoOp`.
    pub async fn order(
        &self,
        query: &str,
        results: &[SearchResult],
    ) -> AppResult<Option<RerankOrder>> {
        if results.is_empty() {
            return Ok(None);
        }

        let picked = match self {
            Reranker::DedicatedModel(r) => r.rank(query, results).await?,
            Reranker::LlmFallback(r) => r.rank(query, results).await?,
            Reranker::NoOp => return Ok(None),
        };

        Ok(Some(complete_order(picked, results.len())))
    }

    /// Reorder `results`. Failures leave the input order unchanged.
    pub async fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Vec<SearchResult> {
        match self.order(query, &results).await {
            Ok(Some(order)) => apply_order(results, &order)
                .into_iter()
                .map(|(result, _)| result)
                .collect(),
            Ok(None) => results,
            Err(e) => {
                warn!("Reranking failed, keeping similarity order: {}", e);
                results
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Drop out-of-range and repeated indices, then append unmentioned ones in
/// their original order with score 0.
fn complete_order(picked: RerankOrder, len: usize) -> RerankOrder {
    let mut seen = HashSet::new();
    let mut order: RerankOrder = picked
        .into_iter()
        .filter(|(i, _)| *i < len && seen.insert(*i))
        .collect();

    order.extend((0..len).filter(|i| !seen.contains(i)).map(|i| (i, 0.0)));
    order
}

/// Move `results` into `order`, pairing each with its rerank score.
pub(crate) fn apply_order(results: Vec<SearchResult>, order: &RerankOrder) -> Vec<(SearchResult, f32)> {
    let mut slots: Vec<Option<SearchResult>> = results.into_iter().map(Some).collect();
    order
        .iter()
        .filter_map(|(i, score)| slots.get_mut(*i).and_then(Option::take).map(|r| (r, *score)))
        .collect()
}
