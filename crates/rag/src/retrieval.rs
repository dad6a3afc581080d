//! Mode-driven combination of note and web retrieval.

use crate::retriever::{RagRetrieval, RagRetriever};
use crate::types::{ContextItem, RetrievalMode, RetrievedContext, WebResult};
use crate::web::WebSearchClient;
use notevault_core::{AppError, AppResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_WEB_RESULTS: usize = 5;

pub struct RetrievalService {
    rag: Option<Arc<RagRetriever>>,
    web: Option<Arc<dyn WebSearchClient>>,
    web_max_results: usize,
}

impl RetrievalService {
    pub fn new(rag: Option<Arc<RagRetriever>>, web: Option<Arc<dyn WebSearchClient>>) -> Self {
        Self {
            rag,
            web,
            web_max_results: DEFAULT_WEB_RESULTS,
        }
    }

    pub fn with_web_max_results(mut self, max_results: usize) -> Self {
        self.web_max_results = max_results;
        self
    }

    pub fn has_rag(&self) -> bool {
        self.rag.is_some()
    }

    pub fn has_web(&self) -> bool {
        self.web.is_some()
    }

    /// Which sources actually run for `mode`, and whether that is a downgrade.
    fn plan(&self, mode: RetrievalMode) -> (bool, bool, bool) {
        let rag = mode.uses_rag() && self.has_rag();
        let web = mode.uses_web() && self.has_web();
        let degraded = (mode.uses_rag() && !rag) || (mode.uses_web() && !web);

        if rag || web || mode == RetrievalMode::None {
            (rag, web, degraded)
        } else {
            // Nothing the mode asked for exists; use whatever does
            (self.has_rag(), self.has_web(), true)
        }
    }

    /// Gather context for `query`. RAG items come before web items.
    ///
    /// Fails only when every source that ran failed, or none exists.
    pub async fn retrieve(&self, query: &str, mode: RetrievalMode) -> AppResult<RetrievedContext> {
        if mode == RetrievalMode::None {
            return Ok(RetrievedContext::empty());
        }

        let (run_rag, run_web, degraded) = self.plan(mode);
        if !run_rag && !run_web {
            return Err(AppError::Retrieval(format!(
                "No retrieval source available for mode {}",
                mode
            )));
        }
        if degraded {
            info!(
                "Retrieval mode {} degraded (rag: {}, web: {})",
                mode, run_rag, run_web
            );
        }

        let (rag_outcome, web_outcome) = tokio::join!(
            async {
                match &self.rag {
                    Some(rag) if run_rag => Some(rag.retrieve(query).await),
                    _ => None,
                }
            },
            async {
                match &self.web {
                    Some(web) if run_web => Some(web.search(query, self.web_max_results).await),
                    _ => None,
                }
            }
        );

        merge(rag_outcome, web_outcome, degraded)
    }
}

fn merge(
    rag: Option<AppResult<RagRetrieval>>,
    web: Option<AppResult<Vec<WebResult>>>,
    degraded: bool,
) -> AppResult<RetrievedContext> {
    let mut context = RetrievedContext {
        degraded,
        ..Default::default()
    };
    let mut errors: Vec<AppError> = Vec::new();

    match rag {
        Some(Ok(retrieval)) => {
            context.used_reranker = retrieval.used_reranker;
            context.sources_used.push("rag".to_string());
            context
                .items
                .extend(retrieval.chunks.into_iter().map(ContextItem::Rag));
        }
        Some(Err(e)) => {
            warn!("Note retrieval failed: {}", e);
            context.rag_unreachable = e.is_unreachable();
            context.degraded = true;
            errors.push(e);
        }
        None => {}
    }

    match web {
        Some(Ok(results)) => {
            context.sources_used.push("web".to_string());
            context
                .items
                .extend(results.into_iter().map(ContextItem::Web));
        }
        Some(Err(e)) => {
            warn!("Web search failed: {}", e);
            context.degraded = true;
            errors.push(e);
        }
        None => {}
    }

    if context.sources_used.is_empty() {
        // An unreachable store stays recognisable to callers
        if let Some(i) = errors.iter().position(AppError::is_unreachable) {
            return Err(errors.swap_remove(i));
        }
        let reasons: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(AppError::Retrieval(format!(
            "All retrieval sources failed: {}",
            reasons.join("; ")
        )));
    }

    debug!(
        "Retrieved {} context items from {:?}",
        context.items.len(),
        context.sources_used
    );
    Ok(context)
}
