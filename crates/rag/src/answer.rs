//! Answer composition for chat turns.
//!
//! `AnswerComposer` turns retrieved context into a prompt and an answer.
//! `ChatService` runs retrieval first and owns the per-session switch that
//! turns RAG off once the vector store has proven unreachable.

use crate::generation::Generator;
use crate::retrieval::RetrievalService;
use crate::types::{ContextItem, RagResult, RetrievalMode, RetrievedContext};
use notevault_core::AppResult;
use notevault_prompt::builtin;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Best RAG score below which an answer is flagged as low confidence.
pub const CONFIDENCE_THRESHOLD: f32 = 0.30;

/// Characters of each snippet placed in the prompt.
const SNIPPET_CHARS: usize = 1200;

const ANSWER_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct AnswerComposer {
    generator: Generator,
}

impl AnswerComposer {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }

    /// Ask the chat model, grounding it in `context` when non-empty.
    pub async fn compose(&self, question: &str, context: &RetrievedContext) -> AppResult<String> {
        self.generator
            .run(
                builtin::ANSWER,
                &[
                    ("context", format_context(context)),
                    ("question", question.to_string()),
                ],
                ANSWER_TEMPERATURE,
            )
            .await
    }
}

/// Numbered context block, one entry per item.
pub fn format_context(context: &RetrievedContext) -> String {
    context
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            ContextItem::Rag(chunk) => {
                let location = chunk
                    .location()
                    .map(|l| format!(", {}", l))
                    .unwrap_or_default();
                format!(
                    "[{}] {}{}\n{}",
                    i + 1,
                    chunk.source_path,
                    location,
                    truncate(&chunk.text, SNIPPET_CHARS)
                )
            }
            ContextItem::Web(result) => format!(
                "[{}] {} ({})\n{}",
                i + 1,
                result.title,
                result.url,
                truncate(&result.snippet, SNIPPET_CHARS)
            ),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}…", &text[..end]),
        None => text.to_string(),
    }
}

/// Mode after the session's auto-disable is applied.
pub fn downgrade(mode: RetrievalMode, rag_disabled: bool) -> RetrievalMode {
    match (mode, rag_disabled) {
        (RetrievalMode::Rag, true) => RetrievalMode::None,
        (RetrievalMode::Hybrid, true) => RetrievalMode::Web,
        (mode, _) => mode,
    }
}

pub struct ChatService {
    retrieval: Arc<RetrievalService>,
    composer: AnswerComposer,
    rag_disabled: AtomicBool,
}

impl ChatService {
    pub fn new(retrieval: Arc<RetrievalService>, composer: AnswerComposer) -> Self {
        Self {
            retrieval,
            composer,
            rag_disabled: AtomicBool::new(false),
        }
    }

    pub fn rag_disabled(&self) -> bool {
        self.rag_disabled.load(Ordering::Relaxed)
    }

    fn disable_rag(&self) {
        if !self.rag_disabled.swap(true, Ordering::Relaxed) {
            warn!("Vector store unreachable; note retrieval disabled for this session");
        }
    }

    /// Retrieve context for `mode`, then answer.
    ///
    /// A retrieval failure is only surfaced in `Rag` mode; other modes answer
    /// without context.
    pub async fn ask(&self, question: &str, mode: RetrievalMode) -> AppResult<RagResult> {
        let effective = downgrade(mode, self.rag_disabled());

        let context = match self.retrieval.retrieve(question, effective).await {
            Ok(context) => {
                if context.rag_unreachable {
                    self.disable_rag();
                }
                context
            }
            Err(e) => {
                if e.is_unreachable() {
                    self.disable_rag();
                }
                if effective == RetrievalMode::Rag {
                    return Err(e);
                }
                warn!("Retrieval failed, answering without context: {}", e);
                RetrievedContext {
                    degraded: true,
                    ..Default::default()
                }
            }
        };

        let answer = self.composer.compose(question, &context).await?;
        let result = build_result(answer, &context, mode, effective);

        info!(
            "Answered with {} chunks (mode {}, sources {:?})",
            result.chunks.len(),
            effective,
            context.sources_used
        );
        Ok(result)
    }
}

fn build_result(
    answer: String,
    context: &RetrievedContext,
    requested: RetrievalMode,
    effective: RetrievalMode,
) -> RagResult {
    let chunks: Vec<_> = context.rag_chunks().cloned().collect();
    let max_score = chunks.iter().map(|c| c.score).reduce(f32::max);

    let mut metadata = BTreeMap::new();
    metadata.insert("mode".to_string(), effective.to_string());
    if requested != effective {
        metadata.insert("requested_mode".to_string(), requested.to_string());
    }
    metadata.insert("sources_used".to_string(), context.sources_used.join(","));
    metadata.insert("degraded".to_string(), context.degraded.to_string());
    if let Some(score) = max_score {
        metadata.insert("max_score".to_string(), format!("{:.3}", score));
    }
    if effective.uses_rag() {
        let low = max_score.map_or(true, |s| s < CONFIDENCE_THRESHOLD);
        metadata.insert("low_confidence".to_string(), low.to_string());
    }

    RagResult {
        answer,
        chunks,
        used_reranker: context.used_reranker,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RagChunk, WebResult};

    fn chunk(score: f32, text: &str) -> RagChunk {
        let mut metadata = BTreeMap::new();
        metadata.insert("line_start".to_string(), "4".to_string());
        metadata.insert("line_end".to_string(), "4".to_string());
        RagChunk {
            chunk_id: "c".to_string(),
            source_path: "garden.md".to_string(),
            text: text.to_string(),
            score,
            rerank_score: None,
            metadata,
        }
    }

    #[test]
    fn test_downgrade() {
        assert_eq!(downgrade(RetrievalMode::Rag, true), RetrievalMode::None);
        assert_eq!(downgrade(RetrievalMode::Hybrid, true), RetrievalMode::Web);
        assert_eq!(downgrade(RetrievalMode::Web, true), RetrievalMode::Web);
        assert_eq!(downgrade(RetrievalMode::Rag, false), RetrievalMode::Rag);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 5), "héllo…");
        assert_eq!(truncate(" short ", 50), "short");
    }

    #[test]
    fn test_format_context_numbers_items() {
        let context = RetrievedContext {
            items: vec![
                ContextItem::Rag(chunk(0.8, "Water deeply.")),
                ContextItem::Web(WebResult {
                    title: "Tomatoes".to_string(),
                    url: "https://example.org".to_string(),
                    snippet: "Full sun.".to_string(),
                }),
            ],
            ..Default::default()
        };

        assert_eq!(
            format_context(&context),
            "[1] garden.md, line 4\nWater deeply.\n\n[2] Tomatoes (https://example.org)\nFull sun."
        );
    }

    #[test]
    fn test_build_result_confidence() {
        let context = RetrievedContext {
            items: vec![ContextItem::Rag(chunk(0.21, "x"))],
            sources_used: vec!["rag".to_string()],
            ..Default::default()
        };
        let result = build_result("a".to_string(), &context, RetrievalMode::Rag, RetrievalMode::Rag);
        assert_eq!(result.metadata["low_confidence"], "true");
        assert_eq!(result.metadata["max_score"], "0.210");
        assert_eq!(result.chunks.len(), 1);

        let result = build_result(
            "a".to_string(),
            &RetrievedContext::empty(),
            RetrievalMode::Rag,
            RetrievalMode::None,
        );
        assert_eq!(result.metadata["requested_mode"], "rag");
        assert!(!result.metadata.contains_key("low_confidence"));
    }
}
