//! Reranking by asking the chat model to order numbered passages.

use super::RerankOrder;
use crate::generation::Generator;
use crate::types::SearchResult;
use notevault_core::AppResult;
use notevault_prompt::builtin;

/// Characters of each passage shown to the model.
const PASSAGE_PREVIEW_CHARS: usize = 600;

#[derive(Debug, Clone)]
pub struct LlmReranker {
    generator: Generator,
}

impl LlmReranker {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }

    pub async fn rank(&self, query: &str, results: &[SearchResult]) -> AppResult<RerankOrder> {
        let output = self
            .generator
            .run(
                builtin::RERANK,
                &[
                    ("query", query.to_string()),
                    ("passages", format_passages(results)),
                ],
                0.0,
            )
            .await?;

        let picked = parse_passage_numbers(&output, results.len());
        tracing::debug!("LLM reranker picked {:?} from {:?}", picked, output);

        let n = results.len() as f32;
        Ok(picked
            .into_iter()
            .enumerate()
            .map(|(position, index)| (index, (n - position as f32) / n))
            .collect())
    }
}

fn format_passages(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let text: String = r.chunk.text.chars().take(PASSAGE_PREVIEW_CHARS).collect();
            format!("[{}] {}", i + 1, text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Zero-based indices from 1-based passage numbers in the reply, in order.
/// Unknown and repeated numbers are ignored.
fn parse_passage_numbers(output: &str, count: usize) -> Vec<usize> {
    let mut picked = Vec::new();
    for token in output.split(|c: char| !c.is_ascii_digit()) {
        let Ok(number) = token.parse::<usize>() else {
            continue;
        };
        if (1..=count).contains(&number) && !picked.contains(&(number - 1)) {
            picked.push(number - 1);
        }
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    #[test]
    fn test_parse_passage_numbers() {
        assert_eq!(parse_passage_numbers("3, 1, 2", 3), vec![2, 0, 1]);
        assert_eq!(parse_passage_numbers("[2] then [2], 7, 0, 1", 3), vec![1, 0]);
        assert_eq!(
            parse_passage_numbers("Most relevant: 4.\nThen 2", 4),
            vec![3, 1]
        );
        assert!(parse_passage_numbers("none of them", 3).is_empty());
    }

    #[test]
    fn test_format_passages() {
        let result = SearchResult {
            chunk: Chunk {
                id: "a".to_string(),
                text: " Tomatoes need sun. ".to_string(),
                source_path: "a.md".to_string(),
                metadata: Default::default(),
            },
            score: 0.4,
        };
        let formatted = format_passages(&[result.clone(), result]);
        assert_eq!(formatted, "[1] Tomatoes need sun.\n\n[2] Tomatoes need sun.");
    }
}
