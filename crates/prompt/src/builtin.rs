//! Prompts shipped with the binary.

use crate::loader::parse_definition;
use crate::types::PromptDefinition;
use notevault_core::{AppError, AppResult};

pub const QUERY_REWRITE: &str = "rag.query.rewrite";
pub const QUERY_EXPAND: &str = "rag.query.expand";
pub const RERANK: &str = "rag.rerank";
pub const ANSWER: &str = "rag.answer";

const SOURCES: [(&str, &str); 4] = [
    (QUERY_REWRITE, include_str!("../prompts/rag.query.rewrite.yml")),
    (QUERY_EXPAND, include_str!("../prompts/rag.query.expand.yml")),
    (RERANK, include_str!("../prompts/rag.rerank.yml")),
    (ANSWER, include_str!("../prompts/rag.answer.yml")),
];

pub fn builtin_prompts() -> AppResult<Vec<PromptDefinition>> {
    SOURCES
        .iter()
        .map(|(id, yaml)| {
            let def = parse_definition(yaml, id)?;
            if def.id != *id {
                return Err(AppError::Prompt(format!(
                    "Built-in prompt {} declares id {}",
                    id, def.id
                )));
            }
            Ok(def)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_parse() {
        let prompts = builtin_prompts().unwrap();
        let ids: Vec<_> = prompts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![QUERY_REWRITE, QUERY_EXPAND, RERANK, ANSWER]);
        assert!(prompts.iter().all(|p| p.system.is_some()));
        assert!(prompts.iter().all(|p| !p.variables.is_empty()));
    }
}
