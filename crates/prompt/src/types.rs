//! Prompt definitions and rendered prompts.

use notevault_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// A prompt as written in YAML.
///
/// ```yaml
/// id: rag.rerank
/// title: Rank passages by relevance
/// apiVersion: "1.0"
/// variables: [query, passages]
/// system: ...
/// template: ...
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDefinition {
    pub id: String,
    pub title: String,
    /// `major.minor`
    pub api_version: String,
    /// Variables a caller must supply; others may be left out
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// User turn
    pub template: String,
}

impl PromptDefinition {
    pub fn validate(&self) -> AppResult<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
        }
        if self.template.trim().is_empty() {
            return Err(AppError::Prompt(format!(
                "Prompt {} has an empty template",
                self.id
            )));
        }

        let well_formed = self
            .api_version
            .split_once('.')
            .map(|(major, minor)| {
                !major.is_empty()
                    && !minor.is_empty()
                    && major.chars().chain(minor.chars()).all(|c| c.is_ascii_digit())
            })
            .unwrap_or(false);
        if !well_formed {
            return Err(AppError::Prompt(format!(
                "Prompt {} has invalid apiVersion {:?}, expected \"x.y\"",
                self.id, self.api_version
            )));
        }

        Ok(())
    }
}

/// Where the active definition of a prompt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptSource {
    Builtin,
    Workspace,
}

/// A rendered prompt, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub id: String,
    pub source: PromptSource,
    pub system: Option<String>,
    pub user: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> PromptDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_definition_from_yaml() {
        let def = parse(
            r#"
id: rag.custom
title: Custom Prompt
apiVersion: "1.0"
variables: [query]
system: "Be terse"
template: "{{query}}"
"#,
        );
        assert_eq!(def.id, "rag.custom");
        assert_eq!(def.variables, vec!["query"]);
        assert_eq!(def.system.as_deref(), Some("Be terse"));
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let base = parse("id: a\ntitle: A\napiVersion: \"1.0\"\ntemplate: x\n");
        assert!(base.variables.is_empty());

        let bad_version = PromptDefinition {
            api_version: "v1".into(),
            ..base.clone()
        };
        assert!(matches!(bad_version.validate(), Err(AppError::Prompt(_))));

        let empty = PromptDefinition {
            template: "  \n".into(),
            ..base
        };
        assert!(empty.validate().is_err());
    }
}
