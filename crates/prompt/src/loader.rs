//! Reading prompt overrides from a workspace.

use crate::types::PromptDefinition;
use notevault_core::config::STATE_DIR_NAME;
use notevault_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// `<workspace>/.notevault/prompts`
pub fn prompts_dir(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR_NAME).join("prompts")
}

/// Parse and validate one definition. `origin` names it in errors.
pub(crate) fn parse_definition(yaml: &str, origin: &str) -> AppResult<PromptDefinition> {
    let def: PromptDefinition = serde_yaml::from_str(yaml)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt {}: {}", origin, e)))?;
    def.validate()?;
    Ok(def)
}

/// Every `*.yml` directly under the workspace prompts directory, sorted by id.
///
/// The file stem must equal the declared id.
pub fn load_overrides(workspace: &Path) -> AppResult<Vec<PromptDefinition>> {
    let dir = prompts_dir(workspace);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut overrides = Vec::new();
    for entry in walkdir::WalkDir::new(&dir).min_depth(1).max_depth(1) {
        let entry = entry
            .map_err(|e| AppError::Prompt(format!("Failed to list {:?}: {}", dir, e)))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("yml") {
            continue;
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| AppError::Prompt(format!("Failed to read {:?}: {}", path, e)))?;
        let def = parse_definition(&yaml, &path.display().to_string())?;

        if def.id != stem {
            return Err(AppError::Prompt(format!(
                "{:?} declares id {}, expected {}",
                path, def.id, stem
            )));
        }

        tracing::debug!("Found prompt override {} at {:?}", def.id, path);
        overrides.push(def);
    }

    overrides.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(overrides)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    pub fn write_prompt(workspace: &Path, id: &str, template: &str) -> PathBuf {
        let dir = super::prompts_dir(workspace);
        std::fs::create_dir_all(&dir).unwrap();

        let path = dir.join(format!("{}.yml", id));
        let yaml = format!(
            "id: {}\ntitle: \"Test Prompt\"\napiVersion: \"1.0\"\ntemplate: \"{}\"\n",
            id, template
        );
        std::fs::write(&path, yaml).unwrap();
        path
    }
}
