//! The set of prompts available to a workspace.

use crate::builtin::builtin_prompts;
use crate::loader::load_overrides;
use crate::types::{BuiltPrompt, PromptDefinition, PromptSource};
use handlebars::Handlebars;
use notevault_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::Path;

/// Built-in prompts overlaid with workspace overrides.
///
/// Templates are compiled when a definition is added, so a broken override
/// fails at load time rather than on first use.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    definitions: HashMap<String, (PromptDefinition, PromptSource)>,
    templates: Handlebars<'static>,
}

impl PromptLibrary {
    fn empty() -> Self {
        let mut templates = Handlebars::new();
        // Prompts are plain text, not HTML
        templates.register_escape_fn(handlebars::no_escape);
        Self {
            definitions: HashMap::new(),
            templates,
        }
    }

    pub fn builtin() -> AppResult<Self> {
        let mut library = Self::empty();
        for def in builtin_prompts()? {
            library.insert(def, PromptSource::Builtin)?;
        }
        Ok(library)
    }

    /// Built-in prompts plus any `.notevault/prompts/*.yml` in the workspace.
    ///
    /// A malformed override is an error rather than a silent fallback, so a
    /// typo in a customised prompt is noticed.
    pub fn load(workspace: &Path) -> AppResult<Self> {
        let mut library = Self::builtin()?;
        for def in load_overrides(workspace)? {
            tracing::info!("Using workspace prompt override: {}", def.id);
            library.insert(def, PromptSource::Workspace)?;
        }
        Ok(library)
    }

    fn insert(&mut self, def: PromptDefinition, source: PromptSource) -> AppResult<()> {
        let system_name = system_template(&def.id);

        self.templates
            .register_template_string(&def.id, &def.template)
            .map_err(|e| AppError::Prompt(format!("Invalid template in {}: {}", def.id, e)))?;

        match &def.system {
            Some(system) => self
                .templates
                .register_template_string(&system_name, system)
                .map_err(|e| {
                    AppError::Prompt(format!("Invalid system template in {}: {}", def.id, e))
                })?,
            None => self.templates.unregister_template(&system_name),
        }

        self.definitions.insert(def.id.clone(), (def, source));
        Ok(())
    }

    /// Render prompt `id`.
    ///
    /// Every variable the definition declares must be present; others render
    /// as empty strings. Output is trimmed and an empty system turn dropped.
    pub fn render(&self, id: &str, variables: HashMap<String, String>) -> AppResult<BuiltPrompt> {
        let (def, source) = self
            .definitions
            .get(id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", id)))?;

        if let Some(missing) = def.variables.iter().find(|v| !variables.contains_key(v.as_str())) {
            return Err(AppError::Prompt(format!(
                "Prompt {} needs variable {}",
                id, missing
            )));
        }

        let system = if def.system.is_some() {
            let rendered = self.render_template(&system_template(id), &variables)?;
            Some(rendered).filter(|s| !s.is_empty())
        } else {
            None
        };
        let user = self.render_template(id, &variables)?;

        tracing::debug!(prompt = id, source = ?source, "Rendered prompt");
        Ok(BuiltPrompt {
            id: id.to_string(),
            source: *source,
            system,
            user,
        })
    }

    fn render_template(&self, name: &str, variables: &HashMap<String, String>) -> AppResult<String> {
        self.templates
            .render(name, variables)
            .map(|s| s.trim().to_string())
            .map_err(|e| AppError::Prompt(format!("Failed to render {}: {}", name, e)))
    }
}

fn system_template(id: &str) -> String {
    format!("{}#system", id)
}
