//! Prompt library for notevault.
//!
//! Prompts are YAML definitions with Handlebars templates. Built-in prompts
//! ship with the binary; a workspace can replace any of them with
//! `.notevault/prompts/<id>.yml`.

pub mod builtin;
pub mod library;
pub mod loader;
pub mod types;

pub use library::PromptLibrary;
pub use loader::{load_overrides, prompts_dir};
pub use types::{BuiltPrompt, PromptDefinition, PromptSource};
