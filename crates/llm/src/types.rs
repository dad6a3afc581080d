//! Supported chat backends.

use std::fmt;
use std::str::FromStr;

use notevault_core::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Ollama,
    /// api.openai.com or any server speaking its chat-completions API
    OpenAI,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
        }
    }

    /// Cloud backends refuse requests without a key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI)
    }
}

impl FromStr for ProviderType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            other => Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: ollama, openai",
                other
            ))),
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("Ollama".parse::<ProviderType>().unwrap(), ProviderType::Ollama);
        assert_eq!(" openai ".parse::<ProviderType>().unwrap(), ProviderType::OpenAI);
        assert!(matches!("claude".parse::<ProviderType>(), Err(AppError::Config(_))));
        assert!(ProviderType::OpenAI.requires_api_key());
        assert_eq!(ProviderType::Ollama.to_string(), "ollama");
    }
}
