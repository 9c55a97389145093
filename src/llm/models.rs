//! Model definitions for the supported providers
//!
//! Adding a model means adding one entry to [`all_models`].

use super::openai::{Endpoint, OpenAIService};
use super::LlmService;
use std::sync::Arc;

/// LLM provider enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Gemini,
    OpenAI,
}

impl Provider {
    /// Get the display name for this provider
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Gemini => "Google",
            Provider::OpenAI => "OpenAI",
        }
    }

    /// Environment variable holding this provider's API key
    pub fn api_key_env_var(self) -> &'static str {
        match self {
            Provider::Gemini => "GOOGLE_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
        }
    }

    fn endpoint(self) -> Endpoint {
        match self {
            Provider::Gemini => Endpoint::Gemini,
            Provider::OpenAI => Endpoint::OpenAI,
        }
    }
}

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID (e.g., "gemini-2.5-flash")
    pub id: &'static str,
    pub provider: Provider,
    /// Name sent to the provider API
    pub api_name: &'static str,
    pub description: &'static str,
    /// Context window size in tokens
    pub context_window: usize,
}

impl ModelDef {
    /// Build the streaming service for this model
    pub fn create(
        &self,
        api_key: &str,
        gateway: Option<&str>,
    ) -> Result<Arc<dyn LlmService>, String> {
        if api_key.is_empty() {
            return Err(format!(
                "{} requires {} or gateway",
                self.id,
                self.provider.api_key_env_var()
            ));
        }
        let service = OpenAIService::new(
            api_key.to_string(),
            self.id,
            self.api_name,
            self.provider.endpoint(),
            gateway,
        )
        .map_err(|e| e.message)?;
        Ok(Arc::new(service))
    }
}

/// Get all available model definitions
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "gemini-2.5-flash",
            provider: Provider::Gemini,
            api_name: "gemini-2.5-flash",
            description: "Gemini 2.5 Flash (fast, default)",
            context_window: 1_048_576,
        },
        ModelDef {
            id: "gemini-2.5-pro",
            provider: Provider::Gemini,
            api_name: "gemini-2.5-pro",
            description: "Gemini 2.5 Pro (most capable, slower)",
            context_window: 1_048_576,
        },
        ModelDef {
            id: "gpt-4o",
            provider: Provider::OpenAI,
            api_name: "gpt-4o",
            description: "GPT-4o (balanced performance)",
            context_window: 128_000,
        },
        ModelDef {
            id: "gpt-4o-mini",
            provider: Provider::OpenAI,
            api_name: "gpt-4o-mini",
            description: "GPT-4o Mini (fast, efficient)",
            context_window: 128_000,
        },
    ]
}
