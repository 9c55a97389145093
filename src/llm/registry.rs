//! Model registry
//!
//! Maps model ids to ready-to-use streaming services, built once at startup
//! from the provider credentials in the environment.

use super::{all_models, LlmService, LoggingService, ModelDef, Provider};
use std::collections::HashMap;
use std::sync::Arc;

/// Model used when `DEFAULT_MODEL` is unset
pub const DEFAULT_MODEL_ID: &str = "gemini-2.5-flash";

/// Provider credentials and model selection
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub google_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    /// Proxy base URL; when set it handles provider authentication
    pub gateway: Option<String>,
    pub default_model: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            google_api_key: get("GOOGLE_API_KEY"),
            openai_api_key: get("OPENAI_API_KEY"),
            gateway: get("LLM_GATEWAY"),
            default_model: get("DEFAULT_MODEL"),
        }
    }
}

/// Configured models and the default choice
pub struct ModelRegistry {
    services: HashMap<String, Arc<dyn LlmService>>,
    default_model: String,
}

impl ModelRegistry {
    /// Registry with no models, used when nothing is configured
    pub fn new_empty() -> Self {
        Self {
            services: HashMap::new(),
            default_model: DEFAULT_MODEL_ID.to_string(),
        }
    }

    /// Build services for every model whose credentials are present.
    ///
    /// The default is `DEFAULT_MODEL` when that model is usable, otherwise
    /// `gemini-2.5-flash`, otherwise the first usable model in table order.
    pub fn new(config: &LlmConfig) -> Self {
        let services: HashMap<String, Arc<dyn LlmService>> = all_models()
            .iter()
            .filter_map(|def| Some((def.id.to_string(), Self::try_create_model(def, config)?)))
            .collect();

        let requested = config.default_model.as_deref();
        if let Some(id) = requested.filter(|id| !services.contains_key(*id)) {
            tracing::warn!(model = %id, "DEFAULT_MODEL is not configured, falling back");
        }

        let default_model = requested
            .into_iter()
            .chain(std::iter::once(DEFAULT_MODEL_ID))
            .chain(all_models().iter().map(|def| def.id))
            .find(|id| services.contains_key(*id))
            .unwrap_or(DEFAULT_MODEL_ID)
            .to_string();

        Self {
            services,
            default_model,
        }
    }

    /// Service for one model, or `None` when its provider has no credential
    fn try_create_model(model_def: &ModelDef, config: &LlmConfig) -> Option<Arc<dyn LlmService>> {
        // The gateway authenticates on our behalf
        let api_key = if config.gateway.is_some() {
            "implicit".to_string()
        } else {
            match model_def.provider {
                Provider::Gemini => config.google_api_key.as_ref()?,
                Provider::OpenAI => config.openai_api_key.as_ref()?,
            }
            .clone()
        };

        match model_def.create(&api_key, config.gateway.as_deref()) {
            Ok(service) => Some(Arc::new(LoggingService::new(service))),
            Err(e) => {
                tracing::warn!(model = model_def.id, error = %e, "Model unavailable");
                None
            }
        }
    }

    /// Get a model by ID
    pub fn get(&self, model_id: &str) -> Option<Arc<dyn LlmService>> {
        self.services.get(model_id).cloned()
    }

    pub fn default_model_id(&self) -> &str {
        &self.default_model
    }

    /// Configured model ids, sorted
    pub fn available_models(&self) -> Vec<String> {
        let mut models: Vec<_> = self.services.keys().cloned().collect();
        models.sort();
        models
    }

    /// Metadata for `/api/models`, in table order
    pub fn available_model_info(&self) -> Vec<crate::api::ModelInfo> {
        all_models()
            .iter()
            .filter(|def| self.services.contains_key(def.id))
            .map(|def| crate::api::ModelInfo {
                id: def.id.to_string(),
                provider: def.provider.display_name().to_string(),
                description: def.description.to_string(),
                context_window: def.context_window,
                default: def.id == self.default_model,
            })
            .collect()
    }

    pub fn has_models(&self) -> bool {
        !self.services.is_empty()
    }
}
