//! Configuration document: services, models, and progress messages.
//!
//! A [`Config`] maps model names to a [`ModelConfig`], which names the
//! [`ServiceConfig`] (backend descriptor plus credentials) it runs on.
//! The orchestrator consumes an already-loaded `Config` read-only; loading
//! and saving live here so callers can keep the document on disk.
//!
//! ```
//! use multillama::Config;
//!
//! let config = Config::from_json_str(r#"{
//!     "services": { "local": { "adapter": "ollama" } },
//!     "models": { "fast": { "service": "local", "name": "llama3.2" } }
//! }"#).unwrap();
//! assert_eq!(config.model("fast").unwrap().name, "llama3.2");
//! ```

use crate::adapter::{Adapter, AnthropicAdapter, OllamaAdapter};
#[cfg(feature = "openai")]
use crate::adapter::OpenAiAdapter;
use crate::error::Result;
use crate::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend descriptors keyed by service name.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,

    /// Model descriptors keyed by the name callers use.
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,

    /// Progress messages shown while runs are in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spinner_config: Option<SpinnerConfig>,
}

/// Which adapter implementation a service uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

/// A backend descriptor and its credentials.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub adapter: AdapterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("adapter", &self.adapter)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl ServiceConfig {
    pub fn new(adapter: AdapterKind) -> Self {
        Self {
            adapter,
            base_url: None,
            api_key: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Instantiate the adapter this service describes.
    pub fn build_adapter(&self) -> Result<Arc<dyn Adapter>> {
        match self.adapter {
            AdapterKind::Ollama => {
                let mut adapter = OllamaAdapter::new();
                if let Some(ref url) = self.base_url {
                    adapter = adapter.with_base_url(url);
                }
                Ok(Arc::new(adapter))
            }
            #[cfg(feature = "openai")]
            AdapterKind::OpenAi => {
                let mut adapter = OpenAiAdapter::new();
                if let Some(ref url) = self.base_url {
                    adapter = adapter.with_base_url(url);
                }
                if let Some(ref key) = self.api_key {
                    adapter = adapter.with_api_key(key);
                }
                Ok(Arc::new(adapter))
            }
            #[cfg(not(feature = "openai"))]
            AdapterKind::OpenAi => Err(PipelineError::Configuration(
                "the openai adapter requires the `openai` feature".to_string(),
            )),
            AdapterKind::Anthropic => {
                let key = self.api_key.clone().ok_or_else(|| {
                    PipelineError::Configuration(
                        "anthropic services require an apiKey".to_string(),
                    )
                })?;
                let mut adapter = AnthropicAdapter::new(key);
                if let Some(ref url) = self.base_url {
                    adapter = adapter.with_base_url(url);
                }
                Ok(Arc::new(adapter))
            }
        }
    }
}

/// Output format hint passed to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// Sampling options forwarded to the backend. Unset fields use the
/// backend's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
}

/// A model as seen by callers: which service runs it and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Name of the service in [`Config::services`].
    #[serde(default)]
    pub service: String,

    /// Provider model identifier (e.g. `"llama3.2"`, `"gpt-4o"`).
    pub name: String,

    #[serde(default)]
    pub response_format: ResponseFormat,

    /// Prepended as a system message when the caller sends a bare prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub options: ModelOptions,
}

impl ModelConfig {
    /// A model with no service binding, used for explicitly registered adapters.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            service: String::new(),
            name: name.into(),
            response_format: ResponseFormat::Text,
            system_prompt: None,
            options: ModelOptions::default(),
        }
    }

    pub fn on_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.options.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.options.max_tokens = Some(tokens);
        self
    }
}

/// Messages shown by progress reporters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinnerConfig {
    pub loading_message: String,
    pub success_message: String,
    pub error_message: String,
}

impl Default for SpinnerConfig {
    fn default() -> Self {
        Self {
            loading_message: "Processing request...".to_string(),
            success_message: "Process completed successfully!".to_string(),
            error_message: "An error occurred during the process".to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service (builder style).
    pub fn service_entry(mut self, name: impl Into<String>, service: ServiceConfig) -> Self {
        self.services.insert(name.into(), service);
        self
    }

    /// Add a model (builder style).
    pub fn model_entry(mut self, name: impl Into<String>, model: ModelConfig) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    pub fn with_spinner_config(mut self, spinner: SpinnerConfig) -> Self {
        self.spinner_config = Some(spinner);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| PipelineError::Configuration(format!("invalid YAML config: {}", e)))
    }

    /// Load a JSON configuration document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            models = config.models.len(),
            services = config.services.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn model(&self, name: &str) -> Result<&ModelConfig> {
        self.models
            .get(name)
            .ok_or_else(|| PipelineError::Configuration(format!("Model {} is not configured.", name)))
    }

    pub fn service(&self, name: &str) -> Result<&ServiceConfig> {
        self.services.get(name).ok_or_else(|| {
            PipelineError::Configuration(format!("Service {} is not configured.", name))
        })
    }

    /// Progress messages, falling back to the defaults.
    pub fn spinner(&self) -> SpinnerConfig {
        self.spinner_config.clone().unwrap_or_default()
    }

    /// Check that every model points at a declared service.
    pub fn validate(&self) -> Result<()> {
        for (model_name, model) in &self.models {
            if !self.services.contains_key(&model.service) {
                return Err(PipelineError::Configuration(format!(
                    "Model {} references undeclared service '{}'",
                    model_name, model.service
                )));
            }
        }
        Ok(())
    }
}
