use thiserror::Error;

/// Errors produced by the orchestrator, pipelines, adapters and plugins.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Unknown model or service, or an otherwise invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The model is unknown or its service has no bound adapter.
    #[error("No adapter configured for model '{model}'")]
    AdapterNotConfigured { model: String },

    /// `execute` was called before any step was added.
    #[error("Pipeline has no steps")]
    EmptyPipeline,

    /// A node's condition produced a key with no matching branch.
    #[error("No branch found for condition result '{key}'")]
    BranchNotFound { key: String },

    /// Traversal re-entered a node it had already executed in this run.
    #[error("Cycle detected: node {node} was reached twice")]
    CycleDetected { node: usize },

    /// A node id that does not belong to this pipeline.
    #[error("Unknown pipeline node {node}")]
    UnknownNode { node: usize },

    /// The resolved adapter cannot stream.
    #[error("Adapter '{adapter}' for model '{model}' does not support streaming")]
    StreamingUnsupported { model: String, adapter: String },

    /// A backend call failed with a provider-level message.
    #[error("Error using {adapter}: {message}")]
    Adapter { adapter: String, message: String },

    /// Non-success HTTP status returned by a provider.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A plugin hook returned an error.
    #[error("Plugin '{plugin}' failed in {hook}: {source}")]
    PluginHook {
        plugin: String,
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A spawned step panicked or was aborted.
    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Whether this error was raised while resolving configuration, before
    /// any external call was made.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Configuration(_) | PipelineError::AdapterNotConfigured { .. }
        )
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<PipelineError>() {
            Ok(inner) => inner,
            Err(other) => PipelineError::Other(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
