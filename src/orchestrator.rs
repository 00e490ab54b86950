//! The orchestrator: model resolution, plugin hooks and progress around
//! every model call and pipeline run.
//!
//! ```text
//!   use_model("fast", prompt)
//!        │
//!        ├─ resolve ── registered adapter? ── else model → service → adapter
//!        ├─ plugins.before_model_call (fold)
//!        ├─ adapter.run
//!        └─ plugins.after_model_call (fold) ──▶ text
//!
//!   run_*_pipeline(pipeline, input)
//!        │
//!        ├─ progress.start(loading message)
//!        ├─ plugins.before_pipeline_start(kind, input)
//!        ├─ pipeline traversal / fan-out
//!        ├─ plugins.after_pipeline_end(kind, output)
//!        └─ progress.succeed | progress.fail ──▶ output | original error
//! ```
//!
//! Every registry is owned by the orchestrator instance, so independent
//! orchestrators can coexist in one process.

use crate::adapter::{Adapter, ChatMessage, Role};
use crate::config::{Config, ModelConfig, SpinnerConfig};
use crate::error::Result;
use crate::pipeline::{BoxFut, ExecutionContext, ParallelPipeline, Pipeline, SequentialPipeline};
use crate::plugin::{Plugin, PipelineKind, PluginChain};
use crate::progress::{Progress, ReporterFactory, TracingReporter};
use crate::PipelineError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What a caller sends to a model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelInput {
    /// A bare prompt. Sent as an optional system message followed by one
    /// user message.
    Prompt(String),
    /// A full conversation, sent as-is.
    Messages(Vec<ChatMessage>),
}

impl From<&str> for ModelInput {
    fn from(prompt: &str) -> Self {
        ModelInput::Prompt(prompt.to_string())
    }
}

impl From<String> for ModelInput {
    fn from(prompt: String) -> Self {
        ModelInput::Prompt(prompt)
    }
}

impl From<Vec<ChatMessage>> for ModelInput {
    fn from(messages: Vec<ChatMessage>) -> Self {
        ModelInput::Messages(messages)
    }
}

/// Adapters bound directly to model names.
///
/// Entries here take precedence over the configuration's
/// model → service → adapter route.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `adapter` to `model`, replacing any previous binding.
    pub fn register(&mut self, model: impl Into<String>, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(model.into(), adapter);
    }

    pub fn get(&self, model: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(model).cloned()
    }

    pub fn contains(&self, model: &str) -> bool {
        self.adapters.contains_key(model)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<_> = self
            .adapters
            .iter()
            .map(|(model, adapter)| (model.as_str(), adapter.name()))
            .collect();
        entries.sort();
        f.debug_struct("AdapterRegistry")
            .field("adapters", &entries)
            .finish()
    }
}

struct OrchestratorInner {
    config: Config,
    services: HashMap<String, Arc<dyn Adapter>>,
    registered: AdapterRegistry,
    plugins: PluginChain,
    reporters: Box<dyn ReporterFactory>,
}

/// Entry point for model calls and pipeline runs.
///
/// Cheap to clone; clones share adapters, plugins and configuration.
///
/// # Example
///
/// ```
/// use multillama::adapter::MockAdapter;
/// use multillama::plugin::Plugin;
/// use multillama::Orchestrator;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let orchestrator = Orchestrator::builder()
///     .adapter("echo", Arc::new(MockAdapter::fixed("pong")))
///     .plugin(Plugin::new("shout").after_model_call(|_, text| async move {
///         Ok(text.to_uppercase())
///     }))
///     .build()
///     .unwrap();
///
/// assert_eq!(orchestrator.use_model("echo", "ping").await.unwrap(), "PONG");
/// # });
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// An orchestrator driven entirely by `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn plugins(&self) -> &PluginChain {
        &self.inner.plugins
    }

    /// Find the adapter and model settings for `model`.
    ///
    /// Fails before any external call when the model is unknown or its
    /// service has no adapter.
    pub fn resolve(&self, model: &str) -> Result<(Arc<dyn Adapter>, ModelConfig)> {
        let configured = self.inner.config.models.get(model);

        if let Some(adapter) = self.inner.registered.get(model) {
            let settings = configured
                .cloned()
                .unwrap_or_else(|| ModelConfig::named(model));
            return Ok((adapter, settings));
        }

        let settings = configured.ok_or_else(|| PipelineError::AdapterNotConfigured {
            model: model.to_string(),
        })?;
        let adapter = self
            .inner
            .services
            .get(&settings.service)
            .cloned()
            .ok_or_else(|| PipelineError::AdapterNotConfigured {
                model: model.to_string(),
            })?;
        Ok((adapter, settings.clone()))
    }

    /// Send `input` to `model` and return the plugin-transformed response text.
    #[instrument(name = "use_model", skip_all, fields(model = %model))]
    pub async fn use_model(&self, model: &str, input: impl Into<ModelInput>) -> Result<String> {
        let (adapter, settings) = self.resolve(model)?;
        let messages = self.prepare_messages(model, &settings, input.into()).await?;

        debug!(adapter = adapter.name(), messages = messages.len(), "calling adapter");
        let response = adapter.run(&messages, &settings).await?;

        self.inner
            .plugins
            .run_after_model_call(model, response.text)
            .await
    }

    /// Stream `input` through `model`, handing each chunk to `on_chunk`.
    ///
    /// Returns the accumulated text. `after_model_call` hooks are not applied
    /// to streamed output.
    #[instrument(name = "use_model_with_streaming", skip_all, fields(model = %model))]
    pub async fn use_model_with_streaming<F>(
        &self,
        model: &str,
        input: impl Into<ModelInput>,
        mut on_chunk: F,
    ) -> Result<String>
    where
        F: FnMut(String) + Send,
    {
        let (adapter, settings) = self.resolve(model)?;
        if !adapter.supports_streaming() {
            return Err(PipelineError::StreamingUnsupported {
                model: model.to_string(),
                adapter: adapter.name().to_string(),
            });
        }
        let messages = self.prepare_messages(model, &settings, input.into()).await?;

        debug!(adapter = adapter.name(), "streaming from adapter");
        let response = adapter
            .run_streaming(&messages, &settings, &mut on_chunk)
            .await?;
        Ok(response.text)
    }

    async fn prepare_messages(
        &self,
        model: &str,
        settings: &ModelConfig,
        input: ModelInput,
    ) -> Result<Vec<ChatMessage>> {
        let plugins = &self.inner.plugins;
        match input {
            ModelInput::Prompt(prompt) => {
                let prompt = plugins.run_before_model_call(model, prompt).await?;
                let mut messages = Vec::with_capacity(2);
                if let Some(ref system) = settings.system_prompt {
                    messages.push(ChatMessage::system(system.clone()));
                }
                messages.push(ChatMessage::user(prompt));
                Ok(messages)
            }
            ModelInput::Messages(mut messages) => {
                if let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == Role::User) {
                    let content = std::mem::take(&mut last_user.content);
                    last_user.content = plugins.run_before_model_call(model, content).await?;
                }
                Ok(messages)
            }
        }
    }

    /// A pipeline step that sends the current value to `model`.
    ///
    /// Strings are sent as-is, any other JSON is rendered first. The step
    /// yields the response as a JSON string.
    pub fn model_step(
        &self,
        model: impl Into<String>,
    ) -> impl Fn(Value, ExecutionContext) -> BoxFut<'static, Result<Value>> + Send + Sync + 'static {
        let call = self.model_call(model);
        move |input: Value, _ctx: ExecutionContext| call(input)
    }

    /// Like [`model_step`](Self::model_step) but without a context, for
    /// [`ParallelPipeline`] steps.
    pub fn model_call(
        &self,
        model: impl Into<String>,
    ) -> impl Fn(Value) -> BoxFut<'static, Result<Value>> + Send + Sync + 'static {
        let orchestrator = self.clone();
        let model = model.into();
        move |input: Value| -> BoxFut<'static, Result<Value>> {
            let orchestrator = orchestrator.clone();
            let model = model.clone();
            Box::pin(async move {
                let text = orchestrator.use_model(&model, prompt_text(input)).await?;
                Ok(Value::String(text))
            })
        }
    }

    /// Run a [`SequentialPipeline`], logging each step at `info` when
    /// `enable_logging` is set.
    #[instrument(name = "run_sequential_pipeline", skip_all, fields(steps = pipeline.len()))]
    pub async fn run_sequential_pipeline(
        &self,
        pipeline: &SequentialPipeline,
        input: Value,
        enable_logging: bool,
    ) -> Result<Value> {
        if pipeline.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }
        let logging = enable_logging || pipeline.graph().logging_enabled();
        let messages = pipeline.graph().messages().cloned();
        self.run_wrapped(PipelineKind::Sequential, messages, input, |input, progress| async move {
            pipeline.traverse(input, &progress, logging).await
        })
        .await
    }

    /// Run a branching [`Pipeline`].
    #[instrument(name = "run_conditional_pipeline", skip_all, fields(nodes = pipeline.len()))]
    pub async fn run_conditional_pipeline(&self, pipeline: &Pipeline, input: Value) -> Result<Value> {
        if pipeline.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }
        let logging = pipeline.logging_enabled();
        let messages = pipeline.messages().cloned();
        self.run_wrapped(PipelineKind::Conditional, messages, input, |input, progress| async move {
            pipeline.traverse(input, &progress, logging).await
        })
        .await
    }

    /// Run a [`ParallelPipeline`]; results come back in registration order.
    ///
    /// `after_pipeline_end` observes the results as a JSON array.
    #[instrument(name = "run_parallel_pipeline", skip_all, fields(steps = pipeline.len()))]
    pub async fn run_parallel_pipeline(
        &self,
        pipeline: &ParallelPipeline,
        input: Value,
    ) -> Result<Vec<Value>> {
        let output = self
            .run_wrapped(PipelineKind::Parallel, None, input, |input, _progress| async move {
                pipeline.execute(input).await.map(Value::Array)
            })
            .await?;
        match output {
            Value::Array(results) => Ok(results),
            other => Ok(vec![other]),
        }
    }

    /// `messages` overrides the configured progress messages for this run.
    async fn run_wrapped<F, Fut>(
        &self,
        kind: PipelineKind,
        messages: Option<SpinnerConfig>,
        input: Value,
        execute: F,
    ) -> Result<Value>
    where
        F: FnOnce(Value, Progress) -> Fut,
        Fut: std::future::Future<Output = Result<Value>>,
    {
        let messages = messages.unwrap_or_else(|| self.inner.config.spinner());
        let progress = Progress::new(self.inner.reporters.create(), messages);
        progress.start();
        info!(%kind, "pipeline started");

        let result = async {
            self.inner.plugins.run_before_pipeline_start(kind, &input).await?;
            let output = execute(input, progress.clone()).await?;
            self.inner.plugins.run_after_pipeline_end(kind, &output).await?;
            Ok(output)
        }
        .await;

        match &result {
            Ok(_) => {
                info!(%kind, "pipeline finished");
                progress.succeed_default();
            }
            Err(e) => {
                warn!(%kind, error = %e, "pipeline failed");
                progress.fail_default();
            }
        }
        result
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut services: Vec<_> = self.inner.services.keys().collect();
        services.sort();
        f.debug_struct("Orchestrator")
            .field("models", &self.inner.config.models.keys().collect::<Vec<_>>())
            .field("services", &services)
            .field("registered", &self.inner.registered)
            .field("plugins", &self.inner.plugins.names())
            .finish()
    }
}

fn prompt_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Builder for [`Orchestrator`].
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Option<Config>,
    plugins: PluginChain,
    adapters: AdapterRegistry,
    reporters: Option<Box<dyn ReporterFactory>>,
}

impl OrchestratorBuilder {
    /// Models, services and progress messages.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the plugin chain.
    pub fn plugins(mut self, plugins: PluginChain) -> Self {
        self.plugins = plugins;
        self
    }

    /// Append one plugin to the chain.
    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.register(plugin);
        self
    }

    /// Replace the explicitly registered adapters.
    pub fn adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    /// Bind `adapter` directly to `model`.
    pub fn adapter(mut self, model: impl Into<String>, adapter: Arc<dyn Adapter>) -> Self {
        self.adapters.register(model, adapter);
        self
    }

    /// Where per-run progress reporters come from. Defaults to
    /// [`TracingReporter`].
    pub fn reporter_factory(mut self, factory: impl ReporterFactory + 'static) -> Self {
        self.reporters = Some(Box::new(factory));
        self
    }

    /// Validate the configuration and build one adapter per service.
    pub fn build(self) -> Result<Orchestrator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let mut services = HashMap::with_capacity(config.services.len());
        for (name, service) in &config.services {
            debug!(service = %name, adapter = ?service.adapter, "building service adapter");
            services.insert(name.clone(), service.build_adapter()?);
        }

        Ok(Orchestrator {
            inner: Arc::new(OrchestratorInner {
                config,
                services,
                registered: self.adapters,
                plugins: self.plugins,
                reporters: self.reporters.unwrap_or_else(|| Box::new(TracingReporter)),
            }),
        })
    }
}
