//! Plugins: optional hooks run around model calls and pipeline runs.
//!
//! A [`Plugin`] carries up to four hooks, each either absent or a function.
//! A [`PluginChain`] holds plugins in registration order:
//!
//! - `before_model_call` / `after_model_call` are **transforms**: the
//!   prompt (or response) is folded through every plugin that has the hook,
//!   each receiving the previous plugin's output.
//! - `before_pipeline_start` / `after_pipeline_end` are **observers**:
//!   awaited one after another, return values ignored.
//!
//! A failing hook aborts the rest of the chain and the enclosing call.
//!
//! # Example
//!
//! ```
//! use multillama::plugin::{Plugin, PluginChain};
//!
//! # tokio_test::block_on(async {
//! let mut chain = PluginChain::new();
//! chain.register(Plugin::new("p1").before_model_call(|_model, prompt| async move {
//!     Ok(format!("{}-p1", prompt))
//! }));
//! chain.register(Plugin::new("p2").before_model_call(|_model, prompt| async move {
//!     Ok(format!("{}-p2", prompt))
//! }));
//!
//! let prompt = chain.run_before_model_call("any", "hi".to_string()).await.unwrap();
//! assert_eq!(prompt, "hi-p1-p2");
//! # });
//! ```

use crate::error::Result;
use crate::pipeline::BoxFut;
use crate::PipelineError;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::trace;

/// Which orchestrator entry point a pipeline hook fires for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Sequential,
    Parallel,
    Conditional,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Sequential => "sequential",
            PipelineKind::Parallel => "parallel",
            PipelineKind::Conditional => "conditional",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type ModelHook = Arc<dyn Fn(String, String) -> BoxFut<'static, anyhow::Result<String>> + Send + Sync>;
type PipelineHook = Arc<dyn Fn(PipelineKind, Value) -> BoxFut<'static, anyhow::Result<()>> + Send + Sync>;

/// A named set of optional hooks.
#[derive(Clone)]
pub struct Plugin {
    name: String,
    before_model_call: Option<ModelHook>,
    after_model_call: Option<ModelHook>,
    before_pipeline_start: Option<PipelineHook>,
    after_pipeline_end: Option<PipelineHook>,
}

fn model_hook<F, Fut>(hook: F) -> ModelHook
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    Arc::new(move |model, text| Box::pin(hook(model, text)))
}

fn pipeline_hook<F, Fut>(hook: F) -> PipelineHook
where
    F: Fn(PipelineKind, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |kind, value| Box::pin(hook(kind, value)))
}

impl Plugin {
    /// A plugin with no hooks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before_model_call: None,
            after_model_call: None,
            before_pipeline_start: None,
            after_pipeline_end: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transform the prompt before it reaches the adapter.
    /// Receives `(model_name, prompt)`.
    pub fn before_model_call<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        self.before_model_call = Some(model_hook(hook));
        self
    }

    /// Transform the adapter's text before it is returned.
    /// Receives `(model_name, response)`.
    pub fn after_model_call<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        self.after_model_call = Some(model_hook(hook));
        self
    }

    /// Observe a pipeline run's initial input.
    pub fn before_pipeline_start<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(PipelineKind, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.before_pipeline_start = Some(pipeline_hook(hook));
        self
    }

    /// Observe a pipeline run's final output.
    pub fn after_pipeline_end<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(PipelineKind, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.after_pipeline_end = Some(pipeline_hook(hook));
        self
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("before_model_call", &self.before_model_call.is_some())
            .field("after_model_call", &self.after_model_call.is_some())
            .field("before_pipeline_start", &self.before_pipeline_start.is_some())
            .field("after_pipeline_end", &self.after_pipeline_end.is_some())
            .finish()
    }
}

/// Ordered plugin registry.
///
/// Register plugins during setup; the chain is read-only once handed to an
/// [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone, Default)]
pub struct PluginChain {
    plugins: Vec<Plugin>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin; it runs after every plugin registered before it.
    pub fn register(&mut self, plugin: Plugin) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name.as_str()).collect()
    }

    pub async fn run_before_model_call(&self, model: &str, prompt: String) -> Result<String> {
        self.fold("before_model_call", model, prompt, |p| p.before_model_call.as_ref())
            .await
    }

    pub async fn run_after_model_call(&self, model: &str, response: String) -> Result<String> {
        self.fold("after_model_call", model, response, |p| p.after_model_call.as_ref())
            .await
    }

    pub async fn run_before_pipeline_start(&self, kind: PipelineKind, input: &Value) -> Result<()> {
        self.notify("before_pipeline_start", kind, input, |p| p.before_pipeline_start.as_ref())
            .await
    }

    pub async fn run_after_pipeline_end(&self, kind: PipelineKind, output: &Value) -> Result<()> {
        self.notify("after_pipeline_end", kind, output, |p| p.after_pipeline_end.as_ref())
            .await
    }

    async fn fold(
        &self,
        hook: &'static str,
        model: &str,
        mut text: String,
        select: impl Fn(&Plugin) -> Option<&ModelHook>,
    ) -> Result<String> {
        for plugin in &self.plugins {
            if let Some(f) = select(plugin) {
                trace!(plugin = %plugin.name, hook, "running plugin hook");
                text = f(model.to_string(), text)
                    .await
                    .map_err(|source| PipelineError::PluginHook {
                        plugin: plugin.name.clone(),
                        hook,
                        source,
                    })?;
            }
        }
        Ok(text)
    }

    async fn notify(
        &self,
        hook: &'static str,
        kind: PipelineKind,
        value: &Value,
        select: impl Fn(&Plugin) -> Option<&PipelineHook>,
    ) -> Result<()> {
        for plugin in &self.plugins {
            if let Some(f) = select(plugin) {
                trace!(plugin = %plugin.name, hook, %kind, "running plugin hook");
                f(kind, value.clone())
                    .await
                    .map_err(|source| PipelineError::PluginHook {
                        plugin: plugin.name.clone(),
                        hook,
                        source,
                    })?;
            }
        }
        Ok(())
    }
}
