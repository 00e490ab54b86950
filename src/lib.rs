//! # MultiLlama
//!
//! Route prompts through interchangeable LLM backends, optionally via
//! composed multi-step pipelines.
//!
//! The crate provides the orchestration layer around model calls:
//! **adapters** that talk to providers, **pipelines** that chain, branch
//! and fan out steps, and **plugins** that hook every model call and
//! pipeline run.
//!
//! ## Core Concepts
//!
//! - **[`Orchestrator`]**: resolves a model name to an adapter, runs the
//!   plugin chain around each call and wraps pipeline runs with progress
//!   reporting.
//! - **[`Adapter`]**: object-safe trait for a provider backend. Streaming is
//!   an optional capability queried with `supports_streaming()`.
//! - **[`Pipeline`]**: a rooted graph of steps with conditional branching.
//!   [`SequentialPipeline`] and [`ParallelPipeline`] cover the common shapes.
//! - **[`ExecutionContext`]**: per-run scratch space and progress controls
//!   handed to every step.
//! - **[`PluginChain`]**: ordered hooks; model hooks transform, pipeline
//!   hooks observe.
//! - **[`Config`]**: services, models and progress messages, loadable from
//!   JSON (or YAML with the `yaml` feature).
//!
//! ## Quick Start
//!
//! ```no_run
//! use multillama::{Config, Orchestrator, SequentialPipeline};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("multillama.json")?;
//!     let orchestrator = Orchestrator::from_config(config)?;
//!
//!     let mut pipeline = SequentialPipeline::new();
//!     pipeline
//!         .add_step(orchestrator.model_step("drafter"))
//!         .add_step(orchestrator.model_step("editor"));
//!
//!     let output = orchestrator
//!         .run_sequential_pipeline(&pipeline, json!("Write a haiku about rust"), true)
//!         .await?;
//!     println!("{}", output.as_str().unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `openai`: the OpenAI-compatible adapter.
//! - `yaml`: YAML configuration files.
//! - `spinner`: a terminal spinner progress reporter.

pub mod adapter;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod plugin;
pub mod progress;

pub use adapter::{Adapter, AdapterResponse, AnthropicAdapter, ChatMessage, MockAdapter, OllamaAdapter, Role};
#[cfg(feature = "openai")]
pub use adapter::OpenAiAdapter;
pub use config::{AdapterKind, Config, ModelConfig, ModelOptions, ResponseFormat, ServiceConfig, SpinnerConfig};
pub use error::{PipelineError, Result};
pub use orchestrator::{AdapterRegistry, ModelInput, Orchestrator, OrchestratorBuilder};
pub use pipeline::{
    conditional_step, BoxFut, BranchKey, ExecutionContext, NodeId, ParallelPipeline, Pipeline,
    SequentialPipeline,
};
pub use plugin::{PipelineKind, Plugin, PluginChain};
#[cfg(feature = "spinner")]
pub use progress::SpinnerReporter;
pub use progress::{FnReporterFactory, NoopReporter, Progress, ProgressReporter, ReporterFactory, TracingReporter};
