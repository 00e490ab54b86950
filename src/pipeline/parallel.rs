//! Fan-out/fan-in over independent steps.

use super::BoxFut;
use crate::error::Result;
use crate::PipelineError;
use futures::future::try_join_all;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

type ParallelStepFn = Arc<dyn Fn(Value) -> BoxFut<'static, Result<Value>> + Send + Sync>;

/// Independent steps that all receive the same input.
///
/// Each step runs as its own tokio task. Results come back in registration
/// order regardless of completion order; the first failure aborts the
/// remaining tasks and is returned as-is.
///
/// # Example
///
/// ```
/// use multillama::pipeline::ParallelPipeline;
/// use serde_json::{json, Value};
///
/// # tokio_test::block_on(async {
/// let mut pipeline = ParallelPipeline::new();
/// pipeline
///     .add_parallel_step(|v: Value| async move { Ok(json!(format!("{}-a", v.as_str().unwrap()))) })
///     .add_parallel_step(|v: Value| async move { Ok(json!(format!("{}-b", v.as_str().unwrap()))) });
///
/// let results = pipeline.execute(json!("x")).await.unwrap();
/// assert_eq!(results, vec![json!("x-a"), json!("x-b")]);
/// # });
/// ```
#[derive(Default)]
pub struct ParallelPipeline {
    steps: Vec<ParallelStepFn>,
}

impl ParallelPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parallel_step<F, Fut>(&mut self, step: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.steps.push(Arc::new(move |input| Box::pin(step(input))));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step concurrently on `input`.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn execute(&self, input: Value) -> Result<Vec<Value>> {
        debug!(steps = self.steps.len(), "launching parallel steps");

        let handles: Vec<_> = self
            .steps
            .iter()
            .map(|step| tokio::spawn(step(input.clone())))
            .collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let joined = try_join_all(handles.into_iter().enumerate().map(|(idx, handle)| async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(PipelineError::StepFailed {
                    step: format!("parallel[{}]", idx),
                    message: join_err.to_string(),
                }),
            }
        }))
        .await;

        if joined.is_err() {
            for abort in &aborts {
                abort.abort();
            }
        }
        joined
    }
}

impl std::fmt::Debug for ParallelPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelPipeline")
            .field("steps", &self.steps.len())
            .finish()
    }
}
