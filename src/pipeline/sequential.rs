//! Sequential pipelines and the conditional step decorator.

use super::{BoxFut, ExecutionContext, NodeId, Pipeline};
use crate::config::SpinnerConfig;
use crate::error::Result;
use crate::progress::Progress;
use serde_json::Value;
use std::future::Future;

/// Wrap `step` so it only runs when `predicate` holds for the current value.
///
/// When the predicate is false the input passes through unchanged.
pub fn conditional_step<P, F, Fut>(
    predicate: P,
    step: F,
) -> impl Fn(Value, ExecutionContext) -> BoxFut<'static, Result<Value>> + Send + Sync + 'static
where
    P: Fn(&Value) -> bool + Send + Sync + 'static,
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    move |input: Value, ctx: ExecutionContext| -> BoxFut<'static, Result<Value>> {
        if predicate(&input) {
            Box::pin(step(input, ctx))
        } else {
            Box::pin(async move { Ok(input) })
        }
    }
}

/// Steps folded left to right: `stepN(...step2(step1(input))...)`.
///
/// Built on [`Pipeline`]: every added step becomes the `next` of the one
/// before it.
///
/// # Example
///
/// ```
/// use multillama::pipeline::SequentialPipeline;
/// use serde_json::{json, Value};
///
/// # tokio_test::block_on(async {
/// let mut pipeline = SequentialPipeline::new();
/// pipeline
///     .add_step(|v: Value, _| async move { Ok(json!(v.as_i64().unwrap() + 1)) })
///     .add_conditional_step(
///         |v| v.as_i64() == Some(2),
///         |v: Value, _| async move { Ok(json!(v.as_i64().unwrap() * 10)) },
///     );
/// assert_eq!(pipeline.execute(json!(1)).await.unwrap(), json!(20));
/// assert_eq!(pipeline.execute(json!(5)).await.unwrap(), json!(6));
/// # });
/// ```
#[derive(Debug, Default)]
pub struct SequentialPipeline {
    graph: Pipeline,
    last: Option<NodeId>,
}

impl SequentialPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step after the current last step.
    pub fn add_step<F, Fut>(&mut self, step: F) -> &mut Self
    where
        F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let id = self.graph.add_step(step);
        if let Some(prev) = self.last {
            self.graph.link(prev, id);
        }
        self.last = Some(id);
        self
    }

    /// Append a step that only runs when `predicate` holds.
    pub fn add_conditional_step<P, F, Fut>(&mut self, predicate: P, step: F) -> &mut Self
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
        F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.add_step(conditional_step(predicate, step))
    }

    pub fn enable_logging(&mut self) {
        self.graph.enable_logging();
    }

    pub fn with_messages(mut self, messages: SpinnerConfig) -> Self {
        self.graph = self.graph.with_messages(messages);
        self
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// The underlying graph.
    pub fn graph(&self) -> &Pipeline {
        &self.graph
    }

    pub async fn execute(&self, input: Value) -> Result<Value> {
        self.graph.execute(input).await
    }

    pub async fn execute_with_progress(
        &self,
        input: Value,
        progress: &Progress,
        logging: bool,
    ) -> Result<Value> {
        self.graph.execute_with_progress(input, progress, logging).await
    }

    pub(crate) async fn traverse(&self, input: Value, progress: &Progress, logging: bool) -> Result<Value> {
        self.graph.traverse(input, progress, logging).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn shout(input: Value, _ctx: ExecutionContext) -> impl Future<Output = Result<Value>> {
        async move { Ok(json!(input.as_str().unwrap_or_default().to_uppercase())) }
    }

    #[tokio::test]
    async fn test_fold_left_to_right() {
        let mut pipeline = SequentialPipeline::new();
        pipeline
            .add_step(|v: Value, _| async move { Ok(json!(format!("{}1", v.as_str().unwrap()))) })
            .add_step(|v: Value, _| async move { Ok(json!(format!("{}2", v.as_str().unwrap()))) })
            .add_step(|v: Value, _| async move { Ok(json!(format!("{}3", v.as_str().unwrap()))) });

        assert_eq!(pipeline.execute(json!("x")).await.unwrap(), json!("x123"));
        assert_eq!(pipeline.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_sequential_fails() {
        let pipeline = SequentialPipeline::new();
        assert!(matches!(
            pipeline.execute(json!(1)).await,
            Err(PipelineError::EmptyPipeline)
        ));
    }

    #[tokio::test]
    async fn test_conditional_step_identity_when_false() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let step = conditional_step(
            |v| v.as_str().map(|s| s.starts_with('!')).unwrap_or(false),
            move |v: Value, ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                shout(v, ctx)
            },
        );

        let mut pipeline = SequentialPipeline::new();
        pipeline.add_step(step);

        assert_eq!(pipeline.execute(json!("quiet")).await.unwrap(), json!("quiet"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.execute(json!("!loud")).await.unwrap(), json!("!LOUD"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_stops_fold() {
        let reached = Arc::new(AtomicUsize::new(0));
        let seen = reached.clone();
        let mut pipeline = SequentialPipeline::new();
        pipeline
            .add_step(|_, _| async { Err(PipelineError::Other("first failed".into())) })
            .add_step(move |v: Value, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                async move { Ok(v) }
            });

        let err = pipeline.execute(json!(null)).await.unwrap_err();
        assert_eq!(err.to_string(), "first failed");
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }
}
