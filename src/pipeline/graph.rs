//! Branching pipeline graph and its executor.

use super::{boxed_step, BranchKey, ConditionFn, ExecutionContext, StepFn};
use crate::config::SpinnerConfig;
use crate::error::Result;
use crate::progress::Progress;
use crate::PipelineError;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Handle to a node inside one [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One unit of work plus its outgoing wiring.
///
/// When a condition is set it takes precedence over `next`.
struct PipelineNode {
    step: StepFn,
    condition: Option<ConditionFn>,
    branches: HashMap<BranchKey, NodeId>,
    next: Option<NodeId>,
}

/// A rooted graph of steps with optional conditional branching.
///
/// The first step ever added is the initial node. Steps are wired with
/// [`set_next`](Self::set_next) for unconditional chaining or with
/// [`set_condition`](Self::set_condition) plus
/// [`add_branch`](Self::add_branch) for branching.
///
/// # Example
///
/// ```
/// use multillama::pipeline::Pipeline;
/// use serde_json::{json, Value};
///
/// # tokio_test::block_on(async {
/// let mut pipeline = Pipeline::new();
/// let classify = pipeline.add_step(|input: Value, _ctx| async move { Ok(input) });
/// let short = pipeline.add_step(|_, _| async { Ok(json!("short")) });
/// let long = pipeline.add_step(|_, _| async { Ok(json!("long")) });
///
/// pipeline.set_condition(classify, |value, _ctx| {
///     let len = value.as_str().map(str::len).unwrap_or(0);
///     if len < 5 { "short" } else { "long" }
/// }).unwrap();
/// pipeline.add_branch(classify, "short", short).unwrap();
/// pipeline.add_branch(classify, "long", long).unwrap();
///
/// assert_eq!(pipeline.execute(json!("hi")).await.unwrap(), json!("short"));
/// # });
/// ```
pub struct Pipeline {
    nodes: Vec<PipelineNode>,
    logging: bool,
    messages: Option<SpinnerConfig>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            logging: false,
            messages: None,
        }
    }

    /// Add an unlinked step and return its node. The first node added
    /// becomes the initial node.
    pub fn add_step<F, Fut>(&mut self, step: F) -> NodeId
    where
        F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.push_node(boxed_step(step))
    }

    pub(crate) fn push_node(&mut self, step: StepFn) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(PipelineNode {
            step,
            condition: None,
            branches: HashMap::new(),
            next: None,
        });
        id
    }

    /// Run `to` after `from` when `from` has no condition.
    pub fn set_next(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.check(to)?;
        self.node_mut(from)?.next = Some(to);
        Ok(())
    }

    /// Route `node`'s result through `condition` to pick a branch.
    pub fn set_condition<F, K>(&mut self, node: NodeId, condition: F) -> Result<()>
    where
        F: Fn(&Value, &ExecutionContext) -> K + Send + Sync + 'static,
        K: Into<BranchKey>,
    {
        let condition: ConditionFn =
            Arc::new(move |value: &Value, ctx: &ExecutionContext| condition(value, ctx).into());
        self.node_mut(node)?.condition = Some(condition);
        Ok(())
    }

    /// Follow `target` when `node`'s condition yields `key`.
    pub fn add_branch(&mut self, node: NodeId, key: impl Into<BranchKey>, target: NodeId) -> Result<()> {
        self.check(target)?;
        self.node_mut(node)?.branches.insert(key.into(), target);
        Ok(())
    }

    /// Record every step invocation with its input at `info` level.
    pub fn enable_logging(&mut self) {
        self.logging = true;
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging
    }

    /// Success/failure messages used instead of the progress handle's defaults.
    pub fn with_messages(mut self, messages: SpinnerConfig) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn messages(&self) -> Option<&SpinnerConfig> {
        self.messages.as_ref()
    }

    pub fn initial_node(&self) -> Option<NodeId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(NodeId(0))
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn check(&self, id: NodeId) -> Result<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(PipelineError::UnknownNode { node: id.0 })
        }
    }

    /// Link two nodes this pipeline handed out.
    pub(crate) fn link(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from.0].next = Some(to);
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut PipelineNode> {
        self.nodes
            .get_mut(id.0)
            .ok_or(PipelineError::UnknownNode { node: id.0 })
    }

    /// Execute the graph, reporting through `tracing`.
    pub async fn execute(&self, input: Value) -> Result<Value> {
        if self.nodes.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }
        let progress = Progress::tracing();
        progress.start();
        self.execute_with_progress(input, &progress, self.logging).await
    }

    /// Execute the graph against a progress handle the caller already started.
    ///
    /// On success the handle is marked succeeded; on any failure it is marked
    /// failed and the original error is returned unchanged.
    pub async fn execute_with_progress(
        &self,
        input: Value,
        progress: &Progress,
        logging: bool,
    ) -> Result<Value> {
        let result = self.traverse(input, progress, logging).await;

        let messages = self.messages.as_ref().unwrap_or_else(|| progress.messages());
        match &result {
            Ok(_) => {
                progress.succeed(&messages.success_message);
            }
            Err(e) => {
                warn!(error = %e, "pipeline failed");
                progress.fail(&messages.error_message);
            }
        }
        result
    }

    /// Walk the graph without signaling the progress handle's terminal state.
    pub(crate) async fn traverse(
        &self,
        input: Value,
        progress: &Progress,
        logging: bool,
    ) -> Result<Value> {
        let mut current = self.initial_node().ok_or(PipelineError::EmptyPipeline)?;
        let ctx = ExecutionContext::new(input.clone(), progress.clone());
        let mut visited = HashSet::new();
        let mut value = input;

        loop {
            if !visited.insert(current) {
                return Err(PipelineError::CycleDetected { node: current.0 });
            }
            let node = &self.nodes[current.0];

            if logging {
                info!(node = current.0, input = %value, "executing step");
            } else {
                trace!(node = current.0, "executing step");
            }

            let result = (node.step)(value, ctx.clone()).await?;

            if let Some(ref condition) = node.condition {
                let key = condition(&result, &ctx);
                match node.branches.get(&key) {
                    Some(&target) => {
                        debug!(node = current.0, %key, target = target.0, "branch selected");
                        current = target;
                    }
                    None => {
                        return Err(PipelineError::BranchNotFound {
                            key: key.to_string(),
                        })
                    }
                }
            } else if let Some(next) = node.next {
                current = next;
            } else {
                return Ok(result);
            }
            value = result;
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("nodes", &self.nodes.len())
            .field("logging", &self.logging)
            .field("has_messages", &self.messages.is_some())
            .finish()
    }
}
