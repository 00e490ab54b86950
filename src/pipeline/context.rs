//! Per-run execution context shared by the steps of one pipeline run.

use crate::progress::Progress;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

struct ContextInner {
    initial_input: Value,
    data: Mutex<HashMap<String, Value>>,
    progress: Progress,
}

/// Scratch space and progress controls for a single pipeline run.
///
/// A fresh context is built for every `execute` call. Clones are handles to
/// the same run: steps may stash values with [`insert`](Self::insert) for
/// later steps to [`get`](Self::get). Never reuse a context across runs.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

impl ExecutionContext {
    pub fn new(initial_input: Value, progress: Progress) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                initial_input,
                data: Mutex::new(HashMap::new()),
                progress,
            }),
        }
    }

    /// The input the run was started with.
    pub fn initial_input(&self) -> &Value {
        &self.inner.initial_input
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.data.lock().get(key).cloned()
    }

    /// Store a value, returning the previous one under `key`.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner.data.lock().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.data.lock().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.data.lock().contains_key(key)
    }

    /// Copy of the whole scratch space.
    pub fn data(&self) -> HashMap<String, Value> {
        self.inner.data.lock().clone()
    }

    pub fn progress(&self) -> &Progress {
        &self.inner.progress
    }

    pub fn update(&self, message: &str) {
        self.inner.progress.update(message);
    }

    pub fn pause_progress(&self) {
        self.inner.progress.pause();
    }

    pub fn resume_progress(&self) {
        self.inner.progress.resume();
    }

    pub fn succeed_progress(&self, message: &str) {
        self.inner.progress.succeed(message);
    }

    pub fn fail_progress(&self, message: &str) {
        self.inner.progress.fail(message);
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("initial_input", &self.inner.initial_input)
            .field("data_keys", &self.inner.data.lock().keys().collect::<Vec<_>>())
            .field("progress", &self.inner.progress)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clones_share_data() {
        let ctx = ExecutionContext::new(json!("in"), Progress::tracing());
        let other = ctx.clone();
        assert!(ctx.insert("count", 1).is_none());
        assert_eq!(other.get("count"), Some(json!(1)));
        assert_eq!(other.insert("count", 2), Some(json!(1)));
        assert!(ctx.contains_key("count"));
        assert_eq!(ctx.remove("count"), Some(json!(2)));
        assert!(ctx.data().is_empty());
        assert_eq!(ctx.initial_input(), &json!("in"));
    }

    #[test]
    fn test_fresh_contexts_are_isolated() {
        let a = ExecutionContext::new(json!(null), Progress::tracing());
        let b = ExecutionContext::new(json!(null), Progress::tracing());
        a.insert("k", "v");
        assert!(b.get("k").is_none());
    }

    #[test]
    fn test_progress_controls_reach_handle() {
        let ctx = ExecutionContext::new(json!(null), Progress::tracing());
        ctx.pause_progress();
        ctx.resume_progress();
        ctx.succeed_progress("early");
        assert!(ctx.progress().is_finished());
    }
}
