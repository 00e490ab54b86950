//! Pipeline execution: graph, sequential, conditional and parallel.
//!
//! - [`Pipeline`]: a rooted graph of steps with optional conditional
//!   branching, executed against one [`ExecutionContext`] per run.
//! - [`SequentialPipeline`]: a degenerate graph where each step feeds the
//!   next; [`conditional_step`] wraps a step behind a predicate.
//! - [`ParallelPipeline`]: independent steps fed the same input, run
//!   concurrently, results in registration order.
//!
//! Values flow between steps as `serde_json::Value`.

pub mod context;
pub mod graph;
pub mod parallel;
pub mod sequential;

pub use context::ExecutionContext;
pub use graph::{NodeId, Pipeline};
pub use parallel::ParallelPipeline;
pub use sequential::{conditional_step, SequentialPipeline};

use crate::error::Result;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, pinned, Send future.
pub type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A graph step: current value plus the run's context in, new value out.
pub type StepFn = Arc<dyn Fn(Value, ExecutionContext) -> BoxFut<'static, Result<Value>> + Send + Sync>;

/// Picks the branch to follow from a step's result.
pub type ConditionFn = Arc<dyn Fn(&Value, &ExecutionContext) -> BranchKey + Send + Sync>;

/// Box a step closure into a [`StepFn`].
pub(crate) fn boxed_step<F, Fut>(step: F) -> StepFn
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |input, ctx| Box::pin(step(input, ctx)))
}

/// Discriminant returned by a condition and used to select a branch.
///
/// Both variants are hashable and stable, so branch maps may mix string
/// and integer keys. `"1"` and `1` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BranchKey {
    Str(String),
    Int(i64),
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchKey::Str(s) => f.write_str(s),
            BranchKey::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for BranchKey {
    fn from(s: &str) -> Self {
        BranchKey::Str(s.to_string())
    }
}

impl From<String> for BranchKey {
    fn from(s: String) -> Self {
        BranchKey::Str(s)
    }
}

impl From<&String> for BranchKey {
    fn from(s: &String) -> Self {
        BranchKey::Str(s.clone())
    }
}

impl From<bool> for BranchKey {
    fn from(b: bool) -> Self {
        BranchKey::Str(b.to_string())
    }
}

macro_rules! branch_key_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for BranchKey {
                fn from(i: $t) -> Self {
                    BranchKey::Int(i as i64)
                }
            }
        )*
    };
}

branch_key_from_int!(i8, i16, i32, i64, u8, u16, u32, usize);
