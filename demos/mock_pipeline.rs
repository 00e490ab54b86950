//! Example: orchestrating mock models through a sequential pipeline.
//!
//! Run with: `cargo run --example mock_pipeline`

use multillama::{MockAdapter, Orchestrator, Plugin, SequentialPipeline};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("multillama=debug").init();

    // Two canned "models" so the example runs without a live backend
    let drafter = Arc::new(MockAdapter::fixed("rust is a language about ownership"));
    let editor = Arc::new(MockAdapter::fixed("Rust: a language about ownership."));

    let orchestrator = Orchestrator::builder()
        .adapter("drafter", drafter.clone())
        .adapter("editor", editor.clone())
        .plugin(Plugin::new("prefix").before_model_call(|model, prompt| async move {
            Ok(format!("[{}] {}", model, prompt))
        }))
        .build()?;

    let mut pipeline = SequentialPipeline::new();
    pipeline
        .add_step(orchestrator.model_step("drafter"))
        .add_step(orchestrator.model_step("editor"));

    let output = orchestrator
        .run_sequential_pipeline(&pipeline, json!("Describe Rust in one line"), true)
        .await?;

    println!("Final: {}", output.as_str().unwrap_or_default());
    println!("Editor saw: {:?}", editor.last_messages());
    println!("Calls: drafter={} editor={}", drafter.calls(), editor.calls());
    Ok(())
}
