//! Example: routing input through a branching pipeline.
//!
//! Run with: `cargo run --example conditional_routing`

use multillama::{ExecutionContext, MockAdapter, Orchestrator, Pipeline};
use serde_json::{json, Value};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = Orchestrator::builder()
        .adapter("coder", Arc::new(MockAdapter::fixed("fn main() {}")))
        .adapter("chatter", Arc::new(MockAdapter::fixed("Happy to chat!")))
        .build()?;

    let mut pipeline = Pipeline::new();
    let classify = pipeline.add_step(|input: Value, ctx: ExecutionContext| async move {
        let is_code = input
            .as_str()
            .map(|s| s.contains("code") || s.contains("function"))
            .unwrap_or(false);
        ctx.insert("topic", if is_code { "code" } else { "chat" });
        ctx.update("classified request");
        Ok(input)
    });
    let code = pipeline.add_step(orchestrator.model_step("coder"));
    let chat = pipeline.add_step(orchestrator.model_step("chatter"));

    pipeline.set_condition(classify, |_value, ctx| {
        ctx.get("topic")
            .and_then(|t| t.as_str().map(String::from))
            .unwrap_or_default()
    })?;
    pipeline.add_branch(classify, "code", code)?;
    pipeline.add_branch(classify, "chat", chat)?;
    pipeline.enable_logging();

    for prompt in ["Write a function that adds two numbers", "How are you today?"] {
        let output = orchestrator
            .run_conditional_pipeline(&pipeline, json!(prompt))
            .await?;
        println!("{} => {}", prompt, output);
    }
    Ok(())
}
