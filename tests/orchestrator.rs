mod common;

use common::{init_tracing, RecordingReporter};
use multillama::{
    AdapterKind, AdapterRegistry, ChatMessage, Config, ExecutionContext, MockAdapter, ModelConfig,
    Orchestrator, ParallelPipeline, Pipeline, PipelineError, PipelineKind, Plugin, PluginChain,
    SequentialPipeline, ServiceConfig, SpinnerConfig,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn messages() -> SpinnerConfig {
    SpinnerConfig {
        loading_message: "thinking".into(),
        success_message: "all done".into(),
        error_message: "gave up".into(),
    }
}

#[tokio::test]
async fn unknown_model_never_reaches_adapter() {
    init_tracing();
    let spy = Arc::new(MockAdapter::fixed("unused"));
    let orchestrator = Orchestrator::builder()
        .adapter("known", spy.clone())
        .build()
        .unwrap();

    let err = orchestrator.use_model("unknown", "hi").await.unwrap_err();
    assert!(err.is_configuration_error());
    assert!(matches!(err, PipelineError::AdapterNotConfigured { .. }));
    assert_eq!(spy.calls(), 0);
}

#[tokio::test]
async fn plugins_compose_in_registration_order() {
    let spy = Arc::new(MockAdapter::fixed("reply"));

    let mut chain = PluginChain::new();
    chain.register(Plugin::new("p1").before_model_call(|_, p| async move { Ok(format!("{}-p1", p)) }));
    chain.register(Plugin::new("p2").before_model_call(|_, p| async move { Ok(format!("{}-p2", p)) }));

    let mut registry = AdapterRegistry::new();
    registry.register("m", spy.clone());

    let orchestrator = Orchestrator::builder()
        .plugins(chain)
        .adapters(registry)
        .build()
        .unwrap();

    orchestrator.use_model("m", "hi").await.unwrap();
    assert_eq!(spy.last_messages(), vec![ChatMessage::user("hi-p1-p2")]);
    assert_eq!(spy.calls(), 1);
}

#[tokio::test]
async fn config_system_prompt_applies_to_registered_model() {
    let config = Config::new()
        .service_entry("local", ServiceConfig::new(AdapterKind::Ollama))
        .model_entry(
            "writer",
            ModelConfig::named("llama3.2")
                .on_service("local")
                .with_system_prompt("You write haiku."),
        );
    let spy = Arc::new(MockAdapter::fixed("old pond"));
    let orchestrator = Orchestrator::builder()
        .config(config)
        .adapter("writer", spy.clone())
        .build()
        .unwrap();

    let text = orchestrator.use_model("writer", "frogs").await.unwrap();
    assert_eq!(text, "old pond");
    assert_eq!(
        spy.last_messages(),
        vec![ChatMessage::system("You write haiku."), ChatMessage::user("frogs")]
    );
}

#[tokio::test]
async fn failing_adapter_marks_run_failed_and_returns_original_error() {
    let reporter = RecordingReporter::new();
    let orchestrator = Orchestrator::builder()
        .config(Config::new().with_spinner_config(messages()))
        .adapter("broken", Arc::new(MockAdapter::failing("connection reset")))
        .reporter_factory(reporter.clone())
        .build()
        .unwrap();

    let mut pipeline = SequentialPipeline::new();
    pipeline
        .add_step(|v: Value, _| async move { Ok(v) })
        .add_step(orchestrator.model_step("broken"));

    let err = orchestrator
        .run_sequential_pipeline(&pipeline, json!("q"), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Adapter { ref adapter, ref message } if adapter == "mock" && message == "connection reset"
    ));
    assert_eq!(reporter.events(), vec!["start:thinking", "fail:gave up"]);
}

#[tokio::test]
async fn terminal_signal_delivered_once_even_if_step_signals() {
    let reporter = RecordingReporter::new();
    let orchestrator = Orchestrator::builder()
        .config(Config::new().with_spinner_config(messages()))
        .reporter_factory(reporter.clone())
        .build()
        .unwrap();

    let mut pipeline = SequentialPipeline::new();
    pipeline.add_step(|v: Value, ctx: ExecutionContext| async move {
        ctx.pause_progress();
        ctx.resume_progress();
        ctx.succeed_progress("step finished early");
        Ok(v)
    });

    orchestrator
        .run_sequential_pipeline(&pipeline, json!(1), false)
        .await
        .unwrap();
    assert_eq!(reporter.terminal_events(), vec!["succeed:step finished early"]);
    assert_eq!(
        reporter.events(),
        vec!["start:thinking", "pause", "resume", "succeed:step finished early"]
    );
}

#[tokio::test]
async fn pipeline_hooks_observe_kind_input_and_output() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let before = seen.clone();
    let after = seen.clone();

    let orchestrator = Orchestrator::builder()
        .plugin(
            Plugin::new("audit")
                .before_pipeline_start(move |kind, input| {
                    before.lock().push(format!("start {} {}", kind, input));
                    async { Ok(()) }
                })
                .after_pipeline_end(move |kind, output| {
                    after.lock().push(format!("end {} {}", kind, output));
                    async { Ok(()) }
                }),
        )
        .reporter_factory(RecordingReporter::new())
        .build()
        .unwrap();

    let mut parallel = ParallelPipeline::new();
    parallel
        .add_parallel_step(|v: Value| async move { Ok(json!([v, 1])) })
        .add_parallel_step(|_| async { Ok(json!("b")) });
    orchestrator.run_parallel_pipeline(&parallel, json!("in")).await.unwrap();

    let mut graph = Pipeline::new();
    graph.add_step(|v: Value, _| async move { Ok(v) });
    orchestrator.run_conditional_pipeline(&graph, json!(7)).await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            r#"start parallel "in""#.to_string(),
            r#"end parallel [["in",1],"b"]"#.to_string(),
            "start conditional 7".to_string(),
            "end conditional 7".to_string(),
        ]
    );
    assert_eq!(PipelineKind::Sequential.to_string(), "sequential");
}

#[tokio::test]
async fn before_pipeline_hook_failure_skips_execution() {
    let reporter = RecordingReporter::new();
    let ran = Arc::new(Mutex::new(false));
    let flag = ran.clone();

    let orchestrator = Orchestrator::builder()
        .plugin(Plugin::new("gate").before_pipeline_start(|_, _| async {
            Err(anyhow::anyhow!("maintenance window"))
        }))
        .reporter_factory(reporter.clone())
        .build()
        .unwrap();

    let mut pipeline = SequentialPipeline::new();
    pipeline.add_step(move |v: Value, _| {
        *flag.lock() = true;
        async move { Ok(v) }
    });

    let err = orchestrator
        .run_sequential_pipeline(&pipeline, json!(null), false)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::PluginHook { ref plugin, .. } if plugin == "gate"));
    assert!(!*ran.lock());
    assert_eq!(
        reporter.terminal_events(),
        vec!["fail:An error occurred during the process"]
    );
}

#[tokio::test]
async fn parallel_model_calls_keep_registration_order() {
    let orchestrator = Orchestrator::builder()
        .adapter("slow", Arc::new(MockAdapter::fixed("tortoise")))
        .adapter("fast", Arc::new(MockAdapter::fixed("hare")))
        .reporter_factory(RecordingReporter::new())
        .build()
        .unwrap();

    let slow = orchestrator.model_call("slow");
    let mut pipeline = ParallelPipeline::new();
    pipeline
        .add_parallel_step(move |v: Value| {
            let call = slow(v);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                call.await
            }
        })
        .add_parallel_step(orchestrator.model_call("fast"));

    let results = orchestrator
        .run_parallel_pipeline(&pipeline, json!("race"))
        .await
        .unwrap();
    assert_eq!(results, vec![json!("tortoise"), json!("hare")]);
}

#[tokio::test]
async fn streaming_collects_chunks_without_after_hook() {
    let orchestrator = Orchestrator::builder()
        .adapter("s", Arc::new(MockAdapter::fixed("a b c").streaming()))
        .plugin(Plugin::new("upper").after_model_call(|_, r| async move { Ok(r.to_uppercase()) }))
        .build()
        .unwrap();

    let mut chunks = Vec::new();
    let text = orchestrator
        .use_model_with_streaming("s", "go", |c| chunks.push(c))
        .await
        .unwrap();
    assert_eq!(text, "a b c");
    assert_eq!(chunks.concat(), "a b c");

    assert_eq!(orchestrator.use_model("s", "go").await.unwrap(), "A B C");
}

#[test]
fn orchestrators_are_independent() {
    let first = Orchestrator::builder()
        .plugin(Plugin::new("only-here"))
        .build()
        .unwrap();
    let second = Orchestrator::builder().build().unwrap();
    assert_eq!(first.plugins().len(), 1);
    assert!(second.plugins().is_empty());
}
