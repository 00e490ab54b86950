//! Mock adapter for testing without a live LLM.
//!
//! [`MockAdapter`] returns pre-configured responses in order and records
//! every call, so tests can assert both on results and on what the
//! orchestrator actually sent.
//!
//! # Example
//!
//! ```
//! use multillama::adapter::MockAdapter;
//!
//! let mock = MockAdapter::new(vec!["Hello, world!".to_string()]);
//! assert_eq!(mock.calls(), 0);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Adapter, AdapterResponse, ChatMessage};
use crate::config::ModelConfig;
use crate::error::Result;
use crate::PipelineError;

/// A test adapter that returns canned responses in order.
///
/// Cycles back to the beginning when all responses have been consumed.
/// Streaming (opt-in via [`streaming`](MockAdapter::streaming)) emits the
/// response one whitespace-separated word at a time.
#[derive(Debug)]
pub struct MockAdapter {
    responses: Vec<String>,
    index: AtomicUsize,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
    streaming: bool,
    failure: Option<String>,
}

impl MockAdapter {
    /// Create a mock adapter with the given canned responses.
    ///
    /// Responses are returned in order. When exhausted, cycles from the beginning.
    pub fn new(responses: Vec<String>) -> Self {
        assert!(!responses.is_empty(), "MockAdapter requires at least one response");
        Self {
            responses,
            index: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
            streaming: false,
            failure: None,
        }
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Create a mock whose every call fails with [`PipelineError::Adapter`].
    pub fn failing(message: impl Into<String>) -> Self {
        let mut mock = Self::fixed("");
        mock.failure = Some(message.into());
        mock
    }

    /// Advertise and implement the streaming capability.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// Number of `run`/`run_streaming` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages received by the most recent call.
    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages.lock().clone()
    }

    fn record(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock() = messages.to_vec();
        if let Some(ref message) = self.failure {
            return Err(PipelineError::Adapter {
                adapter: self.name().to_string(),
                message: message.clone(),
            });
        }
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        Ok(self.responses[idx].clone())
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn run(&self, messages: &[ChatMessage], model: &ModelConfig) -> Result<AdapterResponse> {
        let text = self.record(messages)?;
        Ok(AdapterResponse::new(text, &model.name))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn run_streaming(
        &self,
        messages: &[ChatMessage],
        model: &ModelConfig,
        on_chunk: &mut (dyn FnMut(String) + Send),
    ) -> Result<AdapterResponse> {
        if !self.streaming {
            return Err(PipelineError::StreamingUnsupported {
                model: model.name.clone(),
                adapter: self.name().to_string(),
            });
        }
        let text = self.record(messages)?;
        for chunk in text.split_inclusive(' ') {
            on_chunk(chunk.to_string());
        }
        Ok(AdapterResponse::new(text, &model.name))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ModelConfig {
        ModelConfig::named("test")
    }

    #[tokio::test]
    async fn test_mock_cycles_responses() {
        let mock = MockAdapter::new(vec!["first".into(), "second".into()]);
        let msgs = [ChatMessage::user("q")];
        let r1 = mock.run(&msgs, &model()).await.unwrap();
        let r2 = mock.run(&msgs, &model()).await.unwrap();
        let r3 = mock.run(&msgs, &model()).await.unwrap();
        assert_eq!(r1.text, "first");
        assert_eq!(r2.text, "second");
        assert_eq!(r3.text, "first"); // cycles
        assert_eq!(mock.calls(), 3);
        assert_eq!(r1.metadata["modelUsed"], "test");
    }

    #[tokio::test]
    async fn test_mock_records_messages() {
        let mock = MockAdapter::fixed("ok");
        mock.run(&[ChatMessage::system("s"), ChatMessage::user("u")], &model())
            .await
            .unwrap();
        let last = mock.last_messages();
        assert_eq!(last.len(), 2);
        assert_eq!(last[1].content, "u");
    }

    #[tokio::test]
    async fn test_mock_streaming_chunks() {
        let mock = MockAdapter::fixed("streamed in words").streaming();
        let mut chunks = Vec::new();
        let resp = mock
            .run_streaming(&[ChatMessage::user("q")], &model(), &mut |c| chunks.push(c))
            .await
            .unwrap();
        assert_eq!(resp.text, "streamed in words");
        assert_eq!(chunks, vec!["streamed ", "in ", "words"]);
    }

    #[tokio::test]
    async fn test_mock_without_streaming() {
        let mock = MockAdapter::fixed("x");
        assert!(!mock.supports_streaming());
        let err = mock
            .run_streaming(&[], &model(), &mut |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::StreamingUnsupported { .. }));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let mock = MockAdapter::failing("auth rejected");
        let err = mock.run(&[], &model()).await.unwrap_err();
        assert_eq!(err.to_string(), "Error using mock: auth rejected");
        assert_eq!(mock.calls(), 1);
    }
}
