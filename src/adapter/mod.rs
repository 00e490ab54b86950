//! Adapter trait and normalized message/response types.
//!
//! The [`Adapter`] trait abstracts over LLM providers: given role-tagged
//! messages and a resolved [`ModelConfig`], produce text plus metadata.
//! Built-in implementations: [`OllamaAdapter`], [`OpenAiAdapter`] (feature
//! `openai`), [`AnthropicAdapter`], and [`MockAdapter`] for tests.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator ──► [ChatMessage] ──► Adapter::run() ──► AdapterResponse
//!                                          │
//!                  ┌───────────────────────┼────────────────────┐
//!            OllamaAdapter           OpenAiAdapter        AnthropicAdapter
//!            /api/chat               /v1/chat/completions /v1/messages
//!            NDJSON streaming        SSE streaming        (no streaming)
//! ```

pub mod anthropic;
pub mod framing;
pub mod mock;
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use mock::MockAdapter;
pub use ollama::OllamaAdapter;
#[cfg(feature = "openai")]
pub use openai::OpenAiAdapter;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: Role,
    /// The message content.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant (model) response.
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A normalized adapter response.
#[derive(Debug, Clone)]
pub struct AdapterResponse {
    /// The generated text content.
    pub text: String,

    /// Provider metadata. Always carries `modelUsed` and `timestamp`;
    /// adapters add provider-specific fields (token counts, ids).
    pub metadata: Map<String, Value>,
}

impl AdapterResponse {
    /// Build a response with the standard `modelUsed`/`timestamp` metadata.
    pub fn new(text: impl Into<String>, model: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("modelUsed".into(), Value::String(model.to_string()));
        metadata.insert(
            "timestamp".into(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// Merge provider-specific metadata fields.
    pub fn with_metadata(mut self, extra: Option<Map<String, Value>>) -> Self {
        if let Some(extra) = extra {
            self.metadata.extend(extra);
        }
        self
    }
}

/// Abstraction over LLM providers.
///
/// Implementors translate role-tagged messages into the provider's HTTP API.
/// Streaming is an optional capability: the orchestrator checks
/// [`supports_streaming`](Adapter::supports_streaming) before calling
/// [`run_streaming`](Adapter::run_streaming).
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Adapter>`.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Execute a non-streaming call.
    async fn run(&self, messages: &[ChatMessage], model: &ModelConfig) -> Result<AdapterResponse>;

    /// Whether [`run_streaming`](Adapter::run_streaming) is implemented.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Execute a streaming call.
    ///
    /// `on_chunk` is called for each chunk as it arrives. The final
    /// accumulated text is returned as an [`AdapterResponse`].
    async fn run_streaming(
        &self,
        messages: &[ChatMessage],
        model: &ModelConfig,
        on_chunk: &mut (dyn FnMut(String) + Send),
    ) -> Result<AdapterResponse> {
        let _ = (messages, on_chunk);
        Err(PipelineError::StreamingUnsupported {
            model: model.name.clone(),
            adapter: self.name().to_string(),
        })
    }

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Turn a non-success HTTP response into [`PipelineError::HttpError`].
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(PipelineError::HttpError { status, body })
}

/// Strip known provider path suffixes from a base URL.
/// This prevents double-pathing when adapters append their own paths.
/// e.g., "https://api.openai.com/v1" -> "https://api.openai.com"
/// e.g., "http://localhost:11434/api" -> "http://localhost:11434"
pub(crate) fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    // Longest first.
    for suffix in &[
        "/v1/chat/completions",
        "/v1/messages",
        "/v1/chat",
        "/v1",
        "/api/chat",
        "/api",
    ] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_standard_metadata() {
        let resp = AdapterResponse::new("hi", "llama3.2");
        assert_eq!(resp.metadata["modelUsed"], "llama3.2");
        assert!(resp.metadata["timestamp"].as_str().is_some());
    }

    #[test]
    fn test_response_merges_extra_metadata() {
        let mut extra = Map::new();
        extra.insert("eval_count".into(), Value::from(12));
        let resp = AdapterResponse::new("hi", "m").with_metadata(Some(extra));
        assert_eq!(resp.metadata["eval_count"], 12);
        assert_eq!(resp.metadata["modelUsed"], "m");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = ChatMessage::assistant("ok");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("https://api.openai.com/v1/"), "https://api.openai.com");
        assert_eq!(normalize_base_url("http://localhost:11434/api"), "http://localhost:11434");
        assert_eq!(
            normalize_base_url("https://api.anthropic.com/v1/messages"),
            "https://api.anthropic.com"
        );
        assert_eq!(normalize_base_url("http://localhost:11434"), "http://localhost:11434");
    }

    struct PlainAdapter;

    #[async_trait]
    impl Adapter for PlainAdapter {
        async fn run(&self, _messages: &[ChatMessage], model: &ModelConfig) -> Result<AdapterResponse> {
            Ok(AdapterResponse::new("plain", &model.name))
        }

        fn name(&self) -> &'static str {
            "plain"
        }
    }

    #[tokio::test]
    async fn test_default_streaming_is_unsupported() {
        let adapter = PlainAdapter;
        assert!(!adapter.supports_streaming());
        let err = adapter
            .run_streaming(&[], &ModelConfig::named("m"), &mut |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::StreamingUnsupported { .. }));
    }
}
