//! Adapter for OpenAI-compatible APIs.
//!
//! [`OpenAiAdapter`] covers OpenAI itself and the many servers that mirror
//! its API (vLLM, llama.cpp server, LM Studio, Groq, Together AI, Ollama's
//! `/v1/` endpoint).
//!
//! Endpoint: `/v1/chat/completions`.
//! Streaming: SSE with `data: {"choices": [{"delta": {"content": "token"}}]}`.

use super::framing::{Framing, LineFramer};
use super::{check_status, normalize_base_url, Adapter, AdapterResponse, ChatMessage};
use crate::config::{ModelConfig, ResponseFormat};
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Map, Value};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Adapter for any OpenAI-compatible API.
///
/// Roles accepted: `system`, `user`, `assistant`.
///
/// # Example
///
/// ```
/// use multillama::adapter::OpenAiAdapter;
///
/// let adapter = OpenAiAdapter::new().with_api_key("sk-...");
/// ```
#[derive(Clone)]
pub struct OpenAiAdapter {
    client: Client,
    base_url: String,
    /// If set, sent as `Authorization: Bearer {key}`.
    api_key: Option<String>,
    /// If set, sent as `OpenAI-Organization: {org}`.
    organization: Option<String>,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                &self.api_key.as_ref().map(|k| {
                    if k.chars().count() > 6 {
                        format!("{}***", k.chars().take(6).collect::<String>())
                    } else {
                        "***".to_string()
                    }
                }),
            )
            .field("organization", &self.organization)
            .finish()
    }
}

impl OpenAiAdapter {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            organization: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    pub fn with_base_url(mut self, url: impl AsRef<str>) -> Self {
        self.base_url = normalize_base_url(url.as_ref());
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Request body for `/v1/chat/completions`. Defaults: temperature 1,
    /// 300 max tokens, no penalties.
    fn build_body(messages: &[ChatMessage], model: &ModelConfig, stream: bool) -> Value {
        let o = &model.options;
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let format = match model.response_format {
            ResponseFormat::Json => "json_object",
            ResponseFormat::Text => "text",
        };

        json!({
            "model": model.name,
            "messages": messages,
            "temperature": o.temperature.unwrap_or(1.0),
            "max_tokens": o.max_tokens.unwrap_or(300),
            "frequency_penalty": o.frequency_penalty.unwrap_or(0.0),
            "presence_penalty": o.presence_penalty.unwrap_or(0.0),
            "response_format": {"type": format},
            "stream": stream,
        })
    }

    fn build_http_request(&self, body: &Value) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut req = self.client.post(url).json(body);

        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(ref org) = self.organization {
            req = req.header("OpenAI-Organization", org.as_str());
        }
        req
    }

    fn extract_metadata(json_resp: &Value) -> Option<Map<String, Value>> {
        let mut meta = Map::new();
        for key in ["usage", "id", "model"] {
            if let Some(v) = json_resp.get(key) {
                meta.insert(key.into(), v.clone());
            }
        }
        if meta.is_empty() {
            None
        } else {
            Some(meta)
        }
    }

    fn delta_of(json_val: &Value) -> Option<&str> {
        json_val
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(|v| v.as_str())
    }
}

impl Default for OpenAiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for OpenAiAdapter {
    async fn run(&self, messages: &[ChatMessage], model: &ModelConfig) -> Result<AdapterResponse> {
        if self.api_key.is_none() && self.base_url == DEFAULT_BASE_URL {
            return Err(PipelineError::Configuration(format!(
                "No API key configured for service in model: {}",
                model.name
            )));
        }

        let body = Self::build_body(messages, model, false);
        let resp = self.build_http_request(&body).send().await?;
        let json_resp: Value = check_status(resp).await?.json().await?;

        let text = json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();

        Ok(AdapterResponse::new(text, &model.name).with_metadata(Self::extract_metadata(&json_resp)))
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn run_streaming(
        &self,
        messages: &[ChatMessage],
        model: &ModelConfig,
        on_chunk: &mut (dyn FnMut(String) + Send),
    ) -> Result<AdapterResponse> {
        let body = Self::build_body(messages, model, true);
        let resp = self.build_http_request(&body).send().await?;
        let mut stream = check_status(resp).await?.bytes_stream();

        let mut framer = LineFramer::new(Framing::Sse);
        let mut accumulated = String::new();

        let mut handle = |json_val: Value| {
            if let Some(content) = Self::delta_of(&json_val) {
                if !content.is_empty() {
                    accumulated.push_str(content);
                    on_chunk(content.to_string());
                }
            }
        };

        while let Some(chunk) = stream.next().await {
            for json_val in framer.push(&chunk?) {
                handle(json_val);
            }
        }
        for json_val in framer.finish() {
            handle(json_val);
        }

        Ok(AdapterResponse::new(accumulated, &model.name))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_defaults() {
        let model = ModelConfig::named("gpt-4o");
        let body = OpenAiAdapter::build_body(&[ChatMessage::user("hi")], &model, false);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 1.0);
        assert_eq!(body["max_tokens"], 300);
        assert_eq!(body["frequency_penalty"], 0.0);
        assert_eq!(body["response_format"]["type"], "text");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_body_json_mode() {
        let model = ModelConfig::named("gpt-4o")
            .with_response_format(ResponseFormat::Json)
            .with_temperature(0.1)
            .with_max_tokens(50);
        let body = OpenAiAdapter::build_body(&[ChatMessage::user("hi")], &model, true);

        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["max_tokens"], 50);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_debug_masks_key() {
        let adapter = OpenAiAdapter::new().with_api_key("sk-abcdefghijkl");
        let debug = format!("{:?}", adapter);
        assert!(debug.contains("sk-abc***"));
        assert!(!debug.contains("ghijkl"));
    }

    #[test]
    fn test_debug_masks_non_ascii_key() {
        let adapter = OpenAiAdapter::new().with_api_key("sk-ééééé");
        let debug = format!("{:?}", adapter);
        assert!(debug.contains("sk-ééé***"));
        assert!(!debug.contains("éééé"));

        let short = OpenAiAdapter::new().with_api_key("ключ");
        assert!(format!("{:?}", short).contains("\"***\""));
    }

    #[test]
    fn test_delta_extraction() {
        let chunk = json!({"choices": [{"delta": {"content": "Hel"}}]});
        assert_eq!(OpenAiAdapter::delta_of(&chunk), Some("Hel"));
        assert_eq!(OpenAiAdapter::delta_of(&json!({"choices": []})), None);
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let adapter = OpenAiAdapter::new();
        let err = adapter
            .run(&[ChatMessage::user("hi")], &ModelConfig::named("gpt-4o"))
            .await
            .unwrap_err();
        assert!(err.is_configuration_error());
    }
}
