//! Adapter for Ollama's native chat API.
//!
//! [`OllamaAdapter`] sends messages to `/api/chat`. Streaming uses NDJSON
//! with `{"message": {"content": "token"}}` per line and a final
//! `{"done": true, ...}` line carrying timing and token counts.

use super::framing::{Framing, LineFramer};
use super::{check_status, normalize_base_url, Adapter, AdapterResponse, ChatMessage};
use crate::config::{ModelConfig, ResponseFormat};
use crate::error::Result;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Map, Value};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Adapter for a local or remote Ollama server.
///
/// Roles accepted: `system`, `user`, `assistant`.
#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    client: Client,
    base_url: String,
}

impl OllamaAdapter {
    /// Adapter pointed at `http://localhost:11434`.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl AsRef<str>) -> Self {
        self.base_url = normalize_base_url(url.as_ref());
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the Ollama `options` object; unset fields are left to the server.
    fn build_options(model: &ModelConfig) -> Value {
        let mut opts = Map::new();
        let o = &model.options;
        if let Some(t) = o.temperature {
            opts.insert("temperature".into(), json!(t));
        }
        if let Some(n) = o.max_tokens {
            opts.insert("num_predict".into(), json!(n));
        }
        if let Some(p) = o.presence_penalty {
            opts.insert("presence_penalty".into(), json!(p));
        }
        if let Some(p) = o.frequency_penalty {
            opts.insert("frequency_penalty".into(), json!(p));
        }
        Value::Object(opts)
    }

    fn build_body(messages: &[ChatMessage], model: &ModelConfig, stream: bool) -> Value {
        let messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = json!({
            "model": model.name,
            "messages": messages,
            "stream": stream,
            "options": Self::build_options(model),
        });
        if model.response_format == ResponseFormat::Json {
            body["format"] = json!("json");
        }
        body
    }

    fn extract_metadata(json_resp: &Value) -> Option<Map<String, Value>> {
        let mut meta = Map::new();
        for key in [
            "total_duration",
            "eval_count",
            "eval_duration",
            "prompt_eval_count",
        ] {
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

    fn content_of(json_val: &Value) -> Option<&str> {
        json_val
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

impl Default for OllamaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for OllamaAdapter {
    async fn run(&self, messages: &[ChatMessage], model: &ModelConfig) -> Result<AdapterResponse> {
        let body = Self::build_body(messages, model, false);
        let resp = self.client.post(self.chat_url()).json(&body).send().await?;
        let json_resp: Value = check_status(resp).await?.json().await?;

        let text = Self::content_of(&json_resp).unwrap_or("").to_string();
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
        let resp = self.client.post(self.chat_url()).json(&body).send().await?;
        let mut stream = check_status(resp).await?.bytes_stream();

        let mut framer = LineFramer::new(Framing::NdJson);
        let mut accumulated = String::new();
        let mut metadata = None;

        let mut handle = |json_val: Value| {
            if let Some(t) = Self::content_of(&json_val) {
                if !t.is_empty() {
                    accumulated.push_str(t);
                    on_chunk(t.to_string());
                }
            }
            if json_val.get("done").and_then(|v| v.as_bool()) == Some(true) {
                metadata = Self::extract_metadata(&json_val);
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

        Ok(AdapterResponse::new(accumulated, &model.name).with_metadata(metadata))
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelOptions;

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("Why is the sky blue?"),
        ]
    }

    #[test]
    fn test_chat_body() {
        let model = ModelConfig::named("llama3.2");
        let body = OllamaAdapter::build_body(&conversation(), &model, false);

        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], false);
        let messages = body["messages"].as_array().expect("messages array");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Why is the sky blue?");
        assert!(body.get("format").is_none());
        assert_eq!(body["options"], json!({}));
    }

    #[test]
    fn test_json_format_and_options() {
        let mut model = ModelConfig::named("llama3.2").with_response_format(ResponseFormat::Json);
        model.options = ModelOptions {
            temperature: Some(0.3),
            max_tokens: Some(128),
            frequency_penalty: Some(0.5),
            presence_penalty: None,
        };
        let body = OllamaAdapter::build_body(&conversation(), &model, true);

        assert_eq!(body["format"], "json");
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["temperature"], 0.3);
        assert_eq!(body["options"]["num_predict"], 128);
        assert_eq!(body["options"]["frequency_penalty"], 0.5);
        assert!(body["options"].get("presence_penalty").is_none());
    }

    #[test]
    fn test_metadata_extraction() {
        let resp = json!({
            "message": {"role": "assistant", "content": "hi"},
            "eval_count": 7,
            "total_duration": 1000,
            "done": true
        });
        let meta = OllamaAdapter::extract_metadata(&resp).unwrap();
        assert_eq!(meta["eval_count"], 7);
        assert_eq!(meta["total_duration"], 1000);
        assert!(OllamaAdapter::extract_metadata(&json!({})).is_none());
    }

    #[test]
    fn test_base_url_normalized() {
        let adapter = OllamaAdapter::new().with_base_url("http://gpu-box:11434/api/");
        assert_eq!(adapter.chat_url(), "http://gpu-box:11434/api/chat");
        assert!(adapter.supports_streaming());
    }
}
