//! Adapter for Anthropic's Messages API.
//!
//! Anthropic only accepts `user` and `assistant` roles in the message list,
//! so system messages are lifted into the top-level `system` field. JSON
//! output is requested by forcing a single `json_output` tool call and
//! reading its `data` argument back.

use super::{check_status, normalize_base_url, Adapter, AdapterResponse, ChatMessage, Role};
use crate::config::{ModelConfig, ResponseFormat};
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const JSON_TOOL: &str = "json_output";

/// Adapter for Anthropic models. Does not stream.
#[derive(Clone)]
pub struct AnthropicAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for AnthropicAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicAdapter")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .finish()
    }
}

impl AnthropicAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl AsRef<str>) -> Self {
        self.base_url = normalize_base_url(url.as_ref());
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn build_body(messages: &[ChatMessage], model: &ModelConfig) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let turns: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut body = json!({
            "model": model.name,
            "max_tokens": model.options.max_tokens.unwrap_or(300),
            "temperature": model.options.temperature.unwrap_or(1.0),
            "messages": turns,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        if model.response_format == ResponseFormat::Json {
            body["tools"] = json!([{
                "name": JSON_TOOL,
                "description": JSON_TOOL,
                "input_schema": {
                    "type": "object",
                    "properties": { "data": { "type": "string" } }
                }
            }]);
            body["tool_choice"] = json!({"type": "tool", "name": JSON_TOOL});
        }
        body
    }

    /// Pull the text (or the forced tool's `data` argument) out of the reply.
    fn extract_text(json_resp: &Value, format: ResponseFormat) -> Option<String> {
        let blocks = json_resp.get("content")?.as_array()?;
        match format {
            ResponseFormat::Text => blocks
                .iter()
                .find(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .and_then(|b| b.get("text"))
                .and_then(Value::as_str)
                .map(str::to_string),
            ResponseFormat::Json => {
                let input = blocks
                    .iter()
                    .find(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))?
                    .get("input")?;
                Some(match input.get("data") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => input.to_string(),
                })
            }
        }
    }

    fn extract_metadata(json_resp: &Value) -> Option<Map<String, Value>> {
        let mut meta = Map::new();
        for key in ["usage", "id", "stop_reason"] {
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
}

#[async_trait]
impl Adapter for AnthropicAdapter {
    async fn run(&self, messages: &[ChatMessage], model: &ModelConfig) -> Result<AdapterResponse> {
        let body = Self::build_body(messages, model);
        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;
        let json_resp: Value = check_status(resp).await?.json().await?;

        let text = Self::extract_text(&json_resp, model.response_format).ok_or_else(|| {
            PipelineError::Adapter {
                adapter: self.name().to_string(),
                message: "response contained no usable content block".to_string(),
            }
        })?;

        Ok(AdapterResponse::new(text, &model.name).with_metadata(Self::extract_metadata(&json_resp)))
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}
