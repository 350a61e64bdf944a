//! Google Gemini chat backend
//!
//! Plain-chat backend with no native tool calling; the text convention is
//! the only way tools reach it. Gemini's wire format already names the
//! assistant role "model", so the universal role maps straight through.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{receiver_stream, with_tool_info, LanguageModel, Message, Role, TextStream};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const MAX_OUTPUT_TOKENS: u32 = 3000;
const TEMPERATURE: f32 = 0.2;

pub struct GeminiModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiModel {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            Error::Config("Gemini API key not provided and not found in environment".to_string())
        })?;

        let mut model = Self::new(api_key);
        if let Some(name) = &config.model {
            model = model.with_model(name);
        }
        if let Some(base_url) = &config.base_url {
            model = model.with_base_url(base_url);
        }
        Ok(model)
    }

    /// Translate universal messages into Gemini `contents`
    fn wire_contents(messages: &[Message], tool_info: Option<&str>) -> Vec<Value> {
        with_tool_info(messages, tool_info)
            .into_iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| {
                let role = match m.role {
                    Role::User | Role::Tool => "user",
                    Role::Model => "model",
                };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect()
    }

    fn request_body(&self, messages: &[Message], tool_info: Option<&str>) -> Value {
        json!({
            "contents": Self::wire_contents(messages, tool_info),
            "generationConfig": {
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
                "temperature": TEMPERATURE,
            },
        })
    }

    async fn post(&self, endpoint: String, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "Gemini request failed ({}): {}",
                status, detail
            )));
        }

        Ok(response)
    }

    /// Join the text parts of the first candidate
    fn candidate_text(value: &Value) -> String {
        value
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, messages: &[Message], tool_info: Option<&str>) -> Result<String> {
        let endpoint = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = self.request_body(messages, tool_info);
        let response = self.post(endpoint, &body).await?;

        let value: Value = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Gemini response parse failed: {}", e)))?;

        Ok(Self::candidate_text(&value))
    }

    async fn generate_streaming(
        &self,
        messages: &[Message],
        tool_info: Option<&str>,
    ) -> Result<TextStream> {
        let endpoint = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let body = self.request_body(messages, tool_info);
        let response = self.post(endpoint, &body).await?;

        let (tx, rx) = mpsc::channel(32);
        let mut events = response.bytes_stream().eventsource();

        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        let Ok(value) = serde_json::from_str::<Value>(&event.data) else {
                            debug!(data = %event.data, "Skipping unparseable stream event");
                            continue;
                        };
                        let text = Self::candidate_text(&value);
                        if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                            // Consumer abandoned the stream
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Gemini stream error");
                        let _ = tx
                            .send(Ok(format!("\n[Error in LLM streaming: {}]", e)))
                            .await;
                        let _ = tx.send(Err(Error::Provider(e.to_string()))).await;
                        return;
                    }
                }
            }
        });

        Ok(receiver_stream(rx))
    }
}
