//! OpenAI-compatible chat backend
//!
//! Works against any chat-completions endpoint - OpenAI itself, GitHub
//! Models, or a self-hosted gateway - via a configurable base URL. This
//! backend supports native function calling, but tools are driven through
//! the text convention like every other backend.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{receiver_stream, with_tool_info, LanguageModel, Message, Role, TextStream};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const MAX_TOKENS: u32 = 3000;
const TEMPERATURE: f32 = 0.2;

pub struct OpenAiModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiModel {
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
            Error::Config("OpenAI API key not provided and not found in environment".to_string())
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

    /// Translate universal messages into the chat-completions wire shape
    fn wire_messages(messages: &[Message], tool_info: Option<&str>) -> Vec<Value> {
        let mut wire = vec![json!({
            "role": "system",
            "content": "You are a helpful assistant.",
        })];

        for msg in with_tool_info(messages, tool_info) {
            // Skip empty model turns; some endpoints reject them
            if msg.role == Role::Model && msg.content.is_empty() {
                continue;
            }
            let role = match msg.role {
                Role::User | Role::Tool => "user",
                Role::Model => "assistant",
            };
            wire.push(json!({"role": role, "content": msg.content}));
        }

        wire
    }

    fn request_body(&self, messages: &[Message], tool_info: Option<&str>, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": Self::wire_messages(messages, tool_info),
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
            "stream": stream,
        })
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "OpenAI request failed ({}): {}",
                status, detail
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, messages: &[Message], tool_info: Option<&str>) -> Result<String> {
        let body = self.request_body(messages, tool_info, false);
        let response = self.post(&body).await?;

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("OpenAI response parse failed: {}", e)))?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn generate_streaming(
        &self,
        messages: &[Message],
        tool_info: Option<&str>,
    ) -> Result<TextStream> {
        let body = self.request_body(messages, tool_info, true);
        let response = self.post(&body).await?;

        let (tx, rx) = mpsc::channel(32);
        let mut events = response.bytes_stream().eventsource();

        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => {
                        if event.data == "[DONE]" {
                            break;
                        }
                        let Ok(chunk) = serde_json::from_str::<StreamChunk>(&event.data) else {
                            debug!(data = %event.data, "Skipping unparseable stream event");
                            continue;
                        };
                        let delta = chunk
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.delta.content)
                            .unwrap_or_default();
                        if !delta.is_empty() && tx.send(Ok(delta)).await.is_err() {
                            // Consumer abandoned the stream
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "OpenAI stream error");
                        // Make the failure visible in the stream, then propagate
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

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}
