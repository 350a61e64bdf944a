//! Ollama local-inference backend
//!
//! Talks to a local Ollama daemon through `ollama-rs`. No API key; the
//! endpoint comes from configuration or defaults to localhost.

use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::generation::chat::{request::ChatMessageRequest, ChatMessage, MessageRole};
use ollama_rs::Ollama;
use tokio::sync::mpsc;
use tracing::warn;

use super::{receiver_stream, with_tool_info, LanguageModel, Message, Role, TextStream};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};

const DEFAULT_HOST: &str = "http://localhost";
const DEFAULT_PORT: u16 = 11434;
const DEFAULT_MODEL: &str = "llama3.2";

pub struct OllamaModel {
    client: Ollama,
    model: String,
}

impl OllamaModel {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            client: Ollama::new(host.into(), port),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn localhost() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        let (host, port) = match &config.base_url {
            Some(url) => split_host_port(url),
            None => (DEFAULT_HOST.to_string(), DEFAULT_PORT),
        };

        let mut model = Self::new(host, port);
        if let Some(name) = &config.model {
            model = model.with_model(name);
        }
        model
    }

    /// Translate universal messages into Ollama chat messages
    fn wire_messages(messages: &[Message], tool_info: Option<&str>) -> Vec<ChatMessage> {
        with_tool_info(messages, tool_info)
            .into_iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| {
                let role = match m.role {
                    Role::User | Role::Tool => MessageRole::User,
                    Role::Model => MessageRole::Assistant,
                };
                ChatMessage::new(role, m.content)
            })
            .collect()
    }
}

/// Split "http://host:port" into the parts `Ollama::new` expects
fn split_host_port(url: &str) -> (String, u16) {
    match url.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (url.to_string(), DEFAULT_PORT),
        },
        None => (url.to_string(), DEFAULT_PORT),
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, messages: &[Message], tool_info: Option<&str>) -> Result<String> {
        let request = ChatMessageRequest::new(
            self.model.clone(),
            Self::wire_messages(messages, tool_info),
        );

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| Error::Provider(format!("Ollama request failed: {}", e)))?;

        Ok(response.message.content)
    }

    async fn generate_streaming(
        &self,
        messages: &[Message],
        tool_info: Option<&str>,
    ) -> Result<TextStream> {
        let request = ChatMessageRequest::new(
            self.model.clone(),
            Self::wire_messages(messages, tool_info),
        );

        let mut stream = self
            .client
            .send_chat_messages_stream(request)
            .await
            .map_err(|e| Error::Provider(format!("Ollama request failed: {}", e)))?;

        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(chunk) => {
                        let delta = chunk.message.content;
                        if !delta.is_empty() && tx.send(Ok(delta)).await.is_err() {
                            // Consumer abandoned the stream
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("Ollama stream error: {:?}", e);
                        let _ = tx
                            .send(Ok(format!("\n[Error in LLM streaming: {:?}]", e)))
                            .await;
                        let _ = tx
                            .send(Err(Error::Provider(format!("{:?}", e))))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(receiver_stream(rx))
    }
}
