//! Language-model backends
//!
//! One adapter per backend behind a single capability set: blocking
//! generation and streaming generation. Backends are selected by
//! configuration at construction time; credentials are passed in
//! explicitly, never read from process-global mutable state. The
//! orchestration loop only ever sees the `LanguageModel` trait.

pub mod gemini;
pub mod ollama;
pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};

pub use gemini::GeminiModel;
pub use ollama::OllamaModel;
pub use openai::OpenAiModel;

/// Conversation roles in the universal message shape.
///
/// The assistant role is called `model`; adapters rename it to whatever
/// their backend expects. `Tool` marks tool results fed back to the
/// model - the content already carries the TOOL RESULT/TOOL ERROR prefix
/// and every adapter renders it as a user turn, so the convention stays
/// backend-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Tool,
}

/// One conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// Ordered, finite sequence of text chunks from one streaming generation.
///
/// Single-consumer and not restartable: consuming it twice means issuing
/// two backend calls. Dropping it mid-sequence abandons the generation.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Capability set implemented once per backend
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Backend name for logs and diagnostics
    fn name(&self) -> &str;

    /// Single blocking generation
    async fn generate(&self, messages: &[Message], tool_info: Option<&str>) -> Result<String>;

    /// Streaming generation. A mid-stream backend failure surfaces as a
    /// visible final chunk followed by an `Err` item - never a silent
    /// stop.
    async fn generate_streaming(
        &self,
        messages: &[Message],
        tool_info: Option<&str>,
    ) -> Result<TextStream>;
}

/// Construct the configured backend
pub fn create_model(config: &ProviderConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" | "github" => Ok(Box::new(OpenAiModel::from_config(config)?)),
        "gemini" | "google" => Ok(Box::new(GeminiModel::from_config(config)?)),
        "ollama" | "local" => Ok(Box::new(OllamaModel::from_config(config))),
        other => Err(Error::Config(format!("Unknown provider: {}", other))),
    }
}

/// Copy messages with the tool instructions folded into the first user
/// turn. Later turns must not repeat them.
pub(crate) fn with_tool_info(messages: &[Message], tool_info: Option<&str>) -> Vec<Message> {
    let mut out = messages.to_vec();
    if let Some(info) = tool_info {
        if let Some(first_user) = out.iter_mut().find(|m| m.role == Role::User) {
            first_user.content = format!("{}\n\n{}", first_user.content, info);
        }
    }
    out
}

/// Wrap a producer-task channel as a `TextStream`
pub(crate) fn receiver_stream(rx: mpsc::Receiver<Result<String>>) -> TextStream {
    Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}
