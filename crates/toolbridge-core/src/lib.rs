//! Toolbridge Core - MCP tool-call orchestration
//!
//! This crate provides the core of the Toolbridge client:
//! - Tool-call extraction from model output (the TOOL:/PARAMETERS: text
//!   convention)
//! - Tool result formatting and argument validation
//! - Pluggable language-model backends (OpenAI-compatible, Gemini, Ollama)
//! - The bounded-turn orchestration loop connecting them to MCP sessions

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod formatting;
pub mod orchestration;
pub mod provider;

pub use client::ToolClient;
pub use config::{Config, ProviderConfig, ServerConfig};
pub use error::{Error, Result, ToolError};
pub use extract::{extract_tool_calls, ToolCall};
pub use formatting::{
    format_tool_call, format_tool_result, truncate_str, validate_tool_args,
};
pub use orchestration::{render_tool_info, QueryEvent, QueryLoop, MAX_TURNS};
pub use provider::{create_model, LanguageModel, Message, Role, TextStream};
