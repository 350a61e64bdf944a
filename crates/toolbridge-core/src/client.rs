//! Top-level MCP tool client
//!
//! Owns the configuration, the language-model backend, and at most one
//! active server session. Each query gets a fresh orchestration loop;
//! the session is reused across queries until `disconnect` or a new
//! `connect_to_server`.

use tokio::sync::mpsc;
use tracing::info;

use toolbridge_mcp::{McpSession, McpTool, ServerInfo, ToolSession};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::formatting::format_tool_call;
use crate::orchestration::{QueryEvent, QueryLoop};
use crate::provider::{create_model, LanguageModel};

pub struct ToolClient {
    config: Config,
    llm: Box<dyn LanguageModel>,
    session: Option<McpSession>,
    server_name: Option<String>,
}

impl ToolClient {
    /// Build a client, constructing the configured backend
    pub fn from_config(config: Config) -> Result<Self> {
        let llm = create_model(&config.provider)?;
        Ok(Self::with_model(config, llm))
    }

    /// Build a client with an explicit backend (embedding, tests)
    pub fn with_model(config: Config, llm: Box<dyn LanguageModel>) -> Self {
        Self {
            config,
            llm,
            session: None,
            server_name: None,
        }
    }

    /// All server names in the configuration
    pub fn available_servers(&self) -> Vec<String> {
        self.config.server_names()
    }

    /// Name of the currently connected server, if any
    pub fn active_server(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Tool list of the active session
    pub fn available_tools(&self) -> Result<&[McpTool]> {
        let session = self.session.as_ref().ok_or(Error::NoActiveSession)?;
        Ok(session.available_tools()?)
    }

    /// Connect to a named server, replacing any previous session.
    ///
    /// Configuration and connection failures are fatal to this call and
    /// leave the client disconnected; the caller decides whether to retry.
    pub async fn connect_to_server(&mut self, server_name: &str) -> Result<ServerInfo> {
        let params = self
            .config
            .get_server(server_name)?
            .server_params(server_name)?;

        // Tear down the previous session before spawning a new server
        self.disconnect().await;

        let mut session = McpSession::new(params);
        session.connect().await.map_err(Error::Session)?;
        let server_info = session.initialize().await.map_err(Error::Session)?;

        info!(
            server = server_name,
            tools = session.available_tools().map(|t| t.len()).unwrap_or(0),
            "Connected to server"
        );

        self.session = Some(session);
        self.server_name = Some(server_name.to_string());
        Ok(server_info)
    }

    /// Disconnect the active session. No-op when not connected.
    pub async fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.disconnect().await;
        }
        self.server_name = None;
    }

    /// Run one query, streaming progress events to `events`
    pub async fn process_query_streaming(
        &mut self,
        query: &str,
        events: mpsc::Sender<QueryEvent>,
    ) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NoActiveSession)?;
        QueryLoop::new(self.llm.as_ref(), session)
            .run(query, events)
            .await
    }

    /// Run one query to completion and return the rendered transcript
    pub async fn process_query(&mut self, query: &str) -> Result<String> {
        let session = self.session.as_ref().ok_or(Error::NoActiveSession)?;

        let (tx, mut rx) = mpsc::channel(64);
        let query_loop = QueryLoop::new(self.llm.as_ref(), session);
        let run = query_loop.run(query, tx);
        tokio::pin!(run);

        // Drain events while the loop runs; the channel is bounded, so
        // collecting only afterwards would deadlock
        let mut transcript = String::new();
        let mut outcome: Option<Result<()>> = None;
        loop {
            tokio::select! {
                result = &mut run, if outcome.is_none() => outcome = Some(result),
                event = rx.recv() => match event {
                    Some(event) => transcript.push_str(&render_event(&event)),
                    None => break,
                },
            }
        }

        outcome.unwrap_or(Ok(()))?;
        Ok(transcript)
    }
}

/// Render one event for the plain-text transcript
fn render_event(event: &QueryEvent) -> String {
    match event {
        QueryEvent::Chunk(text) => text.clone(),
        QueryEvent::ToolCall { name, arguments } => {
            format!("\n[{}]\n", format_tool_call(name, arguments))
        }
        QueryEvent::ToolResult { success: true, text, .. } => {
            format!("Result:\n{}\n", text)
        }
        QueryEvent::ToolResult { success: false, text, .. } => {
            format!("Error: {}\n", text)
        }
        QueryEvent::Notice(text) => format!("\n{}\n", text),
    }
}
