//! Session facade over an MCP transport
//!
//! `McpSession` owns one server connection end to end: spawn, handshake,
//! tool discovery, tool calls, teardown. Its value over the raw client is
//! lifecycle sequencing - every operation checks that the session is in
//! the right state instead of failing somewhere inside the transport.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::client::{ClientInfo, McpClient, McpError, ServerInfo};
use crate::transport::{ServerParams, StdioTransport};
use crate::McpTool;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// The capability the orchestration loop needs from a session: the cached
/// tool list and the ability to invoke one tool. Kept narrow so the loop
/// can be driven by test doubles.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Cached tool list; fails if the session was never initialized
    fn available_tools(&self) -> Result<&[McpTool], McpError>;

    /// Invoke a tool and return the raw result payload
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError>;
}

/// A session with one MCP server
pub struct McpSession {
    params: ServerParams,
    client: Option<McpClient<StdioTransport>>,
    server_info: Option<ServerInfo>,
    tools: Option<Vec<McpTool>>,
    state: ConnectionState,
}

impl McpSession {
    pub fn new(params: ServerParams) -> Self {
        Self {
            params,
            client: None,
            server_info: None,
            tools: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Server identity reported during initialize (None before initialize)
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Spawn the server process. No-op if already connected.
    pub async fn connect(&mut self) -> Result<(), McpError> {
        if self.state == ConnectionState::Connected {
            debug!(command = %self.params.command, "Session already connected");
            return Ok(());
        }

        self.state = ConnectionState::Connecting;

        let transport = StdioTransport::spawn(&self.params).await.map_err(|e| {
            self.state = ConnectionState::Disconnected;
            McpError::Transport(format!(
                "Failed to start '{}': {}",
                self.params.command, e
            ))
        })?;

        self.client = Some(McpClient::new(transport));
        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Run the MCP handshake and cache the server's tool list.
    ///
    /// Must follow `connect`. Tool names are the server's responsibility
    /// to keep unique; the cache is a verbatim snapshot.
    pub async fn initialize(&mut self) -> Result<ServerInfo, McpError> {
        let client = self.client.as_ref().ok_or(McpError::NotConnected)?;

        let info = client.initialize(ClientInfo::default()).await?;
        let tools = client.list_tools().await?;

        info!(
            server = %info.name,
            tool_count = tools.len(),
            "MCP session initialized"
        );

        self.tools = Some(tools);
        self.server_info = Some(info.clone());
        Ok(info)
    }

    /// Release the transport and all cached state. Safe to call when
    /// already disconnected.
    pub async fn disconnect(&mut self) -> Result<(), McpError> {
        if let Some(client) = self.client.take() {
            // Kill the child; a dead process is not an error here
            let _ = client.shutdown().await;
        }

        self.server_info = None;
        self.tools = None;
        self.state = ConnectionState::Disconnected;
        Ok(())
    }
}

#[async_trait]
impl ToolSession for McpSession {
    fn available_tools(&self) -> Result<&[McpTool], McpError> {
        self.tools.as_deref().ok_or(McpError::NotInitialized)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        let client = self.client.as_ref().ok_or(McpError::NotConnected)?;
        if self.tools.is_none() {
            return Err(McpError::NotInitialized);
        }

        client.call_tool(name, arguments).await
    }
}
