//! MCP client implementation

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::protocol::{methods, notification, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::transport::Transport;
use crate::{McpTool, ServerCapabilities, PROTOCOL_VERSION};

/// MCP errors
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Session is not connected")]
    NotConnected,
    #[error("Session is not initialized")]
    NotInitialized,
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "toolbridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// MCP client for talking to one server over a transport
pub struct McpClient<T: Transport> {
    transport: Arc<Mutex<T>>,
    request_id: AtomicI64,
}

impl<T: Transport> McpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            request_id: AtomicI64::new(1),
        }
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.request_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Run the initialize handshake and acknowledge it
    pub async fn initialize(&self, client_info: ClientInfo) -> Result<ServerInfo, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": client_info.name,
                "version": client_info.version
            }
        });

        let request = JsonRpcRequest::new(self.next_id(), methods::INITIALIZE)
            .with_params(params);

        let response = self.send_request(request).await?;

        if let Some(result) = response.result {
            let init: InitializeResult = serde_json::from_value(result)
                .map_err(|e| McpError::Protocol(e.to_string()))?;

            debug!(
                server = %init.server_info.name,
                version = %init.server_info.version,
                "MCP initialize complete"
            );

            // Acknowledge before issuing any further requests
            let mut transport = self.transport.lock().await;
            transport
                .send(notification(methods::INITIALIZED))
                .await
                .map_err(|e| McpError::Transport(e.to_string()))?;

            Ok(ServerInfo {
                name: init.server_info.name,
                version: init.server_info.version,
            })
        } else if let Some(error) = response.error {
            Err(McpError::Server(error.message))
        } else {
            Err(McpError::Protocol("Empty response".to_string()))
        }
    }

    /// List available tools
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_LIST);
        let response = self.send_request(request).await?;

        if let Some(result) = response.result {
            let tools: ToolsListResult = serde_json::from_value(result)
                .map_err(|e| McpError::Protocol(e.to_string()))?;
            Ok(tools.tools)
        } else if let Some(error) = response.error {
            Err(McpError::Server(error.message))
        } else {
            Ok(Vec::new())
        }
    }

    /// Call a tool, returning the raw result payload.
    ///
    /// The result shape varies by server (string content, content item
    /// lists, arbitrary JSON), so rendering is left to the caller.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments
        });

        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_CALL)
            .with_params(params);

        let response = self.send_request(request).await?;

        if let Some(result) = response.result {
            Ok(result)
        } else if let Some(error) = response.error {
            Err(McpError::Server(error.message))
        } else {
            Err(McpError::Protocol("Empty response".to_string()))
        }
    }

    /// Close the underlying transport
    pub async fn shutdown(&self) -> Result<(), McpError> {
        let mut transport = self.transport.lock().await;
        transport
            .close()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))
    }

    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let mut transport = self.transport.lock().await;

        let request_value = serde_json::to_value(&request)
            .map_err(|e| McpError::Protocol(e.to_string()))?;

        transport
            .send(request_value)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        // Servers may interleave notifications; skip until the response
        loop {
            let message = transport
                .receive()
                .await
                .map_err(|e| McpError::Transport(e.to_string()))?
                .ok_or_else(|| McpError::Transport("Connection closed".to_string()))?;

            if message.get("id").is_none() {
                debug!(method = ?message.get("method"), "Skipping server notification");
                continue;
            }

            return serde_json::from_value(message)
                .map_err(|e| McpError::Protocol(e.to_string()));
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    #[allow(dead_code)]
    protocol_version: String,
    #[allow(dead_code)]
    capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    server_info: ServerInfoInner,
}

#[derive(Debug, serde::Deserialize)]
struct ServerInfoInner {
    name: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, serde::Deserialize)]
struct ToolsListResult {
    tools: Vec<McpTool>,
}
