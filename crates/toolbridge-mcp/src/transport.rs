//! MCP transport layer
//!
//! MCP servers speak line-delimited JSON over stdin/stdout. The transport
//! trait abstracts that exchange so sessions can be tested against an
//! in-memory implementation.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

/// Launch parameters for a stdio MCP server
#[derive(Debug, Clone, Default)]
pub struct ServerParams {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl ServerParams {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

/// Transport trait for MCP communication
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&mut self, message: Value) -> io::Result<()>;
    async fn receive(&mut self) -> io::Result<Option<Value>>;
    async fn close(&mut self) -> io::Result<()>;
}

/// Stdio transport for subprocess communication
pub struct StdioTransport {
    child: Child,
    reader: BufReader<tokio::process::ChildStdout>,
}

impl StdioTransport {
    /// Spawn the server process and wire up its stdio pipes.
    ///
    /// The child is killed when this transport is dropped, so teardown is
    /// safe even if the owning session never reaches `disconnect`.
    pub async fn spawn(params: &ServerParams) -> io::Result<Self> {
        let mut child = Command::new(&params.command)
            .args(&params.args)
            .envs(&params.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "Failed to capture stdout")
        })?;

        Ok(Self {
            child,
            reader: BufReader::new(stdout),
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        let stdin = self.child.stdin.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "Stdin not available")
        })?;

        let json = serde_json::to_string(&message)?;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        Ok(())
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;

        if n == 0 {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(&line)?;
        Ok(Some(value))
    }

    async fn close(&mut self) -> io::Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}
