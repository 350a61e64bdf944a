//! Configuration for the Toolbridge client
//!
//! The config file is JSON with a `context_servers` mapping (server name
//! to launch spec) and a `provider` block selecting the LLM backend.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use toolbridge_mcp::ServerParams;

use crate::error::{Error, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Tool servers, keyed by name
    #[serde(default)]
    pub context_servers: HashMap<String, ServerConfig>,
    /// LLM backend selection
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Error loading config file: {}", e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("Error parsing config file: {}", e)))
    }

    /// All configured server names
    pub fn server_names(&self) -> Vec<String> {
        self.context_servers.keys().cloned().collect()
    }

    /// Look up a server by name
    pub fn get_server(&self, name: &str) -> Result<&ServerConfig> {
        self.context_servers
            .get(name)
            .ok_or_else(|| Error::Config(format!("Server '{}' not found in config", name)))
    }
}

/// Launch spec for one MCP server
///
/// Two shapes deserialize: the flat form
/// `{"command": "npx", "args": [...], "env": {...}}` and the nested form
/// `{"command": {"path": "npx", "args": [...], "env": {...}}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub command: Option<CommandSpec>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

impl ServerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: Some(CommandSpec::Path(command.into())),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Resolve to transport launch parameters.
    ///
    /// Declared env values are layered over the inherited process
    /// environment by the transport; path-like values are normalized to
    /// the host separator first.
    pub fn server_params(&self, name: &str) -> Result<ServerParams> {
        let (path, args, env) = match &self.command {
            Some(CommandSpec::Path(path)) => (path.clone(), self.args.clone(), self.env.clone()),
            Some(CommandSpec::Detailed { path, args, env }) => {
                (path.clone(), args.clone(), env.clone())
            }
            None => {
                return Err(Error::Config(format!(
                    "Server '{}' does not have command configuration",
                    name
                )));
            }
        };

        let env: HashMap<String, String> = env
            .into_iter()
            .map(|(k, v)| (k, normalize_path_value(&v)))
            .collect();

        Ok(ServerParams::new(path).with_args(args).with_env(env))
    }
}

/// Rewrite separators in path-like values to the host convention
fn normalize_path_value(value: &str) -> String {
    if value.contains('/') || value.contains('\\') {
        value
            .chars()
            .map(|c| {
                if c == '/' || c == '\\' {
                    std::path::MAIN_SEPARATOR
                } else {
                    c
                }
            })
            .collect()
    } else {
        value.to_string()
    }
}

/// LLM backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Backend id: "openai", "gemini", or "ollama"
    pub provider: String,
    /// Model name (defaults to the backend's default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// API key (can be loaded from env)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable name for the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Base URL for the API (for self-hosted or proxy endpoints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            api_key: None,
            api_key_env: None,
            base_url: None,
        }
    }
}

impl ProviderConfig {
    /// Get the API key, checking the environment if not set directly
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }

        if let Some(env_name) = &self.api_key_env {
            if let Ok(key) = std::env::var(env_name) {
                if !key.is_empty() {
                    return Some(key);
                }
            }
        }

        // Default environment variables per backend
        match self.provider.as_str() {
            "openai" | "github" => std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("GITHUB_TOKEN"))
                .ok(),
            "gemini" | "google" => std::env::var("GEMINI_API_KEY")
                .or_else(|_| std::env::var("GOOGLE_API_KEY"))
                .ok(),
            _ => None,
        }
    }
}
