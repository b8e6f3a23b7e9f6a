//! Session setup: connect, discover tools, fetch the seed prompt.

use crate::llm::Message;
use crate::tools::{McpToolHost, ToolHost, ToolRegistry};
use crate::{Error, Result};
use std::future::Future;
use tracing::warn;

/// Everything a conversation needs from a freshly connected host.
pub struct Connected<H> {
    pub host: H,
    pub registry: ToolRegistry,
    pub seed: Vec<Message>,
    /// Non-fatal setup failures, for display.
    pub warnings: Vec<String>,
}

/// Produces connected tool hosts. Called once per (re)connect.
pub trait Connector: Send {
    type Host: ToolHost + 'static;

    fn connect(&self) -> impl Future<Output = Result<Connected<Self::Host>>> + Send;
}

/// Connects to an MCP tool host.
///
/// Only the transport and handshake are fatal. A failed tool listing or
/// seed fetch leaves the registry or history empty and is reported as a
/// warning.
#[derive(Debug, Clone)]
pub struct McpConnector {
    endpoint: mcp::Endpoint,
    seed_prompt: Option<String>,
}

impl McpConnector {
    pub fn new(endpoint: mcp::Endpoint) -> Self {
        Self {
            endpoint,
            seed_prompt: None,
        }
    }

    /// Name of the prompt used to seed each conversation.
    pub fn with_seed_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.seed_prompt = (!prompt.is_empty()).then_some(prompt);
        self
    }

    pub fn endpoint(&self) -> &mcp::Endpoint {
        &self.endpoint
    }
}

impl Connector for McpConnector {
    type Host = McpToolHost;

    async fn connect(&self) -> Result<Connected<McpToolHost>> {
        let mut host = McpToolHost::open(&self.endpoint)
            .await
            .map_err(Error::Connect)?;
        let mut warnings = Vec::new();

        let registry = match host.discover().await {
            Ok(registry) => registry,
            Err(e) => {
                let error = Error::Protocol(format!("tool discovery failed: {e}"));
                warn!(endpoint = %self.endpoint, %error, "continuing without tools");
                warnings.push(error.to_string());
                ToolRegistry::default()
            }
        };

        let seed = match &self.seed_prompt {
            Some(prompt) => match host.seed(prompt).await {
                Ok(seed) => seed,
                Err(e) => {
                    let error = Error::Protocol(format!("seed prompt {prompt:?} unavailable: {e}"));
                    warn!(endpoint = %self.endpoint, %error, "continuing without seed prompt");
                    warnings.push(error.to_string());
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Ok(Connected {
            host,
            registry,
            seed,
            warnings,
        })
    }
}
