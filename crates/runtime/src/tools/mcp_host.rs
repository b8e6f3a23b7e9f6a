//! MCP-backed tool host.

use super::{ToolDescriptor, ToolError, ToolHost, ToolRegistry};
use crate::llm::Message;
use mcp::{HostTransport, PromptRole, Session, Transport};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Tool host backed by an initialized MCP session.
pub struct McpToolHost<T = HostTransport> {
    session: Session<T>,
}

impl McpToolHost {
    /// Connect and initialize a session for an endpoint.
    pub async fn open(endpoint: &mcp::Endpoint) -> Result<Self, mcp::Error> {
        Ok(Self::new(Session::open(endpoint).await?))
    }
}

impl<T: Transport> McpToolHost<T> {
    pub fn new(session: Session<T>) -> Self {
        Self { session }
    }

    /// Fetch the tool catalog into a registry.
    pub async fn discover(&mut self) -> Result<ToolRegistry, mcp::Error> {
        let tools = self.session.list_tools().await?;
        let registry = ToolRegistry::from_descriptors(tools.into_iter().map(ToolDescriptor::from));
        info!(count = registry.len(), "discovered tools");
        Ok(registry)
    }

    /// Fetch a named prompt as seed messages for the conversation.
    ///
    /// Prompt messages without text content are skipped.
    pub async fn seed(&mut self, prompt: &str) -> Result<Vec<Message>, mcp::Error> {
        let messages = self.session.get_prompt(prompt).await?;
        let seed: Vec<Message> = messages
            .into_iter()
            .filter_map(|msg| {
                let text = msg.content.as_text()?.to_string();
                Some(match msg.role {
                    PromptRole::User => Message::user(text),
                    PromptRole::Assistant => Message::assistant(text),
                })
            })
            .collect();
        debug!(%prompt, messages = seed.len(), "fetched seed prompt");
        Ok(seed)
    }
}

/// Tool arguments must be a JSON object, or absent.
fn arguments_to_map(arguments: Value) -> Result<Option<serde_json::Map<String, Value>>, ToolError> {
    match arguments {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(ToolError::InvalidInput(format!(
            "arguments must be an object, got {other}"
        ))),
    }
}

impl<T: Transport> ToolHost for McpToolHost<T> {
    async fn call(&mut self, name: &str, arguments: Value) -> Result<String, ToolError> {
        let arguments = arguments_to_map(arguments)?;
        Ok(self.session.call_tool(name, arguments).await?)
    }

    async fn close(&mut self) {
        if let Err(e) = self.session.close().await {
            warn!(error = %e, "error while closing tool host session");
        }
    }
}
