//! Relay runtime: tool-calling conversations over MCP.
//!
//! This crate connects a completion provider to the tools of an MCP host
//! and runs the conversation loop between them.
//!
//! # Overview
//!
//! - **Conversation**: history, tool registry and tool host for one
//!   connection. Runs turns against a [`CompletionProvider`].
//! - **ToolRegistry**: the discovered tool catalog, in discovery order.
//! - **Connector**: produces a connected host, its registry and the seed
//!   prompt.
//! - **Bridge**: runs the conversation on a background thread so a
//!   synchronous front end can drive it with bounded waits.
//!
//! # Example
//!
//! ```no_run
//! use runtime::{Bridge, BridgeLimits, McpConnector, OllamaProvider};
//!
//! # fn example() -> runtime::Result<()> {
//! let provider = OllamaProvider::builder("qwen3:1.7b").build()?;
//! let connector = McpConnector::new(mcp::Endpoint::Sse {
//!     url: "http://localhost:8080/sse".into(),
//! })
//! .with_seed_prompt("get_initial_prompts");
//!
//! let mut bridge = Bridge::spawn(provider, connector, BridgeLimits::default())?;
//! bridge.connect()?;
//! println!("{}", bridge.submit("What is 2 + 2 * 3?")?);
//! bridge.shutdown();
//! # Ok(())
//! # }
//! ```

mod bridge;
mod connector;
mod conversation;
mod error;
pub mod llm;
pub mod providers;
pub mod tools;

#[cfg(test)]
mod testing;

pub use bridge::{Bridge, BridgeLimits, ConnectSummary, ConnectionStatus};
pub use connector::{Connected, Connector, McpConnector};
pub use conversation::{Conversation, SessionId};
pub use error::{Error, Result};
pub use llm::{
    CompletionOutcome, CompletionProvider, CompletionRequest, Message, ModelError, Role,
    ToolCall, ToolResult, ToolSpec,
};
pub use providers::{OllamaProvider, OllamaProviderBuilder};
pub use tools::{McpToolHost, ToolDescriptor, ToolError, ToolHost, ToolRegistry};
