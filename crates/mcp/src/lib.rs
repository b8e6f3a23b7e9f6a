//! MCP (Model Context Protocol) client library.
//!
//! This crate speaks to a tool host over a persistent streaming connection:
//! a child process on stdio, or an HTTP server using server-sent events.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Endpoint, Session};
//!
//! # async fn example() -> mcp::Result<()> {
//! let endpoint = Endpoint::Sse {
//!     url: "http://localhost:8080/sse".to_string(),
//! };
//!
//! let mut session = Session::open(&endpoint).await?;
//!
//! for tool in session.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let mut args = serde_json::Map::new();
//! args.insert("expression".into(), "2 + 2 * 3".into());
//! let text = session.call_tool("calculate_expression", Some(args)).await?;
//! println!("{text}");
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod protocol;
mod session;
pub mod transport;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, Content, GetPromptParams, GetPromptResult, Implementation,
    InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListPromptsResult, ListToolsResult, PROTOCOL_VERSION, Prompt, PromptMessage, PromptRole,
    RequestId, ServerCapabilities, Tool,
};
pub use session::{DEFAULT_TIMEOUT, Session};
pub use transport::{Endpoint, HostTransport, LineTransport, SseTransport, StdioTransport, Transport};
