//! Tool registry and execution hosts.

pub mod errors;
mod host;
mod mcp_host;
mod registry;

pub use errors::ToolError;
pub use host::ToolHost;
pub use mcp_host::McpToolHost;
pub use registry::{ToolDescriptor, ToolRegistry};
