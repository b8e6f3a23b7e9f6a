//! Tool host trait.

use crate::tools::ToolError;
use serde_json::Value;
use std::future::Future;

/// Trait for tool execution hosts.
///
/// This is the boundary between the conversation loop and side effects.
/// Calls take `&mut self`: a host serves one call at a time.
pub trait ToolHost: Send {
    /// Execute a named tool and return its text output.
    fn call(
        &mut self,
        name: &str,
        arguments: Value,
    ) -> impl Future<Output = Result<String, ToolError>> + Send;

    /// Release the host. Must tolerate repeated calls.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
