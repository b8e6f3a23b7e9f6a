use thiserror::Error;

/// Errors that can occur during tool execution.
///
/// These never abort a turn. The conversation folds them into history as
/// error tool results.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("transport: {0}")]
    Transport(#[source] mcp::Error),
}

impl From<mcp::Error> for ToolError {
    fn from(error: mcp::Error) -> Self {
        match error {
            mcp::Error::ToolCallFailed(text) => Self::Execution(text),
            other => Self::Transport(other),
        }
    }
}

impl ToolError {
    /// Whether the tool host connection is gone, not just this call.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Transport(mcp::Error::HostExited | mcp::Error::Closed | mcp::Error::Io(_))
        )
    }
}
