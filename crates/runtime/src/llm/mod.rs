//! LLM protocol types and provider trait.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{
    CompletionOutcome, CompletionProvider, CompletionRequest, Message, NO_RESPONSE, Role,
    ToolCall, ToolResult, ToolSpec,
};
