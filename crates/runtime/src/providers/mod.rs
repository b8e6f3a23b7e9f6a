//! LLM provider adapters.
//!
//! Each provider implements the completion trait for its specific API.

pub mod ollama;

pub use ollama::{OllamaProvider, OllamaProviderBuilder};
