use mcp::JsonRpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),
}

impl Error {
    /// The JSON-RPC error sent back for a failed request.
    pub fn to_rpc(&self) -> JsonRpcError {
        let code = match self {
            Self::MethodNotFound(_) => JsonRpcError::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => JsonRpcError::INVALID_PARAMS,
            Self::Io(_) | Self::Json(_) | Self::Http(_) => JsonRpcError::INTERNAL_ERROR,
        };
        JsonRpcError::new(code, self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
