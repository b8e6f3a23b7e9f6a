use std::time::Duration;
use thiserror::Error;

use crate::llm::ModelError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to tool host: {0}")]
    Connect(#[source] mcp::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("not connected to a tool host")]
    NotConnected,

    #[error("no reply within {0:?}")]
    BridgeTimeout(Duration),

    #[error("bridge worker has stopped")]
    WorkerGone,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
