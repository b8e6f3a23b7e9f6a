//! Transports carrying JSON-RPC messages to and from a tool host.
//!
//! A transport moves whole messages; framing (newline-delimited stdio or
//! server-sent events) is its business. Request/response correlation lives
//! in [`Session`](crate::Session).

mod sse;
mod stdio;

use std::collections::HashMap;
use std::future::Future;

use crate::error::Result;

pub use sse::SseTransport;
pub use stdio::{LineTransport, StdioTransport};

/// Maximum size of a single inbound message (1MB).
/// Sized for large tool outputs (forecasts, search results).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// A full-duplex message channel to a tool host.
pub trait Transport: Send {
    /// Send one serialized JSON-RPC message.
    fn send(&mut self, message: &str) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next inbound JSON-RPC message.
    fn receive(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Release the underlying stream. Must tolerate repeated calls.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Where a tool host lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A child process speaking newline-delimited JSON-RPC on stdio.
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    /// An HTTP server using the SSE transport (GET stream, POST messages).
    Sse { url: String },
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio { command, args, .. } if args.is_empty() => write!(f, "stdio:{command}"),
            Self::Stdio { command, args, .. } => write!(f, "stdio:{command} {}", args.join(" ")),
            Self::Sse { url } => write!(f, "sse:{url}"),
        }
    }
}

/// The transports an [`Endpoint`] can produce.
pub enum HostTransport {
    Stdio(StdioTransport),
    Sse(SseTransport),
}

impl HostTransport {
    /// Establish the raw stream pair for an endpoint.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Stdio { command, args, env } => {
                Ok(Self::Stdio(StdioTransport::spawn(command, args, env)?))
            }
            Endpoint::Sse { url } => Ok(Self::Sse(SseTransport::connect(url).await?)),
        }
    }
}

impl Transport for HostTransport {
    async fn send(&mut self, message: &str) -> Result<()> {
        match self {
            Self::Stdio(t) => t.send(message).await,
            Self::Sse(t) => t.send(message).await,
        }
    }

    async fn receive(&mut self) -> Result<String> {
        match self {
            Self::Stdio(t) => t.receive().await,
            Self::Sse(t) => t.receive().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Stdio(t) => t.close().await,
            Self::Sse(t) => t.close().await,
        }
    }
}
