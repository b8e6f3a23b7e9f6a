//! Line-delimited JSON-RPC server loop.

use crate::error::{Error, Result};
use crate::prompts;
use crate::tools::Toolbox;
use mcp::protocol::ListChangedCapability;
use mcp::{
    CallToolParams, GetPromptParams, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcResponse, ListPromptsResult, ListToolsResult, PROTOCOL_VERSION,
    RequestId, ServerCapabilities,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

pub const SERVER_NAME: &str = "weather";

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A request or notification from the client.
#[derive(Debug, Deserialize)]
struct Incoming {
    #[serde(default)]
    id: Option<RequestId>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

pub struct Server {
    toolbox: Toolbox,
    initialized: bool,
}

impl Server {
    pub fn new(toolbox: Toolbox) -> Self {
        Self {
            toolbox,
            initialized: false,
        }
    }

    /// Serve requests until the reader reaches EOF.
    ///
    /// Each reply is written as one line. Nothing else may be written to
    /// `writer`.
    pub async fn serve<R, W>(&mut self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        info!(server = SERVER_NAME, "tool host starting");

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(mut reply) = self.handle_line(&line).await {
                reply.push('\n');
                writer.write_all(reply.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        info!("client closed the stream, shutting down");
        Ok(())
    }

    /// Handle one inbound line, returning the serialized reply if one is due.
    pub(crate) async fn handle_line(&mut self, line: &str) -> Option<String> {
        let req_id = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        debug!(req_id, raw = %line, "received message");

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                error!(req_id, error = %e, "failed to parse JSON-RPC message");
                return Some(bare_error(
                    Value::Null,
                    JsonRpcError::new(JsonRpcError::PARSE_ERROR, e.to_string()),
                ));
            }
        };

        let incoming: Incoming = match serde_json::from_value(value.clone()) {
            Ok(incoming) => incoming,
            Err(e) => {
                // Responses to requests we never sent land here too.
                if value.get("method").is_none() && value.get("id").is_some() {
                    debug!(req_id, "ignoring response message");
                    return None;
                }
                warn!(req_id, error = %e, "invalid JSON-RPC request");
                return Some(bare_error(
                    value.get("id").cloned().unwrap_or(Value::Null),
                    JsonRpcError::new(JsonRpcError::INVALID_REQUEST, e.to_string()),
                ));
            }
        };

        let method = incoming.method.clone();
        let result = self.handle_request(&method, incoming.params).await;

        let Some(id) = incoming.id else {
            if let Err(e) = result {
                warn!(req_id, %method, error = %e, "notification handling failed");
            }
            return None;
        };

        let response = match result {
            Ok(value) => {
                info!(req_id, %method, "request completed");
                JsonRpcResponse::success(id, value)
            }
            Err(e) => {
                warn!(req_id, %method, error = %e, "request failed");
                JsonRpcResponse::failure(id, e.to_rpc())
            }
        };
        match serde_json::to_string(&response) {
            Ok(json) => Some(json),
            Err(e) => {
                error!(req_id, error = %e, "failed to encode response");
                None
            }
        }
    }

    async fn handle_request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        match method {
            "initialize" => self.handle_initialize(params),
            "notifications/initialized" => {
                self.initialized = true;
                Ok(json!({}))
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(serde_json::to_value(ListToolsResult {
                tools: self.toolbox.definitions(),
                next_cursor: None,
            })?),
            "tools/call" => {
                let params: CallToolParams = parse_params(params)?;
                let result = self
                    .toolbox
                    .call(&params.name, params.arguments.unwrap_or_default())
                    .await?;
                Ok(serde_json::to_value(result)?)
            }
            "prompts/list" => Ok(serde_json::to_value(ListPromptsResult {
                prompts: prompts::definitions(),
                next_cursor: None,
            })?),
            "prompts/get" => {
                let params: GetPromptParams = parse_params(params)?;
                let prompt = prompts::get(&params.name)
                    .ok_or_else(|| Error::InvalidParams(format!("unknown prompt: {}", params.name)))?;
                Ok(serde_json::to_value(prompt)?)
            }
            other => Err(Error::MethodNotFound(other.to_string())),
        }
    }

    fn handle_initialize(&mut self, params: Option<Value>) -> Result<Value> {
        let params: InitializeParams = parse_params(params)?;
        info!(
            client = %params.client_info.name,
            protocol = %params.protocol_version,
            "client initializing"
        );

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ListChangedCapability::default()),
                prompts: Some(ListChangedCapability::default()),
            },
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
            instructions: None,
        };
        Ok(serde_json::to_value(result)?)
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let params = params.ok_or_else(|| Error::InvalidParams("missing params".into()))?;
    serde_json::from_value(params).map_err(|e| Error::InvalidParams(e.to_string()))
}

/// An error reply whose id may be null.
fn bare_error(id: Value, error: JsonRpcError) -> String {
    json!({"jsonrpc": "2.0", "id": id, "error": error}).to_string()
}
