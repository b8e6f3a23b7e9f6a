//! MCP client session (handshake, request/reply, lifecycle).

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, InitializeParams,
    InitializeResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    PaginatedParams, PromptMessage, RequestId, Tool,
};
use crate::transport::{Endpoint, HostTransport, Transport};

/// Default timeout for a single request/reply round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connected,
    Ready,
    Closed,
}

/// A client session with one tool host.
///
/// Every operation takes `&mut self`, so a session carries at most one
/// outstanding request. Replies that do not match it (left over from a
/// request whose caller gave up) are discarded.
pub struct Session<T> {
    transport: T,
    state: State,
    next_id: i64,
    server_info: Option<InitializeResult>,
    request_timeout: Duration,
}

impl Session<HostTransport> {
    /// Connect to an endpoint and complete the initialize handshake.
    pub async fn open(endpoint: &Endpoint) -> Result<Self> {
        info!(%endpoint, "connecting to tool host");
        let transport = HostTransport::connect(endpoint).await?;
        let mut session = Session::new(transport);

        if let Err(e) = session.initialize().await {
            let _ = session.close().await;
            return Err(e);
        }
        Ok(session)
    }
}

impl<T: Transport> Session<T> {
    /// Wrap an already-connected transport. Call [`initialize`](Self::initialize) next.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: State::Connected,
            next_id: 1,
            server_info: None,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Perform the initialize handshake. A session initializes exactly once.
    pub async fn initialize(&mut self) -> Result<&InitializeResult> {
        match self.state {
            State::Connected => {}
            State::Ready => return Err(Error::AlreadyInitialized),
            State::Closed => return Err(Error::Closed),
        }

        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()))
            .await?;
        self.notify("notifications/initialized").await?;

        info!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "tool host initialized"
        );
        self.state = State::Ready;
        Ok(&*self.server_info.insert(result))
    }

    /// Check if the handshake has completed and the session is open.
    pub fn is_initialized(&self) -> bool {
        self.state == State::Ready
    }

    /// Server info (after initialization).
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    /// Fetch the full tool catalog, following pagination cursors.
    pub async fn list_tools(&mut self) -> Result<Vec<Tool>> {
        self.ensure_ready()?;

        let mut tools = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = None;
        loop {
            let page: ListToolsResult = self
                .request("tools/list", Some(PaginatedParams { cursor }))
                .await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !seen.insert(next.clone()) => {
                    return Err(Error::InvalidResponse(format!(
                        "tools/list repeated cursor {next:?}"
                    )));
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(count = tools.len(), "listed tools");
        Ok(tools)
    }

    /// Fetch the messages of a named prompt.
    pub async fn get_prompt(&mut self, name: &str) -> Result<Vec<PromptMessage>> {
        self.ensure_ready()?;

        let params = GetPromptParams {
            name: name.to_string(),
            arguments: None,
        };
        let result: GetPromptResult = self.request("prompts/get", Some(params)).await?;
        Ok(result.messages)
    }

    /// Call a tool by name and return its text output.
    ///
    /// Text fragments are joined with newlines; other fragments are ignored.
    /// A result flagged `isError` becomes [`Error::ToolCallFailed`].
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<String> {
        self.ensure_ready()?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        let text = result.joined_text();
        if result.is_error {
            return Err(Error::ToolCallFailed(text));
        }
        Ok(text)
    }

    /// Close the session, then the stream underneath it.
    ///
    /// Safe on a session that never finished initializing, and idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }
        self.state = State::Closed;
        self.server_info = None;
        self.transport.close().await
    }

    // --- Internal methods ---

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            State::Ready => Ok(()),
            State::Connected => Err(Error::NotInitialized),
            State::Closed => Err(Error::Closed),
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        RequestId::Number(id)
    }

    async fn request<P, R>(&mut self, method: &str, params: Option<P>) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        let request_json = serde_json::to_string(&request)?;
        debug!(%method, ?id, "sending request");
        self.transport.send(&request_json).await?;

        let response = timeout(self.request_timeout, self.read_response(&id))
            .await
            .map_err(|_| Error::Timeout)??;

        let result_value = response.into_result()?;
        let result: R = serde_json::from_value(result_value)
            .map_err(|e| Error::InvalidResponse(format!("{method}: {e}")))?;

        Ok(result)
    }

    async fn notify(&mut self, method: &str) -> Result<()> {
        let notification_json = serde_json::to_string(&JsonRpcNotification::new(method))?;
        self.transport.send(&notification_json).await
    }

    async fn read_response(&mut self, id: &RequestId) -> Result<JsonRpcResponse> {
        loop {
            let message = self.transport.receive().await?;
            let value: Value = serde_json::from_str(&message)?;

            if let Some(method) = value.get("method").and_then(Value::as_str) {
                debug!(%method, "ignoring host-initiated message");
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_value(value)
                .map_err(|e| Error::InvalidResponse(e.to_string()))?;
            if &response.id != id {
                warn!(expected = ?id, got = ?response.id, "discarding stale response");
                continue;
            }
            return Ok(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LineTransport;
    use serde_json::json;
    use tokio::io::{
        AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf, duplex,
        split,
    };

    type TestTransport = LineTransport<BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>>;

    /// Run a fake host on the far end of a duplex pipe. `reply` maps each
    /// request to the lines it should write back.
    fn scripted_host<F>(reply: F) -> Session<TestTransport>
    where
        F: Fn(&Value) -> Vec<Value> + Send + 'static,
    {
        let (near, far) = duplex(64 * 1024);
        let (near_read, near_write) = split(near);
        let (far_read, mut far_write) = split(far);

        tokio::spawn(async move {
            let mut lines = BufReader::new(far_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                for out in reply(&request) {
                    let mut text = out.to_string();
                    text.push('\n');
                    if far_write.write_all(text.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        });

        Session::new(LineTransport::new(BufReader::new(near_read), near_write))
    }

    fn ok(request: &Value, result: Value) -> Vec<Value> {
        vec![json!({"jsonrpc": "2.0", "id": request["id"], "result": result})]
    }

    fn standard_host(request: &Value) -> Vec<Value> {
        match request["method"].as_str().unwrap_or_default() {
            "initialize" => ok(
                request,
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}, "prompts": {}},
                    "serverInfo": {"name": "weather", "version": "1.0"}
                }),
            ),
            "notifications/initialized" => Vec::new(),
            "tools/list" => ok(
                request,
                json!({"tools": [
                    {"name": "calculate_expression", "inputSchema": {"type": "object"}},
                    {"name": "get_alerts", "description": "alerts", "inputSchema": {"type": "object"}}
                ]}),
            ),
            "prompts/get" => ok(
                request,
                json!({"messages": [
                    {"role": "user", "content": {"type": "text", "text": "Be helpful."}}
                ]}),
            ),
            "tools/call" => match request["params"]["name"].as_str() {
                Some("calculate_expression") => ok(
                    request,
                    json!({"content": [
                        {"type": "text", "text": "8"},
                        {"type": "image", "data": "", "mimeType": "image/png"},
                        {"type": "text", "text": "done"}
                    ]}),
                ),
                _ => ok(
                    request,
                    json!({"content": [{"type": "text", "text": "Unknown tool"}], "isError": true}),
                ),
            },
            _ => vec![json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": {"code": -32601, "message": "Method not found"}
            })],
        }
    }

    #[tokio::test]
    async fn initialize_then_discover() {
        let mut session = scripted_host(standard_host);
        assert!(!session.is_initialized());

        let info = session.initialize().await.unwrap();
        assert_eq!(info.server_info.name, "weather");
        assert!(session.is_initialized());

        let tools = session.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["calculate_expression", "get_alerts"]);
    }

    #[tokio::test]
    async fn second_initialize_is_rejected() {
        let mut session = scripted_host(standard_host);
        session.initialize().await.unwrap();
        assert!(matches!(
            session.initialize().await,
            Err(Error::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn requests_before_initialize_fail() {
        let mut session = scripted_host(standard_host);
        assert!(matches!(
            session.list_tools().await,
            Err(Error::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn call_tool_joins_text_fragments() {
        let mut session = scripted_host(standard_host);
        session.initialize().await.unwrap();

        let mut args = Map::new();
        args.insert("expression".into(), json!("2 + 2 * 3"));
        let text = session
            .call_tool("calculate_expression", Some(args))
            .await
            .unwrap();
        assert_eq!(text, "8\ndone");
    }

    #[tokio::test]
    async fn tool_error_flag_becomes_error() {
        let mut session = scripted_host(standard_host);
        session.initialize().await.unwrap();

        match session.call_tool("nope", None).await {
            Err(Error::ToolCallFailed(text)) => assert_eq!(text, "Unknown tool"),
            other => panic!("expected ToolCallFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_prompt_returns_messages() {
        let mut session = scripted_host(standard_host);
        session.initialize().await.unwrap();

        let messages = session.get_prompt("get_initial_prompts").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.as_text(), Some("Be helpful."));
    }

    #[tokio::test]
    async fn json_rpc_errors_surface() {
        let mut session = scripted_host(|request| {
            if request["method"] == "initialize" {
                standard_host(request)
            } else {
                vec![json!({
                    "jsonrpc": "2.0",
                    "id": request["id"],
                    "error": {"code": -32601, "message": "Method not found"}
                })]
            }
        });
        session.initialize().await.unwrap();
        assert!(matches!(session.list_tools().await, Err(Error::JsonRpc(_))));
    }

    #[tokio::test]
    async fn stale_replies_and_notifications_are_skipped() {
        let mut session = scripted_host(|request| {
            if request["method"] == "tools/list" {
                vec![
                    json!({"jsonrpc": "2.0", "method": "notifications/message", "params": {}}),
                    json!({"jsonrpc": "2.0", "id": 999, "result": {"tools": []}}),
                    json!({"jsonrpc": "2.0", "id": request["id"], "result": {"tools": [
                        {"name": "get_forecast", "inputSchema": {"type": "object"}}
                    ]}}),
                ]
            } else {
                standard_host(request)
            }
        });
        session.initialize().await.unwrap();

        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "get_forecast");
    }

    #[tokio::test]
    async fn list_tools_follows_cursor() {
        let mut session = scripted_host(|request| {
            if request["method"] != "tools/list" {
                return standard_host(request);
            }
            if request["params"]["cursor"].is_null() {
                ok(
                    request,
                    json!({"tools": [{"name": "a", "inputSchema": {}}], "nextCursor": "page2"}),
                )
            } else {
                ok(request, json!({"tools": [{"name": "b", "inputSchema": {}}]}))
            }
        });
        session.initialize().await.unwrap();

        let tools = session.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[tokio::test]
    async fn repeated_cursor_is_rejected() {
        let mut session = scripted_host(|request| {
            if request["method"] != "tools/list" {
                return standard_host(request);
            }
            ok(
                request,
                json!({"tools": [{"name": "a", "inputSchema": {}}], "nextCursor": "again"}),
            )
        });
        session.initialize().await.unwrap();

        match session.list_tools().await {
            Err(Error::InvalidResponse(message)) => assert!(message.contains("again")),
            other => panic!("expected InvalidResponse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_host_times_out() {
        let session = scripted_host(|_| Vec::new());
        let mut session = session.with_request_timeout(Duration::from_millis(50));
        assert!(matches!(session.initialize().await, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_tolerates_uninitialized() {
        let mut session = scripted_host(standard_host);
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(matches!(session.list_tools().await, Err(Error::Closed)));
        assert!(matches!(session.initialize().await, Err(Error::Closed)));
    }
}
