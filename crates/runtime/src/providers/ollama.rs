//! Ollama chat API backend.

use std::time::Duration;

use crate::llm::{
    CompletionOutcome, CompletionProvider, CompletionRequest, Message, ModelError, NO_RESPONSE,
    Role, ToolCall, ToolSpec,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "qwen3:1.7b";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    message: Option<ApiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an Ollama provider.
#[derive(Debug, Clone)]
pub struct OllamaProviderBuilder {
    base_url: String,
    model: String,
    timeout: Duration,
    connect_timeout: Duration,
}

impl OllamaProviderBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Total time allowed for one completion, connect included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn build(self) -> Result<OllamaProvider, ModelError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| ModelError::Network(e.to_string()))?;

        Ok(OllamaProvider {
            client,
            chat_url: format!("{}/api/chat", self.base_url.trim_end_matches('/')),
            model: self.model,
            timeout: self.timeout,
        })
    }
}

/// Ollama `/api/chat` backend with tool calling.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    chat_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn builder(model: impl Into<String>) -> OllamaProviderBuilder {
        OllamaProviderBuilder::new(model)
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    fn message_to_api(msg: &Message) -> ApiMessage {
        ApiMessage {
            role: Self::role_to_api(msg.role),
            content: msg.content.clone(),
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| ApiToolCall {
                    id: call.id.clone(),
                    function: ApiFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool<'_> {
        ApiTool {
            tool_type: "function",
            function: ApiFunction {
                name: &spec.name,
                description: &spec.description,
                parameters: &spec.input_schema,
            },
        }
    }

    fn map_send_error(&self, error: reqwest::Error) -> ModelError {
        if error.is_timeout() {
            ModelError::Timeout(self.timeout)
        } else {
            ModelError::Network(error.to_string())
        }
    }
}

impl std::fmt::Display for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ollama({} at {})", self.model, self.chat_url)
    }
}

impl CompletionProvider for OllamaProvider {
    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<CompletionOutcome, ModelError> {
        let api_request = ApiRequest {
            model: &self.model,
            messages: request.messages.iter().map(Self::message_to_api).collect(),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
            stream: false,
        };

        debug!(
            model = %self.model,
            messages = api_request.messages.len(),
            tools = api_request.tools.len(),
            "requesting completion"
        );

        let response = self
            .client
            .post(&self.chat_url)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        decode_reply(&body)
    }
}

/// Decode a raw `/api/chat` reply body.
fn decode_reply(body: &str) -> Result<CompletionOutcome, ModelError> {
    let reply: ApiResponse = serde_json::from_str(body).map_err(|e| {
        ModelError::InvalidResponse(format!("failed to decode JSON: {e}; raw response: {body}"))
    })?;
    Ok(outcome_from_reply(reply))
}

fn outcome_from_reply(reply: ApiResponse) -> CompletionOutcome {
    let Some(message) = reply.message else {
        return CompletionOutcome::FinalAnswer(NO_RESPONSE.to_string());
    };

    let calls: Vec<ToolCall> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: normalize_arguments(call.function.arguments),
        })
        .collect();
    if !calls.is_empty() {
        return CompletionOutcome::ToolCalls(calls);
    }

    match message.content {
        Some(text) if !text.trim().is_empty() => CompletionOutcome::FinalAnswer(text),
        _ => CompletionOutcome::FinalAnswer(NO_RESPONSE.to_string()),
    }
}

/// Ollama sends arguments as an object; OpenAI-compatible servers send a
/// JSON-encoded string. Both end up as a JSON value.
fn normalize_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(encoded) => serde_json::from_str(&encoded).unwrap_or(Value::String(encoded)),
        Value::Null => Value::Object(Default::default()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_reply_is_final_answer() {
        let body = r#"{"model":"qwen3:1.7b","message":{"role":"assistant","content":"Hello!"},"done":true}"#;
        assert_eq!(
            decode_reply(body).unwrap(),
            CompletionOutcome::FinalAnswer("Hello!".into())
        );
    }

    #[test]
    fn tool_calls_win_over_empty_content() {
        let body = r#"{
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "calculate_expression", "arguments": {"expression": "2 + 2 * 3"}}},
                    {"id": "call_2", "function": {"name": "get_alerts", "arguments": {"state": "CA"}}}
                ]
            }
        }"#;
        let CompletionOutcome::ToolCalls(calls) = decode_reply(body).unwrap() else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "calculate_expression");
        assert_eq!(calls[0].id, None);
        assert_eq!(calls[0].arguments, json!({"expression": "2 + 2 * 3"}));
        assert_eq!(calls[1].id.as_deref(), Some("call_2"));
    }

    #[test]
    fn string_encoded_arguments_are_parsed() {
        let body = r#"{"message":{"tool_calls":[{"function":{"name":"get_forecast","arguments":"{\"latitude\":34.05,\"longitude\":-118.24}"}}]}}"#;
        let CompletionOutcome::ToolCalls(calls) = decode_reply(body).unwrap() else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].arguments["latitude"], json!(34.05));
    }

    #[test]
    fn empty_replies_fall_back() {
        for body in [
            r#"{}"#,
            r#"{"message":{}}"#,
            r#"{"message":{"content":"   "}}"#,
            r#"{"message":{"content":"","tool_calls":[]}}"#,
        ] {
            assert_eq!(
                decode_reply(body).unwrap(),
                CompletionOutcome::FinalAnswer(NO_RESPONSE.into()),
                "body: {body}"
            );
        }
    }

    #[test]
    fn malformed_reply_is_invalid_response() {
        let err = decode_reply("<html>502</html>").unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
        assert!(err.to_string().contains("<html>502</html>"));
    }

    #[test]
    fn request_wire_shape() {
        let messages = vec![
            Message::user("2 + 2 * 3"),
            Message::tool_request(vec![ToolCall::new(
                "calculate_expression",
                json!({"expression": "2 + 2 * 3"}),
            )]),
            Message::tool_result(crate::llm::ToolResult::success(
                "calculate_expression-no-id",
                "8",
            )),
        ];
        let tools = vec![ToolSpec {
            name: "calculate_expression".into(),
            description: "Evaluate arithmetic".into(),
            input_schema: json!({"type": "object"}),
        }];

        let request = ApiRequest {
            model: "qwen3:1.7b",
            messages: messages.iter().map(OllamaProvider::message_to_api).collect(),
            tools: tools.iter().map(OllamaProvider::tool_to_api).collect(),
            stream: false,
        };
        let wire = serde_json::to_value(&request).unwrap();

        assert_eq!(wire["stream"], json!(false));
        assert_eq!(wire["tools"][0]["type"], "function");
        assert_eq!(wire["tools"][0]["function"]["name"], "calculate_expression");
        assert_eq!(wire["tools"][0]["function"]["parameters"], json!({"type": "object"}));
        assert_eq!(wire["messages"][0], json!({"role": "user", "content": "2 + 2 * 3"}));
        assert_eq!(
            wire["messages"][1]["tool_calls"][0]["function"]["arguments"]["expression"],
            "2 + 2 * 3"
        );
        assert_eq!(wire["messages"][2]["role"], "tool");
        assert_eq!(wire["messages"][2]["tool_call_id"], "calculate_expression-no-id");
    }

    #[test]
    fn builder_trims_trailing_slash() {
        let provider = OllamaProvider::builder("llama3.2")
            .base_url("http://gpu-box:11434/")
            .build()
            .unwrap();
        assert_eq!(provider.to_string(), "ollama(llama3.2 at http://gpu-box:11434/api/chat)");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let provider = OllamaProvider::builder(DEFAULT_MODEL)
            .base_url("http://127.0.0.1:9")
            .connect_timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let err = provider
            .complete(CompletionRequest {
                messages: &[Message::user("hi")],
                tools: &[],
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::Network(_) | ModelError::Timeout(_)
        ));
    }
}
