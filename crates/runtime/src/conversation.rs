//! The conversation loop.

use crate::connector::Connected;
use crate::llm::{
    CompletionOutcome, CompletionProvider, CompletionRequest, Message, NO_RESPONSE, ToolResult,
    ToolSpec,
};
use crate::tools::{ToolError, ToolHost, ToolRegistry};
use crate::Result;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One tool host connection, its tool registry and the message history.
///
/// A turn completes the history once. When the model asks for tools, the
/// calls run in order and the first successful output is the answer: the
/// remaining calls are dropped and the model is not consulted again.
pub struct Conversation<P, H> {
    id: SessionId,
    provider: P,
    host: H,
    registry: ToolRegistry,
    tools: Vec<ToolSpec>,
    seed: Vec<Message>,
    history: Vec<Message>,
    host_lost: bool,
}

impl<P: CompletionProvider, H: ToolHost> Conversation<P, H> {
    pub fn new(provider: P, connected: Connected<H>) -> Self {
        let Connected {
            host,
            registry,
            seed,
            ..
        } = connected;
        let id = SessionId::new();
        info!(session = %id, tools = registry.len(), seed = seed.len(), "conversation started");

        Self {
            id,
            provider,
            host,
            tools: registry.as_provider_schema(),
            registry,
            history: seed.clone(),
            seed,
            host_lost: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Set once a tool call finds the host connection gone.
    pub fn host_lost(&self) -> bool {
        self.host_lost
    }

    /// Run one user turn and return the answer text.
    pub async fn turn(&mut self, input: &str) -> Result<String> {
        self.history.push(Message::user(input));

        let outcome = self
            .provider
            .complete(CompletionRequest {
                messages: &self.history,
                tools: &self.tools,
            })
            .await?;

        match outcome {
            CompletionOutcome::FinalAnswer(text) => {
                self.history.push(Message::assistant(text.clone()));
                Ok(text)
            }
            CompletionOutcome::ToolCalls(calls) => {
                self.history.push(Message::tool_request(calls.clone()));

                let total = calls.len();
                let mut failures = Vec::new();
                for (i, call) in calls.into_iter().enumerate() {
                    let call_id = call.id_or_placeholder();

                    let output = if self.registry.has(&call.name) {
                        debug!(session = %self.id, tool = %call.name, "calling tool");
                        self.host.call(&call.name, call.arguments).await
                    } else {
                        Err(ToolError::UnknownTool(call.name.clone()))
                    };

                    match output {
                        Ok(text) => {
                            self.history
                                .push(Message::tool_result(ToolResult::success(call_id, &text)));
                            if i + 1 < total {
                                warn!(
                                    session = %self.id,
                                    dropped = total - i - 1,
                                    "returning first tool result, remaining calls dropped"
                                );
                            }
                            return Ok(text.trim().to_string());
                        }
                        Err(e) => {
                            warn!(session = %self.id, tool = %call.name, error = %e, "tool call failed");
                            if e.is_disconnect() {
                                self.host_lost = true;
                            }
                            let result = ToolResult::error(call_id, &e);
                            failures.push(result.content.clone());
                            self.history.push(Message::tool_result(result));
                        }
                    }
                }

                if failures.is_empty() {
                    return Ok(NO_RESPONSE.to_string());
                }
                Ok(failures.join("\n"))
            }
        }
    }

    /// Restore the history to the seed prompt. The registry is untouched.
    pub fn reset(&mut self) {
        self.history = self.seed.clone();
        debug!(session = %self.id, "history reset");
    }

    /// Release the tool host.
    pub async fn close(&mut self) {
        self.host.close().await;
        info!(session = %self.id, "conversation closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelError, Role, ToolCall};
    use crate::testing::{ScriptedProvider, SpyHost, Step, connected, seed};
    use crate::Error;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn calls(calls: Vec<ToolCall>) -> Step {
        Step::Reply(CompletionOutcome::ToolCalls(calls))
    }

    fn answer(text: &str) -> Step {
        Step::Reply(CompletionOutcome::FinalAnswer(text.into()))
    }

    #[tokio::test]
    async fn final_answer_appends_user_and_assistant() {
        let provider = ScriptedProvider::new([answer("Hello! How can I help?")]);
        let mut conversation = Conversation::new(provider.clone(), connected(SpyHost::default()));
        let before = conversation.history().len();

        let reply = conversation.turn("hi").await.unwrap();

        assert_eq!(reply, "Hello! How can I help?");
        let added: Vec<Role> = conversation.history()[before..]
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(added, [Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn provider_sees_seed_then_user_message() {
        let provider = ScriptedProvider::new([answer("ok")]);
        let mut conversation = Conversation::new(provider.clone(), connected(SpyHost::default()));

        conversation.turn("Any alerts in CA?").await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0][..1], seed()[..]);
        assert_eq!(requests[0][1], Message::user("Any alerts in CA?"));
    }

    #[tokio::test]
    async fn calculator_round_trip() {
        let provider = ScriptedProvider::new([calls(vec![ToolCall::new(
            "calculate_expression",
            json!({"expression": "2 + 2 * 3"}),
        )])]);
        let host = SpyHost::default();
        let mut conversation = Conversation::new(provider.clone(), connected(host.clone()));

        let reply = conversation.turn("What is 2 + 2 * 3?").await.unwrap();

        assert_eq!(reply, "8");
        assert_eq!(provider.requests().len(), 1);
        let last = conversation.history().last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.content, "8");
        assert_eq!(last.tool_call_id.as_deref(), Some("calculate_expression-no-id"));
        assert_eq!(host.call_names(), ["calculate_expression"]);
    }

    #[tokio::test]
    async fn unknown_tool_never_reaches_host() {
        let provider = ScriptedProvider::new([calls(vec![
            ToolCall::new("delete_everything", json!({})).with_id("call_9"),
        ])]);
        let host = SpyHost::default();
        let mut conversation = Conversation::new(provider, connected(host.clone()));

        let reply = conversation.turn("clean up").await.unwrap();

        assert!(host.call_names().is_empty());
        assert_eq!(reply, "Error: unknown tool: delete_everything");
        let last = conversation.history().last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("call_9"));
        assert!(last.content.starts_with("Error:"));
    }

    #[tokio::test]
    async fn only_first_successful_result_is_returned() {
        let provider = ScriptedProvider::new([calls(vec![
            ToolCall::new("get_alerts", json!({"state": "CA"})),
            ToolCall::new("get_alerts", json!({"state": "TX"})),
        ])]);
        let host = SpyHost::default();
        let mut conversation = Conversation::new(provider.clone(), connected(host.clone()));

        let reply = conversation.turn("alerts for CA and TX").await.unwrap();

        assert_eq!(reply, "alerts for CA");
        assert_eq!(host.call_names(), ["get_alerts"]);
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn failed_calls_fall_through_to_next() {
        let provider = ScriptedProvider::new([calls(vec![
            ToolCall::new("get_forecast", json!({"latitude": 0, "longitude": 0})),
            ToolCall::new("get_alerts", json!({"state": "CA"})),
        ])]);
        let host = SpyHost::default();
        let mut conversation = Conversation::new(provider, connected(host.clone()));

        let reply = conversation.turn("weather?").await.unwrap();

        assert_eq!(reply, "alerts for CA");
        let tool_messages: Vec<&str> = conversation
            .history()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            tool_messages,
            ["Error: execution failed: get_forecast is broken", "alerts for CA"]
        );
    }

    #[tokio::test]
    async fn answer_is_trimmed_but_history_keeps_raw_output() {
        let provider = ScriptedProvider::new([calls(vec![ToolCall::new(
            "get_forecast",
            json!({"latitude": 34, "longitude": -118}),
        )])]);
        let mut conversation = Conversation::new(provider, connected(SpyHost::default()));

        let reply = conversation.turn("forecast for LA").await.unwrap();

        assert_eq!(reply, "Today: Sunny");
        assert_eq!(conversation.history().last().unwrap().content, "\nToday: Sunny\n");
    }

    #[tokio::test]
    async fn lost_host_is_recorded() {
        let provider = ScriptedProvider::new([calls(vec![ToolCall::new(
            "get_alerts",
            json!({"state": "CA"}),
        )])]);
        let host = SpyHost::default();
        host.disconnected.store(true, Ordering::SeqCst);
        let mut conversation = Conversation::new(provider, connected(host));
        assert!(!conversation.host_lost());

        let reply = conversation.turn("alerts?").await.unwrap();

        assert!(reply.starts_with("Error: transport:"));
        assert!(conversation.host_lost());
    }

    #[tokio::test]
    async fn all_failures_become_the_answer() {
        let provider = ScriptedProvider::new([calls(vec![
            ToolCall::new("nope", json!({})),
            ToolCall::new("calculate_expression", json!({"expression": "__import__('os')"})),
        ])]);
        let mut conversation = Conversation::new(provider, connected(SpyHost::default()));

        let reply = conversation.turn("do it").await.unwrap();

        assert_eq!(
            reply,
            "Error: unknown tool: nope\nError: execution failed: Error: unsupported expression"
        );
    }

    #[tokio::test]
    async fn model_errors_propagate() {
        let provider = ScriptedProvider::new([Step::Fail(ModelError::Api("500: overloaded".into()))]);
        let mut conversation = Conversation::new(provider, connected(SpyHost::default()));

        let err = conversation.turn("hi").await.unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::Api(_))));
    }

    #[tokio::test]
    async fn reset_restores_seed() {
        let provider = ScriptedProvider::new([]);
        let mut conversation = Conversation::new(provider, connected(SpyHost::default()));

        conversation.turn("first").await.unwrap();
        conversation.turn("second").await.unwrap();
        assert_eq!(conversation.history().len(), seed().len() + 4);

        conversation.reset();

        assert_eq!(conversation.history(), seed());
        assert_eq!(conversation.registry().len(), 3);
    }

    #[tokio::test]
    async fn close_releases_host() {
        let host = SpyHost::default();
        let mut conversation = Conversation::new(ScriptedProvider::new([]), connected(host.clone()));

        conversation.close().await;

        assert!(host.closed.load(Ordering::SeqCst));
    }
}
