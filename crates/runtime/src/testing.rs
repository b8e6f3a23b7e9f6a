//! Fakes shared by unit tests.

use crate::connector::{Connected, Connector};
use crate::llm::{
    CompletionOutcome, CompletionProvider, CompletionRequest, Message, ModelError, Role,
};
use crate::tools::{ToolDescriptor, ToolError, ToolHost, ToolRegistry};
use crate::{Error, Result};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted provider reply.
pub enum Step {
    Reply(CompletionOutcome),
    Fail(ModelError),
    /// Never answers within any reasonable test window.
    Stall(Duration),
}

/// Provider that replays a script, then echoes the last user message.
#[derive(Default)]
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::default(),
        })
    }

    /// Histories seen by each completion call.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

impl CompletionProvider for ScriptedProvider {
    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> std::result::Result<CompletionOutcome, ModelError> {
        self.requests.lock().unwrap().push(request.messages.to_vec());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(outcome)) => Ok(outcome),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(CompletionOutcome::FinalAnswer("too late".into()))
            }
            None => {
                let last_user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                Ok(CompletionOutcome::FinalAnswer(format!("echo: {last_user}")))
            }
        }
    }
}

/// Tool host that records every call and answers a few known ones.
#[derive(Clone, Default)]
pub struct SpyHost {
    pub calls: Arc<Mutex<Vec<(String, Value)>>>,
    pub closed: Arc<AtomicBool>,
    /// Answer every call as if the host process had exited.
    pub disconnected: Arc<AtomicBool>,
}

impl SpyHost {
    pub fn call_names(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl ToolHost for SpyHost {
    async fn call(&mut self, name: &str, arguments: Value) -> std::result::Result<String, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));

        if self.disconnected.load(Ordering::SeqCst) {
            return Err(ToolError::Transport(mcp::Error::HostExited));
        }
        match name {
            "calculate_expression" if arguments["expression"] == "2 + 2 * 3" => Ok("8".into()),
            "calculate_expression" => Err(ToolError::Execution(
                "Error: unsupported expression".into(),
            )),
            "get_forecast" if arguments["latitude"] == 34 => Ok("\nToday: Sunny\n".into()),
            "get_alerts" => Ok(format!("alerts for {}", arguments["state"].as_str().unwrap_or("?"))),
            other => Err(ToolError::Execution(format!("{other} is broken"))),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn registry() -> ToolRegistry {
    ToolRegistry::from_descriptors(["calculate_expression", "get_alerts", "get_forecast"].map(
        |name| ToolDescriptor {
            name: name.into(),
            description: format!("{name} tool"),
            input_schema: json!({"type": "object"}),
        },
    ))
}

pub fn seed() -> Vec<Message> {
    vec![Message::user("You are a helpful weather assistant.")]
}

pub fn connected(host: SpyHost) -> Connected<SpyHost> {
    Connected {
        host,
        registry: registry(),
        seed: seed(),
        warnings: Vec::new(),
    }
}

/// Connector handing out spy hosts; fails while `fail` is set.
#[derive(Clone, Default)]
pub struct SpyConnector {
    pub host: SpyHost,
    pub fail: Arc<AtomicBool>,
    pub attempts: Arc<AtomicUsize>,
    pub delay: Option<Duration>,
}

impl Connector for SpyConnector {
    type Host = SpyHost;

    async fn connect(&self) -> Result<Connected<SpyHost>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Connect(mcp::Error::Connect(
                "connection refused".into(),
            )));
        }
        Ok(connected(self.host.clone()))
    }
}
