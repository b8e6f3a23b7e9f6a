//! Execution bridge between a synchronous front end and the async session.
//!
//! A dedicated thread runs a current-thread tokio runtime for the life of
//! the bridge. It owns the [`Conversation`]; the front end only sends
//! commands and waits for replies with a bound.

use crate::connector::Connector;
use crate::conversation::Conversation;
use crate::llm::CompletionProvider;
use crate::tools::ToolDescriptor;
use crate::{Error, Result};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Extra wait on the caller side beyond the worker's own limit.
const REPLY_GRACE: Duration = Duration::from_secs(1);

/// Time bounds for bridge operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeLimits {
    pub connect: Duration,
    pub turn: Duration,
}

impl Default for BridgeLimits {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            turn: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Failed(String),
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// What a successful connect found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectSummary {
    pub tools: Vec<String>,
    pub warnings: Vec<String>,
}

/// A finished turn and whether it found the tool host gone.
struct Turn {
    answer: String,
    host_lost: bool,
}

enum Command {
    Connect(SyncSender<Result<ConnectSummary>>),
    Submit(String, SyncSender<Result<Turn>>),
    Reset(SyncSender<Result<()>>),
    Tools(SyncSender<Result<Vec<ToolDescriptor>>>),
    Shutdown,
}

/// Handle to the background worker.
pub struct Bridge {
    commands: UnboundedSender<Command>,
    worker: Option<JoinHandle<()>>,
    status: ConnectionStatus,
    limits: BridgeLimits,
}

impl Bridge {
    /// Start the worker thread. Nothing is connected until [`connect`](Self::connect).
    pub fn spawn<P, C>(provider: P, connector: C, limits: BridgeLimits) -> Result<Self>
    where
        P: CompletionProvider + 'static,
        C: Connector + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (commands, inbox) = unbounded_channel();

        let worker = thread::Builder::new()
            .name("relay-bridge".into())
            .spawn(move || runtime.block_on(run_worker(provider, connector, inbox, limits)))?;

        Ok(Self {
            commands,
            worker: Some(worker),
            status: ConnectionStatus::Connecting,
            limits,
        })
    }

    /// Connect (or reconnect) the session. On failure the bridge stays up
    /// and the status records the reason.
    pub fn connect(&mut self) -> Result<ConnectSummary> {
        self.status = ConnectionStatus::Connecting;
        let result = self.request(Command::Connect, self.limits.connect);
        self.status = match &result {
            Ok(_) => ConnectionStatus::Connected,
            Err(e) => ConnectionStatus::Failed(e.to_string()),
        };
        result
    }

    /// Run one conversation turn. A turn that finds the tool host gone
    /// marks the status failed; `/reconnect` is the way back.
    pub fn submit(&mut self, text: &str) -> Result<String> {
        let text = text.to_string();
        let turn = self.request(|reply| Command::Submit(text, reply), self.limits.turn)?;
        if turn.host_lost {
            self.status = ConnectionStatus::Failed("tool host disconnected".into());
        }
        Ok(turn.answer)
    }

    /// Restore the history to the seed prompt.
    pub fn reset(&self) -> Result<()> {
        self.request(Command::Reset, self.limits.connect)
    }

    /// The discovered tool catalog.
    pub fn tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.request(Command::Tools, self.limits.connect)
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn limits(&self) -> BridgeLimits {
        self.limits
    }

    /// Stop the worker, closing the session, and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop_worker(true);
    }

    fn stop_worker(&mut self, wait: bool) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.commands.send(Command::Shutdown);
        if wait && worker.join().is_err() {
            warn!("bridge worker panicked");
        }
    }

    fn request<T>(
        &self,
        command: impl FnOnce(SyncSender<Result<T>>) -> Command,
        limit: Duration,
    ) -> Result<T> {
        let (reply, response) = mpsc::sync_channel(1);
        self.commands
            .send(command(reply))
            .map_err(|_| Error::WorkerGone)?;

        match response.recv_timeout(limit.saturating_add(REPLY_GRACE)) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::BridgeTimeout(limit)),
            Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerGone),
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop_worker(false);
    }
}

async fn run_worker<P, C>(
    provider: P,
    connector: C,
    mut inbox: UnboundedReceiver<Command>,
    limits: BridgeLimits,
) where
    P: CompletionProvider,
    C: Connector,
{
    let provider = Arc::new(provider);
    let mut conversation: Option<Conversation<Arc<P>, C::Host>> = None;
    debug!("bridge worker started");

    while let Some(command) = inbox.recv().await {
        match command {
            Command::Connect(reply) => {
                if let Some(mut old) = conversation.take() {
                    old.close().await;
                }
                let result = match timeout(limits.connect, connector.connect()).await {
                    Ok(Ok(connected)) => {
                        let summary = ConnectSummary {
                            tools: connected
                                .registry
                                .descriptors()
                                .iter()
                                .map(|tool| tool.name.clone())
                                .collect(),
                            warnings: connected.warnings.clone(),
                        };
                        info!(tools = summary.tools.len(), "bridge connected");
                        conversation = Some(Conversation::new(Arc::clone(&provider), connected));
                        Ok(summary)
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(Error::BridgeTimeout(limits.connect)),
                };
                if let Err(e) = &result {
                    warn!(error = %e, "connect failed");
                }
                let _ = reply.send(result);
            }
            Command::Submit(text, reply) => {
                let result = match conversation.as_mut() {
                    None => Err(Error::NotConnected),
                    Some(conversation) => {
                        let session = conversation.id();
                        let outcome = timeout(limits.turn, conversation.turn(&text)).await;
                        match outcome {
                            Ok(result) => result.map(|answer| Turn {
                                answer,
                                host_lost: conversation.host_lost(),
                            }),
                            Err(_) => {
                                warn!(%session, limit = ?limits.turn, "turn cancelled");
                                Err(Error::BridgeTimeout(limits.turn))
                            }
                        }
                    }
                };
                let _ = reply.send(result);
            }
            Command::Reset(reply) => {
                let result = match conversation.as_mut() {
                    None => Err(Error::NotConnected),
                    Some(conversation) => {
                        conversation.reset();
                        Ok(())
                    }
                };
                let _ = reply.send(result);
            }
            Command::Tools(reply) => {
                let result = match &conversation {
                    None => Err(Error::NotConnected),
                    Some(conversation) => Ok(conversation.registry().descriptors().to_vec()),
                };
                let _ = reply.send(result);
            }
            Command::Shutdown => break,
        }
    }

    if let Some(mut conversation) = conversation {
        conversation.close().await;
    }
    debug!("bridge worker stopped");
}
