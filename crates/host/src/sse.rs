//! HTTP + server-sent events front for the tool host.
//!
//! `GET /sse` opens a session stream whose first event, `endpoint`, names
//! the URL to POST requests to. Replies go out on that session's stream as
//! `message` events; the POST itself is only acknowledged.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::server::Server;
use crate::tools::Toolbox;

pub const SSE_PATH: &str = "/sse";
pub const MESSAGES_PATH: &str = "/messages/";

/// One connected client: its protocol state and its event stream.
struct Connection {
    server: Arc<Mutex<Server>>,
    outbox: UnboundedSender<Event>,
}

#[derive(Clone)]
struct AppState {
    toolbox: Toolbox,
    connections: Arc<Mutex<HashMap<Uuid, Connection>>>,
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: Option<String>,
}

pub fn router(toolbox: Toolbox) -> Router {
    let state = AppState {
        toolbox,
        connections: Arc::default(),
    };
    Router::new()
        .route(SSE_PATH, get(open_stream))
        .route(MESSAGES_PATH, post(accept_message))
        .with_state(state)
}

/// Serve SSE sessions on `addr` until the process is stopped.
pub async fn serve(addr: SocketAddr, toolbox: Toolbox) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, path = SSE_PATH, "tool host listening");
    axum::serve(listener, router(toolbox)).await?;
    Ok(())
}

async fn open_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let id = Uuid::new_v4();
    let (outbox, inbox) = unbounded_channel();
    let endpoint = format!("{MESSAGES_PATH}?session_id={}", id.simple());
    let _ = outbox.send(Event::default().event("endpoint").data(endpoint));

    let connection = Connection {
        server: Arc::new(Mutex::new(Server::new(state.toolbox.clone()))),
        outbox: outbox.clone(),
    };
    state.connections.lock().await.insert(id, connection);
    info!(session = %id, "client connected");

    let connections = Arc::clone(&state.connections);
    tokio::spawn(async move {
        outbox.closed().await;
        connections.lock().await.remove(&id);
        info!(session = %id, "client disconnected");
    });

    Sse::new(UnboundedReceiverStream::new(inbox).map(Ok::<_, Infallible>))
        .keep_alive(KeepAlive::default())
}

async fn accept_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> (StatusCode, &'static str) {
    let Some(id) = query
        .session_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
    else {
        return (StatusCode::BAD_REQUEST, "missing or invalid session_id");
    };

    let (server, outbox) = match state.connections.lock().await.get(&id) {
        Some(connection) => (Arc::clone(&connection.server), connection.outbox.clone()),
        None => return (StatusCode::NOT_FOUND, "unknown session"),
    };

    debug!(session = %id, bytes = body.len(), "message posted");
    tokio::spawn(async move {
        let reply = server.lock().await.handle_line(&body).await;
        if let Some(reply) = reply
            && outbox.send(Event::default().event("message").data(reply)).is_err()
        {
            warn!(session = %id, "client went away before the reply");
        }
    });

    (StatusCode::ACCEPTED, "Accepted")
}
