//! HTTP + server-sent events transport.
//!
//! The host streams events on a long-lived GET. Its first event, `endpoint`,
//! names the URL that accepts POSTed requests; replies then arrive on the
//! stream as `message` events.

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, Url};
use tracing::debug;

use super::{MAX_MESSAGE_SIZE, Transport};
use crate::error::{Error, Result};

type EventStream = BoxStream<'static, std::result::Result<Event, EventStreamError<reqwest::Error>>>;

/// Client side of the SSE transport.
pub struct SseTransport {
    client: Client,
    events: Option<EventStream>,
    post_url: Url,
}

impl SseTransport {
    /// Open the event stream and wait for the host to announce its POST endpoint.
    pub async fn connect(url: &str) -> Result<Self> {
        let base =
            Url::parse(url).map_err(|e| Error::Connect(format!("invalid URL {url}: {e}")))?;
        let client = Client::new();

        let response = client
            .get(base.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Connect(format!("GET {base} returned {status}")));
        }

        let mut transport = Self {
            client,
            events: Some(response.bytes_stream().eventsource().boxed()),
            post_url: base.clone(),
        };

        let endpoint = loop {
            let event = transport.next_event().await?;
            if event.event == "endpoint" {
                break event.data;
            }
            debug!(event = %event.event, "ignoring SSE event before endpoint");
        };

        transport.post_url = base
            .join(endpoint.trim())
            .map_err(|e| Error::Connect(format!("invalid endpoint {endpoint:?}: {e}")))?;
        debug!(post_url = %transport.post_url, "SSE transport ready");

        Ok(transport)
    }

    async fn next_event(&mut self) -> Result<Event> {
        let events = self.events.as_mut().ok_or(Error::Closed)?;
        match events.next().await {
            Some(Ok(event)) if event.data.len() > MAX_MESSAGE_SIZE => Err(Error::OutputTooLarge {
                size: event.data.len(),
                max: MAX_MESSAGE_SIZE,
            }),
            Some(Ok(event)) => Ok(event),
            Some(Err(EventStreamError::Transport(e))) => Err(Error::Http(e)),
            Some(Err(e)) => Err(Error::InvalidResponse(format!("event stream: {e}"))),
            None => Err(Error::HostExited),
        }
    }
}

impl Transport for SseTransport {
    async fn send(&mut self, message: &str) -> Result<()> {
        if self.events.is_none() {
            return Err(Error::Closed);
        }

        let response = self
            .client
            .post(self.post_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(message.to_string())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::InvalidResponse(format!(
                "POST {} returned {status}: {body}",
                self.post_url
            )));
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<String> {
        loop {
            let event = self.next_event().await?;
            if event.event == "message" && !event.data.is_empty() {
                return Ok(event.data);
            }
            debug!(event = %event.event, "ignoring SSE event");
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the response tears down the GET stream.
        self.events = None;
        Ok(())
    }
}
