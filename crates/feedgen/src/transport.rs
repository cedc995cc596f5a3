//! Stream transport: connect at a cursor and push each event into a handler.
//!
//! [`JetstreamClient`] is the WebSocket implementation. Failures come back as
//! [`TransportError`], which the driver turns into a [`FailureClass`].

use crate::cursor::Cursor;
use crate::dispatcher::EventHandler;
use crate::error::DispatchError;
use crate::event::{Event, POST_COLLECTION};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

pub const DEFAULT_JETSTREAM_URL: &str = "wss://jetstream1.us-east.bsky.network/subscribe";

/// What the driver should do after a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The stream is corrupt at this position: step the cursor forward one unit and reconnect.
    SkipForward,
    /// Reconnect at the same cursor.
    Retry,
    /// Stop the consumer.
    Fatal,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bad handshake: {0}")]
    Handshake(String),
    #[error("unexpected EOF: {0}")]
    Truncated(String),
    #[error("read loop failed: {0}")]
    ReadLoop(String),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error(transparent)]
    Handler(#[from] DispatchError),
}

impl TransportError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Handshake(_) | Self::Truncated(_) => FailureClass::SkipForward,
            Self::ReadLoop(_) | Self::Timeout(_) => FailureClass::Retry,
            Self::Connect(_) | Self::Handler(_) => FailureClass::Fatal,
        }
    }
}

/// Totals since process start, readable without blocking the read loop.
#[derive(Debug, Default)]
pub struct ReadCounters {
    events: AtomicU64,
    bytes: AtomicU64,
}

impl ReadCounters {
    pub fn record(&self, bytes: usize) {
        self.events.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReadStats {
        ReadStats {
            events: self.events.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub events: u64,
    pub bytes: u64,
}

impl ReadStats {
    pub fn avg_event_size(&self) -> u64 {
        self.bytes.checked_div(self.events).unwrap_or(0)
    }
}

/// A resumable event stream.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect, stream from `cursor` and hand every event to `handler` until the connection
    /// fails. Only returns `Ok` if the stream ends without an error to report.
    async fn connect_and_read(
        &self,
        cursor: Cursor,
        handler: &dyn EventHandler,
    ) -> Result<(), TransportError>;

    fn counters(&self) -> Arc<ReadCounters>;
}

/// Jetstream connection settings.
#[derive(Debug, Clone)]
pub struct JetstreamConfig {
    pub url: String,
    pub wanted_collections: Vec<String>,
    pub connect_timeout: Duration,
}

impl Default for JetstreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_JETSTREAM_URL.to_string(),
            wanted_collections: vec![POST_COLLECTION.to_string()],
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Jetstream WebSocket client.
pub struct JetstreamClient {
    config: JetstreamConfig,
    counters: Arc<ReadCounters>,
}

impl JetstreamClient {
    pub fn new(config: JetstreamConfig) -> Self {
        Self {
            config,
            counters: Arc::new(ReadCounters::default()),
        }
    }

    /// Subscribe URL for a cursor. A zero cursor asks for live events only.
    pub fn subscribe_url(&self, cursor: Cursor) -> String {
        let mut params: Vec<String> = self
            .config
            .wanted_collections
            .iter()
            .map(|c| format!("wantedCollections={c}"))
            .collect();
        if cursor.is_set() {
            params.push(format!("cursor={cursor}"));
        }
        if params.is_empty() {
            return self.config.url.clone();
        }
        let sep = if self.config.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.config.url, sep, params.join("&"))
    }
}

#[async_trait]
impl Transport for JetstreamClient {
    async fn connect_and_read(
        &self,
        cursor: Cursor,
        handler: &dyn EventHandler,
    ) -> Result<(), TransportError> {
        let url = self.subscribe_url(cursor);
        tracing::debug!(%url, "connecting to jetstream");
        let (mut ws, _) = timeout(self.config.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(self.config.connect_timeout))?
            .map_err(classify_connect_error)?;

        while let Some(msg) = ws.next().await {
            let msg = msg.map_err(classify_read_error)?;
            let event = match &msg {
                Message::Text(text) => self.decode(text.as_bytes()),
                Message::Binary(bytes) => self.decode(bytes),
                Message::Close(frame) => {
                    let reason = frame
                        .as_ref()
                        .map(|f| f.reason.to_string())
                        .unwrap_or_default();
                    return Err(TransportError::ReadLoop(format!(
                        "server closed connection: {reason}"
                    )));
                }
                _ => continue,
            };
            if let Some(event) = event {
                handler.handle(&event)?;
            }
        }
        Err(TransportError::ReadLoop("stream ended".into()))
    }

    fn counters(&self) -> Arc<ReadCounters> {
        Arc::clone(&self.counters)
    }
}

impl JetstreamClient {
    fn decode(&self, bytes: &[u8]) -> Option<Event> {
        self.counters.record(bytes.len());
        match serde_json::from_slice(bytes) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(reason = %e, len = bytes.len(), "skipping undecodable jetstream message");
                None
            }
        }
    }
}

/// Upgrade failures are treated as position-specific; anything that stops us reaching the
/// server at all is fatal.
fn classify_connect_error(e: WsError) -> TransportError {
    match e {
        WsError::Http(resp) => TransportError::Handshake(format!("HTTP {}", resp.status())),
        WsError::HttpFormat(e) => TransportError::Handshake(e.to_string()),
        WsError::Protocol(e) => TransportError::Handshake(e.to_string()),
        e @ (WsError::ConnectionClosed | WsError::AlreadyClosed) => {
            TransportError::Handshake(e.to_string())
        }
        other => TransportError::Connect(other.to_string()),
    }
}

fn classify_read_error(e: WsError) -> TransportError {
    match e {
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::Truncated("connection reset without closing handshake".into())
        }
        WsError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
            TransportError::Truncated(io.to_string())
        }
        other => TransportError::ReadLoop(other.to_string()),
    }
}
