//! Common helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use feedgen::{Cursor, Event, EventHandler, ReadCounters, Transport, TransportError};
use futures_util::SinkExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("feedgen=debug".parse().unwrap()))
        .with_test_writer()
        .try_init();
}

/// A post-create commit as Jetstream sends it. `tags` become tag facets.
pub fn post_event_json(time_us: i64, rkey: &str, text: &str, tags: &[&str]) -> String {
    let facets: Vec<serde_json::Value> = tags
        .iter()
        .map(|tag| {
            let needle = format!("#{tag}");
            let start = text.find(&needle).unwrap_or(0);
            serde_json::json!({
                "index": {"byteStart": start, "byteEnd": start + needle.len()},
                "features": [{"$type": "app.bsky.richtext.facet#tag", "tag": tag}]
            })
        })
        .collect();
    post_event_with_record(
        time_us,
        rkey,
        serde_json::json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "facets": facets,
            "langs": ["en"],
            "createdAt": "2025-11-10T09:00:00.000Z"
        }),
    )
}

pub fn post_event_with_record(time_us: i64, rkey: &str, record: serde_json::Value) -> String {
    serde_json::json!({
        "did": "did:plc:integration",
        "time_us": time_us,
        "kind": "commit",
        "commit": {
            "rev": "3l3qo2vutsw2b",
            "operation": "create",
            "collection": "app.bsky.feed.post",
            "rkey": rkey,
            "record": record,
            "cid": "bafyreidc6sydkkbchcyg62v77wbhzvb2mvytlmsychqgwf2xojjtpbsm7e"
        }
    })
    .to_string()
}

pub fn event(json: &str) -> Event {
    serde_json::from_str(json).expect("valid event json")
}

pub enum Step {
    /// Deliver these events, then fail with the error.
    Deliver(Vec<Event>, TransportError),
    /// Deliver these events, then block until cancelled.
    DeliverAndHang(Vec<Event>),
}

/// In-process transport replaying a per-connection script. Records every connect cursor.
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    connects: Mutex<Vec<Cursor>>,
    counters: Arc<ReadCounters>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            connects: Mutex::new(Vec::new()),
            counters: Arc::default(),
        })
    }

    pub fn connects(&self) -> Vec<Cursor> {
        self.connects.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect_and_read(
        &self,
        cursor: Cursor,
        handler: &dyn EventHandler,
    ) -> Result<(), TransportError> {
        self.connects.lock().push(cursor);
        let step = self.steps.lock().pop_front();
        let (events, err) = match step {
            Some(Step::Deliver(events, err)) => (events, Some(err)),
            Some(Step::DeliverAndHang(events)) => (events, None),
            None => return Err(TransportError::Connect("script exhausted".into())),
        };
        for ev in &events {
            self.counters.record(256);
            handler.handle(ev)?;
        }
        match err {
            Some(err) => Err(err),
            None => std::future::pending().await,
        }
    }

    fn counters(&self) -> Arc<ReadCounters> {
        Arc::clone(&self.counters)
    }
}

/// Local WebSocket server standing in for Jetstream.
///
/// Connection `n` receives the `n`-th frame list and is then closed with a close frame;
/// connections past the script stay open and silent.
pub struct JetstreamStub {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
    task: tokio::task::JoinHandle<()>,
}

impl JetstreamStub {
    pub async fn start(script: Vec<Vec<String>>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("ws://{}/subscribe", listener.local_addr()?);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            let mut script: VecDeque<Vec<String>> = script.into();
            while let Ok((stream, _)) = listener.accept().await {
                let seen = Arc::clone(&seen);
                let frames = script.pop_front();
                tokio::spawn(async move {
                    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        seen.lock().push(req.uri().to_string());
                        Ok(resp)
                    };
                    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                    else {
                        return;
                    };
                    match frames {
                        Some(frames) => {
                            for frame in frames {
                                if ws.send(Message::Text(frame)).await.is_err() {
                                    return;
                                }
                            }
                            let _ = ws.close(None).await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                });
            }
        });
        Ok(Self {
            url,
            requests,
            task,
        })
    }

    /// Request URIs (path and query) in connection order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl Drop for JetstreamStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}
