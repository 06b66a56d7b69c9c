//! Per-session SSE transport
//!
//! One session = one SSE stream plus one message-POST URL carrying the
//! session id. The POST handler enqueues JSON-RPC messages; the stream
//! consumer drains them in FIFO order. The queue is bounded: a full queue
//! blocks the producer, which throttles the HTTP client.
//!
//! Stream shape, in order:
//!   1. `event: endpoint\ndata: <path>?sessionId=<uuid>\n\n`
//!   2. `data: <compact JSON>\n\n` per queued message
//!   3. `: keepalive-<n>\n\n` comments during idle gaps
//! A `None` sentinel in the queue ends the stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{McpError, McpResult};

/// Tunables for one session transport
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Queue bound; the intentional backpressure mechanism
    pub queue_capacity: usize,

    /// Idle gap before a keep-alive comment is emitted
    pub keepalive_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

/// What a session speaks for
#[derive(Debug, Clone)]
pub enum SessionBinding {
    /// Proxy for one named server
    Server { server_id: Uuid, server_name: String },

    /// Unified facade over every enabled server of the project
    Unified,
}

/// The stateful bridge between one SSE connection and its message queue
pub struct SessionTransport {
    session_id: Uuid,
    project_id: Uuid,
    binding: SessionBinding,

    /// POST path for this session, without the `sessionId` query
    message_path: String,

    created_at: DateTime<Utc>,
    connected: AtomicBool,

    tx: mpsc::Sender<Option<Value>>,
    rx: StdMutex<Option<mpsc::Receiver<Option<Value>>>>,

    keepalive: Duration,
}

impl SessionTransport {
    pub fn new(
        project_id: Uuid,
        message_path: impl Into<String>,
        binding: SessionBinding,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Arc::new(Self {
            session_id: Uuid::new_v4(),
            project_id,
            binding,
            message_path: message_path.into(),
            created_at: Utc::now(),
            connected: AtomicBool::new(false),
            tx,
            rx: StdMutex::new(Some(rx)),
            keepalive: config.keepalive_interval,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    pub fn binding(&self) -> &SessionBinding {
        &self.binding
    }

    pub fn is_unified(&self) -> bool {
        matches!(self.binding, SessionBinding::Unified)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// The URL clients must POST messages to, delivered in the endpoint event
    pub fn endpoint_url(&self) -> String {
        format!("{}?sessionId={}", self.message_path, self.session_id)
    }

    /// Queue one JSON-RPC message for SSE delivery
    ///
    /// Blocks when the queue is full; that is the flow-control contract
    /// with the POST handler.
    pub async fn enqueue(&self, message: Value) -> McpResult<()> {
        self.tx
            .send(Some(message))
            .await
            .map_err(|_| McpError::transport("session queue closed"))
    }

    /// Ask the SSE loop to exit after draining queued messages
    pub async fn close(&self) {
        if let Err(e) = self.tx.send(None).await {
            debug!(session = %self.session_id, error = %e, "close signal after stream end");
        }
    }

    /// Produce the SSE byte stream for this session
    ///
    /// Single consumer: a second call is an error. The stream marks the
    /// session disconnected when it ends for any reason, including the
    /// client dropping the connection mid-await.
    pub fn sse_stream(self: &Arc<Self>) -> McpResult<impl Stream<Item = String> + Send + 'static> {
        let mut rx = self
            .rx
            .lock()
            .map_err(|_| McpError::internal("session receiver lock poisoned"))?
            .take()
            .ok_or_else(|| McpError::internal("session stream already started"))?;

        let transport = self.clone();
        Ok(async_stream::stream! {
            let guard = DisconnectGuard(transport.clone());
            transport.connected.store(true, Ordering::Release);

            yield format!("event: endpoint\ndata: {}\n\n", transport.endpoint_url());
            debug!(session = %transport.session_id, "endpoint event sent");

            let mut keepalive_count: u64 = 0;
            loop {
                match tokio::time::timeout(transport.keepalive, rx.recv()).await {
                    Ok(Some(Some(message))) => match serde_json::to_string(&message) {
                        Ok(json) => yield format!("data: {}\n\n", json),
                        Err(e) => {
                            warn!(session = %transport.session_id, error = %e, "unserializable message dropped");
                        }
                    },
                    Ok(Some(None)) => {
                        debug!(session = %transport.session_id, "close sentinel received");
                        break;
                    }
                    Ok(None) => {
                        debug!(session = %transport.session_id, "all producers gone");
                        break;
                    }
                    Err(_) => {
                        keepalive_count += 1;
                        yield format!(": keepalive-{}\n\n", keepalive_count);
                    }
                }
            }

            // Drain and discard whatever is still queued
            while rx.try_recv().is_ok() {}
            drop(guard);
        })
    }
}

/// Flips the connected flag when the stream is dropped, including on
/// client disconnect
struct DisconnectGuard(Arc<SessionTransport>);

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.0.connected.store(false, Ordering::Release);
        debug!(session = %self.0.session_id(), "session stream ended");
    }
}
