//! Line-framed JSON-RPC codec with request/response correlation
//!
//! One UTF-8 JSON object per `\n`-terminated line in each direction. Writes
//! are serialized by a mutex so interleaved writers never produce torn
//! lines. Responses are routed to waiters by integer id; frames without an
//! id are notifications and are only logged. A malformed line is skipped,
//! never fatal. When the stream ends, every outstanding waiter fails with a
//! connection-lost error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

/// Upper bound for one inbound line; larger frames are dropped
const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Shared send/correlate state for one child connection
#[derive(Debug)]
pub struct LineCodec {
    writer: Mutex<Option<BufWriter<ChildStdin>>>,

    /// Waiters keyed by request id
    pending: Mutex<HashMap<i64, oneshot::Sender<JsonRpcResponse>>>,

    /// Monotonic id source; ids fit comfortably in 63 bits per session
    next_id: AtomicI64,

    /// Set once the stream is gone, with the reason
    closed: Mutex<Option<String>>,
}

impl LineCodec {
    pub fn new(stdin: ChildStdin) -> Self {
        Self {
            writer: Mutex::new(Some(BufWriter::new(stdin))),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            closed: Mutex::new(None),
        }
    }

    /// Serialize one frame and write it followed by `\n`
    pub async fn send(&self, frame: &JsonRpcRequest) -> McpResult<()> {
        let json = serde_json::to_string(frame)?;

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| McpError::connection_lost("stdin already closed"))?;

        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Send a request and await its correlated response
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> McpResult<JsonRpcResponse> {
        if let Some(reason) = self.closed.lock().await.clone() {
            return Err(McpError::connection_lost(reason));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = JsonRpcRequest::with_id(method, params, id);
        if let Err(e) = self.send(&frame).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                // Sender dropped: the recv loop failed this waiter
                let reason = self
                    .closed
                    .lock()
                    .await
                    .clone()
                    .unwrap_or_else(|| "response channel dropped".to_string());
                Err(McpError::connection_lost(reason))
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout { timeout })
            }
        }
    }

    /// Send a notification (no id, no response)
    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.send(&JsonRpcRequest::notification(method, params)).await
    }

    /// Route one inbound response to its waiter
    async fn resolve(&self, response: JsonRpcResponse) {
        let Some(id) = response.id_as_i64() else {
            debug!(method = ?response.result, "discarding response without integer id");
            return;
        };

        let waiter = self.pending.lock().await.remove(&id);
        match waiter {
            Some(tx) => {
                // A dropped receiver means the caller already timed out
                let _ = tx.send(response);
            }
            None => {
                debug!(id, "no waiter for response id");
            }
        }
    }

    /// Fail every outstanding waiter and refuse future requests
    pub async fn fail_all_pending(&self, reason: &str) {
        *self.closed.lock().await = Some(reason.to_string());
        let waiters: Vec<_> = self.pending.lock().await.drain().collect();
        if !waiters.is_empty() {
            warn!(count = waiters.len(), reason, "failing pending requests");
        }
        // Dropping the senders wakes each waiter with a recv error
    }

    /// Close the write half (signals EOF to the child)
    pub async fn shutdown_writer(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }

    /// Number of outstanding waiters (diagnostics and tests)
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_closed(&self) -> bool {
        self.closed.lock().await.is_some()
    }

    /// Read lines from the child's stdout until EOF
    ///
    /// Runs as its own task per child. Malformed lines are logged and
    /// skipped; id-less frames are notifications and are logged only.
    pub async fn run_recv_loop(self: std::sync::Arc<Self>, stdout: ChildStdout, label: String) {
        let mut lines = BufReader::new(stdout).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed.len() > MAX_LINE_BYTES {
                        warn!(server = %label, bytes = trimmed.len(), "dropping oversized frame");
                        continue;
                    }

                    match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                        Ok(response) if response.id.is_some() => {
                            self.resolve(response).await;
                        }
                        Ok(_) => {
                            // Notification from the child; the orchestrator
                            // does not forward these
                            debug!(server = %label, "ignoring child notification");
                        }
                        Err(e) => {
                            warn!(server = %label, error = %e, "skipping malformed frame");
                        }
                    }
                }
                Ok(None) => {
                    debug!(server = %label, "child closed stdout");
                    break;
                }
                Err(e) => {
                    warn!(server = %label, error = %e, "stdout read failed");
                    break;
                }
            }
        }

        self.fail_all_pending("connection lost: child closed stdout").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::sync::Arc;
    use tokio::process::Command;

    fn spawn_piped(cmd: &str, args: &[&str]) -> (tokio::process::Child, Arc<LineCodec>, ChildStdout) {
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let stdin = child.stdin.take().unwrap();
        let stdout = child.stdout.take().unwrap();
        (child, Arc::new(LineCodec::new(stdin)), stdout)
    }

    #[tokio::test]
    async fn request_correlates_by_id_through_cat() {
        // cat echoes our request line; it parses as a response carrying the
        // same id, which is all the correlator needs
        let (_child, codec, stdout) = spawn_piped("cat", &[]);
        tokio::spawn(codec.clone().run_recv_loop(stdout, "cat".into()));

        let response = codec
            .request("ping", None, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response.id_as_i64(), Some(1));
        assert_eq!(codec.pending_count().await, 0);

        let response = codec
            .request("ping", None, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response.id_as_i64(), Some(2));
    }

    #[tokio::test]
    async fn out_of_order_responses_reach_the_right_waiters() {
        // The child answers the second request before the first
        let script = r#"
read a
read b
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":"second"}'
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":"first"}'
"#;
        let (_child, codec, stdout) = spawn_piped("sh", &["-c", script]);
        tokio::spawn(codec.clone().run_recv_loop(stdout, "swap".into()));

        let (first, second) = tokio::join!(
            codec.request("one", None, Duration::from_secs(2)),
            codec.request("two", None, Duration::from_secs(2)),
        );
        assert_eq!(first.unwrap().result.unwrap(), "first");
        assert_eq!(second.unwrap().result.unwrap(), "second");
    }

    #[tokio::test]
    async fn malformed_lines_do_not_kill_the_loop() {
        let (_child, codec, stdout) = spawn_piped("sh", &["-c", "echo 'this is not json'; cat"]);
        tokio::spawn(codec.clone().run_recv_loop(stdout, "sh".into()));

        let response = codec
            .request("ping", None, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response.id_as_i64(), Some(1));
    }

    #[tokio::test]
    async fn timeout_removes_the_waiter() {
        // sleep keeps stdin open but never answers
        let (_child, codec, stdout) = spawn_piped("sleep", &["5"]);
        tokio::spawn(codec.clone().run_recv_loop(stdout, "sleep".into()));

        let err = codec
            .request("ping", None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Timeout { .. }));
        assert_eq!(codec.pending_count().await, 0);
    }

    #[tokio::test]
    async fn eof_fails_pending_and_future_requests() {
        let (_child, codec, stdout) = spawn_piped("sh", &["-c", "exit 0"]);
        let loop_handle = tokio::spawn(codec.clone().run_recv_loop(stdout, "exit".into()));
        loop_handle.await.unwrap();

        assert!(codec.is_closed().await);
        let err = codec
            .request("ping", None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ConnectionLost { .. }));
    }

    #[tokio::test]
    async fn writes_are_line_framed() {
        let (mut child, codec, stdout) = spawn_piped("cat", &[]);
        // Two concurrent sends must yield two intact lines
        let req_one = JsonRpcRequest::notification("one", None);
        let req_two = JsonRpcRequest::notification("two", None);
        let a = codec.send(&req_one);
        let b = codec.send(&req_two);
        let (ra, rb) = tokio::join!(a, b);
        ra.unwrap();
        rb.unwrap();
        codec.shutdown_writer().await;

        let mut lines = BufReader::new(stdout).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        let second = lines.next_line().await.unwrap().unwrap();
        for line in [first, second] {
            let parsed: JsonRpcRequest = serde_json::from_str(&line).unwrap();
            assert!(parsed.is_notification());
        }
        let _ = child.wait().await;
    }
}
