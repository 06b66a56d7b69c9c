//! Orchestrator metrics
//!
//! Cheap atomic counters recorded on the hot paths and snapshotted for the
//! detailed health endpoint. No exporter; the snapshot is plain JSON.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared across sessions and handlers
#[derive(Debug, Default)]
pub struct McpMetrics {
    /// SSE sessions opened since start
    pub sessions_opened: AtomicU64,

    /// SSE sessions ended since start
    pub sessions_closed: AtomicU64,

    /// Message POSTs accepted for SSE delivery
    pub messages_accepted: AtomicU64,

    /// Message POSTs rejected at validation
    pub messages_rejected: AtomicU64,

    /// tools/call invocations routed to children
    pub tool_calls: AtomicU64,

    /// tools/call invocations that failed
    pub tool_call_failures: AtomicU64,

    /// Cumulative child execution time for tools/call (milliseconds)
    pub tool_call_duration_ms: AtomicU64,
}

impl McpMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_accepted(&self) {
        self.messages_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one routed tool call with its outcome and duration
    pub fn record_tool_call(&self, success: bool, elapsed_ms: u64) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.tool_call_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.tool_call_duration_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    /// Point-in-time copy for serialization
    pub fn snapshot(&self) -> MetricsSnapshot {
        let tool_calls = self.tool_calls.load(Ordering::Relaxed);
        let total_ms = self.tool_call_duration_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            messages_accepted: self.messages_accepted.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            tool_calls,
            tool_call_failures: self.tool_call_failures.load(Ordering::Relaxed),
            avg_tool_call_ms: if tool_calls > 0 { total_ms / tool_calls } else { 0 },
        }
    }
}

/// Serializable view of [`McpMetrics`]
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub messages_accepted: u64,
    pub messages_rejected: u64,
    pub tool_calls: u64,
    pub tool_call_failures: u64,
    pub avg_tool_call_ms: u64,
}
