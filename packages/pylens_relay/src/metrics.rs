//! Relay metrics for observability
//!
//! Counters are updated on the hot paths and summarized at shutdown.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Upstream
    /// Upstream connections accepted since start
    pub upstream_connections: AtomicU64,
    /// Lines read from the upstream runtime
    pub frames_received: AtomicU64,
    /// Lines dropped because they were not valid messages
    pub frames_dropped: AtomicU64,
    /// Messages with a `type` the relay does not route
    pub unknown_messages: AtomicU64,

    // Sessions
    pub sessions_opened: AtomicU64,
    pub active_sessions: AtomicU64,
    /// Commands written upstream
    pub commands_forwarded: AtomicU64,
    /// Commands refused (invalid, no upstream, or write failure)
    pub commands_rejected: AtomicU64,
    /// Events fanned out to all sessions
    pub events_broadcast: AtomicU64,

    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn upstream_connected(&self) {
        self.upstream_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_message(&self) {
        self.unknown_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_forwarded(&self) {
        self.commands_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_rejected(&self) {
        self.commands_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_broadcast(&self) {
        self.events_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            upstream_connections: self.upstream_connections.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            unknown_messages: self.unknown_messages.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            commands_forwarded: self.commands_forwarded.load(Ordering::Relaxed),
            commands_rejected: self.commands_rejected.load(Ordering::Relaxed),
            events_broadcast: self.events_broadcast.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters (for serialization/logging)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub upstream_connections: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub unknown_messages: u64,
    pub sessions_opened: u64,
    pub active_sessions: u64,
    pub commands_forwarded: u64,
    pub commands_rejected: u64,
    pub events_broadcast: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_tracking() {
        let metrics = RelayMetrics::new();
        metrics.session_opened();
        metrics.session_opened();
        metrics.session_closed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sessions_opened, 2);
        assert_eq!(snapshot.active_sessions, 1);
    }

    #[test]
    fn test_frame_counters() {
        let metrics = RelayMetrics::new();
        metrics.frame_received();
        metrics.frame_received();
        metrics.frame_dropped();
        metrics.unknown_message();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.frames_dropped, 1);
        assert_eq!(snapshot.unknown_messages, 1);
    }
}
