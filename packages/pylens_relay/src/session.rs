//! Per-connection session gateway.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pylens_protocol::{Command, ServerEvent};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::RelayState;
use crate::broadcast::{Broadcaster, EventReceiver};
use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use crate::upstream::UpstreamLink;

pub const NOT_CONNECTED_MESSAGE: &str = "Not connected to Python application";
pub const SEND_FAILED_MESSAGE: &str = "Failed to send command to Python";

/// One browser or console connection.
pub struct Session {
    id: Uuid,
    broadcaster: Arc<Broadcaster>,
    link: Arc<UpstreamLink>,
    metrics: Arc<RelayMetrics>,
    closed: AtomicBool,
}

impl Session {
    /// Register a new session. The receiver yields the current upstream
    /// status first, then every broadcast and session-targeted event.
    pub async fn open(state: &RelayState) -> (Self, EventReceiver) {
        let (id, rx) = state.broadcaster.register().await;
        let session = Self {
            id,
            broadcaster: state.broadcaster.clone(),
            link: state.link.clone(),
            metrics: state.metrics.clone(),
            closed: AtomicBool::new(false),
        };
        (session, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Handle an `execute` payload. Failures are reported to this session only,
    /// including a write that fails after the command was queued.
    pub async fn submit(&self, raw: Value) {
        let command = match Command::from_value(raw) {
            Ok(command) => command,
            Err(e) => {
                debug!(session_id = %self.id, error = %e, "rejected command");
                self.reject(format!("Invalid command: {e}")).await;
                return;
            }
        };

        match self.link.send(&command, Some(self.id)).await {
            Ok(()) => {
                self.metrics.command_forwarded();
                debug!(session_id = %self.id, kind = command.kind(), "command queued upstream");
            }
            Err(RelayError::NotConnected) => {
                debug!(session_id = %self.id, kind = command.kind(), "no upstream for command");
                self.reject(NOT_CONNECTED_MESSAGE.to_string()).await;
            }
            Err(e) => {
                warn!(session_id = %self.id, kind = command.kind(), error = %e, "upstream send failed");
                self.reject(SEND_FAILED_MESSAGE.to_string()).await;
            }
        }
    }

    async fn reject(&self, message: String) {
        self.metrics.command_rejected();
        self.broadcaster
            .send_to(self.id, ServerEvent::Error(message))
            .await;
    }

    /// Deregister from the broadcaster. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.broadcaster.deregister(self.id).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use serde_json::json;
    use tokio::io::AsyncReadExt;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn drain(rx: &mut EventReceiver) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push((*event).clone());
        }
        out
    }

    #[tokio::test]
    async fn test_submit_while_disconnected() {
        let state = RelayState::new();
        let (session, mut rx) = Session::open(&state).await;
        let (_, mut other) = Session::open(&state).await;
        drain(&mut rx);
        drain(&mut other);

        session
            .submit(json!({"type": "inspect", "expression": "x"}))
            .await;

        assert_eq!(
            drain(&mut rx),
            vec![ServerEvent::Error(NOT_CONNECTED_MESSAGE.to_string())]
        );
        assert!(drain(&mut other).is_empty());
        let snapshot = state.metrics.snapshot();
        assert_eq!(snapshot.commands_forwarded, 0);
        assert_eq!(snapshot.commands_rejected, 1);
    }

    #[tokio::test]
    async fn test_submit_forwards_to_upstream() {
        let state = RelayState::new();
        let (writer, mut peer) = tokio::io::duplex(256);
        state.link.attach(writer, "duplex").await;

        let (session, mut rx) = Session::open(&state).await;
        drain(&mut rx);
        session
            .submit(json!({"type": "repl", "code": "print(1)"}))
            .await;

        let mut buf = vec![0u8; 256];
        let n = timeout(WAIT, peer.read(&mut buf)).await.unwrap().unwrap();
        assert_eq!(&buf[..n], b"{\"type\":\"repl\",\"code\":\"print(1)\"}\n");
        assert!(drain(&mut rx).is_empty());
        assert_eq!(state.metrics.snapshot().commands_forwarded, 1);
    }

    #[tokio::test]
    async fn test_submit_unknown_type() {
        let state = RelayState::new();
        let (session, mut rx) = Session::open(&state).await;
        drain(&mut rx);

        session.submit(json!({"type": "shutdown"})).await;
        session.submit(json!("not an object")).await;
        session.submit(json!({"type": "repl"})).await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            ServerEvent::Error("Invalid command: unknown command type: shutdown".to_string())
        );
        assert!(events.iter().all(|e| matches!(e, ServerEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_write_failure_reported_to_sender() {
        let state = RelayState::new();
        let writer = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        state.link.attach(writer, "mock").await;

        let (session, mut rx) = Session::open(&state).await;
        assert_eq!(drain(&mut rx), vec![ServerEvent::PythonStatus(true)]);

        let (_, mut other) = Session::open(&state).await;
        drain(&mut other);

        session.submit(json!({"type": "repl", "code": "1"})).await;
        let event = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(*event, ServerEvent::Error(SEND_FAILED_MESSAGE.to_string()));
        assert!(drain(&mut other).is_empty());
        assert!(state.link.is_connected().await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let state = RelayState::new();
        let (session, _rx) = Session::open(&state).await;
        assert_eq!(state.broadcaster.session_count().await, 1);

        session.close().await;
        session.close().await;
        assert_eq!(state.broadcaster.session_count().await, 0);
        assert_eq!(state.metrics.snapshot().active_sessions, 0);
    }
}
