//! Event fan-out to connected sessions.
//!
//! The broadcaster also owns the process-wide upstream connection state so
//! that a newly registered session is greeted with a status that cannot race
//! with a concurrent change.

use std::collections::HashMap;
use std::sync::Arc;

use pylens_protocol::ServerEvent;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::metrics::RelayMetrics;

pub type SessionEvent = Arc<ServerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

#[derive(Default)]
struct Registry {
    upstream_connected: bool,
    sessions: HashMap<Uuid, mpsc::UnboundedSender<SessionEvent>>,
}

impl Registry {
    /// Push to every session; closed sessions are skipped.
    fn fan_out(&self, event: SessionEvent) -> usize {
        let mut delivered = 0;
        for (id, tx) in &self.sessions {
            if tx.send(Arc::clone(&event)).is_ok() {
                delivered += 1;
            } else {
                debug!(session_id = %id, event = event.name(), "session gone, skipping");
            }
        }
        delivered
    }
}

pub struct Broadcaster {
    registry: RwLock<Registry>,
    metrics: Arc<RelayMetrics>,
}

impl Broadcaster {
    pub fn new(metrics: Arc<RelayMetrics>) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            metrics,
        }
    }

    /// Register a session. Its first event is the current upstream status.
    pub async fn register(&self) -> (Uuid, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let mut registry = self.registry.write().await;
        let _ = tx.send(Arc::new(ServerEvent::PythonStatus(
            registry.upstream_connected,
        )));
        registry.sessions.insert(id, tx);
        self.metrics.session_opened();
        debug!(session_id = %id, sessions = registry.sessions.len(), "session registered");
        (id, rx)
    }

    /// Remove a session. Returns false if it was not registered.
    pub async fn deregister(&self, id: Uuid) -> bool {
        let mut registry = self.registry.write().await;
        let removed = registry.sessions.remove(&id).is_some();
        if removed {
            self.metrics.session_closed();
            debug!(session_id = %id, sessions = registry.sessions.len(), "session deregistered");
        }
        removed
    }

    /// Deliver an event to every registered session; returns how many accepted it.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        let registry = self.registry.read().await;
        self.metrics.event_broadcast();
        registry.fan_out(Arc::new(event))
    }

    /// Deliver an event to one session only.
    pub async fn send_to(&self, id: Uuid, event: ServerEvent) -> bool {
        let registry = self.registry.read().await;
        match registry.sessions.get(&id) {
            Some(tx) => tx.send(Arc::new(event)).is_ok(),
            None => false,
        }
    }

    /// Record the upstream state, notifying every session only on change.
    ///
    /// Called by the upstream link alone.
    pub async fn set_upstream_connected(&self, connected: bool) -> bool {
        let mut registry = self.registry.write().await;
        if registry.upstream_connected == connected {
            return false;
        }
        registry.upstream_connected = connected;
        let delivered = registry.fan_out(Arc::new(ServerEvent::PythonStatus(connected)));
        info!(connected, sessions = delivered, "upstream status changed");
        true
    }

    pub async fn upstream_connected(&self) -> bool {
        self.registry.read().await.upstream_connected
    }

    pub async fn session_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcaster() -> Broadcaster {
        Broadcaster::new(Arc::new(RelayMetrics::new()))
    }

    fn drain(rx: &mut EventReceiver) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push((*event).clone());
        }
        out
    }

    #[tokio::test]
    async fn test_join_greets_with_current_status() {
        let b = broadcaster();
        let (_, mut early) = b.register().await;
        assert_eq!(drain(&mut early), vec![ServerEvent::PythonStatus(false)]);

        b.set_upstream_connected(true).await;
        let (_, mut late) = b.register().await;
        assert_eq!(drain(&mut late), vec![ServerEvent::PythonStatus(true)]);
    }

    #[tokio::test]
    async fn test_status_change_is_edge_triggered() {
        let b = broadcaster();
        let (_, mut rx) = b.register().await;
        drain(&mut rx);

        assert!(b.set_upstream_connected(true).await);
        assert!(!b.set_upstream_connected(true).await);
        assert!(b.set_upstream_connected(false).await);

        assert_eq!(
            drain(&mut rx),
            vec![
                ServerEvent::PythonStatus(true),
                ServerEvent::PythonStatus(false)
            ]
        );
    }

    #[tokio::test]
    async fn test_broadcast_skips_closed_sessions() {
        let b = broadcaster();
        let (_, mut alive) = b.register().await;
        let (_, gone) = b.register().await;
        drop(gone);
        drain(&mut alive);

        let delivered = b.broadcast(ServerEvent::Output("hi".to_string())).await;
        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut alive), vec![ServerEvent::Output("hi".to_string())]);
    }

    #[tokio::test]
    async fn test_send_to_targets_one_session() {
        let b = broadcaster();
        let (a, mut rx_a) = b.register().await;
        let (_, mut rx_b) = b.register().await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        assert!(b.send_to(a, ServerEvent::Error("nope".to_string())).await);
        assert_eq!(drain(&mut rx_a), vec![ServerEvent::Error("nope".to_string())]);
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn test_deregister_is_idempotent() {
        let b = broadcaster();
        let (id, _rx) = b.register().await;
        assert_eq!(b.session_count().await, 1);
        assert!(b.deregister(id).await);
        assert!(!b.deregister(id).await);
        assert_eq!(b.session_count().await, 0);
        assert!(!b.send_to(id, ServerEvent::Output("late".to_string())).await);
    }

    #[tokio::test]
    async fn test_concurrent_register_and_broadcast() {
        let b = Arc::new(broadcaster());
        let mut handles = Vec::new();
        for i in 0..16 {
            let b = b.clone();
            handles.push(tokio::spawn(async move {
                let (id, rx) = b.register().await;
                b.broadcast(ServerEvent::Output(format!("line {i}"))).await;
                b.deregister(id).await;
                drop(rx);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(b.session_count().await, 0);
    }
}
