//! Relay between one inspected Python runtime and many browser sessions.
//!
//! The runtime connects in over TCP and speaks newline-delimited JSON; sessions
//! connect over WebSocket and exchange `{"event", "data"}` frames. Everything
//! the runtime says is fanned out to every session, and every session's
//! commands are written to the runtime.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod session;
pub mod upstream;
pub mod web;
pub mod websocket;

pub use broadcast::{Broadcaster, EventReceiver};
pub use config::RelayConfig;
pub use error::RelayError;
pub use metrics::{MetricsSnapshot, RelayMetrics};
pub use session::Session;
pub use upstream::UpstreamLink;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared relay context handed to every task.
#[derive(Clone)]
pub struct RelayState {
    pub broadcaster: Arc<Broadcaster>,
    pub link: Arc<UpstreamLink>,
    pub metrics: Arc<RelayMetrics>,
}

impl RelayState {
    pub fn new() -> Self {
        let metrics = Arc::new(RelayMetrics::new());
        let broadcaster = Arc::new(Broadcaster::new(metrics.clone()));
        let link = Arc::new(UpstreamLink::new(broadcaster.clone(), metrics.clone()));
        Self {
            broadcaster,
            link,
            metrics,
        }
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

/// A relay with both listeners bound but not yet serving.
pub struct Relay {
    state: RelayState,
    http: TcpListener,
    upstream: TcpListener,
    static_dir: Option<PathBuf>,
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, RelayError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::Bind { addr, source })
}

impl Relay {
    pub async fn bind(config: &RelayConfig) -> Result<Self, RelayError> {
        let http = bind(config.http_addr).await?;
        let upstream = bind(config.upstream_addr).await?;
        Ok(Self {
            state: RelayState::new(),
            http,
            upstream,
            static_dir: config.static_dir.clone(),
        })
    }

    pub fn http_addr(&self) -> std::io::Result<SocketAddr> {
        self.http.local_addr()
    }

    pub fn upstream_addr(&self) -> std::io::Result<SocketAddr> {
        self.upstream.local_addr()
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    /// Serve both listeners until `shutdown` is cancelled. The live upstream
    /// connection is closed on the way out.
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let Relay {
            state,
            http,
            upstream,
            static_dir,
        } = self;

        let upstream_task = tokio::spawn(upstream::serve(
            upstream,
            state.link.clone(),
            shutdown.clone(),
        ));

        let app = web::router(state, static_dir);
        let result = axum::serve(http, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await;

        // The HTTP server can also stop on its own; take the upstream side down with it.
        shutdown.cancel();
        if let Err(e) = upstream_task.await {
            warn!(error = %e, "upstream listener task failed");
        }
        info!("relay stopped");
        result
    }
}
