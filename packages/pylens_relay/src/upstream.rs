//! Upstream link: the single authoritative connection to the inspected runtime.
//!
//! The link is passive. It accepts whatever connections arrive on the upstream
//! port and treats the most recent one as authoritative; an older connection is
//! cancelled when a newer one attaches. Each connection carries a generation so
//! that the late close of a superseded connection never detaches its successor.
//!
//! Commands are queued to a per-connection writer task, so a runtime that
//! stops reading never holds the link lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use pylens_protocol::{Command, ServerEvent, UpstreamMessage};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::error::RelayError;
use crate::frame;
use crate::metrics::RelayMetrics;
use crate::session::SEND_FAILED_MESSAGE;

/// Longest slice of a rejected line echoed into the log.
const LOGGED_LINE_LIMIT: usize = 200;

/// One queued command frame.
struct Outbound {
    line: String,
    /// Session told about a failed write.
    reply_to: Option<Uuid>,
}

struct ActiveUpstream {
    generation: u64,
    peer: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

/// Handle returned by [`UpstreamLink::attach`].
#[derive(Debug, Clone)]
pub struct Attachment {
    pub generation: u64,
    /// Cancelled when a newer connection takes over or the link shuts down.
    pub cancel: CancellationToken,
}

pub struct UpstreamLink {
    active: Mutex<Option<ActiveUpstream>>,
    generations: AtomicU64,
    /// Parent of every connection's token.
    shutdown: CancellationToken,
    broadcaster: Arc<Broadcaster>,
    metrics: Arc<RelayMetrics>,
}

impl UpstreamLink {
    pub fn new(broadcaster: Arc<Broadcaster>, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            active: Mutex::new(None),
            generations: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            broadcaster,
            metrics,
        }
    }

    /// Make `writer` the authoritative upstream, superseding any current one.
    ///
    /// The writer moves into its own task; nothing here waits on IO.
    pub async fn attach<W>(&self, writer: W, peer: impl Into<String>) -> Attachment
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = self.shutdown.child_token();
        let peer = peer.into();

        let (outbound, queue) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(
            writer,
            queue,
            cancel.clone(),
            generation,
            self.broadcaster.clone(),
            self.metrics.clone(),
        ));

        // Lock order: link, then broadcaster.
        let mut active = self.active.lock().await;
        let previous = active.replace(ActiveUpstream {
            generation,
            peer: peer.clone(),
            outbound,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            info!(
                generation = previous.generation,
                peer = %previous.peer,
                "upstream connection superseded by {}",
                peer
            );
            previous.cancel.cancel();
        }
        self.metrics.upstream_connected();
        self.broadcaster.set_upstream_connected(true).await;

        Attachment { generation, cancel }
    }

    /// Drop the connection of `generation` if it is still the current one.
    pub async fn detach(&self, generation: u64) -> bool {
        let mut active = self.active.lock().await;
        match active.as_ref() {
            Some(current) if current.generation == generation => {}
            _ => {
                debug!(generation, "ignoring close of a superseded upstream connection");
                return false;
            }
        }
        if let Some(current) = active.take() {
            current.cancel.cancel();
        }
        self.broadcaster.set_upstream_connected(false).await;
        true
    }

    /// Close every current and future connection.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn is_connected(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Classify one upstream line and route it to the sessions.
    ///
    /// Malformed lines are logged and dropped; they never reach a session.
    pub async fn handle_line(&self, line: &str) {
        self.metrics.frame_received();
        let message = match UpstreamMessage::parse(line) {
            Ok(message) => message,
            Err(e) => {
                self.metrics.frame_dropped();
                warn!(
                    error = %e,
                    line = %truncate(line, LOGGED_LINE_LIMIT),
                    "dropping malformed upstream frame"
                );
                return;
            }
        };

        debug!(kind = message.kind(), "upstream message");
        match message {
            UpstreamMessage::Output { data } => {
                self.broadcaster.broadcast(ServerEvent::Output(data)).await;
            }
            UpstreamMessage::Status { connected, message } => {
                self.broadcaster.set_upstream_connected(connected).await;
                if let Some(message) = message {
                    self.broadcaster
                        .broadcast(ServerEvent::Output(message))
                        .await;
                }
            }
            UpstreamMessage::Success { message } => {
                self.broadcaster
                    .broadcast(ServerEvent::success(message))
                    .await;
            }
            UpstreamMessage::Error { error } => {
                self.broadcaster.broadcast(ServerEvent::Error(error)).await;
            }
            UpstreamMessage::InspectResult(result) => {
                self.broadcaster
                    .broadcast(ServerEvent::InspectResult(result))
                    .await;
            }
            UpstreamMessage::Unknown { kind } => {
                self.metrics.unknown_message();
                info!(kind = %kind, "ignoring upstream message of unknown type");
            }
        }
    }

    /// Queue one command for the current upstream connection.
    ///
    /// Returns once the frame is queued. A later write failure is reported
    /// to `reply_to` and leaves the connection attached; only a close or read
    /// error detaches it.
    pub async fn send(
        &self,
        command: &Command,
        reply_to: Option<Uuid>,
    ) -> Result<(), RelayError> {
        let line = command.to_line()?;
        let active = self.active.lock().await;
        let Some(current) = active.as_ref() else {
            return Err(RelayError::NotConnected);
        };
        current
            .outbound
            .send(Outbound { line, reply_to })
            .map_err(|_| RelayError::NotConnected)?;
        debug!(
            generation = current.generation,
            kind = command.kind(),
            "command queued for upstream"
        );
        Ok(())
    }

    /// Drive one upstream connection until it closes, errors, or is superseded.
    pub async fn run_connection<R, W>(self: Arc<Self>, reader: R, writer: W, peer: String)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let Attachment { generation, cancel } = self.attach(writer, peer.clone()).await;
        info!(%peer, generation, "upstream runtime connected");

        let mut lines = frame::lines(reader);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(%peer, generation, "upstream connection cancelled");
                    break;
                }
                next = lines.next() => match next {
                    Some(Ok(line)) => self.handle_line(&line).await,
                    Some(Err(e)) => {
                        warn!(%peer, generation, error = %e, "upstream read error");
                        break;
                    }
                    None => {
                        info!(%peer, generation, "upstream connection closed");
                        break;
                    }
                },
            }
        }

        self.detach(generation).await;
    }
}

/// Write queued frames until the queue closes or `cancel` fires.
///
/// Dropping the writer on exit closes the write side of the socket.
async fn write_loop<W>(
    mut writer: W,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
    generation: u64,
    broadcaster: Arc<Broadcaster>,
    metrics: Arc<RelayMetrics>,
) where
    W: AsyncWrite + Send + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = queue.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let written = tokio::select! {
            _ = cancel.cancelled() => break,
            result = write_frame(&mut writer, &frame.line) => result,
        };
        if let Err(e) = written {
            warn!(generation, error = %e, "upstream write failed");
            metrics.command_rejected();
            if let Some(session) = frame.reply_to {
                broadcaster
                    .send_to(session, ServerEvent::Error(SEND_FAILED_MESSAGE.to_string()))
                    .await;
            }
        }
    }
    debug!(generation, "upstream writer stopped");
}

async fn write_frame<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

/// Accept upstream connections until `shutdown` fires, then close the live one.
pub async fn serve(listener: TcpListener, link: Arc<UpstreamLink>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("upstream listener shutting down");
                link.shutdown();
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let (reader, writer) = stream.into_split();
                    let link = link.clone();
                    tokio::spawn(link.run_connection(reader, writer, addr.to_string()));
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept upstream connection");
                }
            },
        }
    }
}

fn truncate(line: &str, limit: usize) -> &str {
    if line.len() <= limit {
        return line;
    }
    let mut end = limit;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
