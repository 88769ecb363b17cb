//! WebSocket session with the relay.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use pylens_protocol::{ClientEvent, Command, ServerEvent};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::ClientError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half: commands go out as `execute` events.
pub struct CommandSink {
    inner: SplitSink<Socket, Message>,
}

/// Read half: decoded relay events.
pub struct EventStream {
    inner: SplitStream<Socket>,
}

pub async fn connect(url: &str) -> Result<(CommandSink, EventStream), ClientError> {
    let (socket, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| ClientError::from_connect(url, e))?;
    let (sink, stream) = socket.split();
    Ok((CommandSink { inner: sink }, EventStream { inner: stream }))
}

impl CommandSink {
    pub async fn send(&mut self, command: &Command) -> Result<(), ClientError> {
        let json = serde_json::to_string(&ClientEvent::execute(command)?)?;
        self.inner.send(Message::Text(json.into())).await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.inner.close().await?;
        Ok(())
    }
}

impl EventStream {
    /// Next relay event; `None` once the relay closes the socket.
    ///
    /// Frames that are not relay events are skipped.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>, ClientError> {
        while let Some(msg) = self.inner.next().await {
            match msg? {
                Message::Text(text) => match serde_json::from_str(text.as_str()) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => debug!(error = %e, "skipping unrecognized frame"),
                },
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }
}
