use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use pylens_protocol::ClientEvent;
use tracing::{debug, info, warn};

use crate::RelayState;
use crate::session::Session;

/// Bridge one WebSocket to one session until either side goes away.
pub async fn handle_websocket(socket: WebSocket, state: RelayState) {
    let (mut sender, mut receiver) = socket.split();
    let (session, mut events) = Session::open(&state).await;
    let session_id = session.id();
    info!(%session_id, "session connected");

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                let json = match serde_json::to_string(event.as_ref()) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(%session_id, error = %e, "failed to encode event");
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    debug!(%session_id, "socket send failed");
                    break;
                }
            }
            incoming = receiver.next() => {
                let msg = match incoming {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        debug!(%session_id, error = %e, "socket receive error");
                        break;
                    }
                    None => break,
                };
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(ClientEvent::Execute(raw)) => session.submit(raw).await,
                        Err(e) => {
                            debug!(%session_id, error = %e, "ignoring unparseable frame");
                        }
                    },
                    Message::Binary(_) => {
                        debug!(%session_id, "binary frames not supported");
                    }
                    Message::Close(_) => {
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    session.close().await;
    info!(%session_id, "session disconnected");
}
