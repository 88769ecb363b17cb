use tokio_tungstenite::tungstenite;

/// Errors from the relay connection.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Nothing is listening at the relay address.
    #[error("relay unavailable at {0}")]
    Unavailable(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid event frame: {0}")]
    InvalidEvent(#[from] serde_json::Error),
}

impl ClientError {
    /// Classify a connect failure: refused/reset connections mean no relay.
    pub fn from_connect(url: &str, err: tungstenite::Error) -> Self {
        let unavailable = match &err {
            tungstenite::Error::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        };
        if unavailable {
            Self::Unavailable(url.to_string())
        } else {
            Self::WebSocket(err)
        }
    }
}
