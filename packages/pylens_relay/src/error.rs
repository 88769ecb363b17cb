use std::net::SocketAddr;

use pylens_protocol::ProtocolError;

/// Errors surfaced by the relay library.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A command was submitted while no runtime is attached.
    #[error("not connected to the upstream runtime")]
    NotConnected,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
