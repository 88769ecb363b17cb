/// Errors raised while decoding wire payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("missing `type` tag")]
    MissingType,

    #[error("unknown command type: {0}")]
    UnknownCommand(String),

    #[error("malformed `{kind}` payload: {reason}")]
    Malformed { kind: String, reason: String },
}
