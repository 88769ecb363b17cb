//! Session protocol: events exchanged between the relay and each browser or
//! console session, framed as `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::upstream::Command;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessPayload {
    pub message: String,
}

/// Events pushed from the relay to sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Whether the upstream runtime is reachable; sessions enable input on `true`.
    #[serde(rename = "pythonStatus")]
    PythonStatus(bool),
    #[serde(rename = "output")]
    Output(String),
    #[serde(rename = "error")]
    Error(String),
    #[serde(rename = "success")]
    Success(SuccessPayload),
    /// The upstream `inspect_result` message, unchanged.
    #[serde(rename = "inspect_result")]
    InspectResult(Value),
}

impl ServerEvent {
    pub fn success(message: impl Into<String>) -> Self {
        Self::Success(SuccessPayload {
            message: message.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PythonStatus(_) => "pythonStatus",
            Self::Output(_) => "output",
            Self::Error(_) => "error",
            Self::Success(_) => "success",
            Self::InspectResult(_) => "inspect_result",
        }
    }
}

/// Events sent from a session to the relay.
///
/// The `execute` payload stays raw until the relay validates it, so that an
/// unknown command type can be reported back instead of failing the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "execute")]
    Execute(Value),
}

impl ClientEvent {
    pub fn execute(command: &Command) -> Result<Self, serde_json::Error> {
        Ok(Self::Execute(serde_json::to_value(command)?))
    }
}
