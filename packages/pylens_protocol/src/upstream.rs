//! Upstream protocol: one JSON object per line between the relay and the
//! inspected runtime.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// A message received from the upstream runtime, classified by its `type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamMessage {
    /// Captured stdout/stderr text.
    Output { data: String },
    /// Runtime readiness. `connected` is true iff `status == "connected"`.
    Status {
        connected: bool,
        message: Option<String>,
    },
    Success { message: String },
    Error { error: String },
    /// Full message object, forwarded to sessions unchanged.
    InspectResult(Value),
    /// Any tag the relay does not route.
    Unknown { kind: String },
}

#[derive(Deserialize)]
struct OutputPayload {
    data: String,
}

#[derive(Deserialize)]
struct StatusPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct SuccessPayload {
    message: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    error: String,
}

fn payload<T: DeserializeOwned>(kind: &str, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

fn type_tag(value: &Value) -> Result<String, ProtocolError> {
    let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;
    obj.get("type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ProtocolError::MissingType)
}

impl UpstreamMessage {
    /// Parse one line of the upstream stream.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let kind = type_tag(&value)?;
        match kind.as_str() {
            "output" => {
                let p: OutputPayload = payload(&kind, value)?;
                Ok(Self::Output { data: p.data })
            }
            "status" => {
                let p: StatusPayload = payload(&kind, value)?;
                Ok(Self::Status {
                    connected: p.status.as_deref() == Some("connected"),
                    message: p.message,
                })
            }
            "success" => {
                let p: SuccessPayload = payload(&kind, value)?;
                Ok(Self::Success { message: p.message })
            }
            "error" => {
                let p: ErrorPayload = payload(&kind, value)?;
                Ok(Self::Error { error: p.error })
            }
            "inspect_result" => Ok(Self::InspectResult(value)),
            _ => Ok(Self::Unknown { kind }),
        }
    }

    /// The `type` tag this message was classified under.
    pub fn kind(&self) -> &str {
        match self {
            Self::Output { .. } => "output",
            Self::Status { .. } => "status",
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
            Self::InspectResult(_) => "inspect_result",
            Self::Unknown { kind } => kind,
        }
    }
}

/// A command sent from a session to the upstream runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Execute a block of code.
    Repl { code: String },
    /// Introspect the object named by an inspection path.
    Inspect { expression: String },
}

impl Command {
    pub fn repl(code: impl Into<String>) -> Self {
        Self::Repl { code: code.into() }
    }

    pub fn inspect(expression: impl Into<String>) -> Self {
        Self::Inspect {
            expression: expression.into(),
        }
    }

    /// Decode a command received from an untrusted session.
    ///
    /// Distinguishes an unrecognized `type` from a recognized one with a bad
    /// payload so the session can be told which it was.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let kind = type_tag(&value)?;
        match kind.as_str() {
            "repl" | "inspect" => payload(&kind, value),
            _ => Err(ProtocolError::UnknownCommand(kind)),
        }
    }

    /// Serialize as one newline-terminated upstream frame.
    pub fn to_line(&self) -> Result<String, ProtocolError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Repl { .. } => "repl",
            Self::Inspect { .. } => "inspect",
        }
    }
}
