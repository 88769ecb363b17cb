//! Wire types for pylens.
//!
//! Two protocols meet in the relay:
//! - the upstream protocol: newline-delimited JSON objects exchanged with the
//!   inspected runtime (`UpstreamMessage` in, `Command` out)
//! - the session protocol: `{"event": ..., "data": ...}` frames exchanged with
//!   browser/console sessions over WebSocket (`ServerEvent` out, `ClientEvent` in)
//!
//! `InspectionNode` describes the payload of an `inspect_result` message.

mod error;
mod events;
mod inspection;
mod upstream;

pub use error::ProtocolError;
pub use events::{ClientEvent, ServerEvent, SuccessPayload};
pub use inspection::{
    AttributeEntry, AttributeInfo, Category, ErrorInfo, InspectionNode, MethodEntry, MethodInfo,
    ObjectInfo, SIGNATURE_UNAVAILABLE, UNDOCUMENTED,
};
pub use upstream::{Command, UpstreamMessage};
