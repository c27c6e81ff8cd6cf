//! Session and handshake payloads for the message bus
//!
//! These are the JSON bodies inside [`crate::message::BusMessage`] frames.

use serde::{Deserialize, Serialize};

/// Observer role declared at handshake
///
/// Ordering clients see only tables they join; kitchen and admin receive
/// every order event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientRole {
    Ordering,
    Kitchen,
    Admin,
}

/// First frame a client sends after connecting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandshakePayload {
    /// Stable per-device identifier, persisted client-side
    pub client_id: String,
    pub role: ClientRole,
    /// Protocol version ([`crate::message::PROTOCOL_VERSION`])
    pub version: u8,
}

/// Server reply to a handshake
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandshakeAckPayload {
    /// Heartbeat cadence the server expects from session holders
    pub heartbeat_interval_secs: u64,
}

/// Body of `TRY_ACCESS_TABLE` and `HEARTBEAT` frames
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableAccessPayload {
    pub table_id: String,
    pub client_id: String,
}

/// Body of an `ACCESS_DENIED` reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessDeniedPayload {
    /// Human-readable denial reason, shown to the losing client
    pub reason: String,
}

/// Body of `JOIN_TABLE` / `LEAVE_TABLE` frames (scoped-channel membership)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableChannelPayload {
    pub table_id: String,
}

/// Body of an `ERROR` frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
}
