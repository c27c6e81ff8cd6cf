//! Message bus envelope
//!
//! Wire frame layout: 1 byte event type + 4-byte little-endian payload
//! length + JSON payload (the serialized [`BusMessage`]). The event type is
//! carried both as the frame tag and inside the envelope; the frame tag is
//! what the receive path dispatches on, the envelope copy is for logging and
//! correlation.

use crate::order::OrderEvent;
use crate::session::{
    AccessDeniedPayload, ClientRole, ErrorPayload, HandshakeAckPayload, HandshakePayload,
    TableAccessPayload, TableChannelPayload,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

/// Bus protocol version, checked at handshake
pub const PROTOCOL_VERSION: u8 = 1;

/// Upper bound on a single frame payload; larger frames are a protocol error
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Wire event types
///
/// `u8` values are the on-wire frame tags; do not renumber.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // ========== Connection ==========
    Handshake = 1,
    HandshakeAck = 2,

    // ========== Table sessions ==========
    TryAccessTable = 3,
    AccessGranted = 4,
    AccessDenied = 5,
    Heartbeat = 6,

    // ========== Scoped channels ==========
    JoinTable = 7,
    LeaveTable = 8,

    // ========== Order events ==========
    NewOrder = 9,
    OrderUpdated = 10,

    // ========== Recovery / faults ==========
    ResyncRequired = 11,
    Error = 12,
}

impl EventType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for EventType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            1 => Ok(EventType::Handshake),
            2 => Ok(EventType::HandshakeAck),
            3 => Ok(EventType::TryAccessTable),
            4 => Ok(EventType::AccessGranted),
            5 => Ok(EventType::AccessDenied),
            6 => Ok(EventType::Heartbeat),
            7 => Ok(EventType::JoinTable),
            8 => Ok(EventType::LeaveTable),
            9 => Ok(EventType::NewOrder),
            10 => Ok(EventType::OrderUpdated),
            11 => Ok(EventType::ResyncRequired),
            12 => Ok(EventType::Error),
            other => Err(other),
        }
    }
}

/// Serialize a payload struct; these bodies contain only strings, numbers
/// and enums, so failure degrades to a null payload instead of panicking
fn to_payload<T: Serialize>(payload: &T) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

/// Envelope carried by every bus frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusMessage {
    /// Unique per message; responses echo it back via `correlation_id`
    pub request_id: Uuid,
    pub event_type: EventType,
    /// Set on responses: the `request_id` being answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// JSON body, shaped per event type (see [`crate::session`])
    #[serde(default)]
    pub payload: Value,
}

impl BusMessage {
    fn new(event_type: EventType, payload: Value) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            event_type,
            correlation_id: None,
            payload,
        }
    }

    fn reply(event_type: EventType, correlation_id: Uuid, payload: Value) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            event_type,
            correlation_id: Some(correlation_id),
            payload,
        }
    }

    // ========== Connection ==========

    pub fn handshake(client_id: impl Into<String>, role: ClientRole) -> Self {
        let payload = HandshakePayload {
            client_id: client_id.into(),
            role,
            version: PROTOCOL_VERSION,
        };
        Self::new(EventType::Handshake, to_payload(&payload))
    }

    pub fn handshake_ack(correlation_id: Uuid, heartbeat_interval_secs: u64) -> Self {
        let payload = HandshakeAckPayload {
            heartbeat_interval_secs,
        };
        Self::reply(EventType::HandshakeAck, correlation_id, to_payload(&payload))
    }

    // ========== Table sessions ==========

    pub fn try_access_table(table_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        let payload = TableAccessPayload {
            table_id: table_id.into(),
            client_id: client_id.into(),
        };
        Self::new(EventType::TryAccessTable, to_payload(&payload))
    }

    pub fn access_granted(correlation_id: Uuid) -> Self {
        Self::reply(EventType::AccessGranted, correlation_id, Value::Null)
    }

    pub fn access_denied(correlation_id: Uuid, reason: impl Into<String>) -> Self {
        let payload = AccessDeniedPayload {
            reason: reason.into(),
        };
        Self::reply(EventType::AccessDenied, correlation_id, to_payload(&payload))
    }

    pub fn heartbeat(table_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        let payload = TableAccessPayload {
            table_id: table_id.into(),
            client_id: client_id.into(),
        };
        Self::new(EventType::Heartbeat, to_payload(&payload))
    }

    // ========== Scoped channels ==========

    pub fn join_table(table_id: impl Into<String>) -> Self {
        let payload = TableChannelPayload {
            table_id: table_id.into(),
        };
        Self::new(EventType::JoinTable, to_payload(&payload))
    }

    pub fn leave_table(table_id: impl Into<String>) -> Self {
        let payload = TableChannelPayload {
            table_id: table_id.into(),
        };
        Self::new(EventType::LeaveTable, to_payload(&payload))
    }

    // ========== Order events ==========

    /// Wrap an order event; the frame tag mirrors the event kind
    pub fn order_event(event: &OrderEvent) -> Result<Self, serde_json::Error> {
        let event_type = match event.kind {
            crate::order::OrderEventKind::NewOrder => EventType::NewOrder,
            crate::order::OrderEventKind::OrderUpdated => EventType::OrderUpdated,
        };
        Ok(Self::new(event_type, serde_json::to_value(event)?))
    }

    // ========== Recovery / faults ==========

    /// Tells a client its event stream lagged and it must refetch
    pub fn resync_required() -> Self {
        Self::new(EventType::ResyncRequired, Value::Null)
    }

    pub fn error(correlation_id: Option<Uuid>, message: impl Into<String>) -> Self {
        let payload = ErrorPayload {
            message: message.into(),
        };
        Self {
            request_id: Uuid::new_v4(),
            event_type: EventType::Error,
            correlation_id,
            payload: to_payload(&payload),
        }
    }

    /// Decode the payload into its typed form
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
