//! Per-connection protocol handling
//!
//! Each connection runs two halves after the handshake:
//!
//! - a read loop that dispatches session control frames inline
//!   (`TRY_ACCESS_TABLE`, `HEARTBEAT`, `JOIN_TABLE`, `LEAVE_TABLE`), and
//! - a forward task that pushes committed order events through the
//!   connection's role filter to the socket.
//!
//! The forward task subscribes to the event stream *before* the handshake
//! ack goes out, so a client that has seen the ack never misses an event
//! committed afterwards. When the event stream overruns this subscriber,
//! the client gets a `RESYNC_REQUIRED` frame instead of silently dropped
//! events and is expected to refetch over HTTP.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use shared::message::{BusMessage, EventType, PROTOCOL_VERSION};
use shared::order::OrderEvent;
use shared::session::{ClientRole, HandshakePayload, TableAccessPayload, TableChannelPayload};
use shared::LifecycleError;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf, split};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

use crate::bus::codec::{read_frame, write_frame};
use crate::core::ServerState;
use crate::utils::AppResult;

/// Table channels this connection joined (ordering role only)
type JoinedTables = Arc<RwLock<HashSet<String>>>;

type SharedWriter<S> = Arc<Mutex<WriteHalf<S>>>;

async fn send<S>(writer: &SharedWriter<S>, msg: &BusMessage) -> AppResult<()>
where
    S: AsyncWrite,
{
    let mut guard = writer.lock().await;
    write_frame(&mut *guard, msg).await
}

/// Drive one bus connection from handshake to disconnect
pub async fn serve_connection<S>(
    state: ServerState,
    stream: S,
    peer: String,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = split(stream);
    let writer: SharedWriter<S> = Arc::new(Mutex::new(writer));

    // Subscribed before the handshake ack goes out (see module doc)
    let events = state.store.subscribe();

    let Some((client_id, role)) = handshake(&state, &mut reader, &writer, &peer).await else {
        return;
    };
    tracing::info!("🤝 Client {} connected as {:?} ({})", client_id, role, peer);

    let joined: JoinedTables = Arc::new(RwLock::new(HashSet::new()));

    let forward = tokio::spawn(forward_events(
        events,
        role,
        joined.clone(),
        writer.clone(),
        client_id.clone(),
        shutdown.clone(),
    ));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            read = read_frame(&mut reader) => match read {
                Ok(msg) => {
                    if !handle_frame(&state, &client_id, &joined, &writer, msg).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("Client {} read ended: {}", client_id, e);
                    break;
                }
            }
        }
    }

    shutdown.cancel();
    let _ = forward.await;
    tracing::info!("👋 Client {} disconnected", client_id);
}

/// First frame must be a valid, version-compatible handshake
async fn handshake<S>(
    state: &ServerState,
    reader: &mut ReadHalf<S>,
    writer: &SharedWriter<S>,
    peer: &str,
) -> Option<(String, ClientRole)>
where
    S: AsyncRead + AsyncWrite,
{
    let hello = match read_frame(reader).await {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!("Client {} dropped before handshake: {}", peer, e);
            return None;
        }
    };

    if hello.event_type != EventType::Handshake {
        let reply = BusMessage::error(Some(hello.request_id), "Expected handshake");
        let _ = send(writer, &reply).await;
        return None;
    }

    let payload: HandshakePayload = match hello.decode_payload() {
        Ok(payload) => payload,
        Err(e) => {
            let reply =
                BusMessage::error(Some(hello.request_id), format!("Malformed handshake: {e}"));
            let _ = send(writer, &reply).await;
            return None;
        }
    };

    if payload.version != PROTOCOL_VERSION {
        tracing::warn!(
            "Client {} speaks protocol v{}, server requires v{}",
            payload.client_id,
            payload.version,
            PROTOCOL_VERSION
        );
        let reply = BusMessage::error(
            Some(hello.request_id),
            format!("Protocol version {} not supported", payload.version),
        );
        let _ = send(writer, &reply).await;
        return None;
    }

    let ack = BusMessage::handshake_ack(hello.request_id, state.config.heartbeat_interval_secs);
    if send(writer, &ack).await.is_err() {
        return None;
    }
    Some((payload.client_id, payload.role))
}

/// Push order events through the role filter to the socket
async fn forward_events<S>(
    mut events: broadcast::Receiver<OrderEvent>,
    role: ClientRole,
    joined: JoinedTables,
    writer: SharedWriter<S>,
    client_id: String,
    shutdown: CancellationToken,
) where
    S: AsyncWrite,
{
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => {
                    if !should_forward(role, &joined.read(), &event) {
                        continue;
                    }
                    let msg = match BusMessage::order_event(&event) {
                        Ok(msg) => msg,
                        Err(e) => {
                            tracing::error!("Failed to encode order event: {}", e);
                            continue;
                        }
                    };
                    if send(&writer, &msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Client {} lagged {} event(s), requesting resync",
                        client_id,
                        skipped
                    );
                    if send(&writer, &BusMessage::resync_required()).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Role filter: kitchen and admin see everything, ordering clients only
/// the tables they joined
fn should_forward(role: ClientRole, joined: &HashSet<String>, event: &OrderEvent) -> bool {
    match role {
        ClientRole::Kitchen | ClientRole::Admin => true,
        ClientRole::Ordering => joined.contains(&event.table_number),
    }
}

/// Dispatch one client frame; returns false when the connection should close
async fn handle_frame<S>(
    state: &ServerState,
    client_id: &str,
    joined: &JoinedTables,
    writer: &SharedWriter<S>,
    msg: BusMessage,
) -> bool
where
    S: AsyncWrite,
{
    match msg.event_type {
        EventType::TryAccessTable => {
            let payload: TableAccessPayload = match msg.decode_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    let reply =
                        BusMessage::error(Some(msg.request_id), format!("Malformed payload: {e}"));
                    return send(writer, &reply).await.is_ok();
                }
            };
            let reply = match state.sessions.try_acquire(&payload.table_id, &payload.client_id) {
                Ok(()) => BusMessage::access_granted(msg.request_id),
                Err(LifecycleError::TableLocked(reason)) => {
                    BusMessage::access_denied(msg.request_id, reason)
                }
                Err(e) => BusMessage::error(Some(msg.request_id), e.to_string()),
            };
            send(writer, &reply).await.is_ok()
        }

        EventType::Heartbeat => {
            if let Ok(payload) = msg.decode_payload::<TableAccessPayload>() {
                state.sessions.heartbeat(&payload.table_id, &payload.client_id);
            }
            true
        }

        EventType::JoinTable => {
            if let Ok(payload) = msg.decode_payload::<TableChannelPayload>() {
                tracing::debug!("Client {} joined table channel {}", client_id, payload.table_id);
                joined.write().insert(payload.table_id);
            }
            true
        }

        EventType::LeaveTable => {
            if let Ok(payload) = msg.decode_payload::<TableChannelPayload>() {
                tracing::debug!("Client {} left table channel {}", client_id, payload.table_id);
                joined.write().remove(&payload.table_id);
            }
            true
        }

        other => {
            tracing::warn!("Client {} sent unsupported event type {:?}", client_id, other);
            let reply = BusMessage::error(
                Some(msg.request_id),
                format!("Unsupported event type {other:?}"),
            );
            send(writer, &reply).await.is_ok()
        }
    }
}
