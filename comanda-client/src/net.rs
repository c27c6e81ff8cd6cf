//! Bus connection management
//!
//! Owns the TCP connection to the server's message bus: handshake on
//! connect, a background read loop, RPC correlation for request/reply
//! frames, and fan-out of pushed events to local subscribers.
//!
//! The server answers the handshake before it forwards any order event,
//! so a client that has seen the ack never misses events committed after
//! it connected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use shared::message::{BusMessage, EventType, MAX_FRAME_BYTES};
use shared::session::{AccessDeniedPayload, ClientRole, ErrorPayload, HandshakeAckPayload};

use crate::{ClientConfig, ClientError, ClientResult};

/// How long an RPC waits for its correlated reply
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Local fan-out buffer for pushed events
const EVENT_BUFFER: usize = 1024;

type PendingMap = Arc<Mutex<HashMap<Uuid, oneshot::Sender<BusMessage>>>>;
type SharedWriter = Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Message bus client
///
/// Cloneable handle; all clones share one connection. Replies are routed
/// to their waiting request by `correlation_id`; every frame is also
/// fanned out to [`subscribe`](Self::subscribe) receivers.
#[derive(Clone)]
pub struct BusClient {
    writer: SharedWriter,
    event_tx: broadcast::Sender<BusMessage>,
    pending: PendingMap,
    closed: CancellationToken,
    heartbeat_interval: Duration,
    client_id: String,
}

impl std::fmt::Debug for BusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusClient")
            .field("client_id", &self.client_id)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish_non_exhaustive()
    }
}

impl BusClient {
    /// Connect over TCP and perform the handshake
    pub async fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let stream = TcpStream::connect(&config.bus_addr)
            .await
            .map_err(|e| ClientError::Transport(format!("connect {}: {e}", config.bus_addr)))?;
        Self::from_stream(stream, config.client_id.clone(), config.role).await
    }

    /// Build a client over an already-established stream
    ///
    /// Used directly by tests (in-process duplex pipes) and by
    /// [`connect`](Self::connect) for TCP.
    pub async fn from_stream<S>(stream: S, client_id: String, role: ClientRole) -> ClientResult<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);

        // 🤝 Handshake before anything else; the ack carries the heartbeat
        // cadence the server expects from session holders
        let hello = BusMessage::handshake(client_id.clone(), role);
        write_frame(&mut writer, &hello).await?;

        let ack = read_frame(&mut reader).await?;
        let heartbeat_interval = match ack.event_type {
            EventType::HandshakeAck => {
                let payload: HandshakeAckPayload = ack.decode_payload()?;
                Duration::from_secs(payload.heartbeat_interval_secs)
            }
            EventType::Error => {
                let message = ack
                    .decode_payload::<ErrorPayload>()
                    .map(|p| p.message)
                    .unwrap_or_else(|_| "handshake refused".to_string());
                return Err(ClientError::Denied(message));
            }
            other => {
                return Err(ClientError::Transport(format!(
                    "unexpected handshake reply: {other:?}"
                )));
            }
        };

        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = CancellationToken::new();

        // Background read loop: replies are routed to their waiter, and
        // every frame is also forwarded to subscribers
        let loop_tx = event_tx.clone();
        let loop_pending = pending.clone();
        let loop_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(msg) => {
                        if let Some(correlation_id) = msg.correlation_id {
                            let waiter = loop_pending.lock().unwrap().remove(&correlation_id);
                            if let Some(tx) = waiter {
                                let _ = tx.send(msg.clone());
                            }
                        }

                        let _ = loop_tx.send(msg);
                    }
                    Err(e) => {
                        tracing::debug!("Bus read loop ended: {}", e);
                        loop_closed.cancel();
                        break;
                    }
                }
            }
        });

        Ok(Self {
            writer: Arc::new(tokio::sync::Mutex::new(Box::new(writer))),
            event_tx,
            pending,
            closed,
            heartbeat_interval,
            client_id,
        })
    }

    /// Heartbeat cadence announced by the server at handshake
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// The device id this connection handshook with
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Subscribe to pushed frames (order events, resync notices)
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.event_tx.subscribe()
    }

    /// Token cancelled when the connection dies
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Send a frame (fire and forget)
    pub async fn send(&self, msg: &BusMessage) -> ClientResult<()> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, msg).await
    }

    /// Send a frame and await the server's correlated reply
    pub async fn request(&self, msg: &BusMessage) -> ClientResult<BusMessage> {
        let request_id = msg.request_id;
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().unwrap();
            pending.insert(request_id, tx);
        }

        if let Err(e) = self.send(msg).await {
            // Cleanup on send failure
            let mut pending = self.pending.lock().unwrap();
            pending.remove(&request_id);
            return Err(e);
        }

        tokio::select! {
            _ = self.closed.cancelled() => {
                let mut pending = self.pending.lock().unwrap();
                pending.remove(&request_id);
                Err(ClientError::Closed)
            }
            result = tokio::time::timeout(REQUEST_TIMEOUT, rx) => match result {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(_)) => Err(ClientError::Closed),
                Err(_) => {
                    // Timeout cleanup
                    let mut pending = self.pending.lock().unwrap();
                    pending.remove(&request_id);
                    Err(ClientError::Timeout)
                }
            },
        }
    }

    /// Request the table lease
    ///
    /// Returns [`ClientError::Denied`] when another live device holds it.
    pub async fn try_access_table(&self, table_id: &str) -> ClientResult<()> {
        let request = BusMessage::try_access_table(table_id, &self.client_id);
        let reply = self.request(&request).await?;

        match reply.event_type {
            EventType::AccessGranted => Ok(()),
            EventType::AccessDenied => {
                let reason = reply
                    .decode_payload::<AccessDeniedPayload>()
                    .map(|p| p.reason)
                    .unwrap_or_else(|_| "table is in use".to_string());
                Err(ClientError::Denied(reason))
            }
            EventType::Error => {
                let message = reply
                    .decode_payload::<ErrorPayload>()
                    .map(|p| p.message)
                    .unwrap_or_else(|_| "request rejected".to_string());
                Err(ClientError::Transport(message))
            }
            other => Err(ClientError::Transport(format!(
                "unexpected reply to table access: {other:?}"
            ))),
        }
    }

    /// Refresh the table lease (fire and forget)
    pub async fn heartbeat(&self, table_id: &str) -> ClientResult<()> {
        self.send(&BusMessage::heartbeat(table_id, &self.client_id))
            .await
    }

    /// Join a table's event channel (ordering role scoping)
    pub async fn join_table(&self, table_id: &str) -> ClientResult<()> {
        self.send(&BusMessage::join_table(table_id)).await
    }

    /// Leave a table's event channel
    pub async fn leave_table(&self, table_id: &str) -> ClientResult<()> {
        self.send(&BusMessage::leave_table(table_id)).await
    }

    /// Close the connection
    pub async fn close(&self) {
        self.closed.cancel();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Read one frame: 1 byte tag, 4 bytes little-endian length, JSON payload
async fn read_frame<R>(reader: &mut R) -> ClientResult<BusMessage>
where
    R: AsyncRead + Unpin,
{
    let mut tag = [0u8; 1];
    reader
        .read_exact(&mut tag)
        .await
        .map_err(|e| ClientError::Transport(format!("read frame tag: {e}")))?;
    let tag_type = EventType::try_from(tag[0])
        .map_err(|t| ClientError::Transport(format!("unknown event type tag: {t}")))?;

    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| ClientError::Transport(format!("read frame length: {e}")))?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ClientError::Transport(format!(
            "frame of {len} bytes exceeds limit"
        )));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| ClientError::Transport(format!("read frame payload: {e}")))?;

    let msg: BusMessage = serde_json::from_slice(&payload)?;
    if msg.event_type != tag_type {
        return Err(ClientError::Transport(format!(
            "frame tag {tag_type:?} does not match envelope {:?}",
            msg.event_type
        )));
    }

    Ok(msg)
}

/// Write one frame as a single buffer
async fn write_frame<W>(writer: &mut W, msg: &BusMessage) -> ClientResult<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(msg)?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(ClientError::Transport(format!(
            "frame of {} bytes exceeds limit",
            payload.len()
        )));
    }

    let mut frame = Vec::with_capacity(1 + 4 + payload.len());
    frame.push(msg.event_type.as_u8());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);

    writer
        .write_all(&frame)
        .await
        .map_err(|e| ClientError::Transport(format!("write frame: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::order::{Order, OrderEvent, OrderItem};
    use tokio::io::DuplexStream;

    /// Serve the handshake on the fake-server end of a duplex pipe
    async fn accept_handshake(server: &mut DuplexStream, interval_secs: u64) -> BusMessage {
        let hello = read_frame(server).await.unwrap();
        assert_eq!(hello.event_type, EventType::Handshake);
        let ack = BusMessage::handshake_ack(hello.request_id, interval_secs);
        write_frame(server, &ack).await.unwrap();
        hello
    }

    fn sample_order(table: &str) -> Order {
        Order::new(
            table,
            vec![OrderItem::new("Nasi Goreng", 1, 25_000.0, "Makanan")],
            25_000.0,
        )
    }

    #[tokio::test]
    async fn handshake_negotiates_heartbeat_interval() {
        let (client_end, mut server) = tokio::io::duplex(64 * 1024);

        let server_task = tokio::spawn(async move {
            accept_handshake(&mut server, 7).await;
            server
        });

        let bus = BusClient::from_stream(client_end, "tablet-1".into(), ClientRole::Ordering)
            .await
            .unwrap();

        assert_eq!(bus.heartbeat_interval(), Duration::from_secs(7));
        assert_eq!(bus.client_id(), "tablet-1");
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn refused_handshake_surfaces_denied() {
        let (client_end, mut server) = tokio::io::duplex(64 * 1024);

        tokio::spawn(async move {
            let hello = read_frame(&mut server).await.unwrap();
            let refusal =
                BusMessage::error(Some(hello.request_id), "Unsupported protocol version");
            write_frame(&mut server, &refusal).await.unwrap();
        });

        let err = BusClient::from_stream(client_end, "tablet-1".into(), ClientRole::Ordering)
            .await
            .unwrap_err();

        match err {
            ClientError::Denied(reason) => assert!(reason.contains("protocol version")),
            other => panic!("expected Denied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn table_access_round_trip_grant_and_deny() {
        let (client_end, mut server) = tokio::io::duplex(64 * 1024);

        tokio::spawn(async move {
            accept_handshake(&mut server, 5).await;

            // First request granted, second denied
            let first = read_frame(&mut server).await.unwrap();
            assert_eq!(first.event_type, EventType::TryAccessTable);
            write_frame(&mut server, &BusMessage::access_granted(first.request_id))
                .await
                .unwrap();

            let second = read_frame(&mut server).await.unwrap();
            let denied =
                BusMessage::access_denied(second.request_id, "table 5 is currently in use");
            write_frame(&mut server, &denied).await.unwrap();
        });

        let bus = BusClient::from_stream(client_end, "tablet-1".into(), ClientRole::Ordering)
            .await
            .unwrap();

        bus.try_access_table("5").await.unwrap();

        let err = bus.try_access_table("5").await.unwrap_err();
        match err {
            ClientError::Denied(reason) => assert!(reason.contains("in use")),
            other => panic!("expected Denied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pushed_events_reach_subscribers() {
        let (client_end, mut server) = tokio::io::duplex(64 * 1024);

        let bus_task = tokio::spawn(async move {
            accept_handshake(&mut server, 5).await;

            let event = OrderEvent::new_order(1, sample_order("5"));
            let frame = BusMessage::order_event(&event).unwrap();
            write_frame(&mut server, &frame).await.unwrap();
            server
        });

        let bus = BusClient::from_stream(client_end, "kitchen-1".into(), ClientRole::Kitchen)
            .await
            .unwrap();
        let mut events = bus.subscribe();

        let msg = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.event_type, EventType::NewOrder);

        let event: OrderEvent = msg.decode_payload().unwrap();
        assert_eq!(event.table_number, "5");
        bus_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let (client_end, mut server) = tokio::io::duplex(64 * 1024);

        tokio::spawn(async move {
            accept_handshake(&mut server, 5).await;

            // Swallow the request and never reply
            let _ = read_frame(&mut server).await;
            std::future::pending::<()>().await;
        });

        let bus = BusClient::from_stream(client_end, "tablet-1".into(), ClientRole::Ordering)
            .await
            .unwrap();

        let err = bus.try_access_table("5").await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout));
    }

    #[tokio::test]
    async fn disconnect_cancels_closed_token() {
        let (client_end, mut server) = tokio::io::duplex(64 * 1024);

        let bus_task = tokio::spawn(async move {
            accept_handshake(&mut server, 5).await;
            drop(server);
        });

        let bus = BusClient::from_stream(client_end, "tablet-1".into(), ClientRole::Admin)
            .await
            .unwrap();
        bus_task.await.unwrap();

        let closed = bus.closed();
        tokio::time::timeout(Duration::from_secs(1), closed.cancelled())
            .await
            .unwrap();
    }
}
