//! Message bus
//!
//! Push channel for order events and table session control:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 OrderStore                   │
//! │        broadcast::Sender<OrderEvent>         │
//! └──────────────────────┬───────────────────────┘
//!                        │ subscribe() per connection
//!            ┌───────────┴───────────┐
//!            ▼                       ▼
//!     forward task            forward task        ◄─ role filter
//!     (kitchen: all)      (ordering: joined tables)
//!            │                       │
//!            ▼                       ▼
//!        TCP frames              TCP frames
//! ```
//!
//! Frames use a 1-byte tag + 4-byte length + JSON envelope ([`codec`]).
//! Connections handshake first, then the read loop handles session frames
//! while the forward task pushes filtered order events ([`connection`]).
//!
//! Delivery is at-least-once: consumers dedupe by event id or rely on the
//! idempotent full-snapshot merge. A consumer that falls behind the event
//! buffer gets `RESYNC_REQUIRED` and must refetch over HTTP.

pub mod codec;
pub mod connection;

pub use codec::{read_frame, write_frame};
pub use connection::serve_connection;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::core::ServerState;
use crate::utils::{AppError, AppResult};

/// Accept loop for the TCP message bus
///
/// Runs until `shutdown` fires; every connection gets its own child token
/// so one misbehaving client never takes the listener down.
pub async fn start_tcp_server(state: ServerState, shutdown: CancellationToken) -> AppResult<()> {
    let addr = format!("0.0.0.0:{}", state.config.message_tcp_port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind message bus on {addr}: {e}")))?;

    tracing::info!("📡 Message bus listening on {}", addr);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Message bus shutting down");
                break;
            }

            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        tracing::debug!("Client connected: {}", peer);
                        tokio::spawn(serve_connection(
                            state.clone(),
                            stream,
                            peer.to_string(),
                            shutdown.child_token(),
                        ));
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }
    }

    Ok(())
}
