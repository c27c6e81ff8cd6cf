//! Table session keeper
//!
//! Acquires a table over the bus and keeps the lease alive with a
//! background heartbeat task until released or dropped. Once heartbeats
//! stop, the server reclaims the table after its liveness window; there
//! is no explicit release frame, so a crashed tab and an orderly close
//! are reclaimed the same way.

use tokio_util::sync::CancellationToken;

use crate::{BusClient, ClientResult};

/// A held table session
pub struct TableSession {
    table_id: String,
    stop: CancellationToken,
}

impl TableSession {
    /// Acquire `table_id` and start heartbeating at the server-announced
    /// cadence
    ///
    /// Fails with [`ClientError::Denied`] when another live device holds
    /// the table.
    ///
    /// [`ClientError::Denied`]: crate::ClientError::Denied
    pub async fn acquire(bus: &BusClient, table_id: impl Into<String>) -> ClientResult<Self> {
        let table_id = table_id.into();
        bus.try_access_table(&table_id).await?;

        let stop = CancellationToken::new();
        let task_stop = stop.clone();
        let task_bus = bus.clone();
        let task_table = table_id.clone();
        let period = bus.heartbeat_interval();

        tokio::spawn(async move {
            let conn_closed = task_bus.closed();
            let mut ticker = tokio::time::interval(period);
            // The acquisition itself counts as the first beat
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = task_stop.cancelled() => break,
                    _ = conn_closed.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = task_bus.heartbeat(&task_table).await {
                            tracing::debug!("Heartbeat for table {} failed: {}", task_table, e);
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self { table_id, stop })
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    /// Stop heartbeating; the server reclaims the table after the
    /// liveness window
    pub fn release(&self) {
        self.stop.cancel();
    }
}

impl Drop for TableSession {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
