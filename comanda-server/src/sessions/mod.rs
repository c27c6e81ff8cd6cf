//! Table Session Guard
//!
//! Grants exclusive table access to a single ordering client at a time.
//! A lease is kept alive by heartbeats; when heartbeats stop, the lease
//! expires after `heartbeat_interval × liveness_factor` and the table can
//! be taken over by the next `try_acquire`.
//!
//! Expiry is evaluated lazily on every acquire / heartbeat / holds check,
//! so correctness never depends on the background sweeper. The sweeper only
//! prunes dead entries from the map.
//!
//! All operations lock the single table entry, never the whole map, so
//! contention on one table does not block access checks on another.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::LifecycleError;
use tokio::time::Instant;

/// A table held by one ordering client
#[derive(Debug, Clone)]
pub struct TableLease {
    pub table_id: String,
    pub client_id: String,
    /// When the lease was first granted to this client
    pub acquired_at: Instant,
    /// Last heartbeat (or acquire) from the holder
    pub last_heartbeat: Instant,
}

impl TableLease {
    fn new(table_id: &str, client_id: &str) -> Self {
        let now = Instant::now();
        Self {
            table_id: table_id.to_string(),
            client_id: client_id.to_string(),
            acquired_at: now,
            last_heartbeat: now,
        }
    }

    /// True when no heartbeat arrived within the liveness window
    pub fn is_expired(&self, liveness_window: Duration) -> bool {
        self.last_heartbeat.elapsed() >= liveness_window
    }
}

/// Exclusive table occupancy tracker
pub struct SessionGuard {
    leases: DashMap<String, TableLease>,
    heartbeat_interval: Duration,
    liveness_factor: u32,
}

impl SessionGuard {
    pub fn new(heartbeat_interval: Duration, liveness_factor: u32) -> Self {
        Self {
            leases: DashMap::new(),
            heartbeat_interval,
            liveness_factor,
        }
    }

    /// Heartbeat interval announced to clients at handshake
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// How long a lease survives without heartbeats
    pub fn liveness_window(&self) -> Duration {
        self.heartbeat_interval * self.liveness_factor
    }

    /// Try to acquire exclusive access to a table
    ///
    /// - Vacant table: granted.
    /// - Held by the same client: granted (idempotent, refreshes the lease).
    /// - Held by another client whose lease expired: taken over.
    /// - Held by another live client: rejected with `TableLocked`.
    pub fn try_acquire(&self, table_id: &str, client_id: &str) -> Result<(), LifecycleError> {
        match self.leases.entry(table_id.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(TableLease::new(table_id, client_id));
                tracing::info!("🔐 Table {} acquired by client {}", table_id, client_id);
                Ok(())
            }
            Entry::Occupied(mut entry) => {
                let lease = entry.get();
                if lease.client_id == client_id {
                    entry.get_mut().last_heartbeat = Instant::now();
                    tracing::debug!("Table {} re-acquired by holder {}", table_id, client_id);
                    Ok(())
                } else if lease.is_expired(self.liveness_window()) {
                    tracing::warn!(
                        "⚠️ Table {} lease of client {} expired, taken over by {}",
                        table_id,
                        lease.client_id,
                        client_id
                    );
                    entry.insert(TableLease::new(table_id, client_id));
                    Ok(())
                } else {
                    tracing::info!(
                        "❌ Table {} denied for client {}: held by another device",
                        table_id,
                        client_id
                    );
                    Err(LifecycleError::TableLocked(format!(
                        "table {table_id} is currently in use by another device"
                    )))
                }
            }
        }
    }

    /// Refresh the lease of the current holder
    ///
    /// Silently ignored when the caller no longer holds the table (expired
    /// or taken over) — the caller must go through `try_acquire` again.
    pub fn heartbeat(&self, table_id: &str, client_id: &str) {
        match self.leases.get_mut(table_id) {
            Some(mut lease)
                if lease.client_id == client_id && !lease.is_expired(self.liveness_window()) =>
            {
                lease.last_heartbeat = Instant::now();
                tracing::trace!("Heartbeat for table {} from {}", table_id, client_id);
            }
            _ => {
                tracing::debug!(
                    "Ignoring heartbeat for table {} from {}: not the live holder",
                    table_id,
                    client_id
                );
            }
        }
    }

    /// True when `client_id` holds a live lease on the table
    ///
    /// This is the write-path check: order creation requires it.
    pub fn holds(&self, table_id: &str, client_id: &str) -> bool {
        self.leases
            .get(table_id)
            .map(|lease| {
                lease.client_id == client_id && !lease.is_expired(self.liveness_window())
            })
            .unwrap_or(false)
    }

    /// Drop expired leases, returning how many were removed
    ///
    /// Pure hygiene: expired leases are already invisible to `holds` and
    /// reclaimable by `try_acquire`.
    pub fn sweep(&self) -> usize {
        let window = self.liveness_window();
        let before = self.leases.len();
        self.leases.retain(|_, lease| !lease.is_expired(window));
        let removed = before - self.leases.len();
        if removed > 0 {
            tracing::debug!("Swept {} expired table lease(s)", removed);
        }
        removed
    }

    /// Number of tracked leases, live or not
    pub fn lease_count(&self) -> usize {
        self.leases.len()
    }
}
