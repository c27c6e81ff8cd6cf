//! Role-parameterized order projection
//!
//! One merge engine serves all three observer roles. The role decides
//! which events are in scope and whether closed (PAID) orders stay
//! visible; the merge rules themselves are shared:
//!
//! - `NEW_ORDER` inserts only if the id is absent (duplicate delivery and
//!   the fetch/event race both collapse to one entry);
//! - `ORDER_UPDATED` replaces the cached entry wholesale (events carry
//!   full snapshots), or removes it when the order went `PAID` and the
//!   role drops closed orders;
//! - updates for unknown ids are ignored: the next refetch heals.
//!
//! Recovery is always the same move: an authoritative REST refetch. It
//! runs at connect, on `RESYNC_REQUIRED`, on local lag and after a failed
//! optimistic mutation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use shared::message::{BusMessage, EventType};
use shared::order::{Order, OrderEvent, OrderEventKind};
use shared::session::ClientRole;

use crate::{BusClient, ClientConfig, ClientResult, HttpClient};

/// Observer role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Table-scoped ordering device
    Ordering { table: String },
    /// Kitchen board: every table, closed orders drop off
    Kitchen,
    /// Admin dashboard: every table, closed orders stay visible
    Admin,
}

impl Role {
    /// Wire role declared at handshake
    pub fn client_role(&self) -> ClientRole {
        match self {
            Role::Ordering { .. } => ClientRole::Ordering,
            Role::Kitchen => ClientRole::Kitchen,
            Role::Admin => ClientRole::Admin,
        }
    }

    /// Whether closed orders stay in the projection
    fn retains_paid(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Whether an event for `table_number` is in scope
    fn accepts(&self, table_number: &str) -> bool {
        match self {
            Role::Ordering { table } => table == table_number,
            Role::Kitchen | Role::Admin => true,
        }
    }
}

/// Client-side order projection, kept in sync by bus events + refetches
pub struct Synchronizer {
    role: Role,
    api: HttpClient,
    cache: RwLock<HashMap<String, Order>>,
    revision: watch::Sender<u64>,
}

impl Synchronizer {
    pub fn new(role: Role, api: HttpClient) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            role,
            api,
            cache: RwLock::new(HashMap::new()),
            revision,
        }
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Watch channel bumped on every projection change; UIs hang their
    /// re-render off this
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Current projection, first-come-first-served
    pub fn orders(&self) -> Vec<Order> {
        let cache = self.cache.read().unwrap();
        let mut orders: Vec<Order> = cache.values().cloned().collect();
        orders.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        orders
    }

    pub fn get(&self, order_id: &str) -> Option<Order> {
        self.cache.read().unwrap().get(order_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().unwrap().is_empty()
    }

    /// Merge one order event into the projection
    ///
    /// Returns whether the projection changed.
    pub fn apply_event(&self, event: &OrderEvent) -> bool {
        if !self.role.accepts(&event.table_number) {
            return false;
        }

        let order = &event.order;
        let changed = {
            let mut cache = self.cache.write().unwrap();
            match event.kind {
                OrderEventKind::NewOrder => {
                    if order.is_paid() && !self.role.retains_paid() {
                        false
                    } else if cache.contains_key(&order.id) {
                        // Duplicate delivery, or the seed fetch already saw it
                        false
                    } else {
                        cache.insert(order.id.clone(), order.clone());
                        true
                    }
                }
                OrderEventKind::OrderUpdated => {
                    if order.is_paid() && !self.role.retains_paid() {
                        cache.remove(&order.id).is_some()
                    } else {
                        match cache.get_mut(&order.id) {
                            Some(entry) => {
                                *entry = order.clone();
                                true
                            }
                            // Unknown id: the next refetch heals
                            None => false,
                        }
                    }
                }
            }
        };

        if changed {
            self.revision.send_modify(|r| *r += 1);
        }
        changed
    }

    /// Replace the local entry immediately, ahead of the server's event
    ///
    /// If the mutating request then fails, call [`refetch`](Self::refetch);
    /// authoritative state wins, there is no inverse-delta rollback.
    pub fn apply_optimistic(&self, order: Order) {
        {
            let mut cache = self.cache.write().unwrap();
            if order.is_paid() && !self.role.retains_paid() {
                cache.remove(&order.id);
            } else {
                cache.insert(order.id.clone(), order);
            }
        }
        self.revision.send_modify(|r| *r += 1);
    }

    /// Authoritative refetch: replaces the whole projection from REST
    pub async fn refetch(&self) -> ClientResult<()> {
        let fetched = match self.role {
            Role::Admin => self.api.fetch_orders().await?,
            _ => self.api.fetch_active_orders().await?,
        };

        let mut next = HashMap::new();
        for order in fetched {
            if !self.role.accepts(&order.table_number) {
                continue;
            }
            if order.is_paid() && !self.role.retains_paid() {
                continue;
            }
            next.insert(order.id.clone(), order);
        }

        *self.cache.write().unwrap() = next;
        self.revision.send_modify(|r| *r += 1);
        Ok(())
    }

    /// Connection loop: connect, scope, seed, then merge events
    ///
    /// Reconnects with the configured bounded attempts and fixed delay;
    /// returns when `shutdown` fires or the attempts are exhausted.
    pub async fn run(self: Arc<Self>, config: ClientConfig, shutdown: CancellationToken) {
        // The handshake role always mirrors the projection role
        let mut config = config;
        config.role = self.role.client_role();

        let mut attempts: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let bus = match BusClient::connect(&config).await {
                Ok(bus) => bus,
                Err(e) => {
                    attempts += 1;
                    if attempts >= config.reconnect_attempts {
                        tracing::error!(
                            "❌ Giving up after {} connection attempts: {}",
                            attempts,
                            e
                        );
                        return;
                    }
                    tracing::warn!(
                        "⚠️ Bus connect failed (attempt {}/{}): {}",
                        attempts,
                        config.reconnect_attempts,
                        e
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_millis(config.reconnect_delay_ms)) => continue,
                    }
                }
            };

            // Subscribe before seeding so events committed during the
            // fetch are queued rather than lost
            let mut events = bus.subscribe();

            if let Role::Ordering { table } = &self.role
                && let Err(e) = bus.join_table(table).await
            {
                tracing::warn!("⚠️ Failed to join table {}: {}", table, e);
                continue;
            }

            if let Err(e) = self.refetch().await {
                attempts += 1;
                if attempts >= config.reconnect_attempts {
                    tracing::error!("❌ Giving up after {} connection attempts: {}", attempts, e);
                    return;
                }
                tracing::warn!("⚠️ Seed fetch failed: {}", e);
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_millis(config.reconnect_delay_ms)) => continue,
                }
            }

            attempts = 0;
            tracing::info!("📡 Synchronizer online ({:?})", self.role.client_role());

            let conn_closed = bus.closed();
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = conn_closed.cancelled() => {
                        tracing::warn!("⚠️ Bus connection lost, reconnecting");
                        break;
                    }
                    received = events.recv() => match received {
                        Ok(msg) => self.handle_message(&msg).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("Local event queue lagged by {}, refetching", skipped);
                            if let Err(e) = self.refetch().await {
                                tracing::warn!("Lag refetch failed: {}", e);
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        }
    }

    async fn handle_message(&self, msg: &BusMessage) {
        match msg.event_type {
            EventType::NewOrder | EventType::OrderUpdated => {
                match msg.decode_payload::<OrderEvent>() {
                    Ok(event) => {
                        self.apply_event(&event);
                    }
                    Err(e) => tracing::warn!("Undecodable order event: {}", e),
                }
            }
            EventType::ResyncRequired => {
                tracing::info!("Server requested resync, refetching");
                if let Err(e) = self.refetch().await {
                    tracing::warn!("Resync refetch failed: {}", e);
                }
            }
            // Session replies are handled by their requesters
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::order::{ItemStatus, OrderItem, OrderStatus};

    fn test_sync(role: Role) -> Synchronizer {
        let config = ClientConfig::new(
            "http://localhost:3000",
            "localhost:8081",
            role.client_role(),
        );
        Synchronizer::new(role, HttpClient::new(&config))
    }

    fn order_on(table: &str) -> Order {
        Order::new(
            table,
            vec![
                OrderItem::new("Nasi Goreng", 1, 25_000.0, "Makanan"),
                OrderItem::new("Es Teh", 2, 5_000.0, "Minuman"),
            ],
            35_000.0,
        )
    }

    #[test]
    fn duplicate_new_order_yields_one_entry() {
        let sync = test_sync(Role::Kitchen);
        let order = order_on("5");

        let event = OrderEvent::new_order(1, order.clone());
        assert!(sync.apply_event(&event));
        // At-least-once delivery: the second copy is a no-op
        assert!(!sync.apply_event(&event));

        assert_eq!(sync.len(), 1);
        assert_eq!(sync.get(&order.id).unwrap().table_number, "5");
    }

    #[test]
    fn ordering_role_filters_other_tables() {
        let sync = test_sync(Role::Ordering {
            table: "5".to_string(),
        });

        assert!(!sync.apply_event(&OrderEvent::new_order(1, order_on("9"))));
        assert!(sync.apply_event(&OrderEvent::new_order(2, order_on("5"))));

        assert_eq!(sync.len(), 1);
        assert!(sync.orders().iter().all(|o| o.table_number == "5"));
    }

    #[test]
    fn update_replaces_the_whole_snapshot() {
        let sync = test_sync(Role::Kitchen);
        let mut order = order_on("5");

        sync.apply_event(&OrderEvent::new_order(1, order.clone()));

        order.items[0].status = ItemStatus::Cooking;
        order.status = OrderStatus::Cooking;
        assert!(sync.apply_event(&OrderEvent::order_updated(2, order.clone())));

        let cached = sync.get(&order.id).unwrap();
        assert_eq!(cached.status, OrderStatus::Cooking);
        assert_eq!(cached.items[0].status, ItemStatus::Cooking);
    }

    #[test]
    fn paid_orders_leave_the_kitchen_board() {
        let sync = test_sync(Role::Kitchen);
        let mut order = order_on("5");

        sync.apply_event(&OrderEvent::new_order(1, order.clone()));
        assert_eq!(sync.len(), 1);

        order.status = OrderStatus::Paid;
        assert!(sync.apply_event(&OrderEvent::order_updated(2, order.clone())));
        assert!(sync.is_empty());
    }

    #[test]
    fn paid_orders_stay_on_the_admin_dashboard() {
        let sync = test_sync(Role::Admin);
        let mut order = order_on("5");

        sync.apply_event(&OrderEvent::new_order(1, order.clone()));

        order.status = OrderStatus::Paid;
        assert!(sync.apply_event(&OrderEvent::order_updated(2, order.clone())));

        assert_eq!(sync.len(), 1);
        assert_eq!(sync.get(&order.id).unwrap().status, OrderStatus::Paid);
    }

    #[test]
    fn unknown_update_is_ignored() {
        let sync = test_sync(Role::Kitchen);
        let order = order_on("5");

        assert!(!sync.apply_event(&OrderEvent::order_updated(1, order)));
        assert!(sync.is_empty());
    }

    #[test]
    fn paid_new_order_is_skipped_unless_retained() {
        let mut order = order_on("5");
        order.status = OrderStatus::Paid;

        let kitchen = test_sync(Role::Kitchen);
        assert!(!kitchen.apply_event(&OrderEvent::new_order(1, order.clone())));
        assert!(kitchen.is_empty());

        let admin = test_sync(Role::Admin);
        assert!(admin.apply_event(&OrderEvent::new_order(1, order)));
        assert_eq!(admin.len(), 1);
    }

    #[test]
    fn projection_sorts_first_come_first_served() {
        let sync = test_sync(Role::Admin);

        let mut first = order_on("1");
        first.created_at = 1_000;
        let mut second = order_on("2");
        second.created_at = 2_000;

        // Delivery order does not matter
        sync.apply_event(&OrderEvent::new_order(2, second.clone()));
        sync.apply_event(&OrderEvent::new_order(1, first.clone()));

        let tables: Vec<String> = sync
            .orders()
            .into_iter()
            .map(|o| o.table_number)
            .collect();
        assert_eq!(tables, vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn optimistic_overwrite_applies_immediately() {
        let sync = test_sync(Role::Admin);
        let mut order = order_on("5");

        sync.apply_event(&OrderEvent::new_order(1, order.clone()));

        order.status = OrderStatus::Cooking;
        sync.apply_optimistic(order.clone());
        assert_eq!(sync.get(&order.id).unwrap().status, OrderStatus::Cooking);
    }

    #[test]
    fn changes_watch_bumps_on_merge() {
        let sync = test_sync(Role::Kitchen);
        let mut changes = sync.changes();
        let seen = *changes.borrow_and_update();

        let event = OrderEvent::new_order(1, order_on("5"));
        sync.apply_event(&event);
        assert!(changes.has_changed().unwrap());
        assert!(*changes.borrow_and_update() > seen);

        // A duplicate merge is a no-op and does not wake watchers
        sync.apply_event(&event);
        assert!(!changes.has_changed().unwrap());
    }
}
