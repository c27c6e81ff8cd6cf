//! Order lifecycle engine
//!
//! Validates and applies every order mutation. Items advance independently
//! along their preparation track (food passes through COOKING, drinks go
//! straight to SERVED) and the order-level status is derived from them;
//! the only exception is the explicit PAID close, which is sticky.
//!
//! # Transition rules
//!
//! - Exactly one stage forward per request. Skips and regressions are
//!   rejected with `InvalidTransition`.
//! - A request targeting the current state is an idempotent no-op: nothing
//!   persists, nothing is broadcast. Double-taps on two kitchen screens
//!   collapse to one committed transition and one event.
//! - Once an order is PAID, every further mutation is rejected.
//!
//! # Coarse order-level driver
//!
//! `advance_order` moves the whole order one stage and fast-forwards each
//! item along its own track to the matching stage. Applying COOKING to an
//! order whose items are all drinks lands it directly on SERVED, since
//! drinks have no cooking stage.

use std::sync::Arc;

use shared::order::{
    CreateOrderRequest, ItemStatus, LifecycleError, Order, OrderItem, OrderItemInput, OrderStatus,
    Track,
};

use crate::orders::store::OrderStore;
use crate::sessions::SessionGuard;

/// Tolerance for the client-computed total check (floating point money)
const PRICE_EPSILON: f64 = 0.001;

/// Order mutation entry point shared by the HTTP API and the message bus
pub struct OrderLifecycle {
    store: Arc<OrderStore>,
    sessions: Arc<SessionGuard>,
    drink_category: String,
}

impl OrderLifecycle {
    pub fn new(
        store: Arc<OrderStore>,
        sessions: Arc<SessionGuard>,
        drink_category: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sessions,
            drink_category: drink_category.into(),
        }
    }

    /// Category name whose items take the drink track
    pub fn drink_category(&self) -> &str {
        &self.drink_category
    }

    /// Validate and commit a new order, broadcasting `NEW_ORDER`
    ///
    /// The caller must hold a live session on the target table; the order
    /// total must match the sum of its line items.
    pub fn create_order(&self, request: CreateOrderRequest) -> Result<Order, LifecycleError> {
        if request.items.is_empty() {
            return Err(LifecycleError::Validation(
                "order must contain at least one item".into(),
            ));
        }
        for item in &request.items {
            if item.name.trim().is_empty() {
                return Err(LifecycleError::Validation(
                    "item name must not be empty".into(),
                ));
            }
            if item.quantity == 0 {
                return Err(LifecycleError::Validation(format!(
                    "quantity of '{}' must be positive",
                    item.name
                )));
            }
        }

        let computed: f64 = request
            .items
            .iter()
            .map(|i| i.price * f64::from(i.quantity))
            .sum();
        if (computed - request.total_price).abs() > PRICE_EPSILON {
            return Err(LifecycleError::Validation(format!(
                "total price mismatch: expected {computed}, got {}",
                request.total_price
            )));
        }

        if !self.sessions.holds(&request.table_number, &request.client_id) {
            return Err(LifecycleError::SessionRequired(format!(
                "client {} does not hold table {}",
                request.client_id, request.table_number
            )));
        }

        let items: Vec<OrderItem> = request
            .items
            .into_iter()
            .map(OrderItemInput::into_item)
            .collect();
        let order = Order::new(request.table_number, items, request.total_price);
        let event = self.store.insert(order)?;

        tracing::info!(
            order_id = %event.order.id,
            table = %event.order.table_number,
            items = event.order.items.len(),
            "✅ Order created"
        );
        Ok(event.order)
    }

    /// Advance one item a single stage along its track
    ///
    /// Returns the full order after the mutation (unchanged for the
    /// idempotent same-state case).
    pub fn advance_item(
        &self,
        order_id: &str,
        item_id: &str,
        target: ItemStatus,
    ) -> Result<Order, LifecycleError> {
        let drink_category = self.drink_category.clone();
        let event = self.store.update_with(order_id, |order| {
            if order.is_paid() {
                return Err(LifecycleError::InvalidTransition(format!(
                    "order {} is already paid",
                    order.id
                )));
            }

            let (current, track) = match order.item(item_id) {
                Some(item) => (item.status, item.track(&drink_category)),
                None => {
                    return Err(LifecycleError::NotFound(format!(
                        "item {item_id} not found in order {order_id}"
                    )));
                }
            };

            if current == target {
                return Ok(false);
            }
            if track.next_stage(current) != Some(target) {
                return Err(LifecycleError::InvalidTransition(format!(
                    "{current:?} -> {target:?} is not a single forward step on the {track:?} track"
                )));
            }

            if let Some(item) = order.item_mut(item_id) {
                item.status = target;
            }
            order.recompute_status();
            Ok(true)
        })?;

        match event {
            Some(event) => {
                tracing::info!(
                    order_id = %event.order.id,
                    item_id = %item_id,
                    status = ?target,
                    "Item advanced"
                );
                Ok(event.order)
            }
            None => self.current(order_id),
        }
    }

    /// Advance the whole order one coarse stage
    ///
    /// Fast-forwards every item along its own track to the stage matching
    /// `target`. `PAID` routes through [`Self::close_order`].
    pub fn advance_order(
        &self,
        order_id: &str,
        target: OrderStatus,
    ) -> Result<Order, LifecycleError> {
        if target == OrderStatus::Paid {
            return self.close_order(order_id);
        }

        let drink_category = self.drink_category.clone();
        let event = self.store.update_with(order_id, |order| {
            if order.status == target {
                return Ok(false);
            }
            if order.status.next() != Some(target) {
                return Err(LifecycleError::InvalidTransition(format!(
                    "{:?} -> {target:?} is not a single forward step in the order sequence",
                    order.status
                )));
            }

            for item in &mut order.items {
                fast_forward(item, target, &drink_category);
            }
            order.recompute_status();
            Ok(true)
        })?;

        match event {
            Some(event) => {
                tracing::info!(
                    order_id = %event.order.id,
                    status = ?event.order.status,
                    "Order advanced"
                );
                Ok(event.order)
            }
            None => self.current(order_id),
        }
    }

    /// Close an order (mark it PAID)
    ///
    /// Permitted only once every item is served; closing an already-paid
    /// order is an idempotent no-op.
    pub fn close_order(&self, order_id: &str) -> Result<Order, LifecycleError> {
        let event = self.store.update_with(order_id, |order| match order.status {
            OrderStatus::Paid => Ok(false),
            OrderStatus::Served => {
                order.status = OrderStatus::Paid;
                order.touch();
                Ok(true)
            }
            other => Err(LifecycleError::InvalidTransition(format!(
                "cannot close order from {other:?}: all items must be served first"
            ))),
        })?;

        match event {
            Some(event) => {
                tracing::info!(order_id = %event.order.id, "💰 Order closed");
                Ok(event.order)
            }
            None => self.current(order_id),
        }
    }

    /// Administrative close from any state (walkouts, manual corrections)
    ///
    /// Skips the all-served requirement; still idempotent on PAID.
    pub fn close_order_override(&self, order_id: &str) -> Result<Order, LifecycleError> {
        let event = self.store.update_with(order_id, |order| {
            if order.is_paid() {
                return Ok(false);
            }
            tracing::warn!(
                order_id = %order.id,
                status = ?order.status,
                "⚠️ Order closed by override before all items were served"
            );
            order.status = OrderStatus::Paid;
            order.touch();
            Ok(true)
        })?;

        match event {
            Some(event) => Ok(event.order),
            None => self.current(order_id),
        }
    }

    fn current(&self, order_id: &str) -> Result<Order, LifecycleError> {
        self.store
            .get(order_id)
            .ok_or_else(|| LifecycleError::NotFound(format!("order {order_id} not found")))
    }
}

/// Move one item to the stage of its track matching the coarse `target`
///
/// Items already at or past the matching stage are left alone. Drinks have
/// no cooking stage, so the COOKING fast-forward serves them.
fn fast_forward(item: &mut OrderItem, target: OrderStatus, drink_category: &str) {
    let track = item.track(drink_category);
    item.status = match (track, target, item.status) {
        (Track::Food, OrderStatus::Cooking, ItemStatus::Pending) => ItemStatus::Cooking,
        (Track::Drink, OrderStatus::Cooking, ItemStatus::Pending) => ItemStatus::Served,
        (_, OrderStatus::Served, _) => ItemStatus::Served,
        (_, _, current) => current,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::Database;
    use std::time::Duration;

    struct Fixture {
        lifecycle: OrderLifecycle,
        store: Arc<OrderStore>,
        sessions: Arc<SessionGuard>,
    }

    fn fixture() -> Fixture {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .unwrap();
        let store = Arc::new(OrderStore::open(Arc::new(db), 64).unwrap());
        let sessions = Arc::new(SessionGuard::new(Duration::from_secs(5), 3));
        let lifecycle = OrderLifecycle::new(store.clone(), sessions.clone(), "Minuman");
        Fixture {
            lifecycle,
            store,
            sessions,
        }
    }

    fn request(table: &str, client: &str) -> CreateOrderRequest {
        CreateOrderRequest {
            table_number: table.into(),
            client_id: client.into(),
            items: vec![
                OrderItemInput {
                    name: "Nasi Goreng".into(),
                    quantity: 2,
                    price: 25_000.0,
                    category: "Makanan".into(),
                },
                OrderItemInput {
                    name: "Es Teh".into(),
                    quantity: 1,
                    price: 8_000.0,
                    category: "Minuman".into(),
                },
            ],
            total_price: 58_000.0,
        }
    }

    fn place_order(fx: &Fixture) -> Order {
        fx.sessions.try_acquire("T1", "tablet-1").unwrap();
        fx.lifecycle.create_order(request("T1", "tablet-1")).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn create_requires_a_live_session() {
        let fx = fixture();
        let err = fx.lifecycle.create_order(request("T1", "tablet-1"));
        assert!(matches!(err, Err(LifecycleError::SessionRequired(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn create_rejects_empty_orders() {
        let fx = fixture();
        fx.sessions.try_acquire("T1", "tablet-1").unwrap();
        let mut req = request("T1", "tablet-1");
        req.items.clear();
        req.total_price = 0.0;
        assert!(matches!(
            fx.lifecycle.create_order(req),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn create_rejects_zero_quantity() {
        let fx = fixture();
        fx.sessions.try_acquire("T1", "tablet-1").unwrap();
        let mut req = request("T1", "tablet-1");
        req.items[0].quantity = 0;
        assert!(matches!(
            fx.lifecycle.create_order(req),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn create_rejects_tampered_totals() {
        let fx = fixture();
        fx.sessions.try_acquire("T1", "tablet-1").unwrap();
        let mut req = request("T1", "tablet-1");
        req.total_price = 1_000.0;
        assert!(matches!(
            fx.lifecycle.create_order(req),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn created_order_starts_pending_with_pending_items() {
        let fx = fixture();
        let order = place_order(&fx);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.items.iter().all(|i| i.status == ItemStatus::Pending));
        assert_eq!(fx.store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn food_item_walks_pending_cooking_served() {
        let fx = fixture();
        let order = place_order(&fx);
        let food = order.items[0].id.clone();

        let after = fx
            .lifecycle
            .advance_item(&order.id, &food, ItemStatus::Cooking)
            .unwrap();
        assert_eq!(after.item(&food).unwrap().status, ItemStatus::Cooking);
        // Drink still pending, so the derived status stays PENDING
        assert_eq!(after.status, OrderStatus::Pending);

        let after = fx
            .lifecycle
            .advance_item(&order.id, &food, ItemStatus::Served)
            .unwrap();
        assert_eq!(after.item(&food).unwrap().status, ItemStatus::Served);
    }

    #[tokio::test(start_paused = true)]
    async fn drink_item_goes_straight_to_served() {
        let fx = fixture();
        let order = place_order(&fx);
        let drink = order.items[1].id.clone();

        // COOKING is not a drink stage
        assert!(matches!(
            fx.lifecycle
                .advance_item(&order.id, &drink, ItemStatus::Cooking),
            Err(LifecycleError::InvalidTransition(_))
        ));

        let after = fx
            .lifecycle
            .advance_item(&order.id, &drink, ItemStatus::Served)
            .unwrap();
        assert_eq!(after.item(&drink).unwrap().status, ItemStatus::Served);
    }

    #[tokio::test(start_paused = true)]
    async fn food_item_cannot_skip_cooking() {
        let fx = fixture();
        let order = place_order(&fx);
        let food = order.items[0].id.clone();

        assert!(matches!(
            fx.lifecycle
                .advance_item(&order.id, &food, ItemStatus::Served),
            Err(LifecycleError::InvalidTransition(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn regressions_are_rejected() {
        let fx = fixture();
        let order = place_order(&fx);
        let food = order.items[0].id.clone();
        fx.lifecycle
            .advance_item(&order.id, &food, ItemStatus::Cooking)
            .unwrap();

        assert!(matches!(
            fx.lifecycle
                .advance_item(&order.id, &food, ItemStatus::Pending),
            Err(LifecycleError::InvalidTransition(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn same_state_item_request_is_a_silent_noop() {
        let fx = fixture();
        let order = place_order(&fx);
        let food = order.items[0].id.clone();
        let mut rx = fx.store.subscribe();

        fx.lifecycle
            .advance_item(&order.id, &food, ItemStatus::Cooking)
            .unwrap();
        let first_event = rx.try_recv().unwrap();

        // A second kitchen screen taps the same button
        let after = fx
            .lifecycle
            .advance_item(&order.id, &food, ItemStatus::Cooking)
            .unwrap();
        assert_eq!(after.item(&food).unwrap().status, ItemStatus::Cooking);
        // No second event, no new sequence
        assert!(rx.try_recv().is_err());
        assert_eq!(fx.store.current_sequence().unwrap(), first_event.sequence);
    }

    #[tokio::test(start_paused = true)]
    async fn derived_status_follows_items_to_served() {
        let fx = fixture();
        let order = place_order(&fx);
        let food = order.items[0].id.clone();
        let drink = order.items[1].id.clone();

        fx.lifecycle
            .advance_item(&order.id, &drink, ItemStatus::Served)
            .unwrap();
        let after = fx
            .lifecycle
            .advance_item(&order.id, &food, ItemStatus::Cooking)
            .unwrap();
        // No pending items left, food still cooking
        assert_eq!(after.status, OrderStatus::Cooking);

        let after = fx
            .lifecycle
            .advance_item(&order.id, &food, ItemStatus::Served)
            .unwrap();
        assert_eq!(after.status, OrderStatus::Served);
    }

    #[tokio::test(start_paused = true)]
    async fn close_requires_all_items_served() {
        let fx = fixture();
        let order = place_order(&fx);

        assert!(matches!(
            fx.lifecycle.close_order(&order.id),
            Err(LifecycleError::InvalidTransition(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_idempotent_once_paid() {
        let fx = fixture();
        let order = place_order(&fx);
        let food = order.items[0].id.clone();
        let drink = order.items[1].id.clone();
        fx.lifecycle
            .advance_item(&order.id, &food, ItemStatus::Cooking)
            .unwrap();
        fx.lifecycle
            .advance_item(&order.id, &food, ItemStatus::Served)
            .unwrap();
        fx.lifecycle
            .advance_item(&order.id, &drink, ItemStatus::Served)
            .unwrap();

        let closed = fx.lifecycle.close_order(&order.id).unwrap();
        assert!(closed.is_paid());

        let sequence = fx.store.current_sequence().unwrap();
        let again = fx.lifecycle.close_order(&order.id).unwrap();
        assert!(again.is_paid());
        assert_eq!(fx.store.current_sequence().unwrap(), sequence);
    }

    #[tokio::test(start_paused = true)]
    async fn paid_orders_reject_item_mutations() {
        let fx = fixture();
        let order = place_order(&fx);
        let food = order.items[0].id.clone();
        fx.lifecycle.close_order_override(&order.id).unwrap();

        assert!(matches!(
            fx.lifecycle
                .advance_item(&order.id, &food, ItemStatus::Cooking),
            Err(LifecycleError::InvalidTransition(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn override_closes_from_any_state() {
        let fx = fixture();
        let order = place_order(&fx);

        let closed = fx.lifecycle.close_order_override(&order.id).unwrap();
        assert!(closed.is_paid());
    }

    #[tokio::test(start_paused = true)]
    async fn advance_order_fast_forwards_items_per_track() {
        let fx = fixture();
        let order = place_order(&fx);

        let cooking = fx
            .lifecycle
            .advance_order(&order.id, OrderStatus::Cooking)
            .unwrap();
        assert_eq!(cooking.status, OrderStatus::Cooking);
        assert_eq!(cooking.items[0].status, ItemStatus::Cooking); // food
        assert_eq!(cooking.items[1].status, ItemStatus::Served); // drink skips cooking

        let served = fx
            .lifecycle
            .advance_order(&order.id, OrderStatus::Served)
            .unwrap();
        assert_eq!(served.status, OrderStatus::Served);
        assert!(served.items.iter().all(|i| i.status == ItemStatus::Served));

        let paid = fx
            .lifecycle
            .advance_order(&order.id, OrderStatus::Paid)
            .unwrap();
        assert!(paid.is_paid());
    }

    #[tokio::test(start_paused = true)]
    async fn advance_order_rejects_stage_skips() {
        let fx = fixture();
        let order = place_order(&fx);

        assert!(matches!(
            fx.lifecycle.advance_order(&order.id, OrderStatus::Served),
            Err(LifecycleError::InvalidTransition(_))
        ));
        // PAID from PENDING routes through close, which also refuses
        assert!(matches!(
            fx.lifecycle.advance_order(&order.id, OrderStatus::Paid),
            Err(LifecycleError::InvalidTransition(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn advance_order_same_state_is_a_noop() {
        let fx = fixture();
        let order = place_order(&fx);
        let sequence = fx.store.current_sequence().unwrap();

        let after = fx
            .lifecycle
            .advance_order(&order.id, OrderStatus::Pending)
            .unwrap();
        assert_eq!(after.status, OrderStatus::Pending);
        assert_eq!(fx.store.current_sequence().unwrap(), sequence);
    }

    #[tokio::test(start_paused = true)]
    async fn all_drink_order_lands_on_served_from_cooking_driver() {
        let fx = fixture();
        fx.sessions.try_acquire("T2", "tablet-2").unwrap();
        let order = fx
            .lifecycle
            .create_order(CreateOrderRequest {
                table_number: "T2".into(),
                client_id: "tablet-2".into(),
                items: vec![OrderItemInput {
                    name: "Es Jeruk".into(),
                    quantity: 2,
                    price: 10_000.0,
                    category: "Minuman".into(),
                }],
                total_price: 20_000.0,
            })
            .unwrap();

        let after = fx
            .lifecycle
            .advance_order(&order.id, OrderStatus::Cooking)
            .unwrap();
        // Drinks have no cooking stage, so the derived status is SERVED
        assert_eq!(after.status, OrderStatus::Served);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_ids_are_not_found() {
        let fx = fixture();
        let order = place_order(&fx);

        assert!(matches!(
            fx.lifecycle
                .advance_item(&order.id, "missing-item", ItemStatus::Cooking),
            Err(LifecycleError::NotFound(_))
        ));
        assert!(matches!(
            fx.lifecycle.close_order("missing-order"),
            Err(LifecycleError::NotFound(_))
        ));
    }
}
