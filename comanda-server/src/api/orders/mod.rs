//! Order API Module
//!
//! Thin HTTP boundary over the lifecycle engine. Reads come straight from
//! the in-memory mirror; every mutation goes through [`OrderLifecycle`] so
//! the HTTP path and the bus path enforce identical rules.
//!
//! [`OrderLifecycle`]: crate::orders::OrderLifecycle

mod handler;

pub use handler::{UpdateItemStatusRequest, UpdateOrderStatusRequest};

use axum::{
    Router,
    routing::{get, put},
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list).post(handler::create))
        .route("/active", get(handler::active))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/status", put(handler::update_status))
        .route(
            "/{id}/items/{item_id}/status",
            put(handler::update_item_status),
        )
}
