//! Order API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Deserialize;

use shared::order::{CreateOrderRequest, ItemStatus, Order, OrderStatus};

use crate::core::{Config, ServerState};
use crate::utils::{AppError, AppResult};

/// 常数时间比较两个令牌，避免比较耗时泄露前缀长度
fn token_matches(expected: &str, presented: &str) -> bool {
    let a = expected.as_bytes();
    let b = presented.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// 校验 `Authorization: Bearer <token>` 桌台令牌
///
/// 配置的令牌为空时跳过校验 (开发环境)
fn authorize_table(config: &Config, headers: &HeaderMap) -> Result<(), AppError> {
    if config.table_token.is_empty() {
        return Ok(());
    }

    let presented = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidToken)?;

    if !token_matches(&config.table_token, presented) {
        return Err(AppError::InvalidToken);
    }

    Ok(())
}

/// List all orders, first-come-first-served
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(state.store.all()))
}

/// List active (unpaid) orders
pub async fn active(State(state): State<ServerState>) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(state.store.active()))
}

/// Get order by id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state
        .store
        .get(&id)
        .ok_or_else(|| AppError::not_found(format!("Order {} not found", id)))?;
    Ok(Json(order))
}

/// Create an order
///
/// Requires the table token and a live table session for the payload's
/// `client_id` / `table_number`.
pub async fn create(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<Json<Order>> {
    authorize_table(&state.config, &headers)?;

    let order = state.lifecycle.create_order(payload)?;
    Ok(Json(order))
}

/// Order status update request
#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    /// Close from any state (admin override). Only honored for PAID.
    #[serde(default)]
    pub force: bool,
}

/// Advance the whole order one step, or close it
pub async fn update_status(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<Order>> {
    let order = if payload.force && payload.status == OrderStatus::Paid {
        state.lifecycle.close_order_override(&id)?
    } else {
        state.lifecycle.advance_order(&id, payload.status)?
    };
    Ok(Json(order))
}

/// Item status update request
#[derive(Debug, Deserialize)]
pub struct UpdateItemStatusRequest {
    pub status: ItemStatus,
}

/// Advance a single item one step along its track
pub async fn update_item_status(
    State(state): State<ServerState>,
    Path((id, item_id)): Path<(String, String)>,
    Json(payload): Json<UpdateItemStatusRequest>,
) -> AppResult<Json<Order>> {
    let order = state.lifecycle.advance_item(&id, &item_id, payload.status)?;
    Ok(Json(order))
}
