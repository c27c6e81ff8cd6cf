//! Menu API Handlers

use axum::{
    Json,
    extract::{Path, State},
};

use shared::menu::{MenuItem, MenuItemCreate};

use crate::core::ServerState;
use crate::utils::{AppError, AppResult};

/// GET /api/menu - 获取全部菜单项
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<Vec<MenuItem>>> {
    Ok(Json(state.menu.all()))
}

/// POST /api/menu - 创建菜单项
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<MenuItemCreate>,
) -> AppResult<Json<MenuItem>> {
    let item = state
        .menu
        .create(payload)
        .map_err(|e| AppError::database(e.to_string()))?;
    Ok(Json(item))
}

/// DELETE /api/menu/{id} - 删除菜单项
pub async fn delete(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<bool>> {
    let existed = state
        .menu
        .delete(&id)
        .map_err(|e| AppError::database(e.to_string()))?;
    Ok(Json(existed))
}
