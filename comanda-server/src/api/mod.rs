//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查接口
//! - [`orders`] - 订单生命周期接口
//! - [`menu`] - 菜单管理接口

pub mod health;
pub mod menu;
pub mod orders;

// Re-export common types for handlers
pub use crate::utils::{AppResponse, AppResult};
