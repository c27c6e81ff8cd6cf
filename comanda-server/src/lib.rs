//! Comanda Edge Server - 餐厅桌边点餐订单同步引擎
//!
//! # 架构概述
//!
//! 本模块是订单同步引擎的主入口，提供以下核心功能：
//!
//! - **桌台会话** (`sessions`): 心跳续约的桌台租约，同桌同时只允许一台设备下单
//! - **订单生命周期** (`orders`): 厨房/饮品双轨状态机 + redb 持久化 + 事件广播
//! - **消息总线** (`bus`): 长连接 TCP 推送，按订单保序
//! - **HTTP API** (`api`): RESTful 查询与状态流转接口
//!
//! # 模块结构
//!
//! ```text
//! comanda-server/src/
//! ├── core/       # 配置、状态、HTTP 服务器
//! ├── sessions/   # 桌台会话守卫
//! ├── orders/     # 订单存储 + 生命周期状态机
//! ├── menu/       # 菜单目录
//! ├── bus/        # TCP 消息总线 (事件推送)
//! ├── api/        # HTTP 路由和处理器
//! └── utils/      # 错误、日志
//! ```

pub mod api;
pub mod bus;
pub mod core;
pub mod menu;
pub mod orders;
pub mod sessions;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use menu::MenuStore;
pub use orders::{OrderLifecycle, OrderStore};
pub use sessions::SessionGuard;
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 初始化进程环境 (dotenv + 日志)
///
/// 必须在任何 tracing 调用之前执行。日志级别、格式与日志目录
/// 分别取自 `LOG_LEVEL`、`ENVIRONMENT` 和 `LOG_DIR` 环境变量。
pub fn setup_environment() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present (missing file is fine)
    dotenv::dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let json_format = std::env::var("ENVIRONMENT")
        .map(|e| e == "production")
        .unwrap_or(false);
    let log_dir = std::env::var("LOG_DIR").ok();
    init_logger_with_file(&log_level, json_format, log_dir.as_deref())?;

    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
   ______                                 __
  / ____/___  ____ ___  ____ _____  ____/ /___ _
 / /   / __ \/ __ `__ \/ __ `/ __ \/ __  / __ `/
/ /___/ /_/ / / / / / / /_/ / / / / /_/ / /_/ /
\____/\____/_/ /_/ /_/\__,_/_/ /_/\__,_/\__,_/
    "#
    );
}
