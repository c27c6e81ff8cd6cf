//! 工具模块
//!
//! - [`error`] - 统一错误处理
//! - [`logger`] - 日志基础设施

pub mod error;
pub mod logger;

pub use error::{AppError, AppResponse, AppResult, ok, ok_with_message};
pub use logger::{init_logger, init_logger_with_file};
