use std::path::PathBuf;
use std::time::Duration;

/// 服务器配置 - 点餐节点的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/comanda | 工作目录 |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | MESSAGE_TCP_PORT | 8081 | TCP 消息总线端口 |
/// | TABLE_TOKEN | (空) | 下单接口的桌台令牌，空值表示禁用校验 |
/// | HEARTBEAT_INTERVAL_SECS | 5 | 客户端心跳间隔(秒) |
/// | LIVENESS_FACTOR | 3 | 租约存活窗口 = 心跳间隔 × 此系数 |
/// | DRINK_CATEGORY | Minuman | 饮品分类名称 (饮品跳过烹饪阶段) |
/// | EVENT_BUFFER_SIZE | 1024 | 订单事件广播缓冲区容量 |
/// | ENVIRONMENT | development | 运行环境 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/comanda HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// TCP 消息总线端口 (用于客户端直连)
    pub message_tcp_port: u16,
    /// 下单接口的桌台令牌 (空字符串 = 禁用校验，仅限开发环境)
    pub table_token: String,
    /// 客户端心跳间隔 (秒)
    pub heartbeat_interval_secs: u64,
    /// 租约存活窗口系数: 存活窗口 = 心跳间隔 × 此系数
    pub liveness_factor: u32,
    /// 饮品分类名称，该分类的餐品走 PENDING → SERVED 两段流程
    pub drink_category: String,
    /// 订单事件广播缓冲区容量
    pub event_buffer_size: usize,
    /// 运行环境: development | staging | production
    pub environment: String,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/comanda".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            message_tcp_port: std::env::var("MESSAGE_TCP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8081),
            table_token: std::env::var("TABLE_TOKEN").unwrap_or_default(),
            heartbeat_interval_secs: std::env::var("HEARTBEAT_INTERVAL_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5),
            liveness_factor: std::env::var("LIVENESS_FACTOR")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3),
            drink_category: std::env::var("DRINK_CATEGORY")
                .unwrap_or_else(|_| shared::order::DEFAULT_DRINK_CATEGORY.into()),
            event_buffer_size: std::env::var("EVENT_BUFFER_SIZE")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(1024),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(
        work_dir: impl Into<String>,
        http_port: u16,
        message_tcp_port: u16,
    ) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config.message_tcp_port = message_tcp_port;
        config
    }

    /// 客户端心跳间隔
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// 桌台租约存活窗口: 心跳间隔 × 存活系数
    ///
    /// 超过此窗口未收到心跳的租约视为过期，可被其他客户端接管
    pub fn liveness_window(&self) -> Duration {
        self.heartbeat_interval() * self.liveness_factor
    }

    /// 订单数据库文件路径
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("comanda.redb")
    }

    /// 确保工作目录存在
    pub fn ensure_work_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.work_dir)
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
