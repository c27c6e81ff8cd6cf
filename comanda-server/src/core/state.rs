use std::sync::Arc;

use redb::Database;
use tokio_util::sync::CancellationToken;

use crate::core::Config;
use crate::menu::MenuStore;
use crate::orders::{OrderLifecycle, OrderStore};
use crate::sessions::SessionGuard;

/// 服务器状态 - 持有所有服务的单例引用
///
/// ServerState 是同步引擎的核心数据结构，持有所有服务的共享引用。
/// 使用 Arc 实现浅拷贝，每个连接和请求各持一份。
///
/// # 服务组件
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | store | Arc<OrderStore> | 订单存储 + 事件广播 |
/// | sessions | Arc<SessionGuard> | 桌台会话守卫 |
/// | lifecycle | Arc<OrderLifecycle> | 订单生命周期状态机 |
/// | menu | Arc<MenuStore> | 菜单存储 |
/// | shutdown | CancellationToken | 全局关闭信号 |
///
/// # 使用示例
///
/// ```ignore
/// let state = ServerState::initialize(&config).await;
/// state.start_background_tasks();
///
/// // 订阅订单事件
/// let events = state.store.subscribe();
///
/// // 申请桌台
/// state.sessions.try_acquire("5", "tablet-1")?;
/// ```
#[derive(Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// 订单存储 (redb 持久化 + 内存缓存 + 事件广播)
    pub store: Arc<OrderStore>,
    /// 桌台会话守卫
    pub sessions: Arc<SessionGuard>,
    /// 订单生命周期状态机
    pub lifecycle: Arc<OrderLifecycle>,
    /// 菜单存储
    pub menu: Arc<MenuStore>,
    /// 全局关闭信号 (连接任务持有 child token)
    shutdown: CancellationToken,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录 (确保目录存在)
    /// 2. 数据库 (work_dir/comanda.redb，订单和菜单共用)
    /// 3. 各服务 (OrderStore, MenuStore, SessionGuard, OrderLifecycle)
    ///
    /// # Panics
    ///
    /// 工作目录或数据库初始化失败时 panic
    pub async fn initialize(config: &Config) -> Self {
        // 0. Ensure work_dir exists
        config
            .ensure_work_dir()
            .expect("Failed to create work directory");

        // 1. Open the database (orders + menu share one file)
        let db_path = config.database_path();
        let db = Arc::new(Database::create(&db_path).expect("Failed to open database"));

        // 2. Initialize services
        let store = Arc::new(
            OrderStore::open(db.clone(), config.event_buffer_size)
                .expect("Failed to open order store"),
        );
        let menu = Arc::new(MenuStore::open(db).expect("Failed to open menu store"));
        let sessions = Arc::new(SessionGuard::new(
            config.heartbeat_interval(),
            config.liveness_factor,
        ));
        let lifecycle = Arc::new(OrderLifecycle::new(
            store.clone(),
            sessions.clone(),
            config.drink_category.clone(),
        ));

        Self {
            config: config.clone(),
            store,
            sessions,
            lifecycle,
            menu,
            shutdown: CancellationToken::new(),
        }
    }

    /// 启动后台任务
    ///
    /// 必须在 `Server::run()` 之前调用
    ///
    /// 启动的任务：
    /// - 会话清扫器：每个心跳周期回收过期租约 (仅为内存卫生，
    ///   过期判定在 try_acquire/heartbeat 时已惰性生效)
    pub fn start_background_tasks(&self) {
        let sessions = self.sessions.clone();
        let shutdown = self.shutdown.child_token();
        let period = self.config.heartbeat_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = sessions.sweep();
                        if removed > 0 {
                            tracing::debug!("Session sweep reclaimed {} expired lease(s)", removed);
                        }
                    }
                }
            }
        });
    }

    /// 获取全局关闭信号的子 token
    ///
    /// 连接任务各持一份，服务器关闭时统一取消
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// 触发全局关闭
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
