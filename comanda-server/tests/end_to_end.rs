//! 端到端场景: TCP 总线 + HTTP API + 客户端库
//!
//! 在随机端口上拉起完整栈, 用 comanda-client 驱动真实链路:
//! 平板锁台下单, 厨房看板与管理端通过总线同步各自的投影。

use std::sync::Arc;
use std::time::Duration;

use comanda_client::{
    BusClient, ClientConfig, ClientError, ClientRole, HttpClient, Role, Synchronizer, TableSession,
};
use comanda_server::{Config, ServerState};
use shared::order::{CreateOrderRequest, OrderItemInput, OrderStatus};

/// 随机高位端口, 避免并行测试互相冲突
fn random_port() -> u16 {
    10000 + (rand::random::<u16>() % 20000)
}

fn food(name: &str, quantity: u32, price: f64) -> OrderItemInput {
    OrderItemInput {
        name: name.into(),
        quantity,
        price,
        category: "Makanan".into(),
    }
}

fn drink(name: &str, quantity: u32, price: f64) -> OrderItemInput {
    OrderItemInput {
        name: name.into(),
        quantity,
        price,
        category: "Minuman".into(),
    }
}

fn order_request(table: &str, client: &str, items: Vec<OrderItemInput>) -> CreateOrderRequest {
    let total = items.iter().map(|i| i.price * f64::from(i.quantity)).sum();
    CreateOrderRequest {
        table_number: table.into(),
        client_id: client.into(),
        items,
        total_price: total,
    }
}

struct TestStack {
    state: ServerState,
    base_url: String,
    bus_addr: String,
}

async fn start_stack(dir: &tempfile::TempDir) -> TestStack {
    start_stack_with(dir, |_| {}).await
}

/// 拉起总线 + HTTP 服务, 返回客户端可用的地址
async fn start_stack_with(dir: &tempfile::TempDir, tweak: impl FnOnce(&mut Config)) -> TestStack {
    let bus_port = random_port();
    let mut config = Config::with_overrides(dir.path().to_string_lossy(), 0, bus_port);
    tweak(&mut config);
    let state = ServerState::initialize(&config).await;
    state.start_background_tasks();

    let bus_state = state.clone();
    let bus_shutdown = state.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = comanda_server::bus::start_tcp_server(bus_state, bus_shutdown).await {
            eprintln!("message bus exited early: {e}");
        }
    });

    // HTTP 绑定 0 号端口, 由系统分配
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let app = comanda_server::core::build_app(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestStack {
        state,
        base_url,
        bus_addr: format!("127.0.0.1:{bus_port}"),
    }
}

fn client_config(stack: &TestStack, role: ClientRole, client_id: &str) -> ClientConfig {
    ClientConfig::new(stack.base_url.clone(), stack.bus_addr.clone(), role)
        .with_client_id(client_id)
        .with_reconnect(10, 100)
}

/// 总线监听是异步拉起的, 连接失败就稍后重试
async fn connect_bus(config: &ClientConfig) -> BusClient {
    for _ in 0..100 {
        if let Ok(bus) = BusClient::connect(config).await {
            return bus;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("message bus did not come up on {}", config.bus_addr);
}

async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..250 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tablet_order_flows_to_kitchen_board() {
    let dir = tempfile::tempdir().unwrap();
    let stack = start_stack(&dir).await;

    // 厨房看板先上线
    let kitchen_config = client_config(&stack, ClientRole::Kitchen, "kitchen-board");
    let kitchen = Arc::new(Synchronizer::new(
        Role::Kitchen,
        HttpClient::new(&kitchen_config),
    ));
    tokio::spawn(kitchen.clone().run(kitchen_config, stack.state.shutdown_token()));

    // 平板锁定 5 号桌后下单
    let tablet_config = client_config(&stack, ClientRole::Ordering, "tablet-1");
    let bus = connect_bus(&tablet_config).await;
    let _session = TableSession::acquire(&bus, "5").await.unwrap();

    let api = HttpClient::new(&tablet_config);
    let order = api
        .create_order(&order_request(
            "5",
            "tablet-1",
            vec![food("Nasi Goreng", 1, 3.5), drink("Es Teh", 2, 1.0)],
        ))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    // NEW_ORDER 推到厨房看板
    wait_until("kitchen board to show the new order", || {
        kitchen.get(&order.id).is_some()
    })
    .await;

    // 后厨整单推进, 看板跟进
    api.advance_order_status(&order.id, OrderStatus::Cooking)
        .await
        .unwrap();
    wait_until("kitchen board to show COOKING", || {
        kitchen
            .get(&order.id)
            .is_some_and(|o| o.status == OrderStatus::Cooking)
    })
    .await;

    api.advance_order_status(&order.id, OrderStatus::Served)
        .await
        .unwrap();
    wait_until("kitchen board to show SERVED", || {
        kitchen
            .get(&order.id)
            .is_some_and(|o| o.status == OrderStatus::Served)
    })
    .await;

    // 结账: 订单离开厨房看板
    api.close_order(&order.id).await.unwrap();
    wait_until("paid order to leave the kitchen board", || {
        kitchen.get(&order.id).is_none()
    })
    .await;

    stack.state.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn paid_orders_stay_on_the_admin_dashboard() {
    let dir = tempfile::tempdir().unwrap();
    let stack = start_stack(&dir).await;

    let kitchen_config = client_config(&stack, ClientRole::Kitchen, "kitchen-board");
    let kitchen = Arc::new(Synchronizer::new(
        Role::Kitchen,
        HttpClient::new(&kitchen_config),
    ));
    tokio::spawn(kitchen.clone().run(kitchen_config, stack.state.shutdown_token()));

    let admin_config = client_config(&stack, ClientRole::Admin, "back-office");
    let admin = Arc::new(Synchronizer::new(Role::Admin, HttpClient::new(&admin_config)));
    tokio::spawn(admin.clone().run(admin_config, stack.state.shutdown_token()));

    let tablet_config = client_config(&stack, ClientRole::Ordering, "tablet-2");
    let bus = connect_bus(&tablet_config).await;
    let _session = TableSession::acquire(&bus, "3").await.unwrap();

    let api = HttpClient::new(&tablet_config);
    let order = api
        .create_order(&order_request("3", "tablet-2", vec![food("Sate", 2, 2.0)]))
        .await
        .unwrap();

    wait_until("both boards to show the order", || {
        kitchen.get(&order.id).is_some() && admin.get(&order.id).is_some()
    })
    .await;

    // 跑单: 管理端强制关单
    api.close_order_override(&order.id).await.unwrap();

    wait_until("kitchen board to drop the paid order", || {
        kitchen.get(&order.id).is_none()
    })
    .await;
    wait_until("admin dashboard to keep the paid order", || {
        admin
            .get(&order.id)
            .is_some_and(|o| o.status == OrderStatus::Paid)
    })
    .await;

    stack.state.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ordering_board_only_sees_its_own_table() {
    let dir = tempfile::tempdir().unwrap();
    let stack = start_stack(&dir).await;

    // 4 号桌平板: 会话 + 本桌投影
    let tablet_config = client_config(&stack, ClientRole::Ordering, "tablet-4");
    let bus = connect_bus(&tablet_config).await;
    let _session = TableSession::acquire(&bus, "4").await.unwrap();
    let board = Arc::new(Synchronizer::new(
        Role::Ordering { table: "4".into() },
        HttpClient::new(&tablet_config),
    ));
    tokio::spawn(
        board
            .clone()
            .run(tablet_config.clone(), stack.state.shutdown_token()),
    );

    // 9 号桌平板只下单
    let other_config = client_config(&stack, ClientRole::Ordering, "tablet-9");
    let other_bus = connect_bus(&other_config).await;
    let _other_session = TableSession::acquire(&other_bus, "9").await.unwrap();

    let api = HttpClient::new(&tablet_config);
    let other_api = HttpClient::new(&other_config);
    let mine = api
        .create_order(&order_request(
            "4",
            "tablet-4",
            vec![food("Gado Gado", 1, 3.0)],
        ))
        .await
        .unwrap();
    let theirs = other_api
        .create_order(&order_request("9", "tablet-9", vec![food("Bakso", 1, 3.0)]))
        .await
        .unwrap();

    wait_until("table 4 board to show its order", || {
        board.get(&mine.id).is_some()
    })
    .await;

    // 9 号桌的订单不会出现在 4 号桌的投影里
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(board.get(&theirs.id).is_none());
    assert_eq!(board.len(), 1);

    stack.state.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn table_lock_is_exclusive_until_the_lease_expires() {
    let dir = tempfile::tempdir().unwrap();
    let stack = start_stack_with(&dir, |config| {
        // 缩短租约窗口, 让过期接管落在测试时限内
        config.heartbeat_interval_secs = 1;
        config.liveness_factor = 1;
    })
    .await;

    let config_a = client_config(&stack, ClientRole::Ordering, "tablet-a");
    let bus_a = connect_bus(&config_a).await;
    let session_a = TableSession::acquire(&bus_a, "7").await.unwrap();

    // 占用期间其他设备被拒
    let config_b = client_config(&stack, ClientRole::Ordering, "tablet-b");
    let bus_b = connect_bus(&config_b).await;
    let denied = TableSession::acquire(&bus_b, "7").await;
    assert!(matches!(denied, Err(ClientError::Denied(_))));

    // A 停止心跳; 窗口过后 B 接管
    session_a.release();
    let mut taken = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if TableSession::acquire(&bus_b, "7").await.is_ok() {
            taken = true;
            break;
        }
    }
    assert!(taken, "table was never released after the lease expired");

    stack.state.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn order_creation_requires_the_table_token() {
    let dir = tempfile::tempdir().unwrap();
    let stack = start_stack_with(&dir, |config| {
        config.table_token = "kitchen-pass".into();
    })
    .await;

    let tablet_config = client_config(&stack, ClientRole::Ordering, "tablet-5");
    let bus = connect_bus(&tablet_config).await;
    let _session = TableSession::acquire(&bus, "6").await.unwrap();

    let request = order_request("6", "tablet-5", vec![food("Soto", 1, 3.0)]);

    // 没带令牌: 401 信封带错误码
    let bare = HttpClient::new(&tablet_config);
    let err = bare.create_order(&request).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { ref code, .. } if code == "E3002"));

    // 正确令牌放行
    let authed = HttpClient::new(&tablet_config).with_token("kitchen-pass");
    authed.create_order(&request).await.unwrap();

    stack.state.shutdown();
}
