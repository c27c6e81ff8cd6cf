//! Comanda Client - observer library for the order sync engine
//!
//! Everything a client device needs to take part in the order flow:
//!
//! - [`HttpClient`] - typed REST calls (orders, menu)
//! - [`BusClient`] - TCP bus connection, handshake, RPC, event stream
//! - [`TableSession`] - table acquisition + background heartbeat
//! - [`Synchronizer`] - role-parameterized live order projection
//!
//! An ordering tablet, the kitchen board and the admin dashboard all run
//! the same stack and differ only in their [`Role`].

pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod session;
pub mod sync;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::HttpClient;
pub use net::BusClient;
pub use session::TableSession;
pub use sync::{Role, Synchronizer};

// Re-export shared types for convenience
pub use shared::message::{BusMessage, EventType};
pub use shared::order::{
    CreateOrderRequest, ItemStatus, Order, OrderEvent, OrderItem, OrderStatus,
};
pub use shared::session::ClientRole;
