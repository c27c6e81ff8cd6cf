//! Menu catalog types
//!
//! The catalog itself is a thin boundary: the engine only reads it at
//! order-creation time (clients snapshot name/price/category into order
//! items) and passes CRUD calls through.

use serde::{Deserialize, Serialize};

/// A catalog entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub category: String,
}

/// Catalog entry creation payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuItemCreate {
    pub name: String,
    pub price: f64,
    pub category: String,
}
