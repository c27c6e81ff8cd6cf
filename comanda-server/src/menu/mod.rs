//! Menu catalog store
//!
//! Plain CRUD over the `menu` redb table with an in-memory mirror, same
//! layout as the order store. Catalog entries are snapshotted into order
//! items at creation time, so changing or deleting an entry never touches
//! placed orders — there is no event fan-out here.

use std::sync::Arc;

use dashmap::DashMap;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use shared::menu::{MenuItem, MenuItemCreate};

use crate::orders::StoreResult;

/// Catalog entries: key = item_id, value = JSON-serialized MenuItem
const MENU_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("menu");

/// redb-backed menu catalog
pub struct MenuStore {
    db: Arc<Database>,
    items: DashMap<String, MenuItem>,
}

impl MenuStore {
    /// Open the catalog on an existing database, reloading all entries
    pub fn open(db: Arc<Database>) -> StoreResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(MENU_TABLE)?;
        }
        write_txn.commit()?;

        let items = DashMap::new();
        let read_txn = db.begin_read()?;
        {
            let table = read_txn.open_table(MENU_TABLE)?;
            for entry in table.iter()? {
                let (key, value) = entry?;
                let item: MenuItem = serde_json::from_slice(value.value())?;
                items.insert(key.value().to_string(), item);
            }
        }

        tracing::info!("🍽️ Menu catalog opened with {} item(s)", items.len());

        Ok(Self { db, items })
    }

    pub fn get(&self, item_id: &str) -> Option<MenuItem> {
        self.items.get(item_id).map(|entry| entry.value().clone())
    }

    /// All catalog entries, sorted by category then name for stable listings
    pub fn all(&self) -> Vec<MenuItem> {
        let mut items: Vec<MenuItem> = self
            .items
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.name.cmp(&b.name))
        });
        items
    }

    /// Persist a new catalog entry with a server-assigned id
    pub fn create(&self, input: MenuItemCreate) -> StoreResult<MenuItem> {
        let item = MenuItem {
            id: uuid::Uuid::new_v4().to_string(),
            name: input.name,
            price: input.price,
            category: input.category,
        };
        self.persist(&item)?;
        self.items.insert(item.id.clone(), item.clone());
        tracing::info!(item_id = %item.id, name = %item.name, "Menu item created");
        Ok(item)
    }

    /// Remove an entry; returns whether it existed
    pub fn delete(&self, item_id: &str) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed;
        {
            let mut table = write_txn.open_table(MENU_TABLE)?;
            existed = table.remove(item_id)?.is_some();
        }
        write_txn.commit()?;
        self.items.remove(item_id);
        if existed {
            tracing::info!(item_id = %item_id, "Menu item deleted");
        }
        Ok(existed)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn persist(&self, item: &MenuItem) -> StoreResult<()> {
        let bytes = serde_json::to_vec(item)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(MENU_TABLE)?;
            table.insert(item.id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
