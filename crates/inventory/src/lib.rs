//! Inventory domain module.
//!
//! Stock rows per product and warehouse, with the pure rules behind the
//! ledger operations (reserve, release, commit, receive). Persistence and
//! atomicity live in `tradeflow-infra`.

pub mod item;

pub use item::{InventoryItem, InventoryStatus, StockItem};
