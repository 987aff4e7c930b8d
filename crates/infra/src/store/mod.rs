//! Transactional store boundary.
//!
//! Engine code only ever talks to [`Store`] / [`StoreTx`]. Two
//! implementations are provided:
//! - [`in_memory::InMemoryStore`] for tests and local runs
//! - [`postgres::PostgresStore`] for persistent deployments

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{ContractFilter, OrderFilter, Pagination, PurchaseOrderFilter};
pub use r#trait::{Store, StoreError, StoreTx};
