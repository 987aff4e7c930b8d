//! Transactional workflow engine: the store boundary and the operations that
//! move stock, orders, purchase orders and contracts through it.

pub mod config;
pub mod contracts;
pub mod error;
pub mod fulfillment;
pub mod ledger;
pub mod receiving;
pub mod scheduler;
pub mod store;

pub use config::EngineConfig;
pub use contracts::{ContractLineRequest, ContractRequest, ContractUpdate, Contracts};
pub use error::WorkflowError;
pub use fulfillment::{OrderFulfillment, OrderLineRequest, OrderRequest, OrderUpdate};
pub use ledger::InventoryLedger;
pub use receiving::{
    PoLineRequest, PurchaseOrderRequest, PurchaseOrderUpdate, PurchaseOrders, ReceiptLine,
};
pub use scheduler::{ContractScheduler, ContractSchedulerRunner, RunnerStats, SchedulerHandle};
pub use store::{
    ContractFilter, InMemoryStore, OrderFilter, Pagination, PostgresStore, PurchaseOrderFilter,
    Store, StoreError, StoreTx,
};
