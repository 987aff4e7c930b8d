//! Purchasing domain module (purchase orders and goods receipt).
//!
//! Pure domain logic; stock updates for received goods are applied by
//! `tradeflow-infra`.

pub mod order;
pub mod status;

pub use order::{
    CreatePurchaseOrder, PoItem, PoLine, PurchaseOrder, PurchaseOrderRecord, Receipt,
    ReceivedStock,
};
pub use status::{LineStatus, PurchaseOrderStatus};
