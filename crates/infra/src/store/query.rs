//! Listing filters and pagination for the store's read side.
//!
//! Every filter field is optional; `None` matches everything. Listings are
//! always paginated.

use serde::{Deserialize, Serialize};

use tradeflow_contracts::{Contract, ContractStatus};
use tradeflow_core::{CompanyId, SupplierId, UserId};
use tradeflow_purchasing::{PurchaseOrder, PurchaseOrderStatus};
use tradeflow_sales::{Order, OrderStatus, PaymentStatus};

/// Page window for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    /// 0-based.
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    /// Apply the window to an already ordered iterator.
    pub(crate) fn window<T>(&self, rows: impl Iterator<Item = T>) -> Vec<T> {
        rows.skip(self.offset as usize).take(self.limit as usize).collect()
    }
}

/// Order listing criteria. Results come newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub user_id: Option<UserId>,
    pub company_id: Option<CompanyId>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        let owner = &order.record().owner;
        self.status.is_none_or(|s| order.status() == s)
            && self.payment_status.is_none_or(|s| order.payment_status() == s)
            && self.user_id.is_none_or(|id| owner.user_id == Some(id))
            && self.company_id.is_none_or(|id| owner.company_id == Some(id))
    }
}

/// Purchase order listing criteria. Results come newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderFilter {
    pub status: Option<PurchaseOrderStatus>,
    pub supplier_id: Option<SupplierId>,
}

impl PurchaseOrderFilter {
    pub fn matches(&self, po: &PurchaseOrder) -> bool {
        self.status.is_none_or(|s| po.status() == s)
            && self.supplier_id.is_none_or(|id| po.record().supplier_id == id)
    }
}

/// Contract listing criteria. Results come in contract number order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractFilter {
    pub status: Option<ContractStatus>,
    pub company_id: Option<CompanyId>,
}

impl ContractFilter {
    pub fn matches(&self, contract: &Contract) -> bool {
        self.status.is_none_or(|s| contract.status() == s)
            && self.company_id.is_none_or(|id| contract.company_id() == id)
    }
}
