use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use tradeflow_contracts::{Contract, ContractOrder};
use tradeflow_core::{
    ContractId, ExpectedVersion, InventoryItemId, OrderId, ProductId, PurchaseOrderId,
    WarehouseId,
};
use tradeflow_inventory::InventoryItem;
use tradeflow_products::Product;
use tradeflow_purchasing::PurchaseOrder;
use tradeflow_sales::Order;

use super::query::{ContractFilter, OrderFilter, Pagination, PurchaseOrderFilter};

/// Persistence failures, independent of the backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique key violated or optimistic version check failed.
    #[error("store conflict: {0}")]
    Conflict(String),

    /// The row an update targeted does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Driver, connection or transaction failure.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A persisted row could not be turned back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// One open transaction against the store.
///
/// Reads see the transaction's own writes. Nothing is visible to other
/// transactions until [`StoreTx::commit`]; dropping an uncommitted
/// transaction rolls it back.
///
/// Conditional stock mutations return the number of rows they changed (0 or
/// 1). A 0 means the guard in the `WHERE` clause did not hold and nothing was
/// written.
#[async_trait]
pub trait StoreTx: Send {
    // Products

    /// Fails with `Conflict` when the SKU is taken.
    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError>;

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    // Inventory

    async fn insert_inventory_item(&mut self, item: &InventoryItem) -> Result<(), StoreError>;

    async fn get_inventory_item(
        &mut self,
        id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, StoreError>;

    /// Active stock rows for a product, most available first.
    async fn find_active_inventory(
        &mut self,
        product_id: ProductId,
    ) -> Result<Vec<InventoryItem>, StoreError>;

    /// The active row for a product in one warehouse, lowest id first.
    /// Expired and damaged rows are never returned.
    async fn find_inventory_in_warehouse(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<InventoryItem>, StoreError>;

    /// `reserved += qty` only if the row is active and `quantity - reserved >= qty`.
    async fn try_reserve(
        &mut self,
        id: InventoryItemId,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// `reserved -= qty` only if `reserved >= qty`.
    async fn try_release(
        &mut self,
        id: InventoryItemId,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// `quantity -= qty, reserved -= qty` only if `reserved >= qty`.
    async fn try_commit(
        &mut self,
        id: InventoryItemId,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// `quantity += qty`.
    async fn add_on_hand(
        &mut self,
        id: InventoryItemId,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Writes the row's status and `updated_at`. Quantities are untouched.
    async fn update_inventory_status(&mut self, item: &InventoryItem) -> Result<u64, StoreError>;

    // Orders

    /// Inserts the order and its items. Fails with `Conflict` on a taken order number.
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Orders matching `filter`, newest first, with their items.
    async fn list_orders(
        &mut self,
        filter: &OrderFilter,
        page: Pagination,
    ) -> Result<Vec<Order>, StoreError>;

    /// Writes the order back and returns its new version.
    async fn update_order(
        &mut self,
        order: &Order,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError>;

    // Purchase orders

    async fn insert_purchase_order(&mut self, po: &PurchaseOrder) -> Result<(), StoreError>;

    async fn get_purchase_order(
        &mut self,
        id: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, StoreError>;

    /// Purchase orders matching `filter`, newest first, with their items.
    async fn list_purchase_orders(
        &mut self,
        filter: &PurchaseOrderFilter,
        page: Pagination,
    ) -> Result<Vec<PurchaseOrder>, StoreError>;

    async fn update_purchase_order(
        &mut self,
        po: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError>;

    // Contracts

    async fn insert_contract(&mut self, contract: &Contract) -> Result<(), StoreError>;

    async fn get_contract(&mut self, id: ContractId) -> Result<Option<Contract>, StoreError>;

    async fn update_contract(
        &mut self,
        contract: &Contract,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError>;

    /// Contracts matching `filter`, ordered by contract number.
    async fn list_contracts(
        &mut self,
        filter: &ContractFilter,
        page: Pagination,
    ) -> Result<Vec<Contract>, StoreError>;

    /// Contracts in status `Active`, ordered by contract number. Unpaginated.
    async fn list_active_contracts(&mut self) -> Result<Vec<Contract>, StoreError>;

    async fn append_contract_order(&mut self, entry: &ContractOrder) -> Result<(), StoreError>;

    /// Log entries for a contract, oldest first.
    async fn list_contract_orders(
        &mut self,
        contract_id: ContractId,
    ) -> Result<Vec<ContractOrder>, StoreError>;

    // Boundary

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Transactional store: the only way engine code touches persistent state.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;
}

#[async_trait]
impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        (**self).begin().await
    }
}
