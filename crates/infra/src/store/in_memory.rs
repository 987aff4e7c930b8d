use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use tradeflow_contracts::{Contract, ContractOrder, ContractStatus};
use tradeflow_core::{
    AggregateRoot, ContractId, ExpectedVersion, InventoryItemId, OrderId, ProductId,
    PurchaseOrderId, WarehouseId,
};
use tradeflow_inventory::InventoryItem;
use tradeflow_products::Product;
use tradeflow_purchasing::PurchaseOrder;
use tradeflow_sales::Order;

use super::query::{ContractFilter, OrderFilter, Pagination, PurchaseOrderFilter};
use super::r#trait::{Store, StoreError, StoreTx};

#[derive(Debug, Clone, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    inventory: HashMap<InventoryItemId, InventoryItem>,
    orders: HashMap<OrderId, Order>,
    purchase_orders: HashMap<PurchaseOrderId, PurchaseOrder>,
    contracts: HashMap<ContractId, Contract>,
    contract_orders: Vec<ContractOrder>,
}

/// In-memory transactional store.
///
/// Intended for tests/dev. Transactions are serialised: each one holds the
/// table lock for its whole lifetime and works on a private copy that
/// replaces the tables on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(InMemoryTx { guard, work }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
}

/// Version check shared by every aggregate update.
fn next_version<A: AggregateRoot>(
    current: Option<&A>,
    what: &str,
    id: impl core::fmt::Display,
    expected: ExpectedVersion,
) -> Result<u64, StoreError> {
    let current = current.ok_or_else(|| StoreError::NotFound(format!("{what} {id}")))?;
    if !expected.matches(current.version()) {
        return Err(StoreError::Conflict(format!(
            "{what} {id}: expected {expected:?}, found version {}",
            current.version()
        )));
    }
    Ok(current.version() + 1)
}

impl InMemoryTx {
    fn stock_row(&mut self, id: InventoryItemId) -> Option<&mut InventoryItem> {
        self.work.inventory.get_mut(&id)
    }
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        if self.work.products.contains_key(&product.id_typed()) {
            return Err(StoreError::Conflict(format!("product {} already exists", product.id_typed())));
        }
        if self.work.products.values().any(|p| p.sku() == product.sku()) {
            return Err(StoreError::Conflict(format!("sku {} already exists", product.sku())));
        }
        self.work.products.insert(product.id_typed(), product.clone());
        Ok(())
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.work.products.get(&id).cloned())
    }

    async fn insert_inventory_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
        if self.work.inventory.contains_key(&item.id_typed()) {
            return Err(StoreError::Conflict(format!(
                "inventory item {} already exists",
                item.id_typed()
            )));
        }
        self.work.inventory.insert(item.id_typed(), item.clone());
        Ok(())
    }

    async fn get_inventory_item(
        &mut self,
        id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        Ok(self.work.inventory.get(&id).cloned())
    }

    async fn find_active_inventory(
        &mut self,
        product_id: ProductId,
    ) -> Result<Vec<InventoryItem>, StoreError> {
        let mut rows: Vec<InventoryItem> = self
            .work
            .inventory
            .values()
            .filter(|i| i.product_id() == product_id && i.is_active())
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.available()
                .cmp(&a.available())
                .then_with(|| a.id_typed().cmp(&b.id_typed()))
        });
        Ok(rows)
    }

    async fn find_inventory_in_warehouse(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        Ok(self
            .work
            .inventory
            .values()
            .filter(|i| {
                i.product_id() == product_id && i.warehouse_id() == warehouse_id && i.is_active()
            })
            .min_by_key(|i| i.id_typed())
            .cloned())
    }

    async fn try_reserve(
        &mut self,
        id: InventoryItemId,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        match self.stock_row(id) {
            Some(row) if row.can_reserve(qty) => {
                row.reserve(qty, at)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn try_release(
        &mut self,
        id: InventoryItemId,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        match self.stock_row(id) {
            Some(row) if qty > 0 && row.reserved() >= qty => {
                row.release(qty, at)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn try_commit(
        &mut self,
        id: InventoryItemId,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        match self.stock_row(id) {
            Some(row) if qty > 0 && row.reserved() >= qty => {
                row.commit(qty, at)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn add_on_hand(
        &mut self,
        id: InventoryItemId,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        match self.stock_row(id) {
            Some(row) if qty > 0 => {
                row.receive(qty, at)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn update_inventory_status(&mut self, item: &InventoryItem) -> Result<u64, StoreError> {
        match self.stock_row(item.id_typed()) {
            Some(row) => {
                row.mark(item.status(), item.updated_at());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        if self
            .work
            .orders
            .values()
            .any(|o| o.id_typed() == order.id_typed() || o.order_number() == order.order_number())
        {
            return Err(StoreError::Conflict(format!(
                "order number {} already exists",
                order.order_number()
            )));
        }
        self.work.orders.insert(order.id_typed(), order.clone());
        Ok(())
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.work.orders.get(&id).cloned())
    }

    async fn list_orders(
        &mut self,
        filter: &OrderFilter,
        page: Pagination,
    ) -> Result<Vec<Order>, StoreError> {
        let mut rows: Vec<&Order> = self.work.orders.values().filter(|o| filter.matches(o)).collect();
        rows.sort_by(|a, b| {
            b.record()
                .order_date
                .cmp(&a.record().order_date)
                .then_with(|| b.id_typed().cmp(&a.id_typed()))
        });
        Ok(page.window(rows.into_iter().cloned()))
    }

    async fn update_order(
        &mut self,
        order: &Order,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        let id = order.id_typed();
        let version = next_version(self.work.orders.get(&id), "order", id, expected)?;
        self.work
            .orders
            .insert(id, order.clone().with_version(version));
        Ok(version)
    }

    async fn insert_purchase_order(&mut self, po: &PurchaseOrder) -> Result<(), StoreError> {
        if self
            .work
            .purchase_orders
            .values()
            .any(|p| p.id_typed() == po.id_typed() || p.po_number() == po.po_number())
        {
            return Err(StoreError::Conflict(format!(
                "po number {} already exists",
                po.po_number()
            )));
        }
        self.work.purchase_orders.insert(po.id_typed(), po.clone());
        Ok(())
    }

    async fn get_purchase_order(
        &mut self,
        id: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        Ok(self.work.purchase_orders.get(&id).cloned())
    }

    async fn list_purchase_orders(
        &mut self,
        filter: &PurchaseOrderFilter,
        page: Pagination,
    ) -> Result<Vec<PurchaseOrder>, StoreError> {
        let mut rows: Vec<&PurchaseOrder> = self
            .work
            .purchase_orders
            .values()
            .filter(|p| filter.matches(p))
            .collect();
        rows.sort_by(|a, b| {
            b.record()
                .created_at
                .cmp(&a.record().created_at)
                .then_with(|| b.id_typed().cmp(&a.id_typed()))
        });
        Ok(page.window(rows.into_iter().cloned()))
    }

    async fn update_purchase_order(
        &mut self,
        po: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        let id = po.id_typed();
        let version = next_version(self.work.purchase_orders.get(&id), "purchase order", id, expected)?;
        self.work
            .purchase_orders
            .insert(id, po.clone().with_version(version));
        Ok(version)
    }

    async fn insert_contract(&mut self, contract: &Contract) -> Result<(), StoreError> {
        if self.work.contracts.values().any(|c| {
            c.id_typed() == contract.id_typed() || c.contract_number() == contract.contract_number()
        }) {
            return Err(StoreError::Conflict(format!(
                "contract number {} already exists",
                contract.contract_number()
            )));
        }
        self.work.contracts.insert(contract.id_typed(), contract.clone());
        Ok(())
    }

    async fn get_contract(&mut self, id: ContractId) -> Result<Option<Contract>, StoreError> {
        Ok(self.work.contracts.get(&id).cloned())
    }

    async fn update_contract(
        &mut self,
        contract: &Contract,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        let id = contract.id_typed();
        let version = next_version(self.work.contracts.get(&id), "contract", id, expected)?;
        self.work
            .contracts
            .insert(id, contract.clone().with_version(version));
        Ok(version)
    }

    async fn list_contracts(
        &mut self,
        filter: &ContractFilter,
        page: Pagination,
    ) -> Result<Vec<Contract>, StoreError> {
        let mut rows: Vec<&Contract> = self.work.contracts.values().filter(|c| filter.matches(c)).collect();
        rows.sort_by(|a, b| a.contract_number().cmp(b.contract_number()));
        Ok(page.window(rows.into_iter().cloned()))
    }

    async fn list_active_contracts(&mut self) -> Result<Vec<Contract>, StoreError> {
        let mut active: Vec<Contract> = self
            .work
            .contracts
            .values()
            .filter(|c| c.status() == ContractStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.contract_number().cmp(b.contract_number()));
        Ok(active)
    }

    async fn append_contract_order(&mut self, entry: &ContractOrder) -> Result<(), StoreError> {
        self.work.contract_orders.push(entry.clone());
        Ok(())
    }

    async fn list_contract_orders(
        &mut self,
        contract_id: ContractId,
    ) -> Result<Vec<ContractOrder>, StoreError> {
        Ok(self
            .work
            .contract_orders
            .iter()
            .filter(|e| e.contract_id == contract_id)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeflow_core::Money;
    use tradeflow_inventory::StockItem;
    use tradeflow_products::{CreateProduct, Pricing};

    fn product(sku: &str) -> Product {
        Product::create(CreateProduct {
            product_id: ProductId::new(),
            sku: sku.to_string(),
            name: "Widget".to_string(),
            pricing: Pricing::base(Money::from_minor(100)),
            occurred_at: Utc::now(),
        })
        .unwrap()
    }

    fn stock(product_id: ProductId, quantity: i64) -> InventoryItem {
        InventoryItem::stock(StockItem {
            item_id: InventoryItemId::new(),
            product_id,
            warehouse_id: WarehouseId::new(),
            quantity,
            batch_number: None,
            expiry_date: None,
            occurred_at: Utc::now(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let store = InMemoryStore::new();
        let p = product("SKU-1");

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_product(p.id_typed()).await.unwrap().is_none());
        tx.insert_product(&p).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_product(p.id_typed()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_sku_conflicts() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&product("SKU-1")).await.unwrap();
        let err = tx.insert_product(&product("SKU-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn conditional_reserve_reports_zero_rows_when_short() {
        let store = InMemoryStore::new();
        let p = product("SKU-1");
        let row = stock(p.id_typed(), 10);
        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p).await.unwrap();
        tx.insert_inventory_item(&row).await.unwrap();

        assert_eq!(tx.try_reserve(row.id_typed(), 7, Utc::now()).await.unwrap(), 1);
        assert_eq!(tx.try_reserve(row.id_typed(), 5, Utc::now()).await.unwrap(), 0);
        assert_eq!(tx.try_release(row.id_typed(), 8, Utc::now()).await.unwrap(), 0);

        let current = tx.get_inventory_item(row.id_typed()).await.unwrap().unwrap();
        assert_eq!(current.reserved(), 7);
        assert_eq!(current.available(), 3);
    }

    #[tokio::test]
    async fn active_rows_come_most_available_first() {
        let store = InMemoryStore::new();
        let p = product("SKU-1");
        let small = stock(p.id_typed(), 2);
        let large = stock(p.id_typed(), 9);
        let mut tx = store.begin().await.unwrap();
        tx.insert_inventory_item(&small).await.unwrap();
        tx.insert_inventory_item(&large).await.unwrap();

        let rows = tx.find_active_inventory(p.id_typed()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id_typed(), large.id_typed());
    }
}
