//! Inventory Ledger.
//!
//! On-hand vs. reserved stock per product. The transaction-scoped functions
//! are what the other workflows compose into their own transactions;
//! [`InventoryLedger`] wraps each of them in a transaction of its own for
//! standalone callers.
//!
//! Every mutation is one conditional store update. A zero row count means the
//! guard did not hold and nothing changed; there is no read-then-write window
//! between two concurrent reservations.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use tradeflow_core::{InventoryItemId, ProductId, WarehouseId};
use tradeflow_inventory::{InventoryItem, InventoryStatus, StockItem};

use crate::error::WorkflowError;
use crate::store::{Store, StoreTx};

fn ensure_positive(qty: i64) -> Result<(), WorkflowError> {
    if qty <= 0 {
        return Err(WorkflowError::Validation(format!(
            "quantity must be positive, got {qty}"
        )));
    }
    Ok(())
}

/// Total available (`quantity - reserved`) across a product's active rows.
pub async fn available(tx: &mut dyn StoreTx, product_id: ProductId) -> Result<i64, WorkflowError> {
    let rows = tx.find_active_inventory(product_id).await?;
    Ok(rows.iter().map(InventoryItem::available).sum())
}

/// Read-only: can a single row satisfy `qty` right now?
///
/// Reservations never split across rows, so this asks whether one active row
/// has `available >= qty`.
pub async fn check_availability(
    tx: &mut dyn StoreTx,
    product_id: ProductId,
    qty: i64,
) -> Result<bool, WorkflowError> {
    ensure_positive(qty)?;
    let rows = tx.find_active_inventory(product_id).await?;
    Ok(rows.iter().any(|row| row.can_reserve(qty)))
}

/// Reserve `qty` of a product against one active stock row.
///
/// Rows are tried most-available first; each attempt is a conditional update
/// so a row drained by a concurrent caller simply reports zero rows.
pub async fn reserve(
    tx: &mut dyn StoreTx,
    product_id: ProductId,
    qty: i64,
    at: DateTime<Utc>,
) -> Result<InventoryItemId, WorkflowError> {
    ensure_positive(qty)?;
    let candidates = tx.find_active_inventory(product_id).await?;
    if candidates.is_empty() {
        return Err(WorkflowError::not_found(format!(
            "no active inventory for product {product_id}"
        )));
    }

    for row in candidates.iter().filter(|row| row.available() >= qty) {
        if tx.try_reserve(row.id_typed(), qty, at).await? == 1 {
            debug!(product_id = %product_id, inventory_item_id = %row.id_typed(), qty, "stock reserved");
            return Ok(row.id_typed());
        }
    }

    let available: i64 = candidates.iter().map(InventoryItem::available).max().unwrap_or(0);
    Err(WorkflowError::OutOfStock(format!(
        "product {product_id}: requested {qty}, available {available}"
    )))
}

/// Give back a reservation. Releasing more than is reserved is an invariant breach.
pub async fn release(
    tx: &mut dyn StoreTx,
    item_id: InventoryItemId,
    qty: i64,
    at: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    ensure_positive(qty)?;
    if tx.try_release(item_id, qty, at).await? == 0 {
        return Err(WorkflowError::internal(format!(
            "inventory item {item_id}: cannot release {qty}, reservation missing"
        )));
    }
    Ok(())
}

/// Consume a reservation: `quantity` and `reserved` both drop by `qty`.
pub async fn commit(
    tx: &mut dyn StoreTx,
    item_id: InventoryItemId,
    qty: i64,
    at: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    ensure_positive(qty)?;
    if tx.try_commit(item_id, qty, at).await? == 0 {
        return Err(WorkflowError::internal(format!(
            "inventory item {item_id}: cannot commit {qty}, reservation missing"
        )));
    }
    Ok(())
}

/// Grow on-hand stock of a product in a warehouse.
///
/// Only an active row is grown. When the warehouse holds none (or only
/// expired and damaged rows) a fresh active row is opened, so received goods
/// are always reservable.
pub async fn receive(
    tx: &mut dyn StoreTx,
    product_id: ProductId,
    warehouse_id: WarehouseId,
    qty: i64,
    at: DateTime<Utc>,
) -> Result<InventoryItemId, WorkflowError> {
    ensure_positive(qty)?;
    match tx.find_inventory_in_warehouse(product_id, warehouse_id).await? {
        Some(row) => {
            if tx.add_on_hand(row.id_typed(), qty, at).await? == 0 {
                return Err(WorkflowError::internal(format!(
                    "inventory item {} vanished while receiving",
                    row.id_typed()
                )));
            }
            Ok(row.id_typed())
        }
        None => {
            let row = InventoryItem::stock(StockItem {
                item_id: InventoryItemId::new(),
                product_id,
                warehouse_id,
                quantity: qty,
                batch_number: None,
                expiry_date: None,
                occurred_at: at,
            })?;
            tx.insert_inventory_item(&row).await?;
            debug!(product_id = %product_id, warehouse_id = %warehouse_id, "opened stock row on receipt");
            Ok(row.id_typed())
        }
    }
}

/// Flag a stock row expired or damaged, or put it back into service.
pub async fn set_status(
    tx: &mut dyn StoreTx,
    item_id: InventoryItemId,
    status: InventoryStatus,
    at: DateTime<Utc>,
) -> Result<InventoryItem, WorkflowError> {
    let mut item = tx
        .get_inventory_item(item_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(format!("inventory item {item_id}")))?;
    if item.status() == status {
        return Ok(item);
    }
    item.mark(status, at);
    if tx.update_inventory_status(&item).await? == 0 {
        return Err(WorkflowError::internal(format!(
            "inventory item {item_id} vanished while changing status"
        )));
    }
    Ok(item)
}

/// Standalone ledger: each call is its own transaction.
#[derive(Debug, Clone)]
pub struct InventoryLedger<S> {
    store: S,
}

impl<S: Store> InventoryLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Open a stock row (goods already on hand).
    #[instrument(skip(self, cmd), fields(product_id = %cmd.product_id, warehouse_id = %cmd.warehouse_id), err)]
    pub async fn stock(&self, cmd: StockItem) -> Result<InventoryItem, WorkflowError> {
        let item = InventoryItem::stock(cmd)?;
        let mut tx = self.store.begin().await?;
        if tx.get_product(item.product_id()).await?.is_none() {
            return Err(WorkflowError::not_found(format!("product {}", item.product_id())));
        }
        tx.insert_inventory_item(&item).await?;
        tx.commit().await?;
        info!(inventory_item_id = %item.id_typed(), quantity = item.quantity(), "stock row opened");
        Ok(item)
    }

    pub async fn item(&self, id: InventoryItemId) -> Result<InventoryItem, WorkflowError> {
        let mut tx = self.store.begin().await?;
        tx.get_inventory_item(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(format!("inventory item {id}")))
    }

    pub async fn available(&self, product_id: ProductId) -> Result<i64, WorkflowError> {
        let mut tx = self.store.begin().await?;
        available(tx.as_mut(), product_id).await
    }

    pub async fn check_availability(
        &self,
        product_id: ProductId,
        qty: i64,
    ) -> Result<bool, WorkflowError> {
        let mut tx = self.store.begin().await?;
        check_availability(tx.as_mut(), product_id, qty).await
    }

    #[instrument(skip(self), fields(product_id = %product_id, qty), err)]
    pub async fn reserve(
        &self,
        product_id: ProductId,
        qty: i64,
    ) -> Result<InventoryItemId, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let item_id = reserve(tx.as_mut(), product_id, qty, Utc::now()).await?;
        tx.commit().await?;
        Ok(item_id)
    }

    #[instrument(skip(self), fields(inventory_item_id = %item_id, qty), err)]
    pub async fn release(&self, item_id: InventoryItemId, qty: i64) -> Result<(), WorkflowError> {
        let mut tx = self.store.begin().await?;
        release(tx.as_mut(), item_id, qty, Utc::now()).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(inventory_item_id = %item_id, qty), err)]
    pub async fn commit(&self, item_id: InventoryItemId, qty: i64) -> Result<(), WorkflowError> {
        let mut tx = self.store.begin().await?;
        commit(tx.as_mut(), item_id, qty, Utc::now()).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id, warehouse_id = %warehouse_id, qty), err)]
    pub async fn receive(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: i64,
    ) -> Result<InventoryItemId, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let item_id = receive(tx.as_mut(), product_id, warehouse_id, qty, Utc::now()).await?;
        tx.commit().await?;
        Ok(item_id)
    }

    #[instrument(skip(self), fields(inventory_item_id = %item_id, status = %status), err)]
    pub async fn set_item_status(
        &self,
        item_id: InventoryItemId,
        status: InventoryStatus,
    ) -> Result<InventoryItem, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let item = set_status(tx.as_mut(), item_id, status, Utc::now()).await?;
        tx.commit().await?;
        if item.reserved() > 0 && status != InventoryStatus::Active {
            warn!(inventory_item_id = %item_id, reserved = item.reserved(), "stock row taken out of service with reservations held");
        }
        info!(inventory_item_id = %item_id, status = %status, "stock row status changed");
        Ok(item)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use tradeflow_core::{InventoryItemId, Money, ProductId, WarehouseId};
    use tradeflow_inventory::{InventoryItem, StockItem};
    use tradeflow_products::{CreateProduct, Pricing, Product};

    use crate::store::{InMemoryStore, Store};

    /// Seed a product priced at `price` minor units with one stock row of `quantity`.
    pub async fn seed(
        store: &InMemoryStore,
        sku: &str,
        price: i64,
        quantity: i64,
    ) -> (ProductId, InventoryItemId) {
        let product = Product::create(CreateProduct {
            product_id: ProductId::new(),
            sku: sku.to_string(),
            name: format!("{sku} widget"),
            pricing: Pricing::base(Money::from_minor(price)),
            occurred_at: Utc::now(),
        })
        .unwrap();
        let item = InventoryItem::stock(StockItem {
            item_id: InventoryItemId::new(),
            product_id: product.id_typed(),
            warehouse_id: WarehouseId::new(),
            quantity,
            batch_number: None,
            expiry_date: None,
            occurred_at: Utc::now(),
        })
        .unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&product).await.unwrap();
        tx.insert_inventory_item(&item).await.unwrap();
        tx.commit().await.unwrap();
        (product.id_typed(), item.id_typed())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::seed;
    use super::*;
    use crate::store::InMemoryStore;
    use proptest::prelude::*;

    #[tokio::test]
    async fn reserve_then_release_restores_available() {
        let store = InMemoryStore::new();
        let (product, item) = seed(&store, "SKU-1", 100, 10).await;
        let ledger = InventoryLedger::new(store);

        let reserved_on = ledger.reserve(product, 4).await.unwrap();
        assert_eq!(reserved_on, item);
        assert_eq!(ledger.available(product).await.unwrap(), 6);

        ledger.release(item, 4).await.unwrap();
        assert_eq!(ledger.available(product).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn seven_then_five_of_ten_fails_and_keeps_seven_reserved() {
        let store = InMemoryStore::new();
        let (product, item) = seed(&store, "SKU-1", 100, 10).await;
        let ledger = InventoryLedger::new(store);

        ledger.reserve(product, 7).await.unwrap();
        let err = ledger.reserve(product, 5).await.unwrap_err();
        assert!(matches!(err, WorkflowError::OutOfStock(_)));

        let row = ledger.item(item).await.unwrap();
        assert_eq!(row.reserved(), 7);
        assert_eq!(row.available(), 3);
    }

    #[tokio::test]
    async fn reserving_an_unstocked_product_is_not_found() {
        let ledger = InventoryLedger::new(InMemoryStore::new());
        let err = ledger.reserve(ProductId::new(), 1).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
    }

    #[tokio::test]
    async fn releasing_more_than_reserved_is_internal() {
        let store = InMemoryStore::new();
        let (product, item) = seed(&store, "SKU-1", 100, 10).await;
        let ledger = InventoryLedger::new(store);
        ledger.reserve(product, 2).await.unwrap();

        let err = ledger.release(item, 3).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Internal(_)));
        assert_eq!(ledger.item(item).await.unwrap().reserved(), 2);
    }

    #[tokio::test]
    async fn commit_consumes_quantity_and_reservation() {
        let store = InMemoryStore::new();
        let (product, item) = seed(&store, "SKU-1", 100, 10).await;
        let ledger = InventoryLedger::new(store);
        ledger.reserve(product, 3).await.unwrap();
        ledger.commit(item, 3).await.unwrap();

        let row = ledger.item(item).await.unwrap();
        assert_eq!(row.quantity(), 7);
        assert_eq!(row.reserved(), 0);
    }

    #[tokio::test]
    async fn receive_grows_existing_row_or_opens_one() {
        let store = InMemoryStore::new();
        let (product, item) = seed(&store, "SKU-1", 100, 10).await;
        let ledger = InventoryLedger::new(store);
        ledger.reserve(product, 4).await.unwrap();

        let warehouse = ledger.item(item).await.unwrap().warehouse_id();
        assert_eq!(ledger.receive(product, warehouse, 5).await.unwrap(), item);
        let row = ledger.item(item).await.unwrap();
        assert_eq!((row.quantity(), row.reserved()), (15, 4));

        let elsewhere = WarehouseId::new();
        let opened = ledger.receive(product, elsewhere, 2).await.unwrap();
        assert_ne!(opened, item);
        assert_eq!(ledger.available(product).await.unwrap(), 13);
    }

    #[tokio::test]
    async fn receive_skips_expired_row_and_opens_a_reservable_one() {
        let store = InMemoryStore::new();
        let (product, item) = seed(&store, "SKU-1", 100, 3).await;
        let ledger = InventoryLedger::new(store);
        ledger.reserve(product, 3).await.unwrap();
        ledger.commit(item, 3).await.unwrap();
        ledger.set_item_status(item, InventoryStatus::Expired).await.unwrap();
        assert_eq!(ledger.available(product).await.unwrap(), 0);

        let warehouse = ledger.item(item).await.unwrap().warehouse_id();
        let opened = ledger.receive(product, warehouse, 5).await.unwrap();
        assert_ne!(opened, item);
        assert_eq!(ledger.available(product).await.unwrap(), 5);
        assert_eq!(ledger.reserve(product, 1).await.unwrap(), opened);

        let expired = ledger.item(item).await.unwrap();
        assert_eq!(expired.status(), InventoryStatus::Expired);
        assert_eq!(expired.quantity(), 0);

        // The fresh row is the one grown by the next receipt.
        assert_eq!(ledger.receive(product, warehouse, 2).await.unwrap(), opened);
        assert_eq!(ledger.item(opened).await.unwrap().quantity(), 7);
    }

    #[tokio::test]
    async fn damaged_row_refuses_new_reservations_but_settles_held_ones() {
        let store = InMemoryStore::new();
        let (product, item) = seed(&store, "SKU-1", 100, 10).await;
        let ledger = InventoryLedger::new(store);
        ledger.reserve(product, 4).await.unwrap();

        let marked = ledger.set_item_status(item, InventoryStatus::Damaged).await.unwrap();
        assert_eq!(marked.status(), InventoryStatus::Damaged);
        assert!(!ledger.check_availability(product, 1).await.unwrap());
        let err = ledger.reserve(product, 1).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));

        ledger.release(item, 4).await.unwrap();
        assert_eq!(ledger.item(item).await.unwrap().reserved(), 0);

        ledger.set_item_status(item, InventoryStatus::Active).await.unwrap();
        assert_eq!(ledger.available(product).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn status_change_on_unknown_row_is_not_found() {
        let ledger = InventoryLedger::new(InMemoryStore::new());
        let err = ledger
            .set_item_status(InventoryItemId::new(), InventoryStatus::Expired)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
    }

    #[tokio::test]
    async fn check_availability_is_read_only() {
        let store = InMemoryStore::new();
        let (product, _) = seed(&store, "SKU-1", 100, 10).await;
        let ledger = InventoryLedger::new(store);

        assert!(ledger.check_availability(product, 10).await.unwrap());
        assert!(!ledger.check_availability(product, 11).await.unwrap());
        assert_eq!(ledger.available(product).await.unwrap(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservations_never_oversell() {
        let store = InMemoryStore::new();
        let (product, item) = seed(&store, "SKU-1", 100, 10).await;
        let ledger = std::sync::Arc::new(InventoryLedger::new(store));

        let mut handles = Vec::new();
        for qty in [3, 4, 5, 2, 6, 1] {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.reserve(product, qty).await.map(|_| qty) }));
        }

        let mut granted = 0;
        for handle in handles {
            if let Ok(qty) = handle.await.unwrap() {
                granted += qty;
            }
        }
        let row = ledger.item(item).await.unwrap();
        assert!(granted <= 10);
        assert_eq!(row.reserved(), granted);
    }

    proptest! {
        #[test]
        fn reservations_never_exceed_stock(stock in 0i64..50, requests in prop::collection::vec(1i64..20, 1..12)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = InMemoryStore::new();
                let (product, item) = seed(&store, "SKU-P", 100, stock).await;
                let ledger = InventoryLedger::new(store);

                let mut granted = 0;
                for qty in &requests {
                    if ledger.reserve(product, *qty).await.is_ok() {
                        granted += qty;
                    }
                }
                let row = ledger.item(item).await.unwrap();
                assert!(granted <= stock);
                assert_eq!(row.reserved(), granted);
                assert_eq!(row.available(), stock - granted);
            });
        }
    }
}
