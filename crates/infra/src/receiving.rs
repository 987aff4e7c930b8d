//! Purchase orders and PO receiving reconciliation.
//!
//! A receipt report is applied to the PO lines and fed into the ledger in the
//! same transaction: received stock lands on the product's row in the PO's
//! destination warehouse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use tradeflow_core::{
    ExpectedVersion, Money, PoItemId, ProductId, PurchaseOrderId, SupplierId, WarehouseId,
};
use tradeflow_purchasing::{
    CreatePurchaseOrder, PoLine, PurchaseOrder, PurchaseOrderStatus, Receipt,
};

use crate::error::WorkflowError;
use crate::ledger;
use crate::store::{Pagination, PurchaseOrderFilter, Store, StoreTx};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoLineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Input to [`PurchaseOrders::create_purchase_order`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderRequest {
    pub po_number: Option<String>,
    pub supplier_id: SupplierId,
    /// Where received goods are booked.
    pub warehouse_id: WarehouseId,
    pub currency: String,
    pub exchange_rate: Option<f64>,
    pub expected_date: Option<DateTime<Utc>>,
    pub shipping_method: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<PoLineRequest>,
}

/// Partial update for [`PurchaseOrders::update_purchase_order`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderUpdate {
    pub status: Option<PurchaseOrderStatus>,
    pub tracking_number: Option<String>,
    pub container_number: Option<String>,
}

/// One line of a goods-received report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub po_item_id: PoItemId,
    pub quantity: i64,
}

async fn load(tx: &mut dyn StoreTx, po_id: PurchaseOrderId) -> Result<PurchaseOrder, WorkflowError> {
    tx.get_purchase_order(po_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(format!("purchase order {po_id}")))
}

async fn receive_in(
    tx: &mut dyn StoreTx,
    po_id: PurchaseOrderId,
    lines: &[ReceiptLine],
    at: DateTime<Utc>,
) -> Result<PurchaseOrder, WorkflowError> {
    let mut po = load(tx, po_id).await?;
    let expected = ExpectedVersion::of(&po);

    let receipts: Vec<Receipt> = lines
        .iter()
        .map(|l| Receipt {
            po_item_id: l.po_item_id,
            quantity: l.quantity,
        })
        .collect();
    let received = po.receive(&receipts, at)?;

    for stock in &received {
        ledger::receive(tx, stock.product_id, po.warehouse_id(), stock.quantity, at).await?;
    }

    let version = tx.update_purchase_order(&po, expected).await?;
    Ok(po.with_version(version))
}

/// Purchase order workflow, each call in its own transaction.
#[derive(Debug, Clone)]
pub struct PurchaseOrders<S> {
    store: S,
}

impl<S: Store> PurchaseOrders<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Create a purchase order in `Draft`. Every product must exist.
    #[instrument(skip(self, request), fields(supplier_id = %request.supplier_id, lines = request.lines.len()), err)]
    pub async fn create_purchase_order(
        &self,
        request: PurchaseOrderRequest,
    ) -> Result<PurchaseOrder, WorkflowError> {
        let now = Utc::now();
        let po = PurchaseOrder::create(CreatePurchaseOrder {
            po_id: PurchaseOrderId::new(),
            po_number: request.po_number,
            supplier_id: request.supplier_id,
            warehouse_id: request.warehouse_id,
            currency: request.currency,
            exchange_rate: request.exchange_rate,
            expected_date: request.expected_date,
            shipping_method: request.shipping_method,
            notes: request.notes,
            lines: request
                .lines
                .into_iter()
                .map(|l| PoLine {
                    item_id: PoItemId::new(),
                    product_id: l.product_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                })
                .collect(),
            occurred_at: now,
        })?;

        let mut tx = self.store.begin().await?;
        for item in po.items() {
            if tx.get_product(item.product_id).await?.is_none() {
                return Err(WorkflowError::not_found(format!("product {}", item.product_id)));
            }
        }
        tx.insert_purchase_order(&po).await?;
        tx.commit().await?;

        info!(po_id = %po.id_typed(), po_number = %po.po_number(), total = %po.total_amount(), "purchase order created");
        Ok(po)
    }

    #[instrument(skip(self, update), fields(po_id = %po_id), err)]
    pub async fn update_purchase_order(
        &self,
        po_id: PurchaseOrderId,
        update: PurchaseOrderUpdate,
    ) -> Result<PurchaseOrder, WorkflowError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut po = load(tx.as_mut(), po_id).await?;
        let expected = ExpectedVersion::of(&po);

        if let Some(target) = update.status {
            if let Err(err) = po.set_status(target, now) {
                warn!(po_id = %po_id, error = %err, "purchase order transition rejected");
                return Err(err.into());
            }
        }
        if update.tracking_number.is_some() || update.container_number.is_some() {
            po.set_shipping_details(update.tracking_number, update.container_number, now);
        }

        let version = tx.update_purchase_order(&po, expected).await?;
        tx.commit().await?;
        info!(po_id = %po_id, status = %po.status(), "purchase order updated");
        Ok(po.with_version(version))
    }

    pub async fn update_purchase_order_status(
        &self,
        po_id: PurchaseOrderId,
        status: PurchaseOrderStatus,
    ) -> Result<PurchaseOrder, WorkflowError> {
        self.update_purchase_order(
            po_id,
            PurchaseOrderUpdate {
                status: Some(status),
                ..PurchaseOrderUpdate::default()
            },
        )
        .await
    }

    /// Apply a goods-received report.
    ///
    /// Over-receipt of any line rejects the whole report. Received quantity is
    /// added to on-hand stock; the PO moves to `Received` once every line is
    /// complete.
    #[instrument(skip(self, lines), fields(po_id = %po_id, lines = lines.len()), err)]
    pub async fn receive_purchase_order(
        &self,
        po_id: PurchaseOrderId,
        lines: &[ReceiptLine],
    ) -> Result<PurchaseOrder, WorkflowError> {
        let mut tx = self.store.begin().await?;
        match receive_in(tx.as_mut(), po_id, lines, Utc::now()).await {
            Ok(po) => {
                tx.commit().await?;
                info!(
                    po_id = %po_id,
                    status = %po.status(),
                    fully_received = po.is_fully_received(),
                    "purchase order receipt booked"
                );
                Ok(po)
            }
            Err(err) => {
                tx.rollback().await?;
                warn!(po_id = %po_id, error = %err, "purchase order receipt rejected");
                Err(err)
            }
        }
    }

    pub async fn get_purchase_order(
        &self,
        po_id: PurchaseOrderId,
    ) -> Result<PurchaseOrder, WorkflowError> {
        let mut tx = self.store.begin().await?;
        load(tx.as_mut(), po_id).await
    }

    /// Purchase orders matching `filter`, newest first.
    pub async fn list_purchase_orders(
        &self,
        filter: &PurchaseOrderFilter,
        page: Pagination,
    ) -> Result<Vec<PurchaseOrder>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_purchase_orders(filter, page).await?)
    }
}
