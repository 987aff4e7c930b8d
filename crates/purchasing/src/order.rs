use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{
    AggregateRoot, DomainError, DomainResult, Entity, Money, PoItemId, ProductId,
    PurchaseOrderId, SupplierId, Tracked, TransitionOutcome, WarehouseId, document_number,
    find_by_id, find_by_id_mut, transition,
};

use crate::status::{LineStatus, PurchaseOrderStatus};

/// Purchase order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoItem {
    pub id: PoItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub received_quantity: i64,
    pub unit_price: Money,
    pub total_amount: Money,
    pub status: LineStatus,
}

impl PoItem {
    pub fn outstanding(&self) -> i64 {
        self.quantity - self.received_quantity
    }
}

impl Entity for PoItem {
    type Id = PoItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Requested line on a new purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoLine {
    pub item_id: PoItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub po_id: PurchaseOrderId,
    pub po_number: Option<String>,
    pub supplier_id: SupplierId,
    /// Warehouse the goods are booked into on receipt.
    pub warehouse_id: WarehouseId,
    pub currency: String,
    pub exchange_rate: Option<f64>,
    pub expected_date: Option<DateTime<Utc>>,
    pub shipping_method: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<PoLine>,
    pub occurred_at: DateTime<Utc>,
}

/// One receipt report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub po_item_id: PoItemId,
    pub quantity: i64,
}

/// Stock that a successful receipt adds to the destination warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedStock {
    pub po_item_id: PoItemId,
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Persisted shape of a purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderRecord {
    pub id: PurchaseOrderId,
    pub po_number: String,
    pub supplier_id: SupplierId,
    pub warehouse_id: WarehouseId,
    pub status: PurchaseOrderStatus,
    pub currency: String,
    pub exchange_rate: f64,
    pub expected_date: Option<DateTime<Utc>>,
    pub shipping_method: Option<String>,
    pub container_number: Option<String>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<PoItem>,
    pub total_amount: Money,
    pub approved_date: Option<DateTime<Utc>>,
    pub shipped_date: Option<DateTime<Utc>>,
    pub received_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Tracked<PurchaseOrderStatus> for PurchaseOrderRecord {
    fn current(&self) -> PurchaseOrderStatus {
        self.status
    }

    fn set_current(&mut self, state: PurchaseOrderStatus) {
        self.status = state;
    }

    fn entry_timestamp(&mut self, state: PurchaseOrderStatus) -> Option<&mut Option<DateTime<Utc>>> {
        match state {
            PurchaseOrderStatus::Approved => Some(&mut self.approved_date),
            PurchaseOrderStatus::Shipped => Some(&mut self.shipped_date),
            PurchaseOrderStatus::Received => Some(&mut self.received_date),
            _ => None,
        }
    }
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrder {
    record: PurchaseOrderRecord,
}

impl PurchaseOrder {
    pub fn create(cmd: CreatePurchaseOrder) -> DomainResult<Self> {
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("purchase order requires at least one item"));
        }
        let currency = cmd.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(format!(
                "currency must be a 3-letter code, got {:?}",
                cmd.currency
            )));
        }
        let exchange_rate = cmd.exchange_rate.unwrap_or(1.0);
        if !exchange_rate.is_finite() || exchange_rate <= 0.0 {
            return Err(DomainError::validation("exchange rate must be positive"));
        }

        let mut items = Vec::with_capacity(cmd.lines.len());
        for line in cmd.lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "quantity for product {} must be positive",
                    line.product_id
                )));
            }
            if line.unit_price.is_negative() {
                return Err(DomainError::validation("unit price cannot be negative"));
            }
            items.push(PoItem {
                id: line.item_id,
                product_id: line.product_id,
                quantity: line.quantity,
                received_quantity: 0,
                unit_price: line.unit_price,
                total_amount: line.unit_price.times(line.quantity)?,
                status: LineStatus::Pending,
            });
        }
        let total_amount = Money::sum(items.iter().map(|i| i.total_amount))?;
        let po_number = document_number(cmd.po_number, "PO", cmd.occurred_at, cmd.po_id.as_uuid())?;

        Ok(Self {
            record: PurchaseOrderRecord {
                id: cmd.po_id,
                po_number,
                supplier_id: cmd.supplier_id,
                warehouse_id: cmd.warehouse_id,
                status: PurchaseOrderStatus::Draft,
                currency,
                exchange_rate,
                expected_date: cmd.expected_date,
                shipping_method: cmd.shipping_method,
                container_number: None,
                tracking_number: None,
                notes: cmd.notes,
                items,
                total_amount,
                approved_date: None,
                shipped_date: None,
                received_date: None,
                created_at: cmd.occurred_at,
                updated_at: cmd.occurred_at,
                version: 1,
            },
        })
    }

    /// Rebuild from a persisted record, re-checking line quantities.
    pub fn restore(record: PurchaseOrderRecord) -> DomainResult<Self> {
        for item in &record.items {
            if item.received_quantity < 0 || item.received_quantity > item.quantity {
                return Err(DomainError::invariant(format!(
                    "po item {}: received {} outside 0..={}",
                    item.id, item.received_quantity, item.quantity
                )));
            }
        }
        Ok(Self { record })
    }

    pub fn record(&self) -> &PurchaseOrderRecord {
        &self.record
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.record.version = version;
        self
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.record.id
    }

    pub fn po_number(&self) -> &str {
        &self.record.po_number
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.record.status
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.record.warehouse_id
    }

    pub fn items(&self) -> &[PoItem] {
        &self.record.items
    }

    pub fn total_amount(&self) -> Money {
        self.record.total_amount
    }

    pub fn is_fully_received(&self) -> bool {
        self.record.items.iter().all(|i| i.status == LineStatus::Complete)
    }

    pub fn set_status(
        &mut self,
        target: PurchaseOrderStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<TransitionOutcome<PurchaseOrderStatus>> {
        let outcome = transition(&mut self.record, target, at)?;
        if outcome.moved() {
            self.record.updated_at = at;
        }
        Ok(outcome)
    }

    pub fn set_shipping_details(
        &mut self,
        tracking_number: Option<String>,
        container_number: Option<String>,
        at: DateTime<Utc>,
    ) {
        if tracking_number.is_some() {
            self.record.tracking_number = tracking_number;
        }
        if container_number.is_some() {
            self.record.container_number = container_number;
        }
        self.record.updated_at = at;
    }

    /// Book a receipt report against the lines.
    ///
    /// All-or-nothing: any bad line (unknown item, non-positive quantity,
    /// over-receipt) rejects the whole report and leaves the order untouched.
    /// Once every line is complete the order moves to `Received`, passing
    /// through `Shipped` if the supplier never reported shipment.
    pub fn receive(&mut self, receipts: &[Receipt], at: DateTime<Utc>) -> DomainResult<Vec<ReceivedStock>> {
        if !self.record.status.accepts_receipts() {
            return Err(DomainError::validation(format!(
                "purchase order {} cannot receive goods while {}",
                self.record.po_number, self.record.status
            )));
        }
        if receipts.is_empty() {
            return Err(DomainError::validation("receipt report has no lines"));
        }

        let mut items = self.record.items.clone();
        let mut received = Vec::with_capacity(receipts.len());
        for receipt in receipts {
            if receipt.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "received quantity for po item {} must be positive",
                    receipt.po_item_id
                )));
            }
            let Some(item) = find_by_id_mut(&mut items, &receipt.po_item_id) else {
                return Err(DomainError::not_found(format!(
                    "po item {} on purchase order {}",
                    receipt.po_item_id, self.record.po_number
                )));
            };
            if receipt.quantity > item.outstanding() {
                return Err(DomainError::validation(format!(
                    "po item {}: receiving {} exceeds outstanding {} (ordered {}, received {})",
                    item.id,
                    receipt.quantity,
                    item.outstanding(),
                    item.quantity,
                    item.received_quantity
                )));
            }
            item.received_quantity += receipt.quantity;
            item.status = LineStatus::derive(item.received_quantity, item.quantity);
            received.push(ReceivedStock {
                po_item_id: item.id,
                product_id: item.product_id,
                quantity: receipt.quantity,
            });
        }

        self.record.items = items;
        self.record.updated_at = at;
        if self.is_fully_received() {
            if self.record.status == PurchaseOrderStatus::Ordered {
                transition(&mut self.record, PurchaseOrderStatus::Shipped, at)?;
            }
            transition(&mut self.record, PurchaseOrderStatus::Received, at)?;
        }
        Ok(received)
    }

    pub fn item(&self, id: &PoItemId) -> Option<&PoItem> {
        find_by_id(&self.record.items, id)
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.record.id
    }

    fn version(&self) -> u64 {
        self.record.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 30, 0).unwrap()
    }

    fn create(quantities: &[i64]) -> PurchaseOrder {
        PurchaseOrder::create(CreatePurchaseOrder {
            po_id: PurchaseOrderId::new(),
            po_number: None,
            supplier_id: SupplierId::new(),
            warehouse_id: WarehouseId::new(),
            currency: "usd".into(),
            exchange_rate: None,
            expected_date: None,
            shipping_method: None,
            notes: None,
            lines: quantities
                .iter()
                .map(|&q| PoLine {
                    item_id: PoItemId::new(),
                    product_id: ProductId::new(),
                    quantity: q,
                    unit_price: Money::from_minor(250),
                })
                .collect(),
            occurred_at: test_time(),
        })
        .unwrap()
    }

    fn ordered(quantities: &[i64]) -> PurchaseOrder {
        let mut po = create(quantities);
        for s in [
            PurchaseOrderStatus::Pending,
            PurchaseOrderStatus::Approved,
            PurchaseOrderStatus::Ordered,
        ] {
            po.set_status(s, test_time()).unwrap();
        }
        po
    }

    #[test]
    fn create_starts_in_draft_with_totals() {
        let po = create(&[4, 2]);
        assert_eq!(po.status(), PurchaseOrderStatus::Draft);
        assert_eq!(po.total_amount(), Money::from_minor(1500));
        assert_eq!(po.record().currency, "USD");
        assert!(po.po_number().starts_with("PO-20240603-"));
    }

    #[test]
    fn receipts_are_refused_before_the_order_is_placed() {
        let mut po = create(&[5]);
        let id = po.items()[0].id;
        let err = po
            .receive(&[Receipt { po_item_id: id, quantity: 1 }], test_time())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn partial_then_complete_receipt_walks_to_received() {
        let mut po = ordered(&[5]);
        let id = po.items()[0].id;

        let stock = po.receive(&[Receipt { po_item_id: id, quantity: 3 }], test_time()).unwrap();
        assert_eq!(stock[0].quantity, 3);
        assert_eq!(po.items()[0].status, LineStatus::Partial);
        assert_eq!(po.status(), PurchaseOrderStatus::Ordered);

        let stock = po.receive(&[Receipt { po_item_id: id, quantity: 2 }], test_time()).unwrap();
        assert_eq!(stock[0].quantity, 2);
        assert_eq!(po.items()[0].status, LineStatus::Complete);
        assert_eq!(po.status(), PurchaseOrderStatus::Received);
        assert_eq!(po.record().shipped_date, Some(test_time()));
        assert_eq!(po.record().received_date, Some(test_time()));
    }

    #[test]
    fn over_receipt_rejects_the_whole_report() {
        let mut po = ordered(&[5, 5]);
        let a = po.items()[0].id;
        let b = po.items()[1].id;
        let before = po.clone();

        let err = po
            .receive(
                &[
                    Receipt { po_item_id: a, quantity: 5 },
                    Receipt { po_item_id: b, quantity: 6 },
                ],
                test_time(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(po, before);
    }

    #[test]
    fn repeated_lines_in_one_report_accumulate() {
        let mut po = ordered(&[5]);
        let id = po.items()[0].id;
        let err = po
            .receive(
                &[
                    Receipt { po_item_id: id, quantity: 3 },
                    Receipt { po_item_id: id, quantity: 3 },
                ],
                test_time(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(po.items()[0].received_quantity, 0);
    }

    #[test]
    fn unknown_line_is_not_found() {
        let mut po = ordered(&[5]);
        let err = po
            .receive(&[Receipt { po_item_id: PoItemId::new(), quantity: 1 }], test_time())
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn cancellation_only_before_shipment() {
        let mut po = ordered(&[1]);
        po.set_status(PurchaseOrderStatus::Shipped, test_time()).unwrap();
        let err = po.set_status(PurchaseOrderStatus::Cancelled, test_time()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(po.status(), PurchaseOrderStatus::Shipped);
    }
}
