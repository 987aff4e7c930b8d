use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{DomainError, DomainResult, Entity, InventoryItemId, ProductId, WarehouseId};

/// Stock row condition. Only `Active` rows can be reserved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryStatus {
    Active,
    Expired,
    Damaged,
}

tradeflow_core::status_names!(InventoryStatus {
    Active => "active",
    Expired => "expired",
    Damaged => "damaged",
});

/// Stock of one product in one warehouse.
///
/// Invariant: `0 <= reserved <= quantity`, so `available() >= 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    id: InventoryItemId,
    product_id: ProductId,
    warehouse_id: WarehouseId,
    quantity: i64,
    reserved: i64,
    batch_number: Option<String>,
    expiry_date: Option<DateTime<Utc>>,
    status: InventoryStatus,
    updated_at: DateTime<Utc>,
}

/// Command: StockItem (open a stock row for a product in a warehouse).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub item_id: InventoryItemId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub batch_number: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

fn ensure_positive(qty: i64) -> DomainResult<()> {
    if qty <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

impl InventoryItem {
    pub fn stock(cmd: StockItem) -> DomainResult<Self> {
        if cmd.quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        Ok(Self {
            id: cmd.item_id,
            product_id: cmd.product_id,
            warehouse_id: cmd.warehouse_id,
            quantity: cmd.quantity,
            reserved: 0,
            batch_number: cmd.batch_number,
            expiry_date: cmd.expiry_date,
            status: InventoryStatus::Active,
            updated_at: cmd.occurred_at,
        })
    }

    /// Rebuild from persisted columns, re-checking the stock invariant.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: InventoryItemId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        reserved: i64,
        batch_number: Option<String>,
        expiry_date: Option<DateTime<Utc>>,
        status: InventoryStatus,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if reserved < 0 || reserved > quantity {
            return Err(DomainError::invariant(format!(
                "inventory item {id}: reserved {reserved} outside 0..={quantity}"
            )));
        }
        Ok(Self {
            id,
            product_id,
            warehouse_id,
            quantity,
            reserved,
            batch_number,
            expiry_date,
            status,
            updated_at,
        })
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    /// On-hand quantity.
    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    pub fn available(&self) -> i64 {
        self.quantity - self.reserved
    }

    pub fn batch_number(&self) -> Option<&str> {
        self.batch_number.as_deref()
    }

    pub fn expiry_date(&self) -> Option<DateTime<Utc>> {
        self.expiry_date
    }

    pub fn status(&self) -> InventoryStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == InventoryStatus::Active
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn can_reserve(&self, qty: i64) -> bool {
        qty > 0 && self.is_active() && self.available() >= qty
    }

    /// Hold `qty` for an unshipped order line.
    ///
    /// Fails with `OutOfStock` and leaves the row untouched when
    /// `available() < qty`.
    pub fn reserve(&mut self, qty: i64, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(qty)?;
        if !self.is_active() {
            return Err(DomainError::out_of_stock(format!(
                "inventory item {} is {}",
                self.id, self.status
            )));
        }
        if self.available() < qty {
            return Err(DomainError::out_of_stock(format!(
                "product {}: requested {qty}, available {}",
                self.product_id,
                self.available()
            )));
        }
        self.reserved += qty;
        self.updated_at = at;
        Ok(())
    }

    /// Give back a reservation. Releasing more than is reserved is an
    /// invariant breach, not a user error.
    pub fn release(&mut self, qty: i64, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(qty)?;
        if self.reserved < qty {
            return Err(DomainError::invariant(format!(
                "inventory item {}: release {qty} exceeds reserved {}",
                self.id, self.reserved
            )));
        }
        self.reserved -= qty;
        self.updated_at = at;
        Ok(())
    }

    /// Consume a reservation on shipment: both on-hand and reserved drop.
    pub fn commit(&mut self, qty: i64, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(qty)?;
        if self.reserved < qty {
            return Err(DomainError::invariant(format!(
                "inventory item {}: commit {qty} exceeds reserved {}",
                self.id, self.reserved
            )));
        }
        self.quantity -= qty;
        self.reserved -= qty;
        self.updated_at = at;
        Ok(())
    }

    /// Grow on-hand stock (goods received). Reservations are untouched.
    pub fn receive(&mut self, qty: i64, at: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(qty)?;
        self.quantity = self
            .quantity
            .checked_add(qty)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;
        self.updated_at = at;
        Ok(())
    }

    /// Change the row's condition. Held reservations stay releasable and
    /// committable; new ones need the row back to `Active`.
    pub fn mark(&mut self, status: InventoryStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
    }
}

impl Entity for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn item(quantity: i64) -> InventoryItem {
        InventoryItem::stock(StockItem {
            item_id: InventoryItemId::new(),
            product_id: ProductId::new(),
            warehouse_id: WarehouseId::new(),
            quantity,
            batch_number: None,
            expiry_date: None,
            occurred_at: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn reserve_beyond_available_fails_without_side_effects() {
        let mut inv = item(10);
        inv.reserve(7, Utc::now()).unwrap();
        let before = inv.clone();

        let err = inv.reserve(5, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::OutOfStock(_)));
        assert_eq!(inv, before);
        assert_eq!(inv.reserved(), 7);
        assert_eq!(inv.available(), 3);
    }

    #[test]
    fn release_past_zero_is_an_invariant_violation() {
        let mut inv = item(10);
        inv.reserve(2, Utc::now()).unwrap();
        let err = inv.release(3, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(inv.reserved(), 2);
    }

    #[test]
    fn commit_consumes_on_hand_and_reservation() {
        let mut inv = item(10);
        inv.reserve(4, Utc::now()).unwrap();
        inv.commit(4, Utc::now()).unwrap();
        assert_eq!(inv.quantity(), 6);
        assert_eq!(inv.reserved(), 0);
    }

    #[test]
    fn receive_grows_on_hand_only() {
        let mut inv = item(1);
        inv.reserve(1, Utc::now()).unwrap();
        inv.receive(5, Utc::now()).unwrap();
        assert_eq!(inv.quantity(), 6);
        assert_eq!(inv.reserved(), 1);
    }

    #[test]
    fn inactive_rows_cannot_be_reserved() {
        let mut inv = item(10);
        inv.mark(InventoryStatus::Damaged, Utc::now());
        assert!(!inv.can_reserve(1));
        assert!(matches!(inv.reserve(1, Utc::now()), Err(DomainError::OutOfStock(_))));
    }

    #[test]
    fn restore_rejects_rows_breaking_the_invariant() {
        let err = InventoryItem::restore(
            InventoryItemId::new(),
            ProductId::new(),
            WarehouseId::new(),
            5,
            6,
            None,
            None,
            InventoryStatus::Active,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(i64),
        Release(i64),
        Commit(i64),
        Receive(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..20).prop_map(Op::Reserve),
            (1i64..20).prop_map(Op::Release),
            (1i64..20).prop_map(Op::Commit),
            (1i64..20).prop_map(Op::Receive),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of ledger operations is attempted,
        /// reserved stays within 0..=quantity.
        #[test]
        fn reserved_stays_within_on_hand(start in 0i64..50, ops in prop::collection::vec(op(), 0..40)) {
            let mut inv = item(start);
            for op in ops {
                let _ = match op {
                    Op::Reserve(q) => inv.reserve(q, Utc::now()),
                    Op::Release(q) => inv.release(q, Utc::now()),
                    Op::Commit(q) => inv.commit(q, Utc::now()),
                    Op::Receive(q) => inv.receive(q, Utc::now()),
                };
                prop_assert!(inv.reserved() >= 0);
                prop_assert!(inv.reserved() <= inv.quantity());
            }
        }

        /// Property: reserve followed by release restores availability.
        #[test]
        fn reserve_then_release_restores_available(start in 1i64..100, pick in 1i64..100) {
            let qty = pick.min(start);
            let mut inv = item(start);
            let before = inv.available();
            inv.reserve(qty, Utc::now()).unwrap();
            inv.release(qty, Utc::now()).unwrap();
            prop_assert_eq!(inv.available(), before);
        }
    }
}
