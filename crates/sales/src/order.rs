use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{
    AddressId, AggregateRoot, CompanyId, ContractId, DomainError, DomainResult, Entity,
    InventoryItemId, Lifecycle, Money, OrderId, OrderItemId, ProductId, Tracked,
    TransitionOutcome, UserId, document_number, transition,
};

use crate::status::{OrderStatus, PaymentStatus};

/// Who the order is for. At least one side must be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOwner {
    pub user_id: Option<UserId>,
    pub company_id: Option<CompanyId>,
}

impl OrderOwner {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            company_id: None,
        }
    }

    pub fn company(company_id: CompanyId) -> Self {
        Self {
            user_id: None,
            company_id: Some(company_id),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.user_id.is_none() && self.company_id.is_none() {
            return Err(DomainError::validation("order owner requires a user or a company"));
        }
        Ok(())
    }
}

/// Delivery details captured on the order (and on contracts, for generated orders).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub address_id: Option<AddressId>,
    pub method: String,
    pub payment_method: String,
    pub customer_notes: Option<String>,
}

impl ShippingInfo {
    pub fn validate(&self) -> DomainResult<()> {
        if self.address_id.is_none() {
            return Err(DomainError::validation("shipping address is required"));
        }
        if self.method.trim().is_empty() {
            return Err(DomainError::validation("shipping method is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Cancelled,
    Returned,
}

tradeflow_core::status_names!(ItemStatus {
    Active => "active",
    Cancelled => "cancelled",
    Returned => "returned",
});

/// Order line. `inventory_item_id` is the stock row holding its reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub inventory_item_id: Option<InventoryItemId>,
    pub quantity: i64,
    pub unit_price: Money,
    pub total_amount: Money,
    pub status: ItemStatus,
}

impl Entity for OrderItem {
    type Id = OrderItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A line whose price and reservation were already resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub item_id: OrderItemId,
    pub product_id: ProductId,
    pub inventory_item_id: Option<InventoryItemId>,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    /// Generated when absent.
    pub order_number: Option<String>,
    pub owner: OrderOwner,
    pub shipping: ShippingInfo,
    pub contract_id: Option<ContractId>,
    pub lines: Vec<PricedLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Tax, shipping and discount applied on top of the line total.
///
/// Computing these is somebody else's job; the order only stores them and
/// keeps `final_amount` consistent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustments {
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
}

impl Adjustments {
    fn apply_to(&self, total: Money) -> DomainResult<Money> {
        for (what, amount) in [
            ("tax", self.tax),
            ("shipping", self.shipping),
            ("discount", self.discount),
        ] {
            if amount.is_negative() {
                return Err(DomainError::validation(format!("{what} cannot be negative")));
            }
        }
        let gross = Money::sum([total, self.tax, self.shipping])?;
        if self.discount > gross {
            return Err(DomainError::validation(format!(
                "discount {} exceeds order amount {gross}",
                self.discount
            )));
        }
        gross.checked_sub(self.discount)
    }
}

/// Persisted shape of an order, one field per column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub order_number: String,
    pub owner: OrderOwner,
    pub contract_id: Option<ContractId>,
    pub shipping: ShippingInfo,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub adjustments: Adjustments,
    pub final_amount: Money,
    pub admin_notes: Option<String>,
    pub tracking_number: Option<String>,
    pub order_date: DateTime<Utc>,
    pub shipped_date: Option<DateTime<Utc>>,
    pub delivered_date: Option<DateTime<Utc>>,
    pub payment_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Tracked<OrderStatus> for OrderRecord {
    fn current(&self) -> OrderStatus {
        self.status
    }

    fn set_current(&mut self, state: OrderStatus) {
        self.status = state;
    }

    fn entry_timestamp(&mut self, state: OrderStatus) -> Option<&mut Option<DateTime<Utc>>> {
        match state {
            OrderStatus::Shipped => Some(&mut self.shipped_date),
            OrderStatus::Delivered => Some(&mut self.delivered_date),
            _ => None,
        }
    }
}

impl Tracked<PaymentStatus> for OrderRecord {
    fn current(&self) -> PaymentStatus {
        self.payment_status
    }

    fn set_current(&mut self, state: PaymentStatus) {
        self.payment_status = state;
    }

    fn entry_timestamp(&mut self, state: PaymentStatus) -> Option<&mut Option<DateTime<Utc>>> {
        match state {
            PaymentStatus::Paid => Some(&mut self.payment_date),
            _ => None,
        }
    }
}

/// Aggregate root: Order.
///
/// Owns its items by value. Invariant: `total_amount` is the sum of the item
/// totals, and `final_amount` is `total_amount` with the adjustments applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Order {
    record: OrderRecord,
}

impl Order {
    pub fn place(cmd: PlaceOrder) -> DomainResult<Self> {
        cmd.owner.validate()?;
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("order requires at least one item"));
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
            items.push(OrderItem {
                id: line.item_id,
                product_id: line.product_id,
                inventory_item_id: line.inventory_item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                total_amount: line.unit_price.times(line.quantity)?,
                status: ItemStatus::Active,
            });
        }
        let total_amount = Money::sum(items.iter().map(|i| i.total_amount))?;
        let order_number =
            document_number(cmd.order_number, "ORD", cmd.occurred_at, cmd.order_id.as_uuid())?;

        Ok(Self {
            record: OrderRecord {
                id: cmd.order_id,
                order_number,
                owner: cmd.owner,
                contract_id: cmd.contract_id,
                shipping: cmd.shipping,
                status: OrderStatus::initial(),
                payment_status: PaymentStatus::initial(),
                payment_reference: None,
                items,
                total_amount,
                adjustments: Adjustments::default(),
                final_amount: total_amount,
                admin_notes: None,
                tracking_number: None,
                order_date: cmd.occurred_at,
                shipped_date: None,
                delivered_date: None,
                payment_date: None,
                updated_at: cmd.occurred_at,
                version: 1,
            },
        })
    }

    /// Rebuild from a persisted record, re-checking the amount invariants.
    pub fn restore(record: OrderRecord) -> DomainResult<Self> {
        let total = Money::sum(record.items.iter().map(|i| i.total_amount))?;
        if total != record.total_amount {
            return Err(DomainError::invariant(format!(
                "order {}: total {} does not match item sum {total}",
                record.id, record.total_amount
            )));
        }
        if record.adjustments.apply_to(total)? != record.final_amount {
            return Err(DomainError::invariant(format!(
                "order {}: final amount {} does not match adjustments",
                record.id, record.final_amount
            )));
        }
        Ok(Self { record })
    }

    pub fn record(&self) -> &OrderRecord {
        &self.record
    }

    /// Same order at a newer persisted version (set by the store on update).
    pub fn with_version(mut self, version: u64) -> Self {
        self.record.version = version;
        self
    }

    pub fn id_typed(&self) -> OrderId {
        self.record.id
    }

    pub fn order_number(&self) -> &str {
        &self.record.order_number
    }

    pub fn status(&self) -> OrderStatus {
        self.record.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.record.payment_status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.record.items
    }

    pub fn total_amount(&self) -> Money {
        self.record.total_amount
    }

    pub fn final_amount(&self) -> Money {
        self.record.final_amount
    }

    pub fn shipped_date(&self) -> Option<DateTime<Utc>> {
        self.record.shipped_date
    }

    pub fn delivered_date(&self) -> Option<DateTime<Utc>> {
        self.record.delivered_date
    }

    pub fn payment_date(&self) -> Option<DateTime<Utc>> {
        self.record.payment_date
    }

    /// `(stock row, quantity)` for every active item holding a reservation.
    pub fn reservations(&self) -> Vec<(InventoryItemId, i64)> {
        self.record
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Active)
            .filter_map(|i| i.inventory_item_id.map(|inv| (inv, i.quantity)))
            .collect()
    }

    /// Apply a fulfilment status change.
    ///
    /// Cancelling marks active items cancelled and returning marks them
    /// returned; the stock side of either is the caller's job.
    pub fn set_status(
        &mut self,
        target: OrderStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<TransitionOutcome<OrderStatus>> {
        let outcome = transition(&mut self.record, target, at)?;
        if outcome.moved() {
            let item_status = match target {
                OrderStatus::Cancelled => Some(ItemStatus::Cancelled),
                OrderStatus::Returned => Some(ItemStatus::Returned),
                _ => None,
            };
            if let Some(item_status) = item_status {
                for item in self.record.items.iter_mut() {
                    if item.status == ItemStatus::Active {
                        item.status = item_status;
                    }
                }
            }
            self.record.updated_at = at;
        }
        Ok(outcome)
    }

    pub fn set_payment_status(
        &mut self,
        target: PaymentStatus,
        reference: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<TransitionOutcome<PaymentStatus>> {
        let outcome = transition(&mut self.record, target, at)?;
        if let Some(reference) = reference {
            self.record.payment_reference = Some(reference);
        }
        self.record.updated_at = at;
        Ok(outcome)
    }

    /// Replace tax/shipping/discount. Only while the order is still pending.
    pub fn set_adjustments(&mut self, adjustments: Adjustments, at: DateTime<Utc>) -> DomainResult<()> {
        if self.record.status != OrderStatus::Pending {
            return Err(DomainError::validation(format!(
                "order {} can only be adjusted while pending (currently {})",
                self.record.order_number, self.record.status
            )));
        }
        self.record.final_amount = adjustments.apply_to(self.record.total_amount)?;
        self.record.adjustments = adjustments;
        self.record.updated_at = at;
        Ok(())
    }

    pub fn set_tracking_number(&mut self, tracking_number: impl Into<String>, at: DateTime<Utc>) {
        self.record.tracking_number = Some(tracking_number.into());
        self.record.updated_at = at;
    }

    pub fn set_admin_notes(&mut self, notes: impl Into<String>, at: DateTime<Utc>) {
        self.record.admin_notes = Some(notes.into());
        self.record.updated_at = at;
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.record.id
    }

    fn version(&self) -> u64 {
        self.record.version
    }
}
