//! Order Fulfillment Engine.
//!
//! Turns a requested basket into a committed order: resolve each product,
//! reserve stock through the ledger, price the lines, persist the order. All
//! of it happens in one store transaction, so either the order with every
//! reservation exists afterwards or nothing does.
//!
//! Status updates drive the ledger as well: cancelling releases an order's
//! reservations and shipping consumes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use tradeflow_core::{
    ContractId, ExpectedVersion, InventoryItemId, Money, OrderId, OrderItemId, ProductId,
};
use tradeflow_sales::{
    Adjustments, Order, OrderOwner, OrderStatus, PaymentStatus, PlaceOrder, PricedLine,
    ShippingInfo,
};

use crate::error::WorkflowError;
use crate::ledger;
use crate::store::{OrderFilter, Pagination, Store, StoreTx};

/// One requested line of a direct order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Input to [`OrderFulfillment::create_order`].
///
/// `owner` is the acting user and/or company as resolved by the identity
/// collaborator; it is stamped on the order as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Caller-chosen order number; generated when absent.
    pub order_number: Option<String>,
    pub owner: OrderOwner,
    pub shipping: ShippingInfo,
    pub lines: Vec<OrderLineRequest>,
}

impl OrderRequest {
    /// Shape checks that need no store access.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        self.owner.validate()?;
        self.shipping.validate()?;
        if self.lines.is_empty() {
            return Err(WorkflowError::Validation(
                "order requires at least one item".into(),
            ));
        }
        if let Some(line) = self.lines.iter().find(|l| l.quantity <= 0) {
            return Err(WorkflowError::Validation(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }
        Ok(())
    }
}

/// Partial update applied by [`OrderFulfillment::update_order`]. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_reference: Option<String>,
    pub tracking_number: Option<String>,
    pub admin_notes: Option<String>,
}

/// A line ready for placement. A `None` price means "use the product's base price".
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DraftLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Option<Money>,
}

/// Everything [`place_order_in`] needs, whether the order comes from a
/// customer or from a contract firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OrderDraft {
    pub order_number: Option<String>,
    pub owner: OrderOwner,
    pub shipping: ShippingInfo,
    pub contract_id: Option<ContractId>,
    pub lines: Vec<DraftLine>,
}

/// Reserve and persist an order inside the caller's transaction.
///
/// On failure every reservation taken so far is released again before the
/// error is returned, so the transaction is left as it was found even if the
/// caller goes on to commit it.
pub(crate) async fn place_order_in(
    tx: &mut dyn StoreTx,
    draft: OrderDraft,
    at: DateTime<Utc>,
) -> Result<Order, WorkflowError> {
    let mut held: Vec<(InventoryItemId, i64)> = Vec::with_capacity(draft.lines.len());

    match reserve_and_place(tx, draft, at, &mut held).await {
        Ok(order) => Ok(order),
        Err(err) => {
            for (item_id, qty) in held.into_iter().rev() {
                debug!(inventory_item_id = %item_id, qty, "releasing reservation of aborted order");
                ledger::release(tx, item_id, qty, at).await?;
            }
            Err(err)
        }
    }
}

async fn reserve_and_place(
    tx: &mut dyn StoreTx,
    draft: OrderDraft,
    at: DateTime<Utc>,
    held: &mut Vec<(InventoryItemId, i64)>,
) -> Result<Order, WorkflowError> {
    let mut lines = Vec::with_capacity(draft.lines.len());
    for line in draft.lines {
        let product = tx
            .get_product(line.product_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(format!("product {}", line.product_id)))?;
        product.ensure_sellable()?;

        let inventory_item_id = ledger::reserve(tx, line.product_id, line.quantity, at).await?;
        held.push((inventory_item_id, line.quantity));

        lines.push(PricedLine {
            item_id: OrderItemId::new(),
            product_id: line.product_id,
            inventory_item_id: Some(inventory_item_id),
            quantity: line.quantity,
            unit_price: line.unit_price.unwrap_or_else(|| product.base_price()),
        });
    }

    let order = Order::place(PlaceOrder {
        order_id: OrderId::new(),
        order_number: draft.order_number,
        owner: draft.owner,
        shipping: draft.shipping,
        contract_id: draft.contract_id,
        lines,
        occurred_at: at,
    })?;
    tx.insert_order(&order).await?;
    Ok(order)
}

/// Apply an [`OrderUpdate`] inside the caller's transaction, driving the
/// ledger for status changes that touch stock.
async fn update_order_in(
    tx: &mut dyn StoreTx,
    order_id: OrderId,
    update: OrderUpdate,
    at: DateTime<Utc>,
) -> Result<Order, WorkflowError> {
    let mut order = tx
        .get_order(order_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(format!("order {order_id}")))?;
    let expected = ExpectedVersion::of(&order);

    if let Some(target) = update.status {
        let holding = order.reservations();
        let outcome = order.set_status(target, at)?;
        if outcome.moved() {
            match target {
                OrderStatus::Cancelled => {
                    for (item_id, qty) in &holding {
                        ledger::release(tx, *item_id, *qty, at).await?;
                    }
                }
                OrderStatus::Shipped => {
                    for (item_id, qty) in &holding {
                        ledger::commit(tx, *item_id, *qty, at).await?;
                    }
                }
                _ => {}
            }
        }
    }
    if let Some(target) = update.payment_status {
        order.set_payment_status(target, update.payment_reference, at)?;
    }
    if let Some(tracking_number) = update.tracking_number {
        order.set_tracking_number(tracking_number, at);
    }
    if let Some(notes) = update.admin_notes {
        order.set_admin_notes(notes, at);
    }

    let version = tx.update_order(&order, expected).await?;
    Ok(order.with_version(version))
}

/// Order creation and maintenance, each call in its own transaction.
#[derive(Debug, Clone)]
pub struct OrderFulfillment<S> {
    store: S,
}

impl<S: Store> OrderFulfillment<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Create an order, reserving stock for every line.
    ///
    /// All-or-nothing: on `NotFound`, `OutOfStock` or any other failure no
    /// order, item or reservation is persisted.
    #[instrument(skip(self, request), fields(lines = request.lines.len()), err)]
    pub async fn create_order(&self, request: OrderRequest) -> Result<Order, WorkflowError> {
        request.validate()?;
        let draft = OrderDraft {
            order_number: request.order_number,
            owner: request.owner,
            shipping: request.shipping,
            contract_id: None,
            lines: request
                .lines
                .into_iter()
                .map(|l| DraftLine {
                    product_id: l.product_id,
                    quantity: l.quantity,
                    unit_price: None,
                })
                .collect(),
        };

        let mut tx = self.store.begin().await?;
        match place_order_in(tx.as_mut(), draft, Utc::now()).await {
            Ok(order) => {
                tx.commit().await?;
                info!(
                    order_id = %order.id_typed(),
                    order_number = %order.order_number(),
                    total = %order.total_amount(),
                    "order created"
                );
                Ok(order)
            }
            Err(err) => {
                tx.rollback().await?;
                warn!(error = %err, "order rejected");
                Err(err)
            }
        }
    }

    #[instrument(skip(self, update), fields(order_id = %order_id), err)]
    pub async fn update_order(
        &self,
        order_id: OrderId,
        update: OrderUpdate,
    ) -> Result<Order, WorkflowError> {
        let mut tx = self.store.begin().await?;
        match update_order_in(tx.as_mut(), order_id, update, Utc::now()).await {
            Ok(order) => {
                tx.commit().await?;
                info!(
                    order_id = %order_id,
                    status = %order.status(),
                    payment_status = %order.payment_status(),
                    "order updated"
                );
                Ok(order)
            }
            Err(err) => {
                tx.rollback().await?;
                warn!(order_id = %order_id, error = %err, "order update rejected");
                Err(err)
            }
        }
    }

    /// Move an order along its fulfilment lifecycle.
    ///
    /// `Cancelled` releases the order's reservations and `Shipped` consumes
    /// them. Re-applying the current status is a no-op.
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, WorkflowError> {
        self.update_order(
            order_id,
            OrderUpdate {
                status: Some(status),
                ..OrderUpdate::default()
            },
        )
        .await
    }

    pub async fn update_payment_status(
        &self,
        order_id: OrderId,
        status: PaymentStatus,
        reference: Option<String>,
    ) -> Result<Order, WorkflowError> {
        self.update_order(
            order_id,
            OrderUpdate {
                payment_status: Some(status),
                payment_reference: reference,
                ..OrderUpdate::default()
            },
        )
        .await
    }

    /// Record tax, shipping and discount computed elsewhere. Pending orders only.
    #[instrument(skip(self, adjustments), fields(order_id = %order_id), err)]
    pub async fn set_order_adjustments(
        &self,
        order_id: OrderId,
        adjustments: Adjustments,
    ) -> Result<Order, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .get_order(order_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(format!("order {order_id}")))?;
        let expected = ExpectedVersion::of(&order);
        order.set_adjustments(adjustments, Utc::now())?;
        let version = tx.update_order(&order, expected).await?;
        tx.commit().await?;
        info!(order_id = %order_id, final_amount = %order.final_amount(), "order adjusted");
        Ok(order.with_version(version))
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, WorkflowError> {
        let mut tx = self.store.begin().await?;
        tx.get_order(order_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(format!("order {order_id}")))
    }

    /// Orders matching `filter`, newest first.
    pub async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: Pagination,
    ) -> Result<Vec<Order>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_orders(filter, page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::test_support::seed;
    use crate::ledger::InventoryLedger;
    use crate::store::InMemoryStore;
    use tradeflow_core::{AddressId, AggregateRoot, UserId};
    use tradeflow_products::{Pricing, Product};
    use tradeflow_sales::ItemStatus;

    fn shipping() -> ShippingInfo {
        ShippingInfo {
            address_id: Some(AddressId::new()),
            method: "standard".into(),
            payment_method: "invoice".into(),
            customer_notes: None,
        }
    }

    fn request(lines: &[(ProductId, i64)]) -> OrderRequest {
        OrderRequest {
            order_number: None,
            owner: OrderOwner::user(UserId::new()),
            shipping: shipping(),
            lines: lines
                .iter()
                .map(|(product_id, quantity)| OrderLineRequest {
                    product_id: *product_id,
                    quantity: *quantity,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn order_reserves_stock_and_prices_lines() {
        let store = InMemoryStore::new();
        let (a, a_row) = seed(&store, "A", 250, 10).await;
        let (b, _) = seed(&store, "B", 100, 5).await;
        let engine = OrderFulfillment::new(store.clone());

        let order = engine.create_order(request(&[(a, 3), (b, 2)])).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.total_amount(), Money::from_minor(950));
        assert_eq!(order.final_amount(), order.total_amount());
        assert_eq!(order.items()[0].inventory_item_id, Some(a_row));
        assert!(order.order_number().starts_with("ORD-"));

        let ledger = InventoryLedger::new(store);
        assert_eq!(ledger.available(a).await.unwrap(), 7);
        assert_eq!(ledger.available(b).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn second_order_beyond_stock_fails_without_side_effects() {
        let store = InMemoryStore::new();
        let (p, row) = seed(&store, "P", 100, 10).await;
        let engine = OrderFulfillment::new(store.clone());

        engine.create_order(request(&[(p, 7)])).await.unwrap();
        let err = engine.create_order(request(&[(p, 5)])).await.unwrap_err();
        assert!(matches!(err, WorkflowError::OutOfStock(_)));

        let item = InventoryLedger::new(store).item(row).await.unwrap();
        assert_eq!(item.reserved(), 7);
        assert_eq!(item.available(), 3);
    }

    #[tokio::test]
    async fn inactive_product_is_refused_before_reserving() {
        let store = InMemoryStore::new();
        let (a, a_row) = seed(&store, "A", 100, 10).await;
        let retired = Product::restore(
            ProductId::new(),
            "RETIRED".into(),
            "Retired widget".into(),
            Pricing::base(Money::from_minor(100)),
            false,
            Utc::now(),
            1,
        );
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_product(&retired).await.unwrap();
            tx.commit().await.unwrap();
        }
        let engine = OrderFulfillment::new(store.clone());

        let err = engine
            .create_order(request(&[(a, 2), (retired.id_typed(), 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(InventoryLedger::new(store).item(a_row).await.unwrap().reserved(), 0);
    }

    #[tokio::test]
    async fn failing_line_rolls_back_earlier_reservations() {
        let store = InMemoryStore::new();
        let (a, a_row) = seed(&store, "A", 100, 10).await;
        let (b, _) = seed(&store, "B", 100, 1).await;
        let engine = OrderFulfillment::new(store.clone());

        let err = engine.create_order(request(&[(a, 4), (b, 2)])).await.unwrap_err();
        assert!(matches!(err, WorkflowError::OutOfStock(_)));
        assert_eq!(InventoryLedger::new(store.clone()).item(a_row).await.unwrap().reserved(), 0);

        let err = engine
            .create_order(request(&[(a, 4), (ProductId::new(), 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
        assert_eq!(InventoryLedger::new(store).item(a_row).await.unwrap().reserved(), 0);
    }

    #[tokio::test]
    async fn release_on_abort_keeps_transaction_clean() {
        let store = InMemoryStore::new();
        let (a, a_row) = seed(&store, "A", 100, 10).await;
        let draft = OrderDraft {
            order_number: None,
            owner: OrderOwner::user(UserId::new()),
            shipping: shipping(),
            contract_id: None,
            lines: vec![
                DraftLine { product_id: a, quantity: 6, unit_price: None },
                DraftLine { product_id: a, quantity: 6, unit_price: None },
            ],
        };

        let mut tx = store.begin().await.unwrap();
        let err = place_order_in(tx.as_mut(), draft, Utc::now()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::OutOfStock(_)));
        let row = tx.get_inventory_item(a_row).await.unwrap().unwrap();
        assert_eq!(row.reserved(), 0);
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_any_lookup() {
        let engine = OrderFulfillment::new(InMemoryStore::new());

        let err = engine.create_order(request(&[])).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let err = engine.create_order(request(&[(ProductId::new(), 0)])).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let mut no_owner = request(&[(ProductId::new(), 1)]);
        no_owner.owner = OrderOwner { user_id: None, company_id: None };
        assert!(matches!(
            engine.create_order(no_owner).await.unwrap_err(),
            WorkflowError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_order_number_conflicts() {
        let store = InMemoryStore::new();
        let (p, row) = seed(&store, "P", 100, 10).await;
        let engine = OrderFulfillment::new(store.clone());

        let mut first = request(&[(p, 1)]);
        first.order_number = Some("ORD-1".into());
        engine.create_order(first.clone()).await.unwrap();

        let err = engine.create_order(first).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));
        assert_eq!(InventoryLedger::new(store).item(row).await.unwrap().reserved(), 1);
    }

    #[tokio::test]
    async fn pending_cannot_jump_to_shipped() {
        let store = InMemoryStore::new();
        let (p, _) = seed(&store, "P", 100, 10).await;
        let engine = OrderFulfillment::new(store);
        let order = engine.create_order(request(&[(p, 1)])).await.unwrap();

        let err = engine
            .update_order_status(order.id_typed(), OrderStatus::Shipped)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { kind: "order", .. }));

        let unchanged = engine.get_order(order.id_typed()).await.unwrap();
        assert_eq!(unchanged.status(), OrderStatus::Pending);
        assert_eq!(unchanged.version(), order.version());
    }

    #[tokio::test]
    async fn shipping_commits_stock_and_stamps_date_once() {
        let store = InMemoryStore::new();
        let (p, row) = seed(&store, "P", 100, 10).await;
        let engine = OrderFulfillment::new(store.clone());
        let order = engine.create_order(request(&[(p, 4)])).await.unwrap();

        engine.update_order_status(order.id_typed(), OrderStatus::Processing).await.unwrap();
        let shipped = engine.update_order_status(order.id_typed(), OrderStatus::Shipped).await.unwrap();
        let first_stamp = shipped.shipped_date();
        assert!(first_stamp.is_some());

        let again = engine.update_order_status(order.id_typed(), OrderStatus::Shipped).await.unwrap();
        assert_eq!(again.shipped_date(), first_stamp);

        let item = InventoryLedger::new(store).item(row).await.unwrap();
        assert_eq!(item.quantity(), 6);
        assert_eq!(item.reserved(), 0);
    }

    #[tokio::test]
    async fn cancelling_releases_reservations() {
        let store = InMemoryStore::new();
        let (p, row) = seed(&store, "P", 100, 10).await;
        let engine = OrderFulfillment::new(store.clone());
        let order = engine.create_order(request(&[(p, 4)])).await.unwrap();

        let cancelled = engine
            .update_order_status(order.id_typed(), OrderStatus::Cancelled)
            .await
            .unwrap();
        assert!(cancelled.items().iter().all(|i| i.status == ItemStatus::Cancelled));

        let item = InventoryLedger::new(store).item(row).await.unwrap();
        assert_eq!((item.quantity(), item.reserved()), (10, 0));

        // Second cancel is a no-op and must not release again.
        engine.update_order_status(order.id_typed(), OrderStatus::Cancelled).await.unwrap();
    }

    #[tokio::test]
    async fn payment_and_notes_update_together() {
        let store = InMemoryStore::new();
        let (p, _) = seed(&store, "P", 100, 10).await;
        let engine = OrderFulfillment::new(store);
        let order = engine.create_order(request(&[(p, 1)])).await.unwrap();

        let paid = engine
            .update_order(
                order.id_typed(),
                OrderUpdate {
                    payment_status: Some(PaymentStatus::Paid),
                    payment_reference: Some("PAY-42".into()),
                    admin_notes: Some("priority".into()),
                    ..OrderUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(paid.payment_status(), PaymentStatus::Paid);
        assert!(paid.payment_date().is_some());
        assert_eq!(paid.record().admin_notes.as_deref(), Some("priority"));
        assert_eq!(paid.version(), order.version() + 1);

        let err = engine
            .update_payment_status(order.id_typed(), PaymentStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { kind: "payment", .. }));
    }

    #[tokio::test]
    async fn orders_filter_by_status_payment_and_owner() {
        let store = InMemoryStore::new();
        let (p, _) = seed(&store, "P", 100, 50).await;
        let engine = OrderFulfillment::new(store);
        let regular = UserId::new();

        let mut mine = request(&[(p, 1)]);
        mine.owner = OrderOwner::user(regular);
        let first = engine.create_order(mine.clone()).await.unwrap();
        let second = engine.create_order(mine).await.unwrap();
        let stranger = engine.create_order(request(&[(p, 1)])).await.unwrap();

        engine.update_order_status(second.id_typed(), OrderStatus::Cancelled).await.unwrap();
        engine
            .update_order(
                stranger.id_typed(),
                OrderUpdate {
                    payment_status: Some(PaymentStatus::Paid),
                    ..OrderUpdate::default()
                },
            )
            .await
            .unwrap();

        let ids = |orders: Vec<Order>| {
            let mut ids: Vec<OrderId> = orders.iter().map(Order::id_typed).collect();
            ids.sort();
            ids
        };
        let sorted = |mut v: Vec<OrderId>| {
            v.sort();
            v
        };
        let page = Pagination::default();

        let all = engine.list_orders(&OrderFilter::default(), page).await.unwrap();
        assert_eq!(all.len(), 3);

        let by_user = OrderFilter {
            user_id: Some(regular),
            ..OrderFilter::default()
        };
        let found = engine.list_orders(&by_user, page).await.unwrap();
        assert_eq!(ids(found), sorted(vec![first.id_typed(), second.id_typed()]));

        let cancelled = OrderFilter {
            status: Some(OrderStatus::Cancelled),
            ..OrderFilter::default()
        };
        let found = engine.list_orders(&cancelled, page).await.unwrap();
        assert_eq!(ids(found), vec![second.id_typed()]);

        let paid = OrderFilter {
            payment_status: Some(PaymentStatus::Paid),
            ..OrderFilter::default()
        };
        let found = engine.list_orders(&paid, page).await.unwrap();
        assert_eq!(found[0].items().len(), 1);
        assert_eq!(ids(found), vec![stranger.id_typed()]);

        let pending_of_user = OrderFilter {
            status: Some(OrderStatus::Pending),
            user_id: Some(regular),
            ..OrderFilter::default()
        };
        let found = engine.list_orders(&pending_of_user, page).await.unwrap();
        assert_eq!(ids(found), vec![first.id_typed()]);
    }

    #[tokio::test]
    async fn order_listing_pages_do_not_overlap() {
        let store = InMemoryStore::new();
        let (p, _) = seed(&store, "P", 100, 50).await;
        let engine = OrderFulfillment::new(store);
        for _ in 0..5 {
            engine.create_order(request(&[(p, 1)])).await.unwrap();
        }

        let filter = OrderFilter::default();
        let first = engine.list_orders(&filter, Pagination::new(Some(2), None)).await.unwrap();
        let second = engine.list_orders(&filter, Pagination::new(Some(2), Some(2))).await.unwrap();
        let last = engine.list_orders(&filter, Pagination::new(Some(2), Some(4))).await.unwrap();
        assert_eq!((first.len(), second.len(), last.len()), (2, 2, 1));

        let mut seen: Vec<OrderId> = first.iter().chain(&second).chain(&last).map(Order::id_typed).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn adjustments_only_while_pending() {
        let store = InMemoryStore::new();
        let (p, _) = seed(&store, "P", 1000, 10).await;
        let engine = OrderFulfillment::new(store);
        let order = engine.create_order(request(&[(p, 1)])).await.unwrap();

        let adjusted = engine
            .set_order_adjustments(
                order.id_typed(),
                Adjustments {
                    tax: Money::from_minor(200),
                    shipping: Money::from_minor(50),
                    discount: Money::from_minor(100),
                },
            )
            .await
            .unwrap();
        assert_eq!(adjusted.final_amount(), Money::from_minor(1150));

        engine.update_order_status(order.id_typed(), OrderStatus::Processing).await.unwrap();
        let err = engine
            .set_order_adjustments(order.id_typed(), Adjustments::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_orders_never_oversell() {
        let store = InMemoryStore::new();
        let (p, row) = seed(&store, "P", 100, 10).await;
        let engine = std::sync::Arc::new(OrderFulfillment::new(store.clone()));

        let mut handles = Vec::new();
        for qty in [7, 5, 3, 2, 4] {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.create_order(request(&[(p, qty)])).await.map(|_| qty)
            }));
        }
        let mut granted = 0;
        for handle in handles {
            if let Ok(qty) = handle.await.unwrap() {
                granted += qty;
            }
        }
        assert!(granted <= 10);
        let item = InventoryLedger::new(store).item(row).await.unwrap();
        assert_eq!(item.reserved(), granted);
    }
}
