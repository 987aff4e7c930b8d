//! Postgres-backed transactional store.
//!
//! Every [`StoreTx`] wraps one `sqlx` transaction. Aggregates are written as a
//! root row plus child rows; status enums are stored as their lowercase wire
//! names and parsed back on load.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (check constraint violation) | `23514` | `Backend` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / network / other | N/A | `Backend` |
//!
//! Rows that decode but fail domain validation surface as `Corrupt`.
//!
//! ## Stock mutations
//!
//! `try_reserve`, `try_release` and `try_commit` are single conditional
//! `UPDATE`s; the guard lives in the `WHERE` clause and the caller inspects
//! `rows_affected()`. There is no read-then-write window.

use core::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use tradeflow_contracts::{
    Contract, ContractItem, ContractOrder, ContractRecord, ContractSchedule, ContractStatus,
    Recurrence,
};
use tradeflow_core::{
    ContractId, DomainError, ExpectedVersion, InventoryItemId, Money, OrderId, ProductId,
    PurchaseOrderId, WarehouseId,
};
use tradeflow_inventory::InventoryItem;
use tradeflow_products::{Pricing, Product};
use tradeflow_purchasing::{PoItem, PurchaseOrder, PurchaseOrderRecord};
use tradeflow_sales::{Adjustments, Order, OrderItem, OrderOwner, OrderRecord, ShippingInfo};

use super::query::{ContractFilter, OrderFilter, Pagination, PurchaseOrderFilter};
use super::r#trait::{Store, StoreError, StoreTx};

/// Postgres-backed store.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self { pool })
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PgTx { tx }))
    }
}

/// One open Postgres transaction. Dropping it without commit rolls back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

/// `None` skips the version guard in `($n::BIGINT IS NULL OR version = $n)`.
fn expected_param(expected: ExpectedVersion) -> Option<i64> {
    match expected {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(v as i64),
    }
}

const INVENTORY_COLUMNS: &str = "id, product_id, warehouse_id, quantity, reserved, batch_number, \
                                 expiry_date, status, updated_at";

impl PgTx {
    /// Tell a stale version apart from a missing row after a guarded update hit nothing.
    async fn version_miss(
        &mut self,
        table: &'static str,
        id: Uuid,
        expected: ExpectedVersion,
    ) -> StoreError {
        let sql = format!("SELECT version FROM {table} WHERE id = $1");
        match sqlx::query(&sql).bind(id).fetch_optional(&mut *self.tx).await {
            Ok(Some(row)) => {
                let found: i64 = row.try_get("version").unwrap_or_default();
                StoreError::Conflict(format!(
                    "{table} {id}: expected {expected:?}, found version {found}"
                ))
            }
            Ok(None) => StoreError::NotFound(format!("{table} {id}")),
            Err(e) => map_sqlx_error("version_check", e),
        }
    }

    async fn load_order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, inventory_item_id, quantity, unit_price, total_amount, status
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_order_items", e))?;

        rows.iter()
            .map(|row| {
                Ok(OrderItem {
                    id: row.try_get::<Uuid, _>("id").map_err(decode_error)?.into(),
                    product_id: row.try_get::<Uuid, _>("product_id").map_err(decode_error)?.into(),
                    inventory_item_id: row
                        .try_get::<Option<Uuid>, _>("inventory_item_id")
                        .map_err(decode_error)?
                        .map(InventoryItemId::from),
                    quantity: row.try_get("quantity").map_err(decode_error)?,
                    unit_price: money(row, "unit_price")?,
                    total_amount: money(row, "total_amount")?,
                    status: parse_column(row, "status")?,
                })
            })
            .collect()
    }

    async fn load_po_items(&mut self, po_id: Uuid) -> Result<Vec<PoItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, quantity, received_quantity, unit_price, total_amount, status
            FROM po_items
            WHERE purchase_order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(po_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_po_items", e))?;

        rows.iter()
            .map(|row| {
                Ok(PoItem {
                    id: row.try_get::<Uuid, _>("id").map_err(decode_error)?.into(),
                    product_id: row.try_get::<Uuid, _>("product_id").map_err(decode_error)?.into(),
                    quantity: row.try_get("quantity").map_err(decode_error)?,
                    received_quantity: row.try_get("received_quantity").map_err(decode_error)?,
                    unit_price: money(row, "unit_price")?,
                    total_amount: money(row, "total_amount")?,
                    status: parse_column(row, "status")?,
                })
            })
            .collect()
    }

    /// Items and schedule for a contract row already fetched.
    async fn load_contract(&mut self, row: ContractRow) -> Result<Contract, StoreError> {
        let items = sqlx::query(
            r#"
            SELECT id, product_id, quantity, unit_price, is_active
            FROM contract_items
            WHERE contract_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(row.id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_contract_items", e))?
        .iter()
        .map(|r| {
            Ok(ContractItem {
                id: r.try_get::<Uuid, _>("id").map_err(decode_error)?.into(),
                product_id: r.try_get::<Uuid, _>("product_id").map_err(decode_error)?.into(),
                quantity: r.try_get("quantity").map_err(decode_error)?,
                unit_price: money(r, "unit_price")?,
                is_active: r.try_get("is_active").map_err(decode_error)?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

        let schedule = sqlx::query(
            r#"
            SELECT id, frequency, day_of_week, day_of_month, time_of_day,
                   last_generated, next_generation, is_active
            FROM contract_schedules
            WHERE contract_id = $1
            "#,
        )
        .bind(row.id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_contract_schedule", e))?
        .map(|r| schedule_from_row(&r))
        .transpose()?;

        Contract::restore(row.into_record(items, schedule)?).map_err(corrupt("contract"))
    }

    async fn insert_contract_children(&mut self, contract: &Contract) -> Result<(), StoreError> {
        let record = contract.record();
        for (position, item) in record.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO contract_items (id, contract_id, position, product_id, quantity, unit_price, is_active)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(record.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_uuid())
            .bind(item.quantity)
            .bind(item.unit_price.minor())
            .bind(item.is_active)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_contract_item", e))?;
        }

        if let Some(schedule) = &record.schedule {
            let r = &schedule.recurrence;
            sqlx::query(
                r#"
                INSERT INTO contract_schedules (
                    id, contract_id, frequency, day_of_week, day_of_month, time_of_day,
                    last_generated, next_generation, is_active
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(schedule.id.as_uuid())
            .bind(record.id.as_uuid())
            .bind(r.frequency.as_str())
            .bind(r.day_of_week.map(i16::from))
            .bind(r.day_of_month.map(i16::from))
            .bind(r.time_of_day)
            .bind(schedule.last_generated)
            .bind(schedule.next_generation)
            .bind(schedule.is_active)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_contract_schedule", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTx for PgTx {
    #[instrument(skip(self, product), fields(product_id = %product.id_typed()), err)]
    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        let pricing = product.pricing();
        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, base_price, b2b_price, cost_price, is_active, created_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1)
            "#,
        )
        .bind(product.id_typed().as_uuid())
        .bind(product.sku())
        .bind(product.name())
        .bind(pricing.base_price.minor())
        .bind(pricing.b2b_price.map(Money::minor))
        .bind(pricing.cost_price.map(Money::minor))
        .bind(product.is_active())
        .bind(product.created_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("sku {} already exists", product.sku()))
            } else {
                map_sqlx_error("insert_product", e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, sku, name, base_price, b2b_price, cost_price, is_active, created_at, version
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;

        row.map(|row| {
            Ok(Product::restore(
                row.try_get::<Uuid, _>("id").map_err(decode_error)?.into(),
                row.try_get("sku").map_err(decode_error)?,
                row.try_get("name").map_err(decode_error)?,
                Pricing {
                    base_price: money(&row, "base_price")?,
                    b2b_price: optional_money(&row, "b2b_price")?,
                    cost_price: optional_money(&row, "cost_price")?,
                },
                row.try_get("is_active").map_err(decode_error)?,
                row.try_get("created_at").map_err(decode_error)?,
                row.try_get::<i64, _>("version").map_err(decode_error)? as u64,
            ))
        })
        .transpose()
    }

    #[instrument(skip(self, item), fields(inventory_item_id = %item.id_typed()), err)]
    async fn insert_inventory_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items (
                id, product_id, warehouse_id, quantity, reserved, batch_number,
                expiry_date, status, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(item.id_typed().as_uuid())
        .bind(item.product_id().as_uuid())
        .bind(item.warehouse_id().as_uuid())
        .bind(item.quantity())
        .bind(item.reserved())
        .bind(item.batch_number())
        .bind(item.expiry_date())
        .bind(item.status().as_str())
        .bind(item.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("inventory item {} already exists", item.id_typed()))
            } else {
                map_sqlx_error("insert_inventory_item", e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(inventory_item_id = %id), err)]
    async fn get_inventory_item(
        &mut self,
        id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        let sql = format!("SELECT {INVENTORY_COLUMNS} FROM inventory_items WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_inventory_item", e))?;
        row.map(|r| inventory_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn find_active_inventory(
        &mut self,
        product_id: ProductId,
    ) -> Result<Vec<InventoryItem>, StoreError> {
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory_items \
             WHERE product_id = $1 AND status = 'active' \
             ORDER BY (quantity - reserved) DESC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(product_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_active_inventory", e))?;
        rows.iter().map(inventory_from_row).collect()
    }

    #[instrument(skip(self), fields(product_id = %product_id, warehouse_id = %warehouse_id), err)]
    async fn find_inventory_in_warehouse(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory_items \
             WHERE product_id = $1 AND warehouse_id = $2 AND status = 'active' \
             ORDER BY id ASC \
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(product_id.as_uuid())
            .bind(warehouse_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_inventory_in_warehouse", e))?;
        row.map(|r| inventory_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(inventory_item_id = %id, qty), err)]
    async fn try_reserve(
        &mut self,
        id: InventoryItemId,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET reserved = reserved + $2, updated_at = $3
            WHERE id = $1
              AND $2 > 0
              AND status = 'active'
              AND quantity - reserved >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(qty)
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("try_reserve", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(inventory_item_id = %id, qty), err)]
    async fn try_release(
        &mut self,
        id: InventoryItemId,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET reserved = reserved - $2, updated_at = $3
            WHERE id = $1 AND $2 > 0 AND reserved >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(qty)
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("try_release", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(inventory_item_id = %id, qty), err)]
    async fn try_commit(
        &mut self,
        id: InventoryItemId,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET quantity = quantity - $2, reserved = reserved - $2, updated_at = $3
            WHERE id = $1 AND $2 > 0 AND reserved >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(qty)
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("try_commit", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(inventory_item_id = %id, qty), err)]
    async fn add_on_hand(
        &mut self,
        id: InventoryItemId,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET quantity = quantity + $2, updated_at = $3
            WHERE id = $1 AND $2 > 0
            "#,
        )
        .bind(id.as_uuid())
        .bind(qty)
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("add_on_hand", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, item), fields(inventory_item_id = %item.id_typed(), status = %item.status()), err)]
    async fn update_inventory_status(&mut self, item: &InventoryItem) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE inventory_items SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(item.id_typed().as_uuid())
            .bind(item.status().as_str())
            .bind(item.updated_at())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_inventory_status", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, order), fields(order_id = %order.id_typed(), order_number = %order.order_number()), err)]
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let r = order.record();
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, user_id, company_id, contract_id, address_id,
                shipping_method, payment_method, customer_notes, status, payment_status,
                payment_reference, total_amount, tax_amount, shipping_amount, discount_amount,
                final_amount, admin_notes, tracking_number, order_date, shipped_date,
                delivered_date, payment_date, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $25)
            "#,
        )
        .bind(r.id.as_uuid())
        .bind(&r.order_number)
        .bind(r.owner.user_id.map(Uuid::from))
        .bind(r.owner.company_id.map(Uuid::from))
        .bind(r.contract_id.map(Uuid::from))
        .bind(r.shipping.address_id.map(Uuid::from))
        .bind(&r.shipping.method)
        .bind(&r.shipping.payment_method)
        .bind(&r.shipping.customer_notes)
        .bind(r.status.as_str())
        .bind(r.payment_status.as_str())
        .bind(&r.payment_reference)
        .bind(r.total_amount.minor())
        .bind(r.adjustments.tax.minor())
        .bind(r.adjustments.shipping.minor())
        .bind(r.adjustments.discount.minor())
        .bind(r.final_amount.minor())
        .bind(&r.admin_notes)
        .bind(&r.tracking_number)
        .bind(r.order_date)
        .bind(r.shipped_date)
        .bind(r.delivered_date)
        .bind(r.payment_date)
        .bind(r.updated_at)
        .bind(r.version as i64)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("order number {} already exists", r.order_number))
            } else {
                map_sqlx_error("insert_order", e)
            }
        })?;

        for (position, item) in r.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, position, product_id, inventory_item_id,
                    quantity, unit_price, total_amount, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(r.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_uuid())
            .bind(item.inventory_item_id.map(Uuid::from))
            .bind(item.quantity)
            .bind(item.unit_price.minor())
            .bind(item.total_amount.minor())
            .bind(item.status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let row = OrderRow::from_row(&row).map_err(decode_error)?;
        let items = self.load_order_items(row.id).await?;
        let order = Order::restore(row.into_record(items)?).map_err(corrupt("order"))?;
        Ok(Some(order))
    }

    #[instrument(skip(self), err)]
    async fn list_orders(
        &mut self,
        filter: &OrderFilter,
        page: Pagination,
    ) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM orders
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::TEXT IS NULL OR payment_status = $2)
              AND ($3::UUID IS NULL OR user_id = $3)
              AND ($4::UUID IS NULL OR company_id = $4)
            ORDER BY order_date DESC, id DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.payment_status.map(|s| s.as_str()))
        .bind(filter.user_id.map(Uuid::from))
        .bind(filter.company_id.map(Uuid::from))
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        let rows = rows
            .iter()
            .map(OrderRow::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_error)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let items = self.load_order_items(row.id).await?;
            orders.push(Order::restore(row.into_record(items)?).map_err(corrupt("order"))?);
        }
        Ok(orders)
    }

    #[instrument(skip(self, order), fields(order_id = %order.id_typed(), expected = ?expected), err)]
    async fn update_order(
        &mut self,
        order: &Order,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        let r = order.record();
        let row = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, payment_status = $4, payment_reference = $5,
                tax_amount = $6, shipping_amount = $7, discount_amount = $8, final_amount = $9,
                admin_notes = $10, tracking_number = $11, shipped_date = $12,
                delivered_date = $13, payment_date = $14, updated_at = $15,
                version = version + 1
            WHERE id = $1 AND ($2::BIGINT IS NULL OR version = $2)
            RETURNING version
            "#,
        )
        .bind(r.id.as_uuid())
        .bind(expected_param(expected))
        .bind(r.status.as_str())
        .bind(r.payment_status.as_str())
        .bind(&r.payment_reference)
        .bind(r.adjustments.tax.minor())
        .bind(r.adjustments.shipping.minor())
        .bind(r.adjustments.discount.minor())
        .bind(r.final_amount.minor())
        .bind(&r.admin_notes)
        .bind(&r.tracking_number)
        .bind(r.shipped_date)
        .bind(r.delivered_date)
        .bind(r.payment_date)
        .bind(r.updated_at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;

        let Some(row) = row else {
            return Err(self.version_miss("orders", *r.id.as_uuid(), expected).await);
        };
        let version: i64 = row.try_get("version").map_err(decode_error)?;

        for item in &r.items {
            sqlx::query("UPDATE order_items SET status = $2 WHERE id = $1")
                .bind(item.id.as_uuid())
                .bind(item.status.as_str())
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("update_order_item", e))?;
        }
        Ok(version as u64)
    }

    #[instrument(skip(self, po), fields(po_id = %po.id_typed(), po_number = %po.po_number()), err)]
    async fn insert_purchase_order(&mut self, po: &PurchaseOrder) -> Result<(), StoreError> {
        let r = po.record();
        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                id, po_number, supplier_id, warehouse_id, status, currency, exchange_rate,
                expected_date, shipping_method, container_number, tracking_number, notes,
                total_amount, approved_date, shipped_date, received_date, created_at,
                updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19)
            "#,
        )
        .bind(r.id.as_uuid())
        .bind(&r.po_number)
        .bind(r.supplier_id.as_uuid())
        .bind(r.warehouse_id.as_uuid())
        .bind(r.status.as_str())
        .bind(&r.currency)
        .bind(r.exchange_rate)
        .bind(r.expected_date)
        .bind(&r.shipping_method)
        .bind(&r.container_number)
        .bind(&r.tracking_number)
        .bind(&r.notes)
        .bind(r.total_amount.minor())
        .bind(r.approved_date)
        .bind(r.shipped_date)
        .bind(r.received_date)
        .bind(r.created_at)
        .bind(r.updated_at)
        .bind(r.version as i64)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("po number {} already exists", r.po_number))
            } else {
                map_sqlx_error("insert_purchase_order", e)
            }
        })?;

        for (position, item) in r.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO po_items (
                    id, purchase_order_id, position, product_id, quantity,
                    received_quantity, unit_price, total_amount, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(r.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_uuid())
            .bind(item.quantity)
            .bind(item.received_quantity)
            .bind(item.unit_price.minor())
            .bind(item.total_amount.minor())
            .bind(item.status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_po_item", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(po_id = %id), err)]
    async fn get_purchase_order(
        &mut self,
        id: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, StoreError> {
        let row = sqlx::query("SELECT * FROM purchase_orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_purchase_order", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let row = PurchaseOrderRow::from_row(&row).map_err(decode_error)?;
        let items = self.load_po_items(row.id).await?;
        let po = PurchaseOrder::restore(row.into_record(items)?).map_err(corrupt("purchase order"))?;
        Ok(Some(po))
    }

    #[instrument(skip(self), err)]
    async fn list_purchase_orders(
        &mut self,
        filter: &PurchaseOrderFilter,
        page: Pagination,
    ) -> Result<Vec<PurchaseOrder>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM purchase_orders
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::UUID IS NULL OR supplier_id = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.supplier_id.map(Uuid::from))
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_purchase_orders", e))?;

        let rows = rows
            .iter()
            .map(PurchaseOrderRow::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_error)?;

        let mut pos = Vec::with_capacity(rows.len());
        for row in rows {
            let items = self.load_po_items(row.id).await?;
            pos.push(PurchaseOrder::restore(row.into_record(items)?).map_err(corrupt("purchase order"))?);
        }
        Ok(pos)
    }

    #[instrument(skip(self, po), fields(po_id = %po.id_typed(), expected = ?expected), err)]
    async fn update_purchase_order(
        &mut self,
        po: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        let r = po.record();
        let row = sqlx::query(
            r#"
            UPDATE purchase_orders
            SET status = $3, shipping_method = $4, container_number = $5, tracking_number = $6,
                notes = $7, approved_date = $8, shipped_date = $9, received_date = $10,
                updated_at = $11, version = version + 1
            WHERE id = $1 AND ($2::BIGINT IS NULL OR version = $2)
            RETURNING version
            "#,
        )
        .bind(r.id.as_uuid())
        .bind(expected_param(expected))
        .bind(r.status.as_str())
        .bind(&r.shipping_method)
        .bind(&r.container_number)
        .bind(&r.tracking_number)
        .bind(&r.notes)
        .bind(r.approved_date)
        .bind(r.shipped_date)
        .bind(r.received_date)
        .bind(r.updated_at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_purchase_order", e))?;

        let Some(row) = row else {
            return Err(self.version_miss("purchase_orders", *r.id.as_uuid(), expected).await);
        };
        let version: i64 = row.try_get("version").map_err(decode_error)?;

        for item in &r.items {
            sqlx::query("UPDATE po_items SET received_quantity = $2, status = $3 WHERE id = $1")
                .bind(item.id.as_uuid())
                .bind(item.received_quantity)
                .bind(item.status.as_str())
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("update_po_item", e))?;
        }
        Ok(version as u64)
    }

    #[instrument(skip(self, contract), fields(contract_id = %contract.id_typed()), err)]
    async fn insert_contract(&mut self, contract: &Contract) -> Result<(), StoreError> {
        let r = contract.record();
        sqlx::query(
            r#"
            INSERT INTO contracts (
                id, contract_number, company_id, status, start_date, end_date, auto_renew,
                renewal_period_months, payment_terms_days, notes, address_id,
                shipping_method, payment_method, customer_notes, activated_at,
                created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18)
            "#,
        )
        .bind(r.id.as_uuid())
        .bind(&r.contract_number)
        .bind(r.company_id.as_uuid())
        .bind(r.status.as_str())
        .bind(r.start_date)
        .bind(r.end_date)
        .bind(r.auto_renew)
        .bind(r.renewal_period_months as i32)
        .bind(r.payment_terms_days as i32)
        .bind(&r.notes)
        .bind(r.delivery.address_id.map(Uuid::from))
        .bind(&r.delivery.method)
        .bind(&r.delivery.payment_method)
        .bind(&r.delivery.customer_notes)
        .bind(r.activated_at)
        .bind(r.created_at)
        .bind(r.updated_at)
        .bind(r.version as i64)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "contract number {} already exists",
                    r.contract_number
                ))
            } else {
                map_sqlx_error("insert_contract", e)
            }
        })?;

        self.insert_contract_children(contract).await
    }

    #[instrument(skip(self), fields(contract_id = %id), err)]
    async fn get_contract(&mut self, id: ContractId) -> Result<Option<Contract>, StoreError> {
        let row = sqlx::query("SELECT * FROM contracts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_contract", e))?;
        match row {
            Some(row) => {
                let row = ContractRow::from_row(&row).map_err(decode_error)?;
                Ok(Some(self.load_contract(row).await?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, contract), fields(contract_id = %contract.id_typed(), expected = ?expected), err)]
    async fn update_contract(
        &mut self,
        contract: &Contract,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        let r = contract.record();
        let row = sqlx::query(
            r#"
            UPDATE contracts
            SET status = $3, end_date = $4, auto_renew = $5, renewal_period_months = $6,
                payment_terms_days = $7, notes = $8, activated_at = $9, updated_at = $10,
                version = version + 1
            WHERE id = $1 AND ($2::BIGINT IS NULL OR version = $2)
            RETURNING version
            "#,
        )
        .bind(r.id.as_uuid())
        .bind(expected_param(expected))
        .bind(r.status.as_str())
        .bind(r.end_date)
        .bind(r.auto_renew)
        .bind(r.renewal_period_months as i32)
        .bind(r.payment_terms_days as i32)
        .bind(&r.notes)
        .bind(r.activated_at)
        .bind(r.updated_at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_contract", e))?;

        let Some(row) = row else {
            return Err(self.version_miss("contracts", *r.id.as_uuid(), expected).await);
        };
        let version: i64 = row.try_get("version").map_err(decode_error)?;

        // Children are rewritten wholesale; nothing references them by id.
        for table in ["contract_items", "contract_schedules"] {
            let sql = format!("DELETE FROM {table} WHERE contract_id = $1");
            sqlx::query(&sql)
                .bind(r.id.as_uuid())
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("replace_contract_children", e))?;
        }
        self.insert_contract_children(contract).await?;
        Ok(version as u64)
    }

    #[instrument(skip(self), err)]
    async fn list_contracts(
        &mut self,
        filter: &ContractFilter,
        page: Pagination,
    ) -> Result<Vec<Contract>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM contracts
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::UUID IS NULL OR company_id = $2)
            ORDER BY contract_number ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.company_id.map(Uuid::from))
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_contracts", e))?;

        let rows = rows
            .iter()
            .map(ContractRow::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_error)?;

        let mut contracts = Vec::with_capacity(rows.len());
        for row in rows {
            contracts.push(self.load_contract(row).await?);
        }
        Ok(contracts)
    }

    #[instrument(skip(self), err)]
    async fn list_active_contracts(&mut self) -> Result<Vec<Contract>, StoreError> {
        let rows = sqlx::query("SELECT * FROM contracts WHERE status = $1 ORDER BY contract_number ASC")
            .bind(ContractStatus::Active.as_str())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_active_contracts", e))?;

        let rows = rows
            .iter()
            .map(ContractRow::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_error)?;

        let mut contracts = Vec::with_capacity(rows.len());
        for row in rows {
            contracts.push(self.load_contract(row).await?);
        }
        Ok(contracts)
    }

    #[instrument(skip(self, entry), fields(contract_id = %entry.contract_id, status = %entry.status), err)]
    async fn append_contract_order(&mut self, entry: &ContractOrder) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO contract_orders (id, contract_id, schedule_id, generated_date, status, order_id, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.contract_id.as_uuid())
        .bind(entry.schedule_id.as_uuid())
        .bind(entry.generated_date)
        .bind(entry.status.as_str())
        .bind(entry.order_id.map(Uuid::from))
        .bind(&entry.error)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_contract_order", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(contract_id = %contract_id), err)]
    async fn list_contract_orders(
        &mut self,
        contract_id: ContractId,
    ) -> Result<Vec<ContractOrder>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, contract_id, schedule_id, generated_date, status, order_id, error
            FROM contract_orders
            WHERE contract_id = $1
            ORDER BY generated_date ASC, id ASC
            "#,
        )
        .bind(contract_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_contract_orders", e))?;

        rows.iter()
            .map(|row| {
                Ok(ContractOrder {
                    id: row.try_get::<Uuid, _>("id").map_err(decode_error)?.into(),
                    contract_id: row.try_get::<Uuid, _>("contract_id").map_err(decode_error)?.into(),
                    schedule_id: row.try_get::<Uuid, _>("schedule_id").map_err(decode_error)?.into(),
                    generated_date: row.try_get("generated_date").map_err(decode_error)?,
                    status: parse_column(row, "status")?,
                    order_id: row
                        .try_get::<Option<Uuid>, _>("order_id")
                        .map_err(decode_error)?
                        .map(OrderId::from),
                    error: row.try_get("error").map_err(decode_error)?,
                })
            })
            .collect()
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTx { tx } = *self;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgTx { tx } = *self;
        tx.rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Map SQLx errors to `StoreError` with context.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Backend(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn corrupt(what: &'static str) -> impl Fn(DomainError) -> StoreError {
    move |e| StoreError::Corrupt(format!("{what}: {e}"))
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = DomainError>,
{
    let raw: String = row.try_get(column).map_err(decode_error)?;
    parse_text(column, &raw)
}

fn parse_text<T>(column: &str, raw: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn money(row: &PgRow, column: &str) -> Result<Money, StoreError> {
    Ok(Money::from_minor(row.try_get(column).map_err(decode_error)?))
}

fn optional_money(row: &PgRow, column: &str) -> Result<Option<Money>, StoreError> {
    Ok(row
        .try_get::<Option<i64>, _>(column)
        .map_err(decode_error)?
        .map(Money::from_minor))
}

fn small_day(column: &str, value: Option<i16>) -> Result<Option<u8>, StoreError> {
    value
        .map(|v| {
            u8::try_from(v).map_err(|_| StoreError::Corrupt(format!("column {column}: {v}")))
        })
        .transpose()
}

fn unsigned(column: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("column {column}: {value}")))
}

fn inventory_from_row(row: &PgRow) -> Result<InventoryItem, StoreError> {
    InventoryItem::restore(
        row.try_get::<Uuid, _>("id").map_err(decode_error)?.into(),
        row.try_get::<Uuid, _>("product_id").map_err(decode_error)?.into(),
        row.try_get::<Uuid, _>("warehouse_id").map_err(decode_error)?.into(),
        row.try_get("quantity").map_err(decode_error)?,
        row.try_get("reserved").map_err(decode_error)?,
        row.try_get("batch_number").map_err(decode_error)?,
        row.try_get("expiry_date").map_err(decode_error)?,
        parse_column(row, "status")?,
        row.try_get("updated_at").map_err(decode_error)?,
    )
    .map_err(corrupt("inventory item"))
}

fn schedule_from_row(row: &PgRow) -> Result<ContractSchedule, StoreError> {
    let time_of_day: NaiveTime = row.try_get("time_of_day").map_err(decode_error)?;
    Ok(ContractSchedule {
        id: row.try_get::<Uuid, _>("id").map_err(decode_error)?.into(),
        recurrence: Recurrence {
            frequency: parse_column(row, "frequency")?,
            day_of_week: small_day("day_of_week", row.try_get("day_of_week").map_err(decode_error)?)?,
            day_of_month: small_day(
                "day_of_month",
                row.try_get("day_of_month").map_err(decode_error)?,
            )?,
            time_of_day,
        },
        last_generated: row.try_get("last_generated").map_err(decode_error)?,
        next_generation: row.try_get("next_generation").map_err(decode_error)?,
        is_active: row.try_get("is_active").map_err(decode_error)?,
    })
}

// SQLx row types

#[derive(Debug)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Option<Uuid>,
    company_id: Option<Uuid>,
    contract_id: Option<Uuid>,
    address_id: Option<Uuid>,
    shipping_method: String,
    payment_method: String,
    customer_notes: Option<String>,
    status: String,
    payment_status: String,
    payment_reference: Option<String>,
    total_amount: i64,
    tax_amount: i64,
    shipping_amount: i64,
    discount_amount: i64,
    final_amount: i64,
    admin_notes: Option<String>,
    tracking_number: Option<String>,
    order_date: DateTime<Utc>,
    shipped_date: Option<DateTime<Utc>>,
    delivered_date: Option<DateTime<Utc>>,
    payment_date: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            order_number: row.try_get("order_number")?,
            user_id: row.try_get("user_id")?,
            company_id: row.try_get("company_id")?,
            contract_id: row.try_get("contract_id")?,
            address_id: row.try_get("address_id")?,
            shipping_method: row.try_get("shipping_method")?,
            payment_method: row.try_get("payment_method")?,
            customer_notes: row.try_get("customer_notes")?,
            status: row.try_get("status")?,
            payment_status: row.try_get("payment_status")?,
            payment_reference: row.try_get("payment_reference")?,
            total_amount: row.try_get("total_amount")?,
            tax_amount: row.try_get("tax_amount")?,
            shipping_amount: row.try_get("shipping_amount")?,
            discount_amount: row.try_get("discount_amount")?,
            final_amount: row.try_get("final_amount")?,
            admin_notes: row.try_get("admin_notes")?,
            tracking_number: row.try_get("tracking_number")?,
            order_date: row.try_get("order_date")?,
            shipped_date: row.try_get("shipped_date")?,
            delivered_date: row.try_get("delivered_date")?,
            payment_date: row.try_get("payment_date")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl OrderRow {
    fn into_record(self, items: Vec<OrderItem>) -> Result<OrderRecord, StoreError> {
        Ok(OrderRecord {
            id: self.id.into(),
            order_number: self.order_number,
            owner: OrderOwner {
                user_id: self.user_id.map(Into::into),
                company_id: self.company_id.map(Into::into),
            },
            contract_id: self.contract_id.map(Into::into),
            shipping: ShippingInfo {
                address_id: self.address_id.map(Into::into),
                method: self.shipping_method,
                payment_method: self.payment_method,
                customer_notes: self.customer_notes,
            },
            status: parse_text("status", &self.status)?,
            payment_status: parse_text("payment_status", &self.payment_status)?,
            payment_reference: self.payment_reference,
            items,
            total_amount: Money::from_minor(self.total_amount),
            adjustments: Adjustments {
                tax: Money::from_minor(self.tax_amount),
                shipping: Money::from_minor(self.shipping_amount),
                discount: Money::from_minor(self.discount_amount),
            },
            final_amount: Money::from_minor(self.final_amount),
            admin_notes: self.admin_notes,
            tracking_number: self.tracking_number,
            order_date: self.order_date,
            shipped_date: self.shipped_date,
            delivered_date: self.delivered_date,
            payment_date: self.payment_date,
            updated_at: self.updated_at,
            version: self.version as u64,
        })
    }
}

#[derive(Debug)]
struct PurchaseOrderRow {
    id: Uuid,
    po_number: String,
    supplier_id: Uuid,
    warehouse_id: Uuid,
    status: String,
    currency: String,
    exchange_rate: f64,
    expected_date: Option<DateTime<Utc>>,
    shipping_method: Option<String>,
    container_number: Option<String>,
    tracking_number: Option<String>,
    notes: Option<String>,
    total_amount: i64,
    approved_date: Option<DateTime<Utc>>,
    shipped_date: Option<DateTime<Utc>>,
    received_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for PurchaseOrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PurchaseOrderRow {
            id: row.try_get("id")?,
            po_number: row.try_get("po_number")?,
            supplier_id: row.try_get("supplier_id")?,
            warehouse_id: row.try_get("warehouse_id")?,
            status: row.try_get("status")?,
            currency: row.try_get("currency")?,
            exchange_rate: row.try_get("exchange_rate")?,
            expected_date: row.try_get("expected_date")?,
            shipping_method: row.try_get("shipping_method")?,
            container_number: row.try_get("container_number")?,
            tracking_number: row.try_get("tracking_number")?,
            notes: row.try_get("notes")?,
            total_amount: row.try_get("total_amount")?,
            approved_date: row.try_get("approved_date")?,
            shipped_date: row.try_get("shipped_date")?,
            received_date: row.try_get("received_date")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl PurchaseOrderRow {
    fn into_record(self, items: Vec<PoItem>) -> Result<PurchaseOrderRecord, StoreError> {
        Ok(PurchaseOrderRecord {
            id: self.id.into(),
            po_number: self.po_number,
            supplier_id: self.supplier_id.into(),
            warehouse_id: self.warehouse_id.into(),
            status: parse_text("status", &self.status)?,
            currency: self.currency,
            exchange_rate: self.exchange_rate,
            expected_date: self.expected_date,
            shipping_method: self.shipping_method,
            container_number: self.container_number,
            tracking_number: self.tracking_number,
            notes: self.notes,
            items,
            total_amount: Money::from_minor(self.total_amount),
            approved_date: self.approved_date,
            shipped_date: self.shipped_date,
            received_date: self.received_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version as u64,
        })
    }
}

#[derive(Debug)]
struct ContractRow {
    id: Uuid,
    contract_number: String,
    company_id: Uuid,
    status: String,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    auto_renew: bool,
    renewal_period_months: i32,
    payment_terms_days: i32,
    notes: Option<String>,
    address_id: Option<Uuid>,
    shipping_method: String,
    payment_method: String,
    customer_notes: Option<String>,
    activated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for ContractRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ContractRow {
            id: row.try_get("id")?,
            contract_number: row.try_get("contract_number")?,
            company_id: row.try_get("company_id")?,
            status: row.try_get("status")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            auto_renew: row.try_get("auto_renew")?,
            renewal_period_months: row.try_get("renewal_period_months")?,
            payment_terms_days: row.try_get("payment_terms_days")?,
            notes: row.try_get("notes")?,
            address_id: row.try_get("address_id")?,
            shipping_method: row.try_get("shipping_method")?,
            payment_method: row.try_get("payment_method")?,
            customer_notes: row.try_get("customer_notes")?,
            activated_at: row.try_get("activated_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl ContractRow {
    fn into_record(
        self,
        items: Vec<ContractItem>,
        schedule: Option<ContractSchedule>,
    ) -> Result<ContractRecord, StoreError> {
        Ok(ContractRecord {
            id: self.id.into(),
            contract_number: self.contract_number,
            company_id: self.company_id.into(),
            status: parse_text("status", &self.status)?,
            start_date: self.start_date,
            end_date: self.end_date,
            auto_renew: self.auto_renew,
            renewal_period_months: unsigned("renewal_period_months", self.renewal_period_months)?,
            payment_terms_days: unsigned("payment_terms_days", self.payment_terms_days)?,
            notes: self.notes,
            delivery: ShippingInfo {
                address_id: self.address_id.map(Into::into),
                method: self.shipping_method,
                payment_method: self.payment_method,
                customer_notes: self.customer_notes,
            },
            items,
            schedule,
            activated_at: self.activated_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version as u64,
        })
    }
}
