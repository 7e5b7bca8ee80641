use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::store::{
    EventSummary, LedgerStore, OrderQuantities, ReserveOutcome, Transition, hold_created_metadata,
    hold_released_metadata, order_confirmed_metadata, validate_new_product,
};
use crate::{
    CustomerId, InventoryEvent, InventoryEventType, LedgerError, NewHold, NewProduct, Order,
    OrderId, OrderStatus, Product, ProductId, ReleaseReason, Result,
};

const PRODUCT_COLUMNS: &str =
    "id, name, description, price_cents, total_stock, sale_starts_at, sale_ends_at, created_at";
const ORDER_COLUMNS: &str =
    "id, product_id, customer_id, quantity, status, hold_expires_at, created_at";
const EVENT_COLUMNS: &str = "id, product_id, event_type, delta, metadata, created_at";

/// Default bound on lock waits and statements inside one transaction.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// PostgreSQL-backed ledger store.
///
/// Stock decrements use a single conditional `UPDATE`; status transitions
/// take `SELECT ... FOR UPDATE` on the order row before re-checking it.
/// Each transaction sets `lock_timeout` and `statement_timeout` so a stalled
/// writer fails instead of holding row locks indefinitely.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    transaction_timeout: Duration,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
        }
    }

    /// Overrides the per-transaction lock and statement timeout.
    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        let millis = self.transaction_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL lock_timeout = {millis}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("SET LOCAL statement_timeout = {millis}"))
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn rollback(tx: Transaction<'static, Postgres>, operation: &'static str) {
        if let Err(e) = tx.rollback().await {
            tracing::warn!(error = %e, operation, "transaction rollback failed");
        }
    }

    async fn insert_event(
        conn: &mut PgConnection,
        product_id: ProductId,
        event_type: InventoryEventType,
        delta: i64,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_events (product_id, event_type, delta, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(product_id.as_i64())
        .bind(event_type.as_str())
        .bind(delta)
        .bind(metadata)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn lock_order(conn: &mut PgConnection, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id.as_i64())
        .fetch_optional(conn)
        .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price_cents: row.try_get("price_cents")?,
            total_stock: row.try_get("total_stock")?,
            sale_starts_at: row.try_get("sale_starts_at")?,
            sale_ends_at: row.try_get("sale_ends_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            customer_id: CustomerId::new(row.try_get::<String, _>("customer_id")?),
            quantity: row.try_get("quantity")?,
            status: status.parse()?,
            hold_expires_at: row.try_get("hold_expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_event(row: &PgRow) -> Result<InventoryEvent> {
        let event_type: String = row.try_get("event_type")?;
        Ok(InventoryEvent {
            id: row.try_get("id")?,
            product_id: ProductId::new(row.try_get("product_id")?),
            event_type: event_type.parse()?,
            delta: row.try_get("delta")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn insert_product(&self, product: NewProduct, now: DateTime<Utc>) -> Result<Product> {
        validate_new_product(&product)?;

        let mut tx = self.begin().await?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (name, description, price_cents, total_stock, sale_starts_at, sale_ends_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.initial_stock)
        .bind(product.sale_starts_at)
        .bind(product.sale_ends_at)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let product = Self::row_to_product(&row)?;

        Self::insert_event(
            &mut tx,
            product.id,
            InventoryEventType::StockAdded,
            product.total_stock,
            serde_json::json!({ "reason": "initial_stock" }),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(product)
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn reserve_stock(&self, hold: NewHold) -> Result<ReserveOutcome> {
        if hold.quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(hold.quantity));
        }

        let mut tx = self.begin().await?;

        let updated = sqlx::query(
            "UPDATE products SET total_stock = total_stock - $2 WHERE id = $1 AND total_stock >= $2",
        )
        .bind(hold.product_id.as_i64())
        .bind(hold.quantity)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            Self::rollback(tx, "reserve_stock").await;
            return Ok(ReserveOutcome::InsufficientStock);
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (product_id, customer_id, quantity, status, hold_expires_at, created_at)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(hold.product_id.as_i64())
        .bind(hold.customer_id.as_str())
        .bind(hold.quantity)
        .bind(hold.hold_expires_at)
        .bind(hold.created_at)
        .fetch_one(&mut *tx)
        .await?;
        let order = Self::row_to_order(&row)?;

        Self::insert_event(
            &mut tx,
            order.product_id,
            InventoryEventType::HoldCreated,
            -order.quantity,
            hold_created_metadata(&order),
            hold.created_at,
        )
        .await?;

        tx.commit().await?;
        Ok(ReserveOutcome::Reserved(order))
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn find_order_for_customer(
        &self,
        order_id: OrderId,
        customer_id: &CustomerId,
    ) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND customer_id = $2"
        ))
        .bind(order_id.as_i64())
        .bind(customer_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn list_orders_for_customer(&self, customer_id: &CustomerId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(customer_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_order).collect()
    }

    async fn confirm_pending(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Transition> {
        let mut tx = self.begin().await?;

        let Some(order) = Self::lock_order(&mut tx, order_id).await? else {
            Self::rollback(tx, "confirm_pending").await;
            return Ok(Transition::NotFound);
        };
        if order.status != OrderStatus::Pending {
            Self::rollback(tx, "confirm_pending").await;
            return Ok(Transition::NotPending(order.status));
        }
        if order.is_lapsed(now) {
            Self::rollback(tx, "confirm_pending").await;
            return Ok(Transition::Lapsed);
        }

        sqlx::query("UPDATE orders SET status = 'confirmed' WHERE id = $1")
            .bind(order_id.as_i64())
            .execute(&mut *tx)
            .await?;

        let order = Order {
            status: OrderStatus::Confirmed,
            ..order
        };
        Self::insert_event(
            &mut tx,
            order.product_id,
            InventoryEventType::OrderConfirmed,
            0,
            order_confirmed_metadata(&order),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(Transition::Applied(order))
    }

    async fn expire_pending(
        &self,
        order_id: OrderId,
        reason: ReleaseReason,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        let mut tx = self.begin().await?;

        let Some(order) = Self::lock_order(&mut tx, order_id).await? else {
            Self::rollback(tx, "expire_pending").await;
            return Ok(Transition::NotFound);
        };
        if order.status != OrderStatus::Pending {
            Self::rollback(tx, "expire_pending").await;
            return Ok(Transition::NotPending(order.status));
        }

        sqlx::query("UPDATE orders SET status = 'expired' WHERE id = $1")
            .bind(order_id.as_i64())
            .execute(&mut *tx)
            .await?;

        let restocked = sqlx::query("UPDATE products SET total_stock = total_stock + $2 WHERE id = $1")
            .bind(order.product_id.as_i64())
            .bind(order.quantity)
            .execute(&mut *tx)
            .await?;
        if restocked.rows_affected() == 0 {
            Self::rollback(tx, "expire_pending").await;
            return Err(LedgerError::ProductNotFound(order.product_id));
        }

        let order = Order {
            status: OrderStatus::Expired,
            ..order
        };
        Self::insert_event(
            &mut tx,
            order.product_id,
            InventoryEventType::HoldReleased,
            order.quantity,
            hold_released_metadata(&order, reason),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(Transition::Applied(order))
    }

    async fn find_lapsed_holds(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE status = 'pending' AND hold_expires_at <= $1
            ORDER BY hold_expires_at ASC
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_order).collect()
    }

    async fn order_quantities(&self) -> Result<Vec<OrderQuantities>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, status, COUNT(*) AS count, COALESCE(SUM(quantity), 0)::BIGINT AS quantity
            FROM orders
            GROUP BY product_id, status
            ORDER BY product_id, status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<OrderQuantities> {
                let status: String = row.try_get("status")?;
                Ok(OrderQuantities {
                    product_id: ProductId::new(row.try_get("product_id")?),
                    status: status.parse()?,
                    count: row.try_get("count")?,
                    quantity: row.try_get("quantity")?,
                })
            })
            .collect()
    }

    async fn event_summary(&self) -> Result<Vec<EventSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT event_type, COUNT(*) AS count, COALESCE(SUM(delta), 0)::BIGINT AS total_delta
            FROM inventory_events
            GROUP BY event_type
            ORDER BY event_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<EventSummary> {
                let event_type: String = row.try_get("event_type")?;
                Ok(EventSummary {
                    event_type: event_type.parse()?,
                    count: row.try_get("count")?,
                    total_delta: row.try_get("total_delta")?,
                })
            })
            .collect()
    }

    async fn events_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM inventory_events WHERE product_id = $1 ORDER BY id ASC"
        ))
        .bind(product_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }
}
