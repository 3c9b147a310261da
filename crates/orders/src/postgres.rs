//! PostgreSQL order ledger.

use std::collections::HashMap;

use async_trait::async_trait;
use common::{Money, OrderId, ProductId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::ledger::{ensure_persistable, newest_first};
use crate::{Order, OrderError, OrderItem, OrderLedger, OrderStatus, Result};

const ORDER_COLUMNS: &str =
    "id, user_id, status, total_cents, payment_success, created_at, updated_at";

/// PostgreSQL-backed order ledger.
///
/// An order and its items are written in one transaction. Status changes
/// are a single `UPDATE … WHERE status = <expected>`.
#[derive(Clone)]
pub struct PostgresOrderLedger {
    pool: PgPool,
}

impl PostgresOrderLedger {
    /// Creates a new PostgreSQL order ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Loads the items of every order in `ids`, keyed by order.
    async fn load_items(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let rows = sqlx::query(
            "SELECT order_id, product_id, quantity, price_cents FROM order_items \
             WHERE order_id = ANY($1) ORDER BY order_id, position",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id: Uuid = row.try_get("order_id")?;
            let quantity: i32 = row.try_get("quantity")?;
            let item = OrderItem {
                product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
                quantity: quantity.max(0) as u32,
                price: Money::from_cents(row.try_get("price_cents")?),
            };
            items.entry(order_id).or_default().push(item);
        }
        Ok(items)
    }

    async fn hydrate(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.load_items(&ids).await?;

        let mut orders = rows
            .into_iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                row_to_order(&row, items.remove(&id).unwrap_or_default())
            })
            .collect::<Result<Vec<_>>>()?;
        newest_first(&mut orders);
        Ok(orders)
    }
}

fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order::from_parts(
        OrderId::from_uuid(row.try_get("id")?),
        UserId::new(row.try_get("user_id")?),
        status.parse::<OrderStatus>()?,
        Money::from_cents(row.try_get("total_cents")?),
        row.try_get("payment_success")?,
        items,
        row.try_get("created_at")?,
        row.try_get("updated_at")?,
    ))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl OrderLedger for PostgresOrderLedger {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id(), status = %order.status()))]
    async fn insert(&self, order: &Order) -> Result<()> {
        ensure_persistable(order)?;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO orders (id, user_id, status, total_cents, payment_success, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.id().as_uuid())
        .bind(order.user_id().as_i64())
        .bind(order.status().as_str())
        .bind(order.total_amount().cents())
        .bind(order.payment_success())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                return Err(OrderError::AlreadyExists(order.id()));
            }
            return Err(err.into());
        }

        for (position, item) in order.items().iter().enumerate() {
            let quantity = i32::try_from(item.quantity).map_err(|_| OrderError::InvalidQuantity {
                product_id: item.product_id.clone(),
            })?;
            sqlx::query(
                "INSERT INTO order_items (order_id, position, product_id, quantity, price_cents) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(order.id().as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_str())
            .bind(quantity)
            .bind(item.price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Order> {
        expected.transition_to(next)?;

        let updated = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2 RETURNING id",
        )
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .bind(next.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let current = self.get(id).await?.ok_or(OrderError::NotFound(id))?;
        if updated.is_none() {
            return Err(OrderError::StatusConflict {
                order_id: id,
                expected,
                actual: current.status(),
            });
        }
        Ok(current)
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn find_all(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }
}
