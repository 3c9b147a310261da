use async_trait::async_trait;
use common::ProductId;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::ledger::record_outcome;
use crate::record::{MAX_STOCK_QUANTITY, ensure_capacity, ensure_positive};
use crate::{Result, StockAdmin, StockError, StockLedger, StockOperation, StockRecord};

const RETURNING: &str =
    "RETURNING product_id, available_quantity, reserved_quantity, created_at, updated_at";

/// PostgreSQL-backed stock ledger.
///
/// Each mutation is one conditional `UPDATE` whose `WHERE` clause carries the
/// counter check, so the check and the write are a single atomic statement.
/// When no row is updated, a follow-up read tells a missing record apart
/// from an insufficient counter.
#[derive(Clone)]
pub struct PostgresStockLedger {
    pool: PgPool,
}

impl PostgresStockLedger {
    /// Creates a new PostgreSQL stock ledger.
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

    fn row_to_record(row: PgRow) -> Result<StockRecord> {
        Ok(StockRecord {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            available_quantity: counter(row.try_get("available_quantity")?)?,
            reserved_quantity: counter(row.try_get("reserved_quantity")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn conditional_update(
        &self,
        operation: StockOperation,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<StockRecord> {
        ensure_positive(quantity)?;
        let amount = sql_quantity(quantity)?;

        let sql = match operation {
            StockOperation::Reserve => format!(
                "UPDATE inventory \
                 SET available_quantity = available_quantity - $2, \
                     reserved_quantity = reserved_quantity + $2, \
                     updated_at = NOW() \
                 WHERE product_id = $1 AND available_quantity >= $2 {RETURNING}"
            ),
            StockOperation::Release => format!(
                "UPDATE inventory \
                 SET available_quantity = available_quantity + $2, \
                     reserved_quantity = reserved_quantity - $2, \
                     updated_at = NOW() \
                 WHERE product_id = $1 AND reserved_quantity >= $2 {RETURNING}"
            ),
            StockOperation::Confirm => format!(
                "UPDATE inventory \
                 SET reserved_quantity = reserved_quantity - $2, \
                     updated_at = NOW() \
                 WHERE product_id = $1 AND reserved_quantity >= $2 {RETURNING}"
            ),
        };

        let row = sqlx::query(&sql)
            .bind(product_id.as_str())
            .bind(amount)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return Self::row_to_record(row);
        }

        // Zero rows updated: either the record is missing or the counter was short.
        let current = self.get(product_id).await?;
        Err(match operation {
            StockOperation::Reserve => StockError::InsufficientStock {
                product_id: product_id.clone(),
                available: current.available_quantity,
                requested: quantity,
            },
            StockOperation::Release | StockOperation::Confirm => {
                StockError::InsufficientReservation {
                    product_id: product_id.clone(),
                    reserved: current.reserved_quantity,
                    requested: quantity,
                }
            }
        })
    }

    async fn mutate(
        &self,
        operation: StockOperation,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<StockRecord> {
        let result = self
            .conditional_update(operation, product_id, quantity)
            .await;
        record_outcome(operation, &result);
        result
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    async fn get(&self, product_id: &ProductId) -> Result<StockRecord> {
        let row = sqlx::query(
            r#"
            SELECT product_id, available_quantity, reserved_quantity, created_at, updated_at
            FROM inventory
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StockError::NotFound(product_id.clone()))?;

        Self::row_to_record(row)
    }

    #[tracing::instrument(skip(self))]
    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.mutate(StockOperation::Reserve, product_id, quantity)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.mutate(StockOperation::Release, product_id, quantity)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn confirm(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord> {
        self.mutate(StockOperation::Confirm, product_id, quantity)
            .await
    }
}

#[async_trait]
impl StockAdmin for PostgresStockLedger {
    async fn create(&self, product_id: ProductId, available_quantity: u32) -> Result<StockRecord> {
        ensure_capacity(&product_id, 0, available_quantity)?;
        let sql = format!(
            "INSERT INTO inventory (product_id, available_quantity, reserved_quantity) \
             VALUES ($1, $2, 0) \
             ON CONFLICT (product_id) DO NOTHING {RETURNING}"
        );
        let row = sqlx::query(&sql)
            .bind(product_id.as_str())
            .bind(sql_counter(available_quantity)?)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StockError::AlreadyExists(product_id.clone()))?;

        Self::row_to_record(row)
    }

    async fn set_available(
        &self,
        product_id: &ProductId,
        available_quantity: u32,
    ) -> Result<StockRecord> {
        ensure_capacity(product_id, 0, available_quantity)?;
        let sql = format!(
            "UPDATE inventory SET available_quantity = $2, updated_at = NOW() \
             WHERE product_id = $1 AND reserved_quantity <= {MAX_STOCK_QUANTITY} - $2 {RETURNING}"
        );
        let row = sqlx::query(&sql)
            .bind(product_id.as_str())
            .bind(sql_counter(available_quantity)?)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return Self::row_to_record(row);
        }

        // Zero rows updated: either the record is missing or the total would not fit.
        let current = self.get(product_id).await?;
        Err(StockError::CapacityExceeded {
            product_id: product_id.clone(),
            reserved: current.reserved_quantity,
            requested: available_quantity,
        })
    }

    async fn list(&self) -> Result<Vec<StockRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, available_quantity, reserved_quantity, created_at, updated_at
            FROM inventory
            ORDER BY product_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }
}

fn counter(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|e| StockError::Database(sqlx::Error::Decode(Box::new(e))))
}

fn sql_quantity(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| StockError::InvalidQuantity(quantity))
}

fn sql_counter(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|e| StockError::Database(sqlx::Error::Encode(Box::new(e))))
}
