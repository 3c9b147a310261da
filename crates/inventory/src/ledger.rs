//! Stock ledger traits.

use async_trait::async_trait;
use common::ProductId;

use crate::{Result, StockRecord};

/// The three counter transitions of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StockOperation {
    Reserve,
    Release,
    Confirm,
}

impl StockOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockOperation::Reserve => "reserve",
            StockOperation::Release => "release",
            StockOperation::Confirm => "confirm",
        }
    }
}

impl std::fmt::Display for StockOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operations the order saga performs against stock.
///
/// Every mutation is atomic per product: the availability check and the
/// counter update happen as one step, so two concurrent reservations of the
/// same product can never both pass a check that only one of them satisfies.
/// Operations on different products do not contend.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Returns the record for a product.
    async fn get(&self, product_id: &ProductId) -> Result<StockRecord>;

    /// Moves `quantity` from available to reserved.
    ///
    /// Fails with `NotFound` if the product has no record and with
    /// `InsufficientStock` if fewer than `quantity` units are available.
    async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord>;

    /// Moves `quantity` from reserved back to available.
    ///
    /// Fails with `InsufficientReservation` if fewer than `quantity` units are reserved.
    async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord>;

    /// Permanently removes `quantity` reserved units.
    ///
    /// Not idempotent: confirming the same units twice fails the second time
    /// with `InsufficientReservation`.
    async fn confirm(&self, product_id: &ProductId, quantity: u32) -> Result<StockRecord>;

    /// Dispatches one of the three transitions.
    async fn apply(
        &self,
        operation: StockOperation,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<StockRecord> {
        match operation {
            StockOperation::Reserve => self.reserve(product_id, quantity).await,
            StockOperation::Release => self.release(product_id, quantity).await,
            StockOperation::Confirm => self.confirm(product_id, quantity).await,
        }
    }
}

/// Administrative record management, exposed only by the inventory service itself.
#[async_trait]
pub trait StockAdmin: StockLedger {
    /// Creates a record with `reserved_quantity = 0`.
    async fn create(&self, product_id: ProductId, available_quantity: u32) -> Result<StockRecord>;

    /// Overwrites the available counter of an existing record.
    async fn set_available(
        &self,
        product_id: &ProductId,
        available_quantity: u32,
    ) -> Result<StockRecord>;

    /// Lists all records ordered by product ID.
    async fn list(&self) -> Result<Vec<StockRecord>>;
}

/// Counts a ledger mutation outcome.
pub(crate) fn record_outcome<T>(operation: StockOperation, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    metrics::counter!(
        "stock_operations_total",
        "op" => operation.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
