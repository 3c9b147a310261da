use common::ProductId;
use thiserror::Error;

/// Errors that can occur when operating on the stock ledger.
#[derive(Debug, Error)]
pub enum StockError {
    /// Quantities passed to reserve/release/confirm must be positive.
    #[error("Invalid quantity: {0} (must be greater than 0)")]
    InvalidQuantity(u32),

    /// No stock record exists for the product.
    #[error("Inventory not found for product ID: {0}")]
    NotFound(ProductId),

    /// A stock record already exists for the product.
    #[error("Inventory already exists for product ID: {0}")]
    AlreadyExists(ProductId),

    /// Not enough available stock to reserve.
    #[error(
        "Insufficient stock for product ID: {product_id}. Available: {available}, Requested: {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// Not enough reserved stock to release or confirm.
    #[error(
        "Insufficient reservation for product ID: {product_id}. Reserved: {reserved}, Requested: {requested}"
    )]
    InsufficientReservation {
        product_id: ProductId,
        reserved: u32,
        requested: u32,
    },

    /// Available plus reserved stock would not fit the ledger's counters.
    #[error(
        "Stock for product ID: {product_id} would exceed the ledger capacity. Reserved: {reserved}, Requested: {requested}"
    )]
    CapacityExceeded {
        product_id: ProductId,
        reserved: u32,
        requested: u32,
    },

    /// The ledger could not be reached; the request was never applied.
    #[error("Inventory service unavailable: {0}")]
    Unavailable(String),

    /// The ledger did not answer in time; the request may or may not have been applied.
    #[error("Inventory service call timed out")]
    Timeout,

    /// The ledger answered with an error this client does not recognise.
    #[error("Inventory service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StockError {
    /// Returns true if retrying the same call cannot double-apply it.
    pub fn is_transient(&self) -> bool {
        matches!(self, StockError::Unavailable(_))
    }

    /// Machine-readable code carried over the wire.
    pub fn code(&self) -> &'static str {
        match self {
            StockError::InvalidQuantity(_) => "INVALID_QUANTITY",
            StockError::NotFound(_) => "STOCK_NOT_FOUND",
            StockError::AlreadyExists(_) => "STOCK_ALREADY_EXISTS",
            StockError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            StockError::InsufficientReservation { .. } => "INSUFFICIENT_RESERVATION",
            StockError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            StockError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            StockError::Timeout => "TIMEOUT",
            StockError::Rejected { .. } => "REJECTED",
            StockError::Database(_) => "DATABASE",
        }
    }
}

/// Result type for stock ledger operations.
pub type Result<T> = std::result::Result<T, StockError>;
