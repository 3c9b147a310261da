//! Saga error types.

use common::{OrderId, ProductId};
use inventory::StockError;
use orders::{OrderError, OrderStatus};
use thiserror::Error;

use crate::services::PricingError;

/// Errors surfaced to callers of [`crate::OrderSaga`].
///
/// Collaborator errors are translated into this taxonomy at the saga
/// boundary, so callers never see which step of the saga failed.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request was rejected before any remote call.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// The product has no price or no stock record.
    #[error("Product not found with ID: {0}")]
    ProductNotFound(ProductId),

    /// Not enough stock to reserve a line.
    #[error(
        "Insufficient stock for product {product_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// Confirming a reservation failed after payment succeeded. The order
    /// was recorded as `FAILED`. `unreleased` names the unconfirmed
    /// reservations that could not be released either.
    #[error("Stock confirmation failed for order {order_id}, product {product_id}: {reason}")]
    StockConfirmationFailed {
        order_id: OrderId,
        product_id: ProductId,
        reason: String,
        unreleased: Vec<ProductId>,
    },

    /// A collaborator could not be reached or did not answer in time.
    #[error("{service} service unavailable: {reason}")]
    ServiceUnavailable {
        service: &'static str,
        reason: String,
    },

    /// No such order.
    #[error("Order not found with ID: {0}")]
    OrderNotFound(OrderId),

    /// The order is already cancelled.
    #[error("Order {0} is already cancelled")]
    AlreadyCancelled(OrderId),

    /// The order's status does not allow the operation.
    #[error("Invalid state transition: cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Some reservations could not be released. A cancelled order keeps its
    /// status; a declined order is recorded as `FAILED`.
    #[error("Compensation incomplete for order {order_id}: stock still reserved for {products:?}")]
    CompensationIncomplete {
        order_id: OrderId,
        products: Vec<ProductId>,
    },

    /// Stock ledger error with no saga-level meaning.
    #[error("Stock ledger error: {0}")]
    Stock(StockError),

    /// Order ledger error with no saga-level meaning.
    #[error("Order ledger error: {0}")]
    Ledger(OrderError),
}

impl SagaError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            SagaError::InvalidOrder(_) => "INVALID_ORDER",
            SagaError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            SagaError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            SagaError::StockConfirmationFailed { .. } => "STOCK_CONFIRMATION_FAILED",
            SagaError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            SagaError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            SagaError::AlreadyCancelled(_) => "ALREADY_CANCELLED",
            SagaError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SagaError::CompensationIncomplete { .. } => "COMPENSATION_INCOMPLETE",
            SagaError::Stock(err) => err.code(),
            SagaError::Ledger(_) => "ORDER_LEDGER_ERROR",
        }
    }
}

impl From<StockError> for SagaError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::NotFound(product_id) => SagaError::ProductNotFound(product_id),
            StockError::InsufficientStock {
                product_id,
                available,
                requested,
            } => SagaError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            StockError::InvalidQuantity(quantity) => {
                SagaError::InvalidOrder(format!("Invalid quantity: {quantity}"))
            }
            StockError::Unavailable(reason) => SagaError::ServiceUnavailable {
                service: "inventory",
                reason,
            },
            StockError::Timeout => SagaError::ServiceUnavailable {
                service: "inventory",
                reason: "request timed out".to_string(),
            },
            StockError::Rejected { status, message } if status >= 500 => {
                SagaError::ServiceUnavailable {
                    service: "inventory",
                    reason: message,
                }
            }
            other => SagaError::Stock(other),
        }
    }
}

impl From<PricingError> for SagaError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::NotFound(product_id) => SagaError::ProductNotFound(product_id),
            other => SagaError::ServiceUnavailable {
                service: "product",
                reason: other.to_string(),
            },
        }
    }
}

impl From<OrderError> for SagaError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound(order_id) => SagaError::OrderNotFound(order_id),
            OrderError::InvalidTransition { from, to } => SagaError::InvalidTransition { from, to },
            OrderError::NoItems => SagaError::InvalidOrder(err.to_string()),
            OrderError::InvalidQuantity { .. } | OrderError::AmountOverflow { .. } => {
                SagaError::InvalidOrder(err.to_string())
            }
            other => SagaError::Ledger(other),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
