//! Order error types.

use common::{OrderId, ProductId};
use thiserror::Error;

use crate::status::OrderStatus;

/// Errors that can occur when building, transitioning or storing orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The transition is not in the order state machine.
    #[error("Invalid state transition: cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Order has no items.
    #[error("Order must contain at least one item")]
    NoItems,

    /// Item quantity must be positive.
    #[error("Invalid quantity for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId },

    /// A line total or the order total does not fit in the money type.
    #[error("Order amount overflows at product {product_id}")]
    AmountOverflow { product_id: ProductId },

    /// Items can only be added while the order is being created.
    #[error("Items cannot be changed once the order is {status}")]
    ItemsLocked { status: OrderStatus },

    /// Orders are written to the ledger only once their outcome is decided.
    #[error("Order in {status} state cannot be persisted")]
    NotPersistable { status: OrderStatus },

    /// An order with the same ID was already persisted.
    #[error("Order already exists: {0}")]
    AlreadyExists(OrderId),

    /// No such order in the ledger.
    #[error("Order not found with ID: {0}")]
    NotFound(OrderId),

    /// The stored status differs from what the caller expected.
    #[error("Order {order_id} is {actual}, expected {expected}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// A stored status string is not a known status.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;
