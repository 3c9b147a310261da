//! Order ledger trait.

use async_trait::async_trait;
use common::{OrderId, UserId};

use crate::{Order, OrderStatus, Result};

/// Durable record of orders.
///
/// Orders are written once their placement outcome is known; later status
/// changes go through [`OrderLedger::update_status`], a compare-and-set on
/// the stored status.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Stores a new order with its items.
    ///
    /// Fails with `NotPersistable` for orders still in `Created`, and with
    /// `AlreadyExists` if the ID is taken.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Loads an order, `None` if it does not exist.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Moves an order from `expected` to `next`.
    ///
    /// Fails with `NotFound` if the order is missing, `StatusConflict` if the
    /// stored status is not `expected`, and `InvalidTransition` if the table
    /// does not allow `expected → next`. Returns the updated order.
    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Order>;

    /// All orders of one user, newest first.
    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// All orders, newest first.
    async fn find_all(&self) -> Result<Vec<Order>>;
}

pub(crate) fn ensure_persistable(order: &Order) -> Result<()> {
    if order.status() == OrderStatus::Created {
        return Err(crate::OrderError::NotPersistable {
            status: order.status(),
        });
    }
    Ok(())
}

pub(crate) fn newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id().cmp(&a.id()))
    });
}
