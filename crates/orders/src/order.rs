//! Order and order line model.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{OrderError, Result};
use crate::status::OrderStatus;

/// A line item with the unit price snapshotted when the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

impl OrderItem {
    /// Creates a new order item.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32, price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            price,
        }
    }

    /// Returns `price × quantity`.
    pub fn line_total(&self) -> Result<Money> {
        self.price
            .checked_mul(self.quantity)
            .ok_or_else(|| OrderError::AmountOverflow {
                product_id: self.product_id.clone(),
            })
    }
}

/// A customer order.
///
/// Built in [`OrderStatus::Created`]; items can only be appended in that
/// state. Every status change goes through the transition table in
/// [`OrderStatus::transition_to`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    status: OrderStatus,
    total_amount: Money,
    payment_success: bool,
    items: Vec<OrderItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Starts a new order for `user_id`.
    pub fn new(user_id: UserId, payment_success: bool) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            user_id,
            status: OrderStatus::Created,
            total_amount: Money::zero(),
            payment_success,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds an order from stored columns.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: OrderId,
        user_id: UserId,
        status: OrderStatus,
        total_amount: Money,
        payment_success: bool,
        items: Vec<OrderItem>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            status,
            total_amount,
            payment_success,
            items,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn payment_success(&self) -> bool {
        self.payment_success
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Appends an item and adds its line total to the order total.
    pub fn add_item(&mut self, item: OrderItem) -> Result<()> {
        if self.status != OrderStatus::Created {
            return Err(OrderError::ItemsLocked {
                status: self.status,
            });
        }
        if item.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id,
            });
        }

        let total = item
            .line_total()?
            .checked_add(self.total_amount)
            .ok_or_else(|| OrderError::AmountOverflow {
                product_id: item.product_id.clone(),
            })?;

        self.total_amount = total;
        self.items.push(item);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Moves the order to `next` if the transition table allows it.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<()> {
        if next == OrderStatus::Reserved && self.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        self.status = self.status.transition_to(next)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `Created → Reserved`, once every item is held.
    pub fn mark_reserved(&mut self) -> Result<()> {
        self.transition_to(OrderStatus::Reserved)
    }

    /// `Reserved → Paid`.
    pub fn mark_paid(&mut self) -> Result<()> {
        self.transition_to(OrderStatus::Paid)
    }

    /// `Reserved → Failed`.
    pub fn mark_failed(&mut self) -> Result<()> {
        self.transition_to(OrderStatus::Failed)
    }

    /// `Reserved → Cancelled`.
    pub fn cancel(&mut self) -> Result<()> {
        self.transition_to(OrderStatus::Cancelled)
    }
}
