//! In-memory order ledger.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, UserId};
use tokio::sync::RwLock;

use crate::ledger::{ensure_persistable, newest_first};
use crate::{Order, OrderError, OrderLedger, OrderStatus, Result};

/// In-memory order ledger for testing and development.
#[derive(Clone, Default)]
pub struct InMemoryOrderLedger {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrderLedger {
    async fn insert(&self, order: &Order) -> Result<()> {
        ensure_persistable(order)?;

        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id()) {
            return Err(OrderError::AlreadyExists(order.id()));
        }
        orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    #[tracing::instrument(skip(self))]
    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or(OrderError::NotFound(id))?;

        if order.status() != expected {
            return Err(OrderError::StatusConflict {
                order_id: id,
                expected,
                actual: order.status(),
            });
        }
        order.transition_to(next)?;
        Ok(order.clone())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|order| order.user_id() == user_id)
            .cloned()
            .collect();
        newest_first(&mut orders);
        Ok(orders)
    }

    async fn find_all(&self) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        newest_first(&mut orders);
        Ok(orders)
    }
}
