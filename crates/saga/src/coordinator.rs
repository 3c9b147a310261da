//! The order placement and cancellation saga.

use std::time::Instant;

use common::{OrderId, ProductId, UserId};
use inventory::{StockError, StockLedger};
use orders::{Order, OrderError, OrderItem, OrderLedger, OrderStatus};
use serde::{Deserialize, Serialize};

use crate::compensation::{Compensator, Reservation};
use crate::config::SagaConfig;
use crate::deadline::within;
use crate::error::{Result, SagaError};
use crate::services::{PricingError, PricingLookup};

/// One requested line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Orchestrates order placement across the stock ledger, the pricing
/// lookup and the order ledger.
///
/// Lines are reserved one at a time, in request order, so a failure always
/// knows exactly which reservations to undo. Compensating releases run
/// concurrently. Every stock and pricing call is bounded by
/// [`SagaConfig::call_timeout`]; an elapsed call fails the same way a
/// rejection does.
pub struct OrderSaga<S, P, O>
where
    S: StockLedger,
    P: PricingLookup,
    O: OrderLedger,
{
    stock: S,
    pricing: P,
    orders: O,
    config: SagaConfig,
}

impl<S, P, O> OrderSaga<S, P, O>
where
    S: StockLedger,
    P: PricingLookup,
    O: OrderLedger,
{
    /// Creates a new saga over the given collaborators.
    pub fn new(stock: S, pricing: P, orders: O, config: SagaConfig) -> Self {
        Self {
            stock,
            pricing,
            orders,
            config,
        }
    }

    pub fn stock(&self) -> &S {
        &self.stock
    }

    pub fn pricing(&self) -> &P {
        &self.pricing
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    fn compensator(&self) -> Compensator<'_, S> {
        Compensator::new(
            &self.stock,
            self.config.call_timeout,
            &self.config.compensation,
        )
    }

    /// Places an order.
    ///
    /// Returns the persisted order, `PAID` when `payment_success` is set and
    /// every reservation was confirmed, `FAILED` when payment was declined.
    /// A failed reservation releases everything reserved before it and
    /// persists nothing. A failed confirmation persists the order as
    /// `FAILED` and returns [`SagaError::StockConfirmationFailed`]. A declined
    /// order whose reservations cannot all be released is persisted as
    /// `FAILED` and returns [`SagaError::CompensationIncomplete`].
    #[tracing::instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        lines: Vec<OrderLine>,
        payment_success: bool,
    ) -> Result<Order> {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();

        let result = self.run_placement(user_id, lines, payment_success).await;

        let outcome = match &result {
            Ok(order) => order.status().as_str(),
            Err(SagaError::StockConfirmationFailed { .. })
            | Err(SagaError::CompensationIncomplete { .. }) => OrderStatus::Failed.as_str(),
            Err(_) => "ABORTED",
        };
        let duration = saga_start.elapsed().as_secs_f64();
        metrics::counter!("saga_outcomes_total", "status" => outcome).increment(1);
        metrics::histogram!("saga_duration_seconds").record(duration);

        match &result {
            Ok(order) => tracing::info!(
                order_id = %order.id(),
                status = %order.status(),
                total = %order.total_amount(),
                duration,
                "order saga finished"
            ),
            Err(err) => tracing::warn!(error = %err, outcome, duration, "order saga failed"),
        }

        result
    }

    async fn run_placement(
        &self,
        user_id: UserId,
        lines: Vec<OrderLine>,
        payment_success: bool,
    ) -> Result<Order> {
        validate(&lines)?;

        let mut order = Order::new(user_id, payment_success);
        let mut reserved: Vec<Reservation> = Vec::with_capacity(lines.len());

        // Reserve phase
        for line in lines {
            if let Err(err) = self.reserve_line(&mut order, &mut reserved, line).await {
                tracing::warn!(
                    order_id = %order.id(),
                    error = %err,
                    compensating = reserved.len(),
                    "reservation failed, releasing earlier reservations"
                );
                self.compensator().release_all(order.id(), &reserved).await;
                return Err(err);
            }
        }
        order.mark_reserved()?;
        tracing::info!(order_id = %order.id(), items = reserved.len(), "all items reserved");

        // Payment branch
        if payment_success {
            if let Err(err) = self.confirm_all(&order, &reserved).await {
                order.mark_failed()?;
                self.orders.insert(&order).await?;
                return Err(err);
            }
            order.mark_paid()?;
        } else {
            tracing::info!(order_id = %order.id(), "payment declined, releasing reservations");
            let report = self.compensator().release_all(order.id(), &reserved).await;
            order.mark_failed()?;
            if !report.is_complete() {
                self.orders.insert(&order).await?;
                return Err(SagaError::CompensationIncomplete {
                    order_id: order.id(),
                    products: report.unreleased_products(),
                });
            }
        }

        self.orders.insert(&order).await?;
        Ok(order)
    }

    /// Prices and reserves one line. The reservation is recorded before the
    /// item is added, so it is compensated even if adding fails.
    async fn reserve_line(
        &self,
        order: &mut Order,
        reserved: &mut Vec<Reservation>,
        line: OrderLine,
    ) -> Result<()> {
        let OrderLine {
            product_id,
            quantity,
        } = line;

        let product = within(
            self.config.call_timeout,
            || PricingError::Unavailable("request timed out".to_string()),
            self.pricing.get_product(&product_id),
        )
        .await?;

        within(
            self.config.call_timeout,
            || StockError::Timeout,
            self.stock.reserve(&product_id, quantity),
        )
        .await?;

        tracing::debug!(order_id = %order.id(), %product_id, quantity, price = %product.price, "item reserved");
        reserved.push(Reservation {
            product_id: product_id.clone(),
            quantity,
        });
        order.add_item(OrderItem::new(product_id, quantity, product.price))?;
        Ok(())
    }

    /// Confirms every reservation in order.
    ///
    /// On the first failure, reservations already confirmed cannot be undone
    /// and are flagged for reconciliation; the failed one and every later
    /// one are released.
    async fn confirm_all(&self, order: &Order, reserved: &[Reservation]) -> Result<()> {
        for (index, reservation) in reserved.iter().enumerate() {
            let result = within(
                self.config.call_timeout,
                || StockError::Timeout,
                self.stock
                    .confirm(&reservation.product_id, reservation.quantity),
            )
            .await;

            let Err(err) = result else {
                continue;
            };

            tracing::error!(
                order_id = %order.id(),
                product_id = %reservation.product_id,
                error = %err,
                "confirmation failed"
            );
            for confirmed in &reserved[..index] {
                tracing::error!(
                    order_id = %order.id(),
                    product_id = %confirmed.product_id,
                    quantity = confirmed.quantity,
                    requires_reconciliation = true,
                    "confirmed quantity cannot be reversed"
                );
            }
            let report = self
                .compensator()
                .release_all(order.id(), &reserved[index..])
                .await;

            return Err(SagaError::StockConfirmationFailed {
                order_id: order.id(),
                product_id: reservation.product_id.clone(),
                reason: err.to_string(),
                unreleased: report.unreleased_products(),
            });
        }
        Ok(())
    }

    /// Cancels a `RESERVED` order, releasing the stock held for its items.
    ///
    /// If any release fails the order keeps its status and
    /// [`SagaError::CompensationIncomplete`] names the products still held.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(order_id))?;

        match order.status() {
            OrderStatus::Cancelled => return Err(SagaError::AlreadyCancelled(order_id)),
            OrderStatus::Reserved => {}
            other => {
                return Err(SagaError::InvalidTransition {
                    from: other,
                    to: OrderStatus::Cancelled,
                });
            }
        }

        let reservations: Vec<Reservation> = order.items().iter().map(Reservation::from).collect();
        let report = self
            .compensator()
            .release_all(order_id, &reservations)
            .await;
        if !report.is_complete() {
            return Err(SagaError::CompensationIncomplete {
                order_id,
                products: report.unreleased_products(),
            });
        }

        let cancelled = match self
            .orders
            .update_status(order_id, OrderStatus::Reserved, OrderStatus::Cancelled)
            .await
        {
            Ok(order) => order,
            Err(OrderError::StatusConflict {
                actual: OrderStatus::Cancelled,
                ..
            }) => return Err(SagaError::AlreadyCancelled(order_id)),
            Err(err) => return Err(err.into()),
        };

        metrics::counter!("saga_outcomes_total", "status" => OrderStatus::Cancelled.as_str())
            .increment(1);
        tracing::info!(%order_id, items = reservations.len(), "order cancelled");
        Ok(cancelled)
    }

    /// Orders placed by one user, newest first.
    pub async fn get_user_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.orders.find_by_user(user_id).await?)
    }

    /// Every order, newest first.
    pub async fn get_all_orders(&self) -> Result<Vec<Order>> {
        Ok(self.orders.find_all().await?)
    }
}

fn validate(lines: &[OrderLine]) -> Result<()> {
    if lines.is_empty() {
        return Err(SagaError::InvalidOrder(
            "Order must contain at least one item".to_string(),
        ));
    }
    if let Some(line) = lines.iter().find(|line| line.quantity == 0) {
        return Err(SagaError::InvalidOrder(format!(
            "Quantity for product {} must be greater than 0",
            line.product_id
        )));
    }
    Ok(())
}
