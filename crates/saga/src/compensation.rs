//! Compensating releases.

use std::time::Duration;

use common::{OrderId, ProductId};
use futures_util::future::join_all;
use inventory::{StockError, StockLedger};
use orders::OrderItem;

use crate::config::CompensationPolicy;
use crate::deadline::within;

/// A quantity held on one product on behalf of an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl From<&OrderItem> for Reservation {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            quantity: item.quantity,
        }
    }
}

/// A release that did not succeed after every allowed attempt.
#[derive(Debug)]
pub struct CompensationFailure {
    pub reservation: Reservation,
    pub attempts: u32,
    pub error: StockError,
}

/// Outcome of releasing a set of reservations.
#[derive(Debug, Default)]
pub struct CompensationReport {
    pub released: Vec<Reservation>,
    pub failed: Vec<CompensationFailure>,
}

impl CompensationReport {
    /// Returns true if every reservation was released.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Products whose reservation is still held.
    pub fn unreleased_products(&self) -> Vec<ProductId> {
        self.failed
            .iter()
            .map(|failure| failure.reservation.product_id.clone())
            .collect()
    }
}

/// Releases reservations on behalf of an order.
///
/// Releases are independent of each other and run concurrently. A release
/// is retried only while its error is transient, i.e. the request never
/// reached the ledger. A timed-out release may already have been applied,
/// and retrying it without an idempotency key could release twice.
pub struct Compensator<'a, S: StockLedger> {
    stock: &'a S,
    call_timeout: Duration,
    policy: &'a CompensationPolicy,
}

impl<'a, S: StockLedger> Compensator<'a, S> {
    pub fn new(stock: &'a S, call_timeout: Duration, policy: &'a CompensationPolicy) -> Self {
        Self {
            stock,
            call_timeout,
            policy,
        }
    }

    /// Releases every reservation in `reservations`.
    ///
    /// Never fails as a whole; failed releases are logged, counted and
    /// returned in the report.
    pub async fn release_all(
        &self,
        order_id: OrderId,
        reservations: &[Reservation],
    ) -> CompensationReport {
        let outcomes = join_all(
            reservations
                .iter()
                .map(|reservation| self.release_one(order_id, reservation)),
        )
        .await;

        let mut report = CompensationReport::default();
        for (reservation, outcome) in reservations.iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.released.push(reservation.clone()),
                Err((attempts, error)) => report.failed.push(CompensationFailure {
                    reservation: reservation.clone(),
                    attempts,
                    error,
                }),
            }
        }
        report
    }

    async fn release_one(
        &self,
        order_id: OrderId,
        reservation: &Reservation,
    ) -> Result<(), (u32, StockError)> {
        let Reservation {
            product_id,
            quantity,
        } = reservation;
        let max_attempts = self.policy.attempts();
        metrics::counter!("saga_compensations_total").increment(1);

        let mut attempt = 1;
        loop {
            let result = within(
                self.call_timeout,
                || StockError::Timeout,
                self.stock.release(product_id, *quantity),
            )
            .await;

            match result {
                Ok(_) => {
                    tracing::info!(%order_id, %product_id, quantity, attempt, "reservation released");
                    return Ok(());
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    tracing::warn!(
                        %order_id,
                        %product_id,
                        quantity,
                        attempt,
                        error = %err,
                        "release failed, retrying"
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    tracing::error!(
                        %order_id,
                        %product_id,
                        quantity,
                        attempt,
                        error = %err,
                        requires_reconciliation = true,
                        "release failed, stock remains reserved"
                    );
                    return Err((attempt, err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{FaultyStockLedger, StockFault};
    use inventory::{InMemoryStockLedger, StockOperation};

    fn reservation(product: &str, quantity: u32) -> Reservation {
        Reservation {
            product_id: ProductId::new(product),
            quantity,
        }
    }

    async fn reserved_ledger() -> FaultyStockLedger<InMemoryStockLedger> {
        let ledger = InMemoryStockLedger::with_stock([("A", 10), ("B", 10)]);
        ledger.reserve(&ProductId::new("A"), 2).await.unwrap();
        ledger.reserve(&ProductId::new("B"), 3).await.unwrap();
        FaultyStockLedger::new(ledger)
    }

    fn fast_policy(max_attempts: u32) -> CompensationPolicy {
        CompensationPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_releases_everything() {
        let ledger = reserved_ledger().await;
        let policy = fast_policy(3);
        let compensator = Compensator::new(&ledger, Duration::from_secs(1), &policy);

        let report = compensator
            .release_all(OrderId::new(), &[reservation("A", 2), reservation("B", 3)])
            .await;

        assert!(report.is_complete());
        assert_eq!(report.released.len(), 2);
        for product in ["A", "B"] {
            let record = ledger.get(&ProductId::new(product)).await.unwrap();
            assert_eq!(record.available_quantity, 10);
            assert_eq!(record.reserved_quantity, 0);
        }
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let ledger = reserved_ledger().await;
        ledger.set_fault_times(StockOperation::Release, "A", StockFault::Unavailable, 2);
        let policy = fast_policy(3);
        let compensator = Compensator::new(&ledger, Duration::from_secs(1), &policy);

        let report = compensator
            .release_all(OrderId::new(), &[reservation("A", 2)])
            .await;

        assert!(report.is_complete());
        assert_eq!(ledger.call_count(StockOperation::Release), 3);
        let a = ledger.get(&ProductId::new("A")).await.unwrap();
        assert_eq!(a.reserved_quantity, 0);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let ledger = reserved_ledger().await;
        ledger.set_fault(StockOperation::Release, "A", StockFault::Unavailable);
        let policy = fast_policy(3);
        let compensator = Compensator::new(&ledger, Duration::from_secs(1), &policy);

        let report = compensator
            .release_all(OrderId::new(), &[reservation("A", 2), reservation("B", 3)])
            .await;

        assert!(!report.is_complete());
        assert_eq!(report.unreleased_products(), vec![ProductId::new("A")]);
        assert_eq!(report.failed[0].attempts, 3);
        assert_eq!(report.released, vec![reservation("B", 3)]);
    }

    #[tokio::test]
    async fn test_business_rejection_is_not_retried() {
        let ledger = reserved_ledger().await;
        let policy = fast_policy(3);
        let compensator = Compensator::new(&ledger, Duration::from_secs(1), &policy);

        // More than is reserved.
        let report = compensator
            .release_all(OrderId::new(), &[reservation("A", 5)])
            .await;

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].attempts, 1);
        assert!(matches!(
            report.failed[0].error,
            StockError::InsufficientReservation { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_not_retried() {
        let ledger = reserved_ledger().await;
        ledger.set_fault(StockOperation::Release, "A", StockFault::Hang);
        let policy = fast_policy(3);
        let compensator = Compensator::new(&ledger, Duration::from_millis(50), &policy);

        let report = compensator
            .release_all(OrderId::new(), &[reservation("A", 2)])
            .await;

        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].error, StockError::Timeout));
        assert_eq!(ledger.call_count(StockOperation::Release), 1);
    }
}
