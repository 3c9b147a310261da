//! Integration tests for the order placement saga.

use std::sync::Arc;
use std::time::Duration;

use common::{Money, OrderId, ProductId, UserId};
use futures_util::future::join_all;
use inventory::{InMemoryStockLedger, StockLedger, StockOperation};
use orders::{InMemoryOrderLedger, Order, OrderItem, OrderLedger, OrderStatus};
use saga::{
    CompensationPolicy, FaultyStockLedger, InMemoryPricingLookup, OrderLine, OrderSaga,
    SagaConfig, SagaError, StockFault,
};

type TestSaga =
    OrderSaga<FaultyStockLedger<InMemoryStockLedger>, InMemoryPricingLookup, InMemoryOrderLedger>;

struct TestHarness {
    saga: TestSaga,
    stock: FaultyStockLedger<InMemoryStockLedger>,
    pricing: InMemoryPricingLookup,
    orders: InMemoryOrderLedger,
}

impl TestHarness {
    /// Products A, B, C with 10 units each, P with 10, SCARCE with 1.
    fn new() -> Self {
        Self::with_config(SagaConfig {
            call_timeout: Duration::from_millis(200),
            compensation: CompensationPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            },
        })
    }

    fn with_config(config: SagaConfig) -> Self {
        let stock = FaultyStockLedger::new(InMemoryStockLedger::with_stock([
            ("A", 10),
            ("B", 10),
            ("C", 10),
            ("P", 10),
            ("SCARCE", 1),
        ]));
        let pricing = InMemoryPricingLookup::with_prices([
            ("A", Money::from_cents(1000)),
            ("B", Money::from_cents(250)),
            ("C", Money::from_cents(99)),
            ("P", Money::from_cents(1999)),
            ("SCARCE", Money::from_cents(5000)),
            ("UNSTOCKED", Money::from_cents(100)),
        ]);
        let orders = InMemoryOrderLedger::new();

        let saga = OrderSaga::new(stock.clone(), pricing.clone(), orders.clone(), config);
        Self {
            saga,
            stock,
            pricing,
            orders,
        }
    }

    async fn counters(&self, product: &str) -> (u32, u32) {
        let record = self.stock.get(&ProductId::new(product)).await.unwrap();
        (record.available_quantity, record.reserved_quantity)
    }

    /// Reserves stock for `lines` and stores a RESERVED order holding it.
    async fn reserved_order(&self, user: i64, lines: &[(&str, u32)]) -> Order {
        let mut order = Order::new(UserId::new(user), true);
        for (product, quantity) in lines {
            let product_id = ProductId::new(*product);
            self.stock.reserve(&product_id, *quantity).await.unwrap();
            order
                .add_item(OrderItem::new(product_id, *quantity, Money::from_cents(100)))
                .unwrap();
        }
        order.mark_reserved().unwrap();
        self.orders.insert(&order).await.unwrap();
        order
    }
}

fn lines(items: &[(&str, u32)]) -> Vec<OrderLine> {
    items
        .iter()
        .map(|(product, quantity)| OrderLine::new(*product, *quantity))
        .collect()
}

#[tokio::test]
async fn test_paid_order_confirms_stock() {
    let h = TestHarness::new();

    let order = h
        .saga
        .place_order(UserId::new(1), lines(&[("P", 3)]), true)
        .await
        .unwrap();

    assert_eq!(order.status(), OrderStatus::Paid);
    assert_eq!(order.total_amount(), Money::from_cents(3 * 1999));
    assert_eq!(order.items().len(), 1);
    assert_eq!(h.counters("P").await, (7, 0));

    let stored = h.orders.get(order.id()).await.unwrap().unwrap();
    assert_eq!(stored, order);
}

#[tokio::test]
async fn test_paid_order_with_several_items() {
    let h = TestHarness::new();

    let order = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 2), ("B", 3), ("C", 1)]), true)
        .await
        .unwrap();

    assert_eq!(order.status(), OrderStatus::Paid);
    assert_eq!(
        order.total_amount(),
        Money::from_cents(2 * 1000 + 3 * 250 + 99)
    );
    let products: Vec<_> = order.items().iter().map(|i| i.product_id.as_str()).collect();
    assert_eq!(products, vec!["A", "B", "C"]);

    assert_eq!(h.counters("A").await, (8, 0));
    assert_eq!(h.counters("B").await, (7, 0));
    assert_eq!(h.counters("C").await, (9, 0));
}

#[tokio::test]
async fn test_declined_payment_releases_and_records_failed() {
    let h = TestHarness::new();

    let order = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 2), ("B", 3)]), false)
        .await
        .unwrap();

    assert_eq!(order.status(), OrderStatus::Failed);
    assert!(!order.payment_success());
    assert_eq!(h.counters("A").await, (10, 0));
    assert_eq!(h.counters("B").await, (10, 0));

    let stored = h.orders.get(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Failed);
}

#[tokio::test]
async fn test_insufficient_stock_leaves_record_unchanged() {
    let h = TestHarness::new();

    let err = h
        .saga
        .place_order(UserId::new(1), lines(&[("P", 15)]), true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SagaError::InsufficientStock {
            available: 10,
            requested: 15,
            ..
        }
    ));
    assert_eq!(h.counters("P").await, (10, 0));
    assert_eq!(h.orders.order_count().await, 0);
}

#[tokio::test]
async fn test_failed_reservation_rolls_back_earlier_items() {
    let h = TestHarness::new();

    let err = h
        .saga
        .place_order(
            UserId::new(1),
            lines(&[("A", 2), ("B", 3), ("SCARCE", 5)]),
            true,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SagaError::InsufficientStock { .. }));
    assert_eq!(h.counters("A").await, (10, 0));
    assert_eq!(h.counters("B").await, (10, 0));
    assert_eq!(h.counters("SCARCE").await, (1, 0));
    assert_eq!(h.orders.order_count().await, 0);
    assert_eq!(h.stock.call_count(StockOperation::Release), 2);
}

#[tokio::test]
async fn test_unknown_price_rolls_back() {
    let h = TestHarness::new();

    let err = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 2), ("MISSING", 1)]), true)
        .await
        .unwrap_err();

    assert!(matches!(err, SagaError::ProductNotFound(p) if p.as_str() == "MISSING"));
    assert_eq!(h.counters("A").await, (10, 0));
    assert_eq!(h.orders.order_count().await, 0);
}

#[tokio::test]
async fn test_priced_product_without_stock_record() {
    let h = TestHarness::new();

    let err = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 1), ("UNSTOCKED", 1)]), true)
        .await
        .unwrap_err();

    assert!(matches!(err, SagaError::ProductNotFound(p) if p.as_str() == "UNSTOCKED"));
    assert_eq!(h.counters("A").await, (10, 0));
}

#[tokio::test]
async fn test_pricing_outage_rolls_back() {
    let h = TestHarness::new();
    h.pricing.set_unavailable(true);

    let err = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 1)]), true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SagaError::ServiceUnavailable {
            service: "product",
            ..
        }
    ));
    assert_eq!(h.stock.call_count(StockOperation::Reserve), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reserve_timeout_is_a_failure_and_rolls_back() {
    let h = TestHarness::new();
    h.stock
        .set_fault(StockOperation::Reserve, "B", StockFault::Hang);

    let err = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 4), ("B", 1)]), true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SagaError::ServiceUnavailable {
            service: "inventory",
            ..
        }
    ));
    assert_eq!(h.counters("A").await, (10, 0));
    assert_eq!(h.orders.order_count().await, 0);
}

#[tokio::test]
async fn test_confirm_failure_releases_unconfirmed_and_records_failed() {
    let h = TestHarness::new();
    h.stock
        .set_fault(StockOperation::Confirm, "B", StockFault::ServerError);

    let err = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 2), ("B", 3), ("C", 4)]), true)
        .await
        .unwrap_err();

    let (order_id, product_id) = match err {
        SagaError::StockConfirmationFailed {
            order_id,
            product_id,
            ..
        } => (order_id, product_id),
        other => panic!("expected StockConfirmationFailed, got {other:?}"),
    };
    assert_eq!(product_id.as_str(), "B");

    // A was confirmed before the failure and cannot be undone.
    assert_eq!(h.counters("A").await, (8, 0));
    assert_eq!(h.counters("B").await, (10, 0));
    assert_eq!(h.counters("C").await, (10, 0));

    let stored = h.orders.get(order_id).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Failed);
    assert_eq!(stored.items().len(), 3);
}

#[tokio::test]
async fn test_confirm_failure_names_reservations_it_could_not_release() {
    let h = TestHarness::new();
    h.stock
        .set_fault(StockOperation::Confirm, "B", StockFault::ServerError);
    h.stock
        .set_fault(StockOperation::Release, "C", StockFault::ServerError);

    let err = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 2), ("B", 3), ("C", 4)]), true)
        .await
        .unwrap_err();

    match err {
        SagaError::StockConfirmationFailed {
            product_id,
            unreleased,
            ..
        } => {
            assert_eq!(product_id.as_str(), "B");
            assert_eq!(unreleased, vec![ProductId::new("C")]);
        }
        other => panic!("expected StockConfirmationFailed, got {other:?}"),
    }
    assert_eq!(h.counters("B").await, (10, 0));
    assert_eq!(h.counters("C").await, (6, 4));
}

#[tokio::test]
async fn test_declined_payment_with_failed_release_is_not_success() {
    let h = TestHarness::new();
    h.stock
        .set_fault(StockOperation::Release, "A", StockFault::ServerError);

    let err = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 2), ("B", 1)]), false)
        .await
        .unwrap_err();

    let order_id = match err {
        SagaError::CompensationIncomplete { order_id, products } => {
            assert_eq!(products, vec![ProductId::new("A")]);
            order_id
        }
        other => panic!("expected CompensationIncomplete, got {other:?}"),
    };
    assert_eq!(h.counters("A").await, (8, 2));
    assert_eq!(h.counters("B").await, (10, 0));

    // The declined order is still recorded so the held stock can be traced.
    let stored = h.orders.get(order_id).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Failed);
    assert_eq!(stored.items().len(), 2);
}

#[tokio::test]
async fn test_overflowing_total_is_invalid_and_rolls_back() {
    let h = TestHarness::new();
    h.pricing.set_price("B", Money::from_cents(i64::MAX / 2));

    let err = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 1), ("B", 3)]), true)
        .await
        .unwrap_err();

    assert!(matches!(err, SagaError::InvalidOrder(_)));
    assert_eq!(h.counters("A").await, (10, 0));
    assert_eq!(h.counters("B").await, (10, 0));
    assert_eq!(h.orders.order_count().await, 0);
}

#[tokio::test]
async fn test_transient_release_failure_is_retried_during_rollback() {
    let h = TestHarness::new();
    h.stock
        .set_fault_times(StockOperation::Release, "A", StockFault::Unavailable, 2);

    let err = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 2), ("SCARCE", 2)]), true)
        .await
        .unwrap_err();

    assert!(matches!(err, SagaError::InsufficientStock { .. }));
    assert_eq!(h.counters("A").await, (10, 0));
    assert_eq!(h.stock.call_count(StockOperation::Release), 3);
}

#[tokio::test]
async fn test_failed_compensation_surfaces_original_error() {
    let h = TestHarness::new();
    h.stock
        .set_fault(StockOperation::Release, "A", StockFault::ServerError);

    let err = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 2), ("SCARCE", 2)]), true)
        .await
        .unwrap_err();

    assert!(matches!(err, SagaError::InsufficientStock { .. }));
    // The release was rejected, so A's reservation is still held.
    assert_eq!(h.counters("A").await, (8, 2));
}

#[tokio::test]
async fn test_cancel_reserved_order_releases_items() {
    let h = TestHarness::new();
    let order = h.reserved_order(1, &[("A", 2), ("B", 5)]).await;
    assert_eq!(h.counters("A").await, (8, 2));
    assert_eq!(h.counters("B").await, (5, 5));

    let cancelled = h.saga.cancel_order(order.id()).await.unwrap();

    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(cancelled.items(), order.items());
    assert_eq!(h.counters("A").await, (10, 0));
    assert_eq!(h.counters("B").await, (10, 0));
}

#[tokio::test]
async fn test_cancel_twice_fails_without_side_effects() {
    let h = TestHarness::new();
    let order = h.reserved_order(1, &[("A", 2)]).await;
    h.saga.cancel_order(order.id()).await.unwrap();

    // Hold some unrelated stock so a stray release would be visible.
    h.stock.reserve(&ProductId::new("A"), 3).await.unwrap();
    let releases = h.stock.call_count(StockOperation::Release);

    let err = h.saga.cancel_order(order.id()).await.unwrap_err();

    assert!(matches!(err, SagaError::AlreadyCancelled(id) if id == order.id()));
    assert_eq!(h.stock.call_count(StockOperation::Release), releases);
    assert_eq!(h.counters("A").await, (7, 3));
}

#[tokio::test]
async fn test_cancel_failed_order_is_rejected() {
    let h = TestHarness::new();
    let order = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 2)]), false)
        .await
        .unwrap();

    let err = h.saga.cancel_order(order.id()).await.unwrap_err();
    assert!(matches!(
        err,
        SagaError::InvalidTransition {
            from: OrderStatus::Failed,
            ..
        }
    ));
    assert_eq!(h.counters("A").await, (10, 0));
}

#[tokio::test]
async fn test_cancel_unknown_order() {
    let h = TestHarness::new();
    let err = h.saga.cancel_order(OrderId::new()).await.unwrap_err();
    assert!(matches!(err, SagaError::OrderNotFound(_)));
}

#[tokio::test]
async fn test_cancel_with_failed_release_keeps_order_reserved() {
    let h = TestHarness::new();
    let order = h.reserved_order(1, &[("A", 2), ("B", 1)]).await;
    h.stock
        .set_fault(StockOperation::Release, "B", StockFault::ServerError);

    let err = h.saga.cancel_order(order.id()).await.unwrap_err();

    let products = match err {
        SagaError::CompensationIncomplete { products, .. } => products,
        other => panic!("expected CompensationIncomplete, got {other:?}"),
    };
    assert_eq!(products, vec![ProductId::new("B")]);

    let stored = h.orders.get(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Reserved);
    assert_eq!(h.counters("A").await, (10, 0));
    assert_eq!(h.counters("B").await, (9, 1));
}

#[tokio::test]
async fn test_same_product_on_two_lines() {
    let h = TestHarness::new();

    let order = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 2), ("A", 3)]), true)
        .await
        .unwrap();

    assert_eq!(order.items().len(), 2);
    assert_eq!(order.total_amount(), Money::from_cents(5 * 1000));
    assert_eq!(h.counters("A").await, (5, 0));
}

#[tokio::test]
async fn test_user_and_admin_views() {
    let h = TestHarness::new();
    let first = h
        .saga
        .place_order(UserId::new(1), lines(&[("A", 1)]), true)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = h
        .saga
        .place_order(UserId::new(1), lines(&[("B", 1)]), false)
        .await
        .unwrap();
    h.saga
        .place_order(UserId::new(2), lines(&[("C", 1)]), true)
        .await
        .unwrap();

    let mine = h.saga.get_user_orders(UserId::new(1)).await.unwrap();
    let ids: Vec<_> = mine.iter().map(Order::id).collect();
    assert_eq!(ids, vec![second.id(), first.id()]);

    assert_eq!(h.saga.get_all_orders().await.unwrap().len(), 3);
    assert!(h.saga.get_user_orders(UserId::new(3)).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_never_oversell() {
    let h = Arc::new(TestHarness::new());

    let attempts = (0..20).map(|user| {
        let h = Arc::clone(&h);
        async move {
            h.saga
                .place_order(UserId::new(user), lines(&[("P", 1)]), true)
                .await
        }
    });
    let results = join_all(attempts).await;

    let paid = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(SagaError::InsufficientStock { .. })))
        .count();

    assert_eq!(paid, 10);
    assert_eq!(rejected, 10);
    assert_eq!(h.counters("P").await, (0, 0));
    assert_eq!(h.orders.order_count().await, 10);
}
