//! HTTP services with observability for the stock ledger and the order saga.
//!
//! Two services are built from this crate:
//! - `inventory-service` exposes the stock ledger
//! - `order-service` runs the order placement saga against a remote stock
//!   ledger and product service
//!
//! Both log with `tracing` and expose Prometheus metrics at `/metrics`.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use inventory::{StockAdmin, StockLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::OrderLedger;
use saga::{OrderSaga, PricingLookup};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;

fn with_layers(router: Router) -> Router {
    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the inventory service router.
pub fn create_inventory_app<L: StockAdmin + 'static>(
    ledger: Arc<L>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::inventory;

    let api = Router::new()
        .route(
            "/api/inventory",
            get(inventory::list_records::<L>).post(inventory::create_record::<L>),
        )
        .route(
            "/api/inventory/{product_id}",
            get(inventory::get_record::<L>).put(inventory::update_available::<L>),
        )
        .route("/api/inventory/reserve", post(inventory::reserve::<L>))
        .route("/api/inventory/release", post(inventory::release::<L>))
        .route("/api/inventory/confirm", post(inventory::confirm::<L>))
        .with_state(ledger);

    with_layers(api.merge(routes::ops::router("inventory-service", metrics_handle)))
}

/// Creates the order service router.
pub fn create_order_app<S, P, O>(
    saga: Arc<OrderSaga<S, P, O>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    S: StockLedger + 'static,
    P: PricingLookup + 'static,
    O: OrderLedger + 'static,
{
    use routes::orders;

    let api = Router::new()
        .route(
            "/api/orders",
            post(orders::place::<S, P, O>).get(orders::all_orders::<S, P, O>),
        )
        .route("/api/orders/my-orders", get(orders::my_orders::<S, P, O>))
        .route("/api/orders/{id}/cancel", put(orders::cancel::<S, P, O>))
        .with_state(saga);

    with_layers(api.merge(routes::ops::router("order-service", metrics_handle)))
}

/// Installs the global tracing subscriber, filtered by `RUST_LOG`.
pub fn init_tracing(config: &Config) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Binds `config.addr()` and serves `app` until SIGINT or SIGTERM.
pub async fn serve(config: &Config, app: Router) -> std::io::Result<()> {
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}
