//! Order service entry point.

use std::sync::Arc;

use api::config::{Config, ORDER_PORT};
use orders::{InMemoryOrderLedger, PostgresOrderLedger};
use saga::{HttpPricingLookup, HttpStockLedger, OrderSaga};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() {
    let config = Config::from_env(ORDER_PORT);

    // 1. Initialize tracing
    api::init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Remote collaborators
    let stock = HttpStockLedger::new(&config.inventory_service_url, config.call_timeout)
        .expect("failed to build inventory client");
    let pricing = HttpPricingLookup::new(&config.product_service_url, config.call_timeout)
        .expect("failed to build product client");
    tracing::info!(
        inventory = %config.inventory_service_url,
        product = %config.product_service_url,
        timeout_ms = config.call_timeout.as_millis() as u64,
        "collaborators configured"
    );

    // 4. Pick the order ledger backend and build the application
    let app = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let orders = PostgresOrderLedger::new(pool);
            orders
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL order ledger");
            let saga = OrderSaga::new(stock, pricing, orders, config.saga_config());
            api::create_order_app(Arc::new(saga), metrics_handle)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory order ledger");
            let saga = OrderSaga::new(
                stock,
                pricing,
                InMemoryOrderLedger::new(),
                config.saga_config(),
            );
            api::create_order_app(Arc::new(saga), metrics_handle)
        }
    };

    // 5. Start server
    api::serve(&config, app).await.expect("server error");
}
