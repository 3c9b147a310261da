//! Inventory service entry point.

use std::sync::Arc;

use api::config::{Config, INVENTORY_PORT};
use inventory::{InMemoryStockLedger, PostgresStockLedger};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() {
    let config = Config::from_env(INVENTORY_PORT);

    // 1. Initialize tracing
    api::init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the ledger backend and build the application
    let app = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let ledger = PostgresStockLedger::new(pool);
            ledger
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL stock ledger");
            api::create_inventory_app(Arc::new(ledger), metrics_handle)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stock ledger");
            api::create_inventory_app(Arc::new(InMemoryStockLedger::new()), metrics_handle)
        }
    };

    // 4. Start server
    api::serve(&config, app).await.expect("server error");
}
