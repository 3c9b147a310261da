//! Service configuration loaded from environment variables.

use std::time::Duration;

use saga::{CompensationPolicy, SagaConfig};

/// Default port of the inventory service.
pub const INVENTORY_PORT: u16 = 8082;

/// Default port of the order service.
pub const ORDER_PORT: u16 = 8083;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: per service)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL URL; unset keeps ledgers in memory
/// - `INVENTORY_SERVICE_URL`: stock ledger used by the order service
///   (default: `"http://localhost:8082"`)
/// - `PRODUCT_SERVICE_URL`: pricing lookup used by the order service
///   (default: `"http://localhost:8081"`)
/// - `CALL_TIMEOUT_MS`: bound on every remote call (default: `5000`)
/// - `COMPENSATION_MAX_ATTEMPTS`: attempts per compensating release (default: `3`)
/// - `COMPENSATION_BACKOFF_MS`: delay between those attempts (default: `100`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub inventory_service_url: String,
    pub product_service_url: String,
    pub call_timeout: Duration,
    pub compensation_max_attempts: u32,
    pub compensation_backoff: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env(default_port: u16) -> Self {
        Self::from_lookup(default_port, |key| std::env::var(key).ok())
    }

    /// Loads configuration from `lookup`, falling back to defaults.
    pub fn from_lookup(default_port: u16, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::with_port(default_port);
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            inventory_service_url: lookup("INVENTORY_SERVICE_URL")
                .unwrap_or(defaults.inventory_service_url),
            product_service_url: lookup("PRODUCT_SERVICE_URL")
                .unwrap_or(defaults.product_service_url),
            call_timeout: parsed("CALL_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.call_timeout),
            compensation_max_attempts: parsed("COMPENSATION_MAX_ATTEMPTS")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.compensation_max_attempts),
            compensation_backoff: parsed("COMPENSATION_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.compensation_backoff),
        }
    }

    /// Default configuration listening on `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port,
            log_level: "info".to_string(),
            database_url: None,
            inventory_service_url: format!("http://localhost:{INVENTORY_PORT}"),
            product_service_url: "http://localhost:8081".to_string(),
            call_timeout: Duration::from_millis(5000),
            compensation_max_attempts: 3,
            compensation_backoff: Duration::from_millis(100),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The saga settings carried by this configuration.
    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig {
            call_timeout: self.call_timeout,
            compensation: CompensationPolicy {
                max_attempts: self.compensation_max_attempts,
                backoff: self.compensation_backoff,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(default_port: u16, vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(default_port, |key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = from_map(ORDER_PORT, &[]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8083);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.inventory_service_url, "http://localhost:8082");
        assert_eq!(config.product_service_url, "http://localhost:8081");
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert_eq!(config.saga_config(), SagaConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = from_map(
            INVENTORY_PORT,
            &[
                ("HOST", "127.0.0.1"),
                ("PORT", "9000"),
                ("DATABASE_URL", "postgres://localhost/inventory"),
                ("CALL_TIMEOUT_MS", "750"),
                ("COMPENSATION_MAX_ATTEMPTS", "5"),
                ("COMPENSATION_BACKOFF_MS", "20"),
            ],
        );
        assert_eq!(config.addr(), "127.0.0.1:9000");
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/inventory")
        );

        let saga = config.saga_config();
        assert_eq!(saga.call_timeout, Duration::from_millis(750));
        assert_eq!(saga.compensation.max_attempts, 5);
        assert_eq!(saga.compensation.backoff, Duration::from_millis(20));
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = from_map(
            INVENTORY_PORT,
            &[("PORT", "http"), ("CALL_TIMEOUT_MS", "soon"), ("DATABASE_URL", "")],
        );
        assert_eq!(config.port, INVENTORY_PORT);
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert!(config.database_url.is_none());
    }
}
