//! Pricing lookup trait and implementations.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{Money, ProductId};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

/// Errors returned by a pricing lookup.
#[derive(Debug, Error)]
pub enum PricingError {
    /// No such product.
    #[error("Product not found with ID: {0}")]
    NotFound(ProductId),

    /// The product service could not be reached or failed.
    #[error("Product service unavailable: {0}")]
    Unavailable(String),

    /// The product service answered with a price that cannot be used.
    #[error("Invalid price for product {product_id}: {price}")]
    InvalidPrice { product_id: ProductId, price: String },
}

/// Current price of a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPrice {
    pub id: ProductId,
    pub price: Money,
}

/// Read-only product price lookup.
#[async_trait]
pub trait PricingLookup: Send + Sync {
    /// Returns the current price of a product.
    async fn get_product(&self, product_id: &ProductId) -> Result<ProductPrice, PricingError>;
}

#[derive(Debug, Default)]
struct InMemoryPricingState {
    prices: HashMap<ProductId, Money>,
    unavailable: bool,
    lookups: usize,
}

/// In-memory pricing lookup for testing and single-process runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPricingLookup {
    state: Arc<RwLock<InMemoryPricingState>>,
}

impl InMemoryPricingLookup {
    /// Creates an empty price list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a price list from `(product, price)` pairs.
    pub fn with_prices<I, P>(prices: I) -> Self
    where
        I: IntoIterator<Item = (P, Money)>,
        P: Into<ProductId>,
    {
        let lookup = Self::new();
        for (product_id, price) in prices {
            lookup.set_price(product_id, price);
        }
        lookup
    }

    /// Sets or replaces a price.
    pub fn set_price(&self, product_id: impl Into<ProductId>, price: Money) {
        self.write().prices.insert(product_id.into(), price);
    }

    /// Makes every lookup fail with `Unavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    /// Returns the number of lookups served so far, failed ones included.
    pub fn lookup_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookups
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryPricingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PricingLookup for InMemoryPricingLookup {
    async fn get_product(&self, product_id: &ProductId) -> Result<ProductPrice, PricingError> {
        let mut state = self.write();
        state.lookups += 1;

        if state.unavailable {
            return Err(PricingError::Unavailable(
                "product service is down".to_string(),
            ));
        }

        state
            .prices
            .get(product_id)
            .map(|price| ProductPrice {
                id: product_id.clone(),
                price: *price,
            })
            .ok_or_else(|| PricingError::NotFound(product_id.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    price: Decimal,
}

/// Pricing lookup against the product service's `GET /api/products/{id}`.
#[derive(Debug, Clone)]
pub struct HttpPricingLookup {
    client: Client,
    base_url: String,
}

impl HttpPricingLookup {
    /// Creates a client for the product service at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PricingLookup for HttpPricingLookup {
    #[tracing::instrument(skip(self), fields(%product_id))]
    async fn get_product(&self, product_id: &ProductId) -> Result<ProductPrice, PricingError> {
        let url = format!("{}/api/products/{}", self.base_url, product_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PricingError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(PricingError::NotFound(product_id.clone())),
            status if !status.is_success() => {
                return Err(PricingError::Unavailable(format!(
                    "product service answered {status}"
                )));
            }
            _ => {}
        }

        let body: ProductResponse = response
            .json()
            .await
            .map_err(|e| PricingError::Unavailable(format!("unreadable product response: {e}")))?;

        let price = Money::from_decimal(body.price)
            .filter(|price| !price.cents().is_negative())
            .ok_or_else(|| PricingError::InvalidPrice {
                product_id: product_id.clone(),
                price: body.price.to_string(),
            })?;

        Ok(ProductPrice {
            id: product_id.clone(),
            price,
        })
    }
}
