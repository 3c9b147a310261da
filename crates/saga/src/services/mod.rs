//! Collaborators of the order saga.
//!
//! - [`pricing`]: product price lookup, in-memory or over HTTP
//! - [`inventory`]: the stock ledger reached over HTTP, and a fault-injecting
//!   wrapper for tests

pub mod inventory;
pub mod pricing;

pub use inventory::{FaultyStockLedger, HttpStockLedger, StockFault};
pub use pricing::{
    HttpPricingLookup, InMemoryPricingLookup, PricingError, PricingLookup, ProductPrice,
};
