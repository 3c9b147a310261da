//! Order placement saga.
//!
//! There is no transaction spanning the stock ledger and the order ledger.
//! [`OrderSaga`] keeps them consistent with compensating actions instead:
//!
//! 1. For each line, look up the price, then reserve the stock. Every
//!    successful reservation is appended to a compensation list.
//! 2. If any line fails, release everything on the list and surface the
//!    error. Nothing is persisted.
//! 3. With all lines reserved, confirm every reservation when payment
//!    succeeded (`PAID`), or release them all when it was declined (`FAILED`).
//! 4. Persist the order once, with its final status.
//!
//! Confirmation is not reversible. If confirming line *k* fails, lines
//! before *k* stay confirmed and are logged for manual reconciliation; the
//! rest are released and the order is recorded as `FAILED`.
//!
//! Mutations carry no idempotency key. A call that timed out may still have
//! been applied by the ledger, so only failures that never reached the
//! ledger are retried during compensation.

pub mod compensation;
pub mod config;
pub mod coordinator;
mod deadline;
pub mod error;
pub mod services;

pub use compensation::{CompensationFailure, CompensationReport, Compensator, Reservation};
pub use config::{CompensationPolicy, SagaConfig};
pub use coordinator::{OrderLine, OrderSaga};
pub use error::{Result, SagaError};
pub use services::{
    FaultyStockLedger, HttpPricingLookup, HttpStockLedger, InMemoryPricingLookup, PricingError,
    PricingLookup, ProductPrice, StockFault,
};
