//! Orders and the order ledger.
//!
//! This crate provides:
//! - [`Order`] / [`OrderItem`] with price snapshots taken at reservation time
//! - [`OrderStatus`], an explicit state machine with a fixed transition table
//! - [`OrderLedger`], the durable record of orders, with in-memory and
//!   PostgreSQL implementations

pub mod error;
pub mod ledger;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod status;

pub use error::{OrderError, Result};
pub use ledger::OrderLedger;
pub use memory::InMemoryOrderLedger;
pub use order::{Order, OrderItem};
pub use postgres::PostgresOrderLedger;
pub use status::OrderStatus;
