//! Stock ledger for the inventory service.
//!
//! Each product has a single [`StockRecord`] holding two counters:
//! `available_quantity` and `reserved_quantity`. Stock moves through three
//! states:
//!
//! ```text
//! available ──reserve──► reserved ──confirm──► (removed from the ledger)
//!     ▲                      │
//!     └───────release────────┘
//! ```
//!
//! Every operation is a single-record read-check-write executed atomically,
//! so concurrent callers can never drive either counter below zero.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod wire;

pub use error::{Result, StockError};
pub use ledger::{StockAdmin, StockLedger, StockOperation};
pub use memory::InMemoryStockLedger;
pub use postgres::PostgresStockLedger;
pub use record::{MAX_STOCK_QUANTITY, StockRecord};
pub use wire::{AvailableUpdate, NewStockRecord, StockAdjustment, StockErrorBody};
