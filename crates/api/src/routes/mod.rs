//! HTTP handlers.

pub mod inventory;
pub mod ops;
pub mod orders;
