//! The per-product stock record and its counter transitions.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StockError};

/// Upper bound on `available_quantity + reserved_quantity` for one product.
///
/// Matches the `INTEGER` counters of the Postgres schema.
pub const MAX_STOCK_QUANTITY: u32 = i32::MAX as u32;

/// Available and reserved stock for one product.
///
/// `available_quantity + reserved_quantity` is the physical stock the ledger
/// still tracks, never more than [`MAX_STOCK_QUANTITY`]. Reserve and release
/// move units between the two counters and confirm removes reserved units
/// for good. Only [`StockRecord::set_available`] adds stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub product_id: ProductId,
    pub available_quantity: u32,
    pub reserved_quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Creates a record with nothing reserved.
    pub fn new(product_id: ProductId, available_quantity: u32) -> Self {
        let now = Utc::now();
        Self {
            product_id,
            available_quantity,
            reserved_quantity: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves `quantity` units from available to reserved.
    pub fn reserve(&mut self, quantity: u32) -> Result<()> {
        ensure_positive(quantity)?;
        if self.available_quantity < quantity {
            return Err(StockError::InsufficientStock {
                product_id: self.product_id.clone(),
                available: self.available_quantity,
                requested: quantity,
            });
        }
        // The total is unchanged and already within MAX_STOCK_QUANTITY.
        self.available_quantity -= quantity;
        self.reserved_quantity += quantity;
        self.touch();
        Ok(())
    }

    /// Moves `quantity` units from reserved back to available.
    pub fn release(&mut self, quantity: u32) -> Result<()> {
        self.check_reserved(quantity)?;
        let available = self
            .available_quantity
            .checked_add(quantity)
            .ok_or_else(|| StockError::CapacityExceeded {
                product_id: self.product_id.clone(),
                reserved: self.reserved_quantity,
                requested: quantity,
            })?;
        self.reserved_quantity -= quantity;
        self.available_quantity = available;
        self.touch();
        Ok(())
    }

    /// Removes `quantity` reserved units permanently.
    pub fn confirm(&mut self, quantity: u32) -> Result<()> {
        self.check_reserved(quantity)?;
        self.reserved_quantity -= quantity;
        self.touch();
        Ok(())
    }

    /// Overwrites the available counter (admin restock/correction).
    ///
    /// Fails when the new counter plus what is reserved would exceed
    /// [`MAX_STOCK_QUANTITY`].
    pub fn set_available(&mut self, available_quantity: u32) -> Result<()> {
        ensure_capacity(&self.product_id, self.reserved_quantity, available_quantity)?;
        self.available_quantity = available_quantity;
        self.touch();
        Ok(())
    }

    /// Total units still tracked by the ledger.
    pub fn total_quantity(&self) -> u64 {
        self.available_quantity as u64 + self.reserved_quantity as u64
    }

    fn check_reserved(&self, quantity: u32) -> Result<()> {
        ensure_positive(quantity)?;
        if self.reserved_quantity < quantity {
            return Err(StockError::InsufficientReservation {
                product_id: self.product_id.clone(),
                reserved: self.reserved_quantity,
                requested: quantity,
            });
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Rejects zero quantities before any record is touched.
pub fn ensure_positive(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(StockError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// Rejects counters whose total would exceed [`MAX_STOCK_QUANTITY`].
pub fn ensure_capacity(product_id: &ProductId, reserved: u32, available: u32) -> Result<()> {
    if u64::from(reserved) + u64::from(available) > u64::from(MAX_STOCK_QUANTITY) {
        return Err(StockError::CapacityExceeded {
            product_id: product_id.clone(),
            reserved,
            requested: available,
        });
    }
    Ok(())
}
