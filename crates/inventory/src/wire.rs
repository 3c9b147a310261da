//! JSON bodies shared by the inventory HTTP surface and its remote clients.

use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::StockError;

/// Body of reserve/release/confirm requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body of the admin create request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStockRecord {
    pub product_id: ProductId,
    pub available_quantity: u32,
}

/// Body of the admin update request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableUpdate {
    pub available_quantity: u32,
}

/// Error body returned by the inventory service.
///
/// Carries enough detail for a client to rebuild the typed [`StockError`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockErrorBody {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<u32>,
}

impl From<&StockError> for StockErrorBody {
    fn from(err: &StockError) -> Self {
        let mut body = StockErrorBody {
            error: err.to_string(),
            code: err.code().to_string(),
            ..Default::default()
        };
        match err {
            StockError::InvalidQuantity(q) => body.requested = Some(*q),
            StockError::NotFound(p) | StockError::AlreadyExists(p) => {
                body.product_id = Some(p.clone())
            }
            StockError::InsufficientStock {
                product_id,
                available,
                requested,
            } => {
                body.product_id = Some(product_id.clone());
                body.available = Some(*available);
                body.requested = Some(*requested);
            }
            StockError::InsufficientReservation {
                product_id,
                reserved,
                requested,
            }
            | StockError::CapacityExceeded {
                product_id,
                reserved,
                requested,
            } => {
                body.product_id = Some(product_id.clone());
                body.reserved = Some(*reserved);
                body.requested = Some(*requested);
            }
            _ => {}
        }
        body
    }
}

impl StockErrorBody {
    /// Rebuilds the typed error.
    ///
    /// `product_id` and `quantity` describe the request that failed and fill
    /// in whatever the body leaves out.
    pub fn into_error(self, status: u16, product_id: &ProductId, quantity: u32) -> StockError {
        let product = self.product_id.unwrap_or_else(|| product_id.clone());
        let requested = self.requested.unwrap_or(quantity);
        match self.code.as_str() {
            "INVALID_QUANTITY" => StockError::InvalidQuantity(requested),
            "STOCK_NOT_FOUND" => StockError::NotFound(product),
            "STOCK_ALREADY_EXISTS" => StockError::AlreadyExists(product),
            "INSUFFICIENT_STOCK" => StockError::InsufficientStock {
                product_id: product,
                available: self.available.unwrap_or(0),
                requested,
            },
            "INSUFFICIENT_RESERVATION" => StockError::InsufficientReservation {
                product_id: product,
                reserved: self.reserved.unwrap_or(0),
                requested,
            },
            "CAPACITY_EXCEEDED" => StockError::CapacityExceeded {
                product_id: product,
                reserved: self.reserved.unwrap_or(0),
                requested,
            },
            "SERVICE_UNAVAILABLE" => StockError::Unavailable(self.error),
            _ => StockError::Rejected {
                status,
                message: self.error,
            },
        }
    }
}
