//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::error::{OrderError, Result};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► Reserved ──┬──► Paid
///                        ├──► Failed
///                        └──► Cancelled
/// ```
///
/// `Created` and `Reserved` exist while the placement saga runs. `Paid`,
/// `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order is being assembled, items are being reserved.
    #[default]
    Created,

    /// Every item has been reserved, payment outcome not applied yet.
    Reserved,

    /// Payment succeeded and all reservations were confirmed (terminal state).
    Paid,

    /// Payment was declined and all reservations were released (terminal state).
    Failed,

    /// A reserved order was cancelled and its stock released (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Every status reachable in one step from `self`.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Created => &[OrderStatus::Reserved],
            OrderStatus::Reserved => &[
                OrderStatus::Paid,
                OrderStatus::Failed,
                OrderStatus::Cancelled,
            ],
            OrderStatus::Paid | OrderStatus::Failed | OrderStatus::Cancelled => &[],
        }
    }

    /// Returns true if the table allows `self → next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns `next` if the table allows `self → next`.
    pub fn transition_to(&self, next: OrderStatus) -> Result<OrderStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(OrderError::InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Reserved => "RESERVED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATED" => Ok(OrderStatus::Created),
            "RESERVED" => Ok(OrderStatus::Reserved),
            "PAID" => Ok(OrderStatus::Paid),
            "FAILED" => Ok(OrderStatus::Failed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}
