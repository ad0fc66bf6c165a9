//! Order status state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Shipped ──┬──► Completed
///           │              └──► Cancelled
///           ├──► Completed
///           └──► Cancelled
/// ```
///
/// Re-applying the current status is always accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order has been placed and stock decremented.
    #[default]
    Pending,

    /// Order has left the warehouse.
    Shipped,

    /// Order was delivered (terminal state).
    Completed,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if the order may move from this status to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            OrderStatus::Pending => matches!(
                next,
                OrderStatus::Shipped | OrderStatus::Completed | OrderStatus::Cancelled
            ),
            OrderStatus::Shipped => {
                matches!(next, OrderStatus::Completed | OrderStatus::Cancelled)
            }
            OrderStatus::Completed | OrderStatus::Cancelled => false,
        }
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Returns the status name as stored and sent over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a string does not name a known order status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown order status '{0}'")]
pub struct ParseOrderStatusError(pub String);

impl FromStr for OrderStatus {
    type Err = ParseOrderStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "shipped" => Ok(OrderStatus::Shipped),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            _ => Err(ParseOrderStatusError(s.to_string())),
        }
    }
}
