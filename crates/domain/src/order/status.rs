//! Order checkout state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its checkout lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► CustomerInfo ──► Shipping ──► Payment ──► Review ──► Submitted ──► Fulfilled
///    │             │              │            │           │
///    └─────────────┴──────────────┴────────────┴───────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order is being built; items can be added and removed.
    #[default]
    Pending,

    /// Checkout started, awaiting customer details.
    CustomerInfo,

    /// Customer confirmed, awaiting address and shipping option.
    Shipping,

    /// Shipping selected and inventory confirmed, awaiting payment method.
    Payment,

    /// Payment authorized, awaiting final confirmation.
    Review,

    /// Order confirmed; immutable from here on.
    Submitted,

    /// Every item has shipped (terminal state).
    Fulfilled,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if items, quantities and coupons can change in this status.
    pub fn is_editable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::CustomerInfo | OrderStatus::Shipping
        )
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        !matches!(
            self,
            OrderStatus::Submitted | OrderStatus::Fulfilled | OrderStatus::Cancelled
        )
    }

    /// Returns true if the order no longer accepts mutations.
    pub fn is_frozen(&self) -> bool {
        matches!(
            self,
            OrderStatus::Submitted | OrderStatus::Fulfilled | OrderStatus::Cancelled
        )
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Fulfilled | OrderStatus::Cancelled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::CustomerInfo => "CUSTOMER_INFO",
            OrderStatus::Shipping => "SHIPPING",
            OrderStatus::Payment => "PAYMENT",
            OrderStatus::Review => "REVIEW",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Fulfilled => "FULFILLED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
