//! Order aggregate and related types.

mod aggregate;
mod fulfillment;
mod item;
mod status;

pub use aggregate::Order;
pub use fulfillment::{
    Address, CustomerInfo, FulfillmentGroup, PaymentDetails, PaymentMethod, ShippingMethod,
};
pub use item::{OrderAdjustment, OrderItem, OrderItemAdjustment};
pub use status::OrderStatus;

use common::OrderItemId;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order is not in the status the command requires.
    #[error("Invalid state transition: cannot {action} from {current} status")]
    InvalidTransition {
        current: OrderStatus,
        action: &'static str,
    },

    /// Item not found in order.
    #[error("Item not found: {item_id}")]
    ItemNotFound { item_id: OrderItemId },

    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Customer details failed validation.
    #[error("Invalid customer info: {0}")]
    InvalidCustomerInfo(String),

    /// Shipping address is missing required fields.
    #[error("Incomplete address: missing {}", fields.join(", "))]
    IncompleteAddress { fields: Vec<&'static str> },

    /// Line or order totals would not fit in a money amount.
    #[error("Order amounts exceed the supported range")]
    AmountOverflow,
}
