//! Domain error types.

use thiserror::Error;

use crate::inventory::InventoryError;
use crate::offer::OfferError;
use crate::order::OrderError;

/// Errors raised by domain rules.
///
/// Every variant is a business-rule outcome, never a transient failure.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the order aggregate.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// An error occurred in the inventory ledger math.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// An error occurred while evaluating offers.
    #[error("Offer error: {0}")]
    Offer(#[from] OfferError),
}
