//! Checkout error taxonomy.

use domain::{DomainError, InventoryError, OfferError, OrderError};
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

/// Errors returned by the inventory ledger and the checkout commands.
///
/// Every variant carries a stable code (see [`CheckoutError::code`]); callers
/// branch on the variant, users see `{code, message}`.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Malformed command input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// An order, item, reservation, level, SKU or coupon is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A state-machine or reservation guard rejected the command.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Stock cannot satisfy the request and backorders are disallowed.
    #[error("Insufficient inventory for {sku_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        sku_id: String,
        requested: u32,
        available: i64,
    },

    /// Another writer saved the record first.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// The payment collaborator declined the authorization.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// Persistence or transport failure.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A step failed and so did the action compensating for it.
    #[error("{original} (compensation failed: {compensation})")]
    CompensationFailed {
        original: Box<CheckoutError>,
        compensation: Box<CheckoutError>,
    },
}

/// User-facing error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl CheckoutError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CheckoutError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable snake_case error code.
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::Validation(_) => "validation_error",
            CheckoutError::NotFound { .. } => "not_found",
            CheckoutError::InvalidTransition(_) => "invalid_transition",
            CheckoutError::InsufficientInventory { .. } => "insufficient_inventory",
            CheckoutError::Conflict(_) => "conflict",
            CheckoutError::PaymentFailed(_) => "payment_failed",
            CheckoutError::Internal(_) => "internal_error",
            CheckoutError::CompensationFailed { .. } => "compensation_failed",
        }
    }

    /// The `{code, message}` shown to callers.
    ///
    /// Internal failures get a generic message; the cause is only logged.
    pub fn body(&self) -> ErrorBody {
        let message = match self {
            CheckoutError::Internal(_) => "internal error".to_string(),
            CheckoutError::CompensationFailed { original, .. } => format!(
                "{}; compensating action also failed",
                original.body().message
            ),
            other => other.to_string(),
        };
        ErrorBody {
            code: self.code(),
            message,
        }
    }

    /// Pairs this error with the failure of its compensating action.
    pub fn with_compensation_failure(self, compensation: CheckoutError) -> Self {
        CheckoutError::CompensationFailed {
            original: Box::new(self),
            compensation: Box::new(compensation),
        }
    }
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { .. } => {
                CheckoutError::InvalidTransition(err.to_string())
            }
            OrderError::ItemNotFound { item_id } => CheckoutError::not_found("Order item", item_id),
            OrderError::InvalidQuantity { .. }
            | OrderError::NoItems
            | OrderError::InvalidCustomerInfo(_)
            | OrderError::IncompleteAddress { .. }
            | OrderError::AmountOverflow => CheckoutError::Validation(err.to_string()),
        }
    }
}

impl From<InventoryError> for CheckoutError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InvalidQuantity { .. } => CheckoutError::Validation(err.to_string()),
            InventoryError::InsufficientInventory {
                sku_id,
                requested,
                available,
            } => CheckoutError::InsufficientInventory {
                sku_id: sku_id.to_string(),
                requested,
                available,
            },
            InventoryError::InsufficientReserved { .. }
            | InventoryError::InsufficientAllocated { .. }
            | InventoryError::InvalidReservationTransition { .. } => {
                CheckoutError::InvalidTransition(err.to_string())
            }
            InventoryError::SkuMismatch { .. } => CheckoutError::Internal(err.to_string()),
        }
    }
}

impl From<OfferError> for CheckoutError {
    fn from(err: OfferError) -> Self {
        match err {
            OfferError::CouponNotFound(code) => CheckoutError::not_found("Coupon", code),
            OfferError::CouponArchived(_) => CheckoutError::Validation(err.to_string()),
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Order(e) => e.into(),
            DomainError::Inventory(e) => e.into(),
            DomainError::Offer(e) => e.into(),
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        if err.is_conflict() {
            CheckoutError::Conflict(err.to_string())
        } else {
            CheckoutError::Internal(err.to_string())
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderItemId, SkuId, Version};
    use domain::OrderStatus;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            CheckoutError::Validation("x".into()).code(),
            "validation_error"
        );
        assert_eq!(CheckoutError::not_found("Order", "1").code(), "not_found");
        assert_eq!(
            CheckoutError::InvalidTransition("x".into()).code(),
            "invalid_transition"
        );
        assert_eq!(CheckoutError::Conflict("x".into()).code(), "conflict");
        assert_eq!(
            CheckoutError::PaymentFailed("x".into()).code(),
            "payment_failed"
        );
        assert_eq!(CheckoutError::Internal("x".into()).code(), "internal_error");
    }

    #[test]
    fn test_internal_message_is_hidden() {
        let err = CheckoutError::Internal("relation \"orders\" does not exist".into());
        let body = err.body();
        assert_eq!(body.code, "internal_error");
        assert_eq!(body.message, "internal error");
    }

    #[test]
    fn test_order_errors_map_to_taxonomy() {
        let err: CheckoutError = OrderError::InvalidTransition {
            current: OrderStatus::Pending,
            action: "submit",
        }
        .into();
        assert_eq!(err.code(), "invalid_transition");

        let err: CheckoutError = OrderError::InvalidQuantity { quantity: 0 }.into();
        assert_eq!(err.code(), "validation_error");

        let err: CheckoutError = OrderError::ItemNotFound {
            item_id: OrderItemId::new(),
        }
        .into();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_inventory_errors_map_to_taxonomy() {
        let err: CheckoutError = InventoryError::InsufficientInventory {
            sku_id: SkuId::new("SKU-1"),
            requested: 6,
            available: 4,
        }
        .into();
        assert!(matches!(
            err,
            CheckoutError::InsufficientInventory {
                requested: 6,
                available: 4,
                ..
            }
        ));

        let err: CheckoutError = InventoryError::InsufficientReserved {
            sku_id: SkuId::new("SKU-1"),
            requested: 2,
            reserved: 1,
        }
        .into();
        assert_eq!(err.code(), "invalid_transition");
    }

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err: CheckoutError = StoreError::ConcurrencyConflict {
            aggregate_type: "Order",
            id: "abc".into(),
            expected: Version::first(),
            actual: Version::new(2),
        }
        .into();
        assert_eq!(err.code(), "conflict");

        let err: CheckoutError = StoreError::Unavailable("down".into()).into();
        assert_eq!(err.code(), "internal_error");
    }

    #[test]
    fn test_compensation_failure_reports_both() {
        let err = CheckoutError::Internal("save failed".into())
            .with_compensation_failure(CheckoutError::Internal("release failed".into()));
        assert_eq!(err.code(), "compensation_failed");
        let text = err.to_string();
        assert!(text.contains("save failed"));
        assert!(text.contains("release failed"));
        assert_eq!(
            err.body().message,
            "internal error; compensating action also failed"
        );
    }
}
