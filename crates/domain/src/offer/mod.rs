//! Promotions and the engine that turns them into order adjustments.

mod definition;
mod engine;

pub use definition::{AdjustmentScope, Discount, Offer, TargetCriteria};
pub use engine::{ItemEligibility, OfferEngine, RecomputeSummary, TargetCriteriaEligibility};

use thiserror::Error;

/// Errors raised while evaluating offers.
#[derive(Debug, Error)]
pub enum OfferError {
    /// No offer is registered under the coupon code.
    #[error("Coupon not found: {0}")]
    CouponNotFound(String),

    /// The coupon's offer has been archived.
    #[error("Coupon {0} is no longer active")]
    CouponArchived(String),
}
