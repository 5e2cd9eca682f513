//! Domain layer for the checkout core.
//!
//! This crate provides the pure, synchronous domain model:
//! - Aggregate trait for versioned records
//! - Order aggregate with the checkout state machine
//! - Inventory counters and reservation lifecycle
//! - Offer definitions and the full-recompute offer engine

pub mod aggregate;
pub mod error;
pub mod inventory;
pub mod offer;
pub mod order;

pub use aggregate::{Aggregate, DomainEvent};
pub use error::DomainError;
pub use inventory::{
    InventoryError, InventoryLevel, InventoryReservation, LedgerEntry, ReservationStatus,
};
pub use offer::{
    AdjustmentScope, Discount, ItemEligibility, Offer, OfferEngine, OfferError, RecomputeSummary,
    TargetCriteria, TargetCriteriaEligibility,
};
pub use order::{
    Address, CustomerInfo, FulfillmentGroup, Order, OrderAdjustment, OrderError, OrderItem,
    OrderItemAdjustment, OrderStatus, PaymentDetails, PaymentMethod, ShippingMethod,
};
