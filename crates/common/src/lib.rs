//! Shared identifiers and value types for the checkout core.

mod money;
mod types;

pub use money::{Money, Percent, PercentOutOfRange};
pub use types::{
    CustomerId, FulfillmentGroupId, OfferId, OrderId, OrderItemId, ProductId, ReservationId,
    SkuId, Version,
};
