//! Inventory counters and reservation records.
//!
//! [`InventoryLevel`] owns the per-SKU counters, [`InventoryReservation`] the
//! hold placed for one order item. The functions in [`transitions`] pair a
//! reservation state change with its counter mutation so callers can commit
//! both as a single unit.

mod level;
mod reservation;
pub mod transitions;

pub use level::InventoryLevel;
pub use reservation::{InventoryReservation, ReservationStatus};
pub use transitions::LedgerEntry;

use common::{ReservationId, SkuId};
use thiserror::Error;

/// Errors raised by inventory counter math and reservation guards.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Quantities must be strictly positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// Not enough available stock and backorders are disallowed.
    #[error("Insufficient inventory for {sku_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        sku_id: SkuId,
        requested: u32,
        available: i64,
    },

    /// Releasing or allocating more than is reserved.
    #[error("Cannot take {requested} from reserved quantity {reserved} for {sku_id}")]
    InsufficientReserved {
        sku_id: SkuId,
        requested: u32,
        reserved: i64,
    },

    /// Deallocating or shipping more than is allocated.
    #[error("Cannot take {requested} from allocated quantity {allocated} for {sku_id}")]
    InsufficientAllocated {
        sku_id: SkuId,
        requested: u32,
        allocated: i64,
    },

    /// The reservation is not in a status that allows the action.
    #[error("Reservation {reservation_id} cannot {action} from {status} status")]
    InvalidReservationTransition {
        reservation_id: ReservationId,
        status: ReservationStatus,
        action: &'static str,
    },

    /// A reservation was paired with the level of a different SKU.
    #[error("Reservation for {reservation_sku} paired with level for {level_sku}")]
    SkuMismatch {
        reservation_sku: SkuId,
        level_sku: SkuId,
    },
}
