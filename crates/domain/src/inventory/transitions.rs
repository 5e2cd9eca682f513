//! Reservation transitions paired with their counter mutations.
//!
//! Each function works on copies of the level and the reservation and returns
//! both in their new state. Nothing is mutated when the reservation guard or
//! the counter check fails, so the caller can commit the returned pair as one
//! unit or drop it.

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, OrderItemId};

use super::{InventoryError, InventoryLevel, InventoryReservation, ReservationStatus};

/// A level and reservation to be committed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub level: InventoryLevel,
    pub reservation: InventoryReservation,
}

/// Reserves `quantity` and creates the pending reservation holding it.
pub fn reserve(
    level: &InventoryLevel,
    order_id: OrderId,
    order_item_id: OrderItemId,
    quantity: u32,
    ttl: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<LedgerEntry, InventoryError> {
    let mut level = level.clone();
    level.reserve(quantity)?;
    let reservation = InventoryReservation::new(
        level.sku_id().clone(),
        order_id,
        order_item_id,
        quantity,
        ttl,
        now,
    );
    Ok(LedgerEntry { level, reservation })
}

/// Confirms a pending reservation. Counters are unchanged.
pub fn confirm(
    level: &InventoryLevel,
    reservation: &InventoryReservation,
    ttl: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<LedgerEntry, InventoryError> {
    pair(level, reservation, |_, r| r.confirm(now, ttl))
}

/// Returns a confirmed reservation to pending with the given expiry. Counters are unchanged.
pub fn unconfirm(
    level: &InventoryLevel,
    reservation: &InventoryReservation,
    expires_at: Option<DateTime<Utc>>,
) -> Result<LedgerEntry, InventoryError> {
    pair(level, reservation, |_, r| r.unconfirm(expires_at))
}

/// Changes the quantity of an open reservation, reserving or releasing the difference.
pub fn adjust(
    level: &InventoryLevel,
    reservation: &InventoryReservation,
    quantity: u32,
) -> Result<LedgerEntry, InventoryError> {
    let current = reservation.quantity();
    pair(level, reservation, |l, r| {
        r.adjust_quantity(quantity)?;
        if quantity > current {
            l.reserve(quantity - current)
        } else if quantity < current {
            l.release(current - quantity)
        } else {
            Ok(())
        }
    })
}

/// Releases an open reservation's quantity back to available.
pub fn release(
    level: &InventoryLevel,
    reservation: &InventoryReservation,
    now: DateTime<Utc>,
) -> Result<LedgerEntry, InventoryError> {
    pair(level, reservation, |l, r| {
        r.release(now)?;
        l.release(r.quantity())
    })
}

/// Expires an open reservation and releases its quantity.
pub fn expire(
    level: &InventoryLevel,
    reservation: &InventoryReservation,
    now: DateTime<Utc>,
) -> Result<LedgerEntry, InventoryError> {
    pair(level, reservation, |l, r| {
        r.expire(now)?;
        l.release(r.quantity())
    })
}

/// Commits a confirmed reservation's quantity to fulfillment.
pub fn allocate(
    level: &InventoryLevel,
    reservation: &InventoryReservation,
    now: DateTime<Utc>,
) -> Result<LedgerEntry, InventoryError> {
    pair(level, reservation, |l, r| {
        r.allocate(now)?;
        l.allocate(r.quantity())
    })
}

/// Undoes an allocation, returning the quantity to reserved.
pub fn deallocate(
    level: &InventoryLevel,
    reservation: &InventoryReservation,
) -> Result<LedgerEntry, InventoryError> {
    pair(level, reservation, |l, r| {
        r.deallocate()?;
        l.deallocate(r.quantity())
    })
}

/// Ships a reservation: allocated stock leaves on-hand.
///
/// A confirmed reservation is allocated and shipped in the same unit.
pub fn fulfill(
    level: &InventoryLevel,
    reservation: &InventoryReservation,
    now: DateTime<Utc>,
) -> Result<LedgerEntry, InventoryError> {
    let was_allocated = reservation.status() == ReservationStatus::Allocated;
    pair(level, reservation, |l, r| {
        r.fulfill(now)?;
        if !was_allocated {
            l.allocate(r.quantity())?;
        }
        l.decrement(r.quantity())
    })
}

fn pair<F>(
    level: &InventoryLevel,
    reservation: &InventoryReservation,
    apply: F,
) -> Result<LedgerEntry, InventoryError>
where
    F: FnOnce(&mut InventoryLevel, &mut InventoryReservation) -> Result<(), InventoryError>,
{
    if level.sku_id() != reservation.sku_id() {
        return Err(InventoryError::SkuMismatch {
            reservation_sku: reservation.sku_id().clone(),
            level_sku: level.sku_id().clone(),
        });
    }

    let mut level = level.clone();
    let mut reservation = reservation.clone();
    apply(&mut level, &mut reservation)?;
    Ok(LedgerEntry { level, reservation })
}
