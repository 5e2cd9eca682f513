//! Reservation records and their lifecycle guards.

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, OrderItemId, ReservationId, SkuId, Version};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::InventoryError;

/// Status of an inventory reservation.
///
/// ```text
/// Pending ──► Confirmed ──► Allocated ──► Fulfilled
///    │   ◄──────  │  ▲          │
///    │ (unconfirm)│  └──────────┘ (deallocate)
///    ├────────────┴──► Released
///    └────────────┴──► Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    #[default]
    Pending,
    Confirmed,
    Allocated,
    Fulfilled,
    Released,
    Expired,
}

impl ReservationStatus {
    /// Open reservations can still be released, expired or extended.
    pub fn is_open(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    /// Returns true for the statuses that hold quantity in the reserved counter.
    pub fn holds_reserved(&self) -> bool {
        self.is_open()
    }

    /// Returns true for the status that holds quantity in the allocated counter.
    pub fn holds_allocated(&self) -> bool {
        matches!(self, ReservationStatus::Allocated)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Fulfilled | ReservationStatus::Released | ReservationStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Allocated => "ALLOCATED",
            ReservationStatus::Fulfilled => "FULFILLED",
            ReservationStatus::Released => "RELEASED",
            ReservationStatus::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A hold of `quantity` units of a SKU for one order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReservation {
    id: ReservationId,

    #[serde(default)]
    version: Version,

    sku_id: SkuId,
    order_id: OrderId,
    order_item_id: OrderItemId,
    quantity: u32,
    status: ReservationStatus,
    reservation_ref: String,

    reserved_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    allocated_at: Option<DateTime<Utc>>,
    released_at: Option<DateTime<Utc>>,
    fulfilled_at: Option<DateTime<Utc>>,
}

impl Aggregate for InventoryReservation {
    type Id = ReservationId;

    fn aggregate_type() -> &'static str {
        "InventoryReservation"
    }

    fn id(&self) -> ReservationId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

impl InventoryReservation {
    /// Creates a pending reservation.
    ///
    /// A missing or non-positive TTL means the reservation never expires.
    pub fn new(
        sku_id: SkuId,
        order_id: OrderId,
        order_item_id: OrderItemId,
        quantity: u32,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Self {
        let id = ReservationId::new();
        let reference = id.as_uuid().simple().to_string().to_uppercase();
        Self {
            id,
            version: Version::initial(),
            sku_id,
            order_id,
            order_item_id,
            quantity,
            status: ReservationStatus::Pending,
            reservation_ref: format!("RES-{}", &reference[..12]),
            reserved_at: now,
            expires_at: expiry(now, ttl),
            confirmed_at: None,
            allocated_at: None,
            released_at: None,
            fulfilled_at: None,
        }
    }

    pub fn sku_id(&self) -> &SkuId {
        &self.sku_id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn order_item_id(&self) -> OrderItemId {
        self.order_item_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn reservation_ref(&self) -> &str {
        &self.reservation_ref
    }

    pub fn reserved_at(&self) -> DateTime<Utc> {
        self.reserved_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn allocated_at(&self) -> Option<DateTime<Utc>> {
        self.allocated_at
    }

    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        self.released_at
    }

    pub fn fulfilled_at(&self) -> Option<DateTime<Utc>> {
        self.fulfilled_at
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// True iff the reservation is open and its expiry has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.expires_at.is_some_and(|at| at <= now)
    }
}

// Lifecycle guards. Each checks the status before touching any field.
impl InventoryReservation {
    /// PENDING → CONFIRMED.
    ///
    /// A TTL restarts the expiry clock for reservations that expire at all;
    /// never-expiring reservations stay that way.
    pub fn confirm(
        &mut self,
        now: DateTime<Utc>,
        ttl: Option<Duration>,
    ) -> Result<(), InventoryError> {
        self.require(&[ReservationStatus::Pending], "confirm")?;

        if self.expires_at.is_some() {
            if let Some(at) = expiry(now, ttl) {
                self.expires_at = Some(at);
            }
        }
        self.confirmed_at = Some(now);
        self.status = ReservationStatus::Confirmed;
        Ok(())
    }

    /// CONFIRMED → PENDING, putting back the expiry the pending hold had.
    pub fn unconfirm(&mut self, expires_at: Option<DateTime<Utc>>) -> Result<(), InventoryError> {
        self.require(&[ReservationStatus::Confirmed], "unconfirm")?;
        self.confirmed_at = None;
        self.expires_at = expires_at;
        self.status = ReservationStatus::Pending;
        Ok(())
    }

    /// Moves the expiry of an open reservation. `None` removes it.
    pub fn extend(&mut self, expires_at: Option<DateTime<Utc>>) -> Result<(), InventoryError> {
        self.require(
            &[ReservationStatus::Pending, ReservationStatus::Confirmed],
            "extend",
        )?;
        self.expires_at = expires_at;
        Ok(())
    }

    /// Changes the held quantity of an open reservation.
    pub fn adjust_quantity(&mut self, quantity: u32) -> Result<(), InventoryError> {
        self.require(
            &[ReservationStatus::Pending, ReservationStatus::Confirmed],
            "adjust",
        )?;
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity { quantity });
        }
        self.quantity = quantity;
        Ok(())
    }

    /// CONFIRMED → ALLOCATED. Allocated reservations no longer expire.
    pub fn allocate(&mut self, now: DateTime<Utc>) -> Result<(), InventoryError> {
        self.require(&[ReservationStatus::Confirmed], "allocate")?;
        self.allocated_at = Some(now);
        self.expires_at = None;
        self.status = ReservationStatus::Allocated;
        Ok(())
    }

    /// ALLOCATED → CONFIRMED.
    pub fn deallocate(&mut self) -> Result<(), InventoryError> {
        self.require(&[ReservationStatus::Allocated], "deallocate")?;
        self.allocated_at = None;
        self.status = ReservationStatus::Confirmed;
        Ok(())
    }

    /// PENDING/CONFIRMED → RELEASED.
    pub fn release(&mut self, now: DateTime<Utc>) -> Result<(), InventoryError> {
        self.require(
            &[ReservationStatus::Pending, ReservationStatus::Confirmed],
            "release",
        )?;
        self.released_at = Some(now);
        self.status = ReservationStatus::Released;
        Ok(())
    }

    /// PENDING/CONFIRMED → EXPIRED.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), InventoryError> {
        self.require(
            &[ReservationStatus::Pending, ReservationStatus::Confirmed],
            "expire",
        )?;
        self.released_at = Some(now);
        self.status = ReservationStatus::Expired;
        Ok(())
    }

    /// CONFIRMED/ALLOCATED → FULFILLED.
    pub fn fulfill(&mut self, now: DateTime<Utc>) -> Result<(), InventoryError> {
        self.require(
            &[ReservationStatus::Confirmed, ReservationStatus::Allocated],
            "fulfill",
        )?;
        if self.allocated_at.is_none() {
            self.allocated_at = Some(now);
        }
        self.expires_at = None;
        self.fulfilled_at = Some(now);
        self.status = ReservationStatus::Fulfilled;
        Ok(())
    }

    fn require(
        &self,
        allowed: &[ReservationStatus],
        action: &'static str,
    ) -> Result<(), InventoryError> {
        if !allowed.contains(&self.status) {
            return Err(InventoryError::InvalidReservationTransition {
                reservation_id: self.id,
                status: self.status,
                action,
            });
        }
        Ok(())
    }
}

fn expiry(now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.filter(|ttl| *ttl > Duration::zero()).map(|ttl| now + ttl)
}
