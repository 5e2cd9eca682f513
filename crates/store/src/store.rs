use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId, SkuId, Version};
use domain::{Aggregate, InventoryLevel, InventoryReservation, LedgerEntry, Order};

use crate::{EventEnvelope, Result, StoreError};

/// Versions assigned by a successful ledger commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedVersions {
    pub level: Version,
    pub reservation: Version,
}

/// Persistence contract for orders.
///
/// Orders are stored whole: items, adjustments and fulfillment groups travel
/// with the order record.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Creates or updates an order.
    ///
    /// The order's version must equal the stored version (0 for a new order),
    /// otherwise the save fails with `ConcurrencyConflict`.
    ///
    /// Returns the new version of the order.
    async fn save_order(&self, order: &Order) -> Result<Version>;

    /// Retrieves an order by identity.
    ///
    /// Returns None if the order doesn't exist.
    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>>;
}

/// Persistence contract for inventory levels and reservations.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Creates or updates a level on its own, with the same version check as orders.
    async fn save_level(&self, level: &InventoryLevel) -> Result<Version>;

    /// Retrieves the level for a SKU.
    async fn find_level(&self, sku_id: &SkuId) -> Result<Option<InventoryLevel>>;

    /// Lists every level, ordered by SKU.
    async fn list_levels(&self) -> Result<Vec<InventoryLevel>>;

    /// Retrieves a reservation by identity.
    async fn find_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<InventoryReservation>>;

    /// Retrieves every reservation placed for an order, oldest first.
    async fn find_reservations_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<InventoryReservation>>;

    /// Retrieves every reservation for a SKU, oldest first.
    async fn find_reservations_for_sku(&self, sku_id: &SkuId)
    -> Result<Vec<InventoryReservation>>;

    /// Retrieves open reservations whose expiry is at or before `now`.
    async fn find_expired_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<InventoryReservation>>;

    /// Commits a level and a reservation in one transaction.
    ///
    /// Both versions are checked; if either check fails nothing is written.
    async fn commit(&self, entry: &LedgerEntry) -> Result<CommittedVersions>;
}

/// Fire-and-continue notification sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes one notification.
    async fn publish(&self, envelope: EventEnvelope) -> Result<()>;
}

/// Checks `aggregate` against the stored version and returns the version to write.
pub(crate) fn next_version<A: Aggregate>(aggregate: &A, stored: Option<Version>) -> Result<Version> {
    let actual = stored.unwrap_or(Version::initial());
    if actual != aggregate.version() {
        return Err(conflict(aggregate, actual));
    }
    Ok(actual.next())
}

pub(crate) fn conflict<A: Aggregate>(aggregate: &A, actual: Version) -> StoreError {
    StoreError::ConcurrencyConflict {
        aggregate_type: A::aggregate_type(),
        id: aggregate.id().to_string(),
        expected: aggregate.version(),
        actual,
    }
}
