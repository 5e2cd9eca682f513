//! Traits shared by persisted records and outbound notifications.

use common::Version;
use serde::{Serialize, de::DeserializeOwned};

/// A notification about something that already happened, named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Routing name used by event sinks.
    fn event_type(&self) -> &'static str;
}

/// A record stored as a versioned document.
///
/// Orders, inventory levels and reservations are each saved whole. The store
/// rejects a save whose version does not match the stored one, so two writers
/// racing on the same record cannot both win.
pub trait Aggregate: Clone + Serialize + DeserializeOwned + Send + Sync {
    type Id: Clone + std::fmt::Display + Send + Sync;

    /// Record type name, used in storage and error messages.
    fn aggregate_type() -> &'static str;

    fn id(&self) -> Self::Id;

    /// Version the record was loaded at; 0 if it was never saved.
    fn version(&self) -> Version;

    /// Called by the store after a successful save.
    fn set_version(&mut self, version: Version);

    fn is_new(&self) -> bool {
        self.version() == Version::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CustomerId, OrderId, OrderItemId, SkuId};

    use crate::{InventoryLevel, InventoryReservation, Order};

    #[test]
    fn test_records_start_unsaved() {
        let mut level = InventoryLevel::new("SKU-001", 5);
        assert!(level.is_new());

        level.set_version(Version::first());
        assert!(!level.is_new());
        assert_eq!(level.version(), Version::first());
    }

    #[test]
    fn test_record_identity_and_type() {
        let order = Order::new(CustomerId::new(), "USD");
        assert_eq!(Order::aggregate_type(), "Order");
        assert!(order.is_new());

        let level = InventoryLevel::new("SKU-001", 5);
        assert_eq!(level.id(), SkuId::new("SKU-001"));

        let reservation = InventoryReservation::new(
            SkuId::new("SKU-001"),
            OrderId::new(),
            OrderItemId::new(),
            2,
            None,
            chrono::Utc::now(),
        );
        assert_ne!(
            InventoryReservation::aggregate_type(),
            InventoryLevel::aggregate_type()
        );
        assert!(reservation.is_new());
    }
}
