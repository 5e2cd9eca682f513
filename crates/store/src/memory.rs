use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId, SkuId, Version};
use domain::{Aggregate, InventoryLevel, InventoryReservation, LedgerEntry, Order};
use tokio::sync::RwLock;

use crate::{
    EventEnvelope, Result, StoreError,
    store::{CommittedVersions, EventSink, InventoryStore, OrderStore, next_version},
};

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    levels: HashMap<SkuId, InventoryLevel>,
    reservations: HashMap<ReservationId, InventoryReservation>,
}

#[derive(Debug)]
struct Faults {
    fail_on_save_order: AtomicBool,
    fail_on_commit: AtomicBool,
    /// Commits allowed before `fail_on_commit` behaviour kicks in; `usize::MAX` = unlimited.
    commits_remaining: AtomicUsize,
}

impl Default for Faults {
    fn default() -> Self {
        Self {
            fail_on_save_order: AtomicBool::new(false),
            fail_on_commit: AtomicBool::new(false),
            commits_remaining: AtomicUsize::new(usize::MAX),
        }
    }
}

/// In-memory store implementation for tests and local runs.
///
/// Provides the same version checks as the PostgreSQL implementation, plus
/// switches to inject failures.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every order save fail until switched off.
    pub fn set_fail_on_save_order(&self, fail: bool) {
        self.faults.fail_on_save_order.store(fail, Ordering::SeqCst);
    }

    /// Makes every ledger commit fail until switched off.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.faults.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Lets `count` more ledger commits succeed, then fails the rest.
    pub fn fail_commits_after(&self, count: usize) {
        self.faults.commits_remaining.store(count, Ordering::SeqCst);
    }

    /// Returns the number of stored reservations.
    pub async fn reservation_count(&self) -> usize {
        self.tables.read().await.reservations.len()
    }

    /// Writes a level and a reservation without any version check.
    ///
    /// Used to stage drifted state for reconciliation tests.
    pub async fn force_put(&self, level: InventoryLevel, reservation: Option<InventoryReservation>) {
        let mut tables = self.tables.write().await;
        if let Some(reservation) = reservation {
            tables.reservations.insert(reservation.id(), reservation);
        }
        tables.levels.insert(level.sku_id().clone(), level);
    }

    /// Clears all records.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        tables.orders.clear();
        tables.levels.clear();
        tables.reservations.clear();
    }

    fn check_commit_faults(&self) -> Result<()> {
        if self.faults.fail_on_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit rejected".to_string()));
        }
        let allowed = self
            .faults
            .commits_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                usize::MAX => Some(n),
                0 => None,
                n => Some(n - 1),
            });
        if allowed.is_err() {
            return Err(StoreError::Unavailable("commit rejected".to_string()));
        }
        Ok(())
    }
}

fn sorted_by_reserved_at(mut reservations: Vec<InventoryReservation>) -> Vec<InventoryReservation> {
    reservations.sort_by(|a, b| {
        a.reserved_at()
            .cmp(&b.reserved_at())
            .then(a.id().cmp(&b.id()))
    });
    reservations
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn save_order(&self, order: &Order) -> Result<Version> {
        if self.faults.fail_on_save_order.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("order save rejected".to_string()));
        }

        let mut tables = self.tables.write().await;
        let stored = tables.orders.get(&order.id()).map(|o| o.version());
        let version = next_version(order, stored)?;

        let mut record = order.clone();
        record.set_version(version);
        tables.orders.insert(order.id(), record);
        Ok(version)
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn save_level(&self, level: &InventoryLevel) -> Result<Version> {
        let mut tables = self.tables.write().await;
        let stored = tables.levels.get(level.sku_id()).map(|l| l.version());
        let version = next_version(level, stored)?;

        let mut record = level.clone();
        record.set_version(version);
        tables.levels.insert(level.sku_id().clone(), record);
        Ok(version)
    }

    async fn find_level(&self, sku_id: &SkuId) -> Result<Option<InventoryLevel>> {
        Ok(self.tables.read().await.levels.get(sku_id).cloned())
    }

    async fn list_levels(&self) -> Result<Vec<InventoryLevel>> {
        let tables = self.tables.read().await;
        let mut levels: Vec<_> = tables.levels.values().cloned().collect();
        levels.sort_by(|a, b| a.sku_id().cmp(b.sku_id()));
        Ok(levels)
    }

    async fn find_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<InventoryReservation>> {
        Ok(self
            .tables
            .read()
            .await
            .reservations
            .get(&reservation_id)
            .cloned())
    }

    async fn find_reservations_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<InventoryReservation>> {
        let tables = self.tables.read().await;
        let reservations = tables
            .reservations
            .values()
            .filter(|r| r.order_id() == order_id)
            .cloned()
            .collect();
        Ok(sorted_by_reserved_at(reservations))
    }

    async fn find_reservations_for_sku(
        &self,
        sku_id: &SkuId,
    ) -> Result<Vec<InventoryReservation>> {
        let tables = self.tables.read().await;
        let reservations = tables
            .reservations
            .values()
            .filter(|r| r.sku_id() == sku_id)
            .cloned()
            .collect();
        Ok(sorted_by_reserved_at(reservations))
    }

    async fn find_expired_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<InventoryReservation>> {
        let tables = self.tables.read().await;
        let reservations = tables
            .reservations
            .values()
            .filter(|r| r.is_expired_at(now))
            .cloned()
            .collect();
        Ok(sorted_by_reserved_at(reservations))
    }

    async fn commit(&self, entry: &LedgerEntry) -> Result<CommittedVersions> {
        self.check_commit_faults()?;

        let mut tables = self.tables.write().await;

        // Both checks run before either write.
        let stored_level = tables.levels.get(entry.level.sku_id()).map(|l| l.version());
        let level_version = next_version(&entry.level, stored_level)?;
        let stored_reservation = tables
            .reservations
            .get(&entry.reservation.id())
            .map(|r| r.version());
        let reservation_version = next_version(&entry.reservation, stored_reservation)?;

        let mut level = entry.level.clone();
        level.set_version(level_version);
        let mut reservation = entry.reservation.clone();
        reservation.set_version(reservation_version);

        tables.levels.insert(level.sku_id().clone(), level);
        tables.reservations.insert(reservation.id(), reservation);

        Ok(CommittedVersions {
            level: level_version,
            reservation: reservation_version,
        })
    }
}

/// In-memory event sink that records every published envelope.
#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<RwLock<Vec<EventEnvelope>>>,
    fail_on_publish: Arc<AtomicBool>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every publish fail until switched off.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    /// Returns all published envelopes in publish order.
    pub async fn events(&self) -> Vec<EventEnvelope> {
        self.events.read().await.clone()
    }

    /// Returns the published event types in publish order.
    pub async fn event_types(&self) -> Vec<String> {
        self.events
            .read()
            .await
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(&self, envelope: EventEnvelope) -> Result<()> {
        if self.fail_on_publish.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("sink offline".to_string()));
        }
        self.events.write().await.push(envelope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{CustomerId, OrderItemId};
    use domain::inventory::transitions;

    fn reserve_entry(level: &InventoryLevel, quantity: u32, ttl: Option<Duration>) -> LedgerEntry {
        transitions::reserve(
            level,
            OrderId::new(),
            OrderItemId::new(),
            quantity,
            ttl,
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn save_and_find_order() {
        let store = InMemoryStore::new();
        let order = Order::new(CustomerId::new(), "USD");

        let version = store.save_order(&order).await.unwrap();
        assert_eq!(version, Version::first());

        let found = store.find_order(order.id()).await.unwrap().unwrap();
        assert_eq!(found.version(), Version::first());
        assert_eq!(found.customer_id(), order.customer_id());
    }

    #[tokio::test]
    async fn stale_order_save_conflicts() {
        let store = InMemoryStore::new();
        let order = Order::new(CustomerId::new(), "USD");
        store.save_order(&order).await.unwrap();

        // Still at version 0.
        let result = store.save_order(&order).await;
        assert!(matches!(result, Err(StoreError::ConcurrencyConflict { .. })));
    }

    #[tokio::test]
    async fn missing_order_is_none() {
        let store = InMemoryStore::new();
        assert!(store.find_order(OrderId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_writes_level_and_reservation_together() {
        let store = InMemoryStore::new();
        let level = InventoryLevel::new("SKU-001", 10);
        let v = store.save_level(&level).await.unwrap();
        let mut level = level;
        level.set_version(v);

        let entry = reserve_entry(&level, 4, None);
        let versions = store.commit(&entry).await.unwrap();
        assert_eq!(versions.level, Version::new(2));
        assert_eq!(versions.reservation, Version::first());

        let stored = store.find_level(&SkuId::new("SKU-001")).await.unwrap().unwrap();
        assert_eq!(stored.reserved(), 4);
        let reservation = store
            .find_reservation(entry.reservation.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reservation.quantity(), 4);
    }

    #[tokio::test]
    async fn commit_with_stale_level_writes_nothing() {
        let store = InMemoryStore::new();
        let level = InventoryLevel::new("SKU-001", 10);
        store.save_level(&level).await.unwrap();

        // `level` is still at version 0 while the store holds version 1.
        let entry = reserve_entry(&level, 4, None);
        let result = store.commit(&entry).await;
        assert!(matches!(result, Err(StoreError::ConcurrencyConflict { .. })));
        assert_eq!(store.reservation_count().await, 0);
    }

    #[tokio::test]
    async fn expired_reservations_are_found() {
        let store = InMemoryStore::new();
        let mut level = InventoryLevel::new("SKU-001", 10);
        level.set_version(store.save_level(&level).await.unwrap());

        let short = reserve_entry(&level, 1, Some(Duration::seconds(1)));
        let versions = store.commit(&short).await.unwrap();
        level = short.level.clone();
        level.set_version(versions.level);

        let never = reserve_entry(&level, 1, None);
        store.commit(&never).await.unwrap();

        let later = Utc::now() + Duration::minutes(5);
        let expired = store.find_expired_reservations(later).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id(), short.reservation.id());
    }

    #[tokio::test]
    async fn commit_budget_fails_after_limit() {
        let store = InMemoryStore::new();
        store.fail_commits_after(0);
        let level = InventoryLevel::new("SKU-001", 10);
        let entry = reserve_entry(&level, 1, None);

        assert!(matches!(
            store.commit(&entry).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn sink_records_and_fails_on_demand() {
        let sink = InMemoryEventSink::new();
        sink.publish(EventEnvelope::new("OrderCreated", "Order", "o-1"))
            .await
            .unwrap();

        sink.set_fail_on_publish(true);
        assert!(
            sink.publish(EventEnvelope::new("OrderSubmitted", "Order", "o-1"))
                .await
                .is_err()
        );

        assert_eq!(sink.event_types().await, vec!["OrderCreated".to_string()]);
    }
}
