//! Inventory ledger: reservation lifecycle bound to counter mutations.

use chrono::{DateTime, Utc};
use common::{OrderId, OrderItemId, ReservationId, SkuId};
use domain::inventory::transitions;
use domain::{Aggregate, InventoryError, InventoryLevel, InventoryReservation, LedgerEntry};
use serde::Serialize;
use store::InventoryStore;
use tokio::sync::OwnedMutexGuard;

use crate::config::LedgerConfig;
use crate::error::{CheckoutError, Result};
use crate::events::{CheckoutEvent, EventPublisher};
use crate::locks::KeyedLocks;

/// Result of releasing a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The reservation was open and is now released.
    Released(InventoryReservation),
    /// The reservation had already reached a terminal status; nothing changed.
    AlreadyClosed(InventoryReservation),
}

impl ReleaseOutcome {
    pub fn reservation(&self) -> &InventoryReservation {
        match self {
            ReleaseOutcome::Released(r) | ReleaseOutcome::AlreadyClosed(r) => r,
        }
    }

    pub fn was_released(&self) -> bool {
        matches!(self, ReleaseOutcome::Released(_))
    }
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Reservations moved to EXPIRED by this pass.
    pub expired: usize,
    /// Candidates that were no longer expirable when re-read under the lock.
    pub skipped: usize,
    /// Candidates whose expiry failed; left for the next pass.
    pub failed: usize,
}

/// Counter drift found on one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterDrift {
    pub sku_id: SkuId,
    pub reserved_counter: i64,
    pub reserved_records: i64,
    pub allocated_counter: i64,
    pub allocated_records: i64,
    pub repaired: bool,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub drifted: Vec<CounterDrift>,
    pub failed: usize,
}

/// Owns the per-SKU counters and reservation records.
///
/// Every reservation transition is committed together with its counter
/// mutation. Operations on one SKU run under that SKU's lock, and the store
/// rejects any commit whose level or reservation version moved underneath.
pub struct InventoryLedger<S> {
    store: S,
    locks: KeyedLocks<SkuId>,
    config: LedgerConfig,
    events: EventPublisher,
}

impl<S: InventoryStore> InventoryLedger<S> {
    pub fn new(store: S, config: LedgerConfig, events: EventPublisher) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            config,
            events,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // Level operations

    /// Persists a new level. Fails with `Conflict` if the SKU already has one.
    #[tracing::instrument(skip(self, level), fields(sku_id = %level.sku_id()))]
    pub async fn create_level(&self, mut level: InventoryLevel) -> Result<InventoryLevel> {
        let _guard = self.locks.lock(level.sku_id()).await;
        let version = self.store.save_level(&level).await?;
        level.set_version(version);
        tracing::info!(on_hand = level.on_hand(), "inventory level created");
        Ok(level)
    }

    /// Returns the level for a SKU.
    pub async fn level(&self, sku_id: &SkuId) -> Result<InventoryLevel> {
        self.store
            .find_level(sku_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Inventory level", sku_id))
    }

    /// Receives stock, creating the level when the SKU has none yet.
    #[tracing::instrument(skip(self))]
    pub async fn receive_stock(&self, sku_id: &SkuId, quantity: u32) -> Result<InventoryLevel> {
        let _guard = self.locks.lock(sku_id).await;
        let mut level = match self.store.find_level(sku_id).await? {
            Some(level) => level,
            None => InventoryLevel::new(sku_id.clone(), 0),
        };
        level.increment(quantity)?;
        self.save_level(level).await
    }

    /// Reconciles on-hand to a physical count.
    #[tracing::instrument(skip(self))]
    pub async fn record_count(&self, sku_id: &SkuId, counted: u32) -> Result<InventoryLevel> {
        self.update_level(sku_id, |level| {
            level.record_count(counted);
            Ok(())
        })
        .await
    }

    /// Records stock on its way from a supplier.
    #[tracing::instrument(skip(self))]
    pub async fn mark_in_transit(&self, sku_id: &SkuId, quantity: u32) -> Result<InventoryLevel> {
        self.update_level(sku_id, |level| level.mark_in_transit(quantity))
            .await
    }

    pub async fn needs_reorder(&self, sku_id: &SkuId) -> Result<bool> {
        Ok(self.level(sku_id).await?.needs_reorder())
    }

    pub async fn below_safety_stock(&self, sku_id: &SkuId) -> Result<bool> {
        Ok(self.level(sku_id).await?.below_safety_stock())
    }

    /// Levels at or under their reorder point, ordered by SKU.
    pub async fn reorder_candidates(&self) -> Result<Vec<InventoryLevel>> {
        let levels = self.store.list_levels().await?;
        Ok(levels.into_iter().filter(|l| l.needs_reorder()).collect())
    }

    // Reservation lifecycle

    pub async fn reservation(&self, reservation_id: ReservationId) -> Result<InventoryReservation> {
        self.store
            .find_reservation(reservation_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Reservation", reservation_id))
    }

    pub async fn reservations_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<InventoryReservation>> {
        Ok(self.store.find_reservations_for_order(order_id).await?)
    }

    /// Reserves stock for an order item and records the pending reservation.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        sku_id: &SkuId,
        order_id: OrderId,
        order_item_id: OrderItemId,
        quantity: u32,
    ) -> Result<InventoryReservation> {
        let entry = {
            let _guard = self.locks.lock(sku_id).await;
            let level = self.load_level(sku_id).await?;
            let entry = transitions::reserve(
                &level,
                order_id,
                order_item_id,
                quantity,
                self.config.reservation_ttl,
                Utc::now(),
            )?;
            self.commit(entry).await?
        };

        metrics::counter!("inventory_reservations_total").increment(1);
        tracing::info!(
            reservation_id = %entry.reservation.id(),
            available = entry.level.available(),
            backordered = entry.level.backordered(),
            "inventory reserved"
        );
        self.events
            .publish(CheckoutEvent::InventoryReserved((&entry.reservation).into()))
            .await;
        Ok(entry.reservation)
    }

    /// PENDING → CONFIRMED, restarting the expiry clock with the confirmed TTL.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(&self, reservation_id: ReservationId) -> Result<InventoryReservation> {
        let ttl = self.config.confirmed_ttl;
        let entry = self
            .transition(reservation_id, |level, reservation| {
                transitions::confirm(level, reservation, ttl, Utc::now())
            })
            .await?;
        Ok(entry.reservation)
    }

    /// CONFIRMED → PENDING with the expiry the pending hold had before.
    #[tracing::instrument(skip(self))]
    pub async fn unconfirm(
        &self,
        reservation_id: ReservationId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<InventoryReservation> {
        let entry = self
            .transition(reservation_id, |level, reservation| {
                transitions::unconfirm(level, reservation, expires_at)
            })
            .await?;
        Ok(entry.reservation)
    }

    /// Moves the expiry of an open reservation. `None` makes it never expire.
    #[tracing::instrument(skip(self))]
    pub async fn extend(
        &self,
        reservation_id: ReservationId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<InventoryReservation> {
        let entry = self
            .transition(reservation_id, |level, reservation| {
                let mut reservation = reservation.clone();
                reservation.extend(expires_at)?;
                Ok(LedgerEntry {
                    level: level.clone(),
                    reservation,
                })
            })
            .await?;
        Ok(entry.reservation)
    }

    /// Changes the quantity held by an open reservation.
    #[tracing::instrument(skip(self))]
    pub async fn adjust(
        &self,
        reservation_id: ReservationId,
        quantity: u32,
    ) -> Result<InventoryReservation> {
        let entry = self
            .transition(reservation_id, |level, reservation| {
                transitions::adjust(level, reservation, quantity)
            })
            .await?;
        Ok(entry.reservation)
    }

    /// CONFIRMED → ALLOCATED.
    #[tracing::instrument(skip(self))]
    pub async fn allocate(&self, reservation_id: ReservationId) -> Result<InventoryReservation> {
        let entry = self
            .transition(reservation_id, |level, reservation| {
                transitions::allocate(level, reservation, Utc::now())
            })
            .await?;
        Ok(entry.reservation)
    }

    /// ALLOCATED → CONFIRMED.
    #[tracing::instrument(skip(self))]
    pub async fn deallocate(&self, reservation_id: ReservationId) -> Result<InventoryReservation> {
        let entry = self
            .transition(reservation_id, transitions::deallocate)
            .await?;
        Ok(entry.reservation)
    }

    /// Ships the reserved stock: CONFIRMED or ALLOCATED → FULFILLED.
    #[tracing::instrument(skip(self))]
    pub async fn fulfill(&self, reservation_id: ReservationId) -> Result<InventoryReservation> {
        let entry = self
            .transition(reservation_id, |level, reservation| {
                transitions::fulfill(level, reservation, Utc::now())
            })
            .await?;
        tracing::info!(on_hand = entry.level.on_hand(), "reservation fulfilled");
        Ok(entry.reservation)
    }

    /// Releases an open reservation.
    ///
    /// The status is re-read under the SKU lock: a reservation that already
    /// reached a terminal status is reported as `AlreadyClosed` and left alone.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, reservation_id: ReservationId) -> Result<ReleaseOutcome> {
        let entry = {
            let (_guard, level, reservation) = self.lock_reservation(reservation_id).await?;
            if reservation.status().is_terminal() {
                tracing::debug!(status = %reservation.status(), "reservation already closed");
                return Ok(ReleaseOutcome::AlreadyClosed(reservation));
            }
            let entry = transitions::release(&level, &reservation, Utc::now())?;
            self.commit(entry).await?
        };

        metrics::counter!("inventory_releases_total").increment(1);
        tracing::info!(available = entry.level.available(), "inventory released");
        self.events
            .publish(CheckoutEvent::InventoryReleased((&entry.reservation).into()))
            .await;
        Ok(ReleaseOutcome::Released(entry.reservation))
    }

    // Sweeps

    /// Expires every open reservation whose expiry is at or before `now`.
    ///
    /// Each candidate is handled on its own: one failure is logged and counted
    /// without stopping the pass. Running the sweep twice expires nothing the
    /// second time.
    #[tracing::instrument(skip(self))]
    pub async fn expire_reservations(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let start = std::time::Instant::now();
        let candidates = self.store.find_expired_reservations(now).await?;
        let mut report = SweepReport::default();

        for candidate in candidates {
            match self.expire_one(&candidate, now).await {
                Ok(Some(reservation)) => {
                    report.expired += 1;
                    self.events
                        .publish(CheckoutEvent::ReservationExpired((&reservation).into()))
                        .await;
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        reservation_id = %candidate.id(),
                        error = %e,
                        "failed to expire reservation"
                    );
                }
            }
        }

        metrics::counter!("inventory_reservations_expired_total").increment(report.expired as u64);
        metrics::histogram!("inventory_sweep_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        if report.expired > 0 || report.failed > 0 {
            tracing::info!(
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    async fn expire_one(
        &self,
        candidate: &InventoryReservation,
        now: DateTime<Utc>,
    ) -> Result<Option<InventoryReservation>> {
        let _guard = self.locks.lock(candidate.sku_id()).await;

        let Some(reservation) = self.store.find_reservation(candidate.id()).await? else {
            return Ok(None);
        };
        // Released, fulfilled or extended since the candidate query ran.
        if !reservation.is_expired_at(now) {
            return Ok(None);
        }

        let level = self.load_level(reservation.sku_id()).await?;
        let entry = self
            .commit(transitions::expire(&level, &reservation, now)?)
            .await?;
        Ok(Some(entry.reservation))
    }

    /// Compares every level's reserved/allocated counters with its reservation
    /// records. With `repair` the counters are rewritten to match the records.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, repair: bool) -> Result<ReconcileReport> {
        let levels = self.store.list_levels().await?;
        let mut report = ReconcileReport::default();

        for level in levels {
            report.checked += 1;
            match self.reconcile_level(level.sku_id(), repair).await {
                Ok(Some(drift)) => report.drifted.push(drift),
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(sku_id = %level.sku_id(), error = %e, "failed to reconcile level");
                }
            }
        }
        Ok(report)
    }

    async fn reconcile_level(&self, sku_id: &SkuId, repair: bool) -> Result<Option<CounterDrift>> {
        let _guard = self.locks.lock(sku_id).await;
        let mut level = self.load_level(sku_id).await?;
        let reservations = self.store.find_reservations_for_sku(sku_id).await?;

        let held = |pred: fn(&InventoryReservation) -> bool| -> i64 {
            reservations
                .iter()
                .filter(|r| pred(r))
                .map(|r| i64::from(r.quantity()))
                .sum()
        };
        let reserved_records = held(|r| r.status().holds_reserved());
        let allocated_records = held(|r| r.status().holds_allocated());

        if level.reserved() == reserved_records && level.allocated() == allocated_records {
            return Ok(None);
        }

        let mut drift = CounterDrift {
            sku_id: sku_id.clone(),
            reserved_counter: level.reserved(),
            reserved_records,
            allocated_counter: level.allocated(),
            allocated_records,
            repaired: false,
        };
        metrics::counter!("inventory_reconciliation_drift_total").increment(1);
        tracing::warn!(
            %sku_id,
            reserved_counter = drift.reserved_counter,
            reserved_records,
            allocated_counter = drift.allocated_counter,
            allocated_records,
            "inventory counters drifted from reservation records"
        );

        if repair {
            level.rebalance(
                reserved_records.unsigned_abs(),
                allocated_records.unsigned_abs(),
            );
            self.store.save_level(&level).await?;
            drift.repaired = true;
            tracing::info!(%sku_id, "inventory counters repaired");
        }
        Ok(Some(drift))
    }

    // Helpers

    async fn load_level(&self, sku_id: &SkuId) -> Result<InventoryLevel> {
        self.level(sku_id).await
    }

    async fn save_level(&self, mut level: InventoryLevel) -> Result<InventoryLevel> {
        let version = self.store.save_level(&level).await?;
        level.set_version(version);
        Ok(level)
    }

    async fn update_level<F>(&self, sku_id: &SkuId, apply: F) -> Result<InventoryLevel>
    where
        F: FnOnce(&mut InventoryLevel) -> std::result::Result<(), InventoryError>,
    {
        let _guard = self.locks.lock(sku_id).await;
        let mut level = self.load_level(sku_id).await?;
        apply(&mut level)?;
        self.save_level(level).await
    }

    /// Locks the reservation's SKU and re-reads both records under the lock.
    async fn lock_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<(OwnedMutexGuard<()>, InventoryLevel, InventoryReservation)> {
        let sku_id = self.reservation(reservation_id).await?.sku_id().clone();
        let guard = self.locks.lock(&sku_id).await;
        let reservation = self.reservation(reservation_id).await?;
        let level = self.load_level(&sku_id).await?;
        Ok((guard, level, reservation))
    }

    async fn transition<F>(&self, reservation_id: ReservationId, apply: F) -> Result<LedgerEntry>
    where
        F: FnOnce(
            &InventoryLevel,
            &InventoryReservation,
        ) -> std::result::Result<LedgerEntry, InventoryError>,
    {
        let (_guard, level, reservation) = self.lock_reservation(reservation_id).await?;
        let entry = apply(&level, &reservation)?;
        self.commit(entry).await
    }

    async fn commit(&self, mut entry: LedgerEntry) -> Result<LedgerEntry> {
        let versions = self.store.commit(&entry).await?;
        entry.level.set_version(versions.level);
        entry.reservation.set_version(versions.reservation);
        Ok(entry)
    }
}
