//! Per-SKU inventory counters.

use chrono::{DateTime, Utc};
use common::{SkuId, Version};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::InventoryError;

/// Stock counters for one SKU.
///
/// Every operation validates before it mutates, so a failed call leaves the
/// counters untouched. After every operation
/// `on_hand + backordered == available + reserved + allocated`; `available`
/// never goes negative, a deficit is carried in `backordered` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLevel {
    sku_id: SkuId,
    warehouse: Option<String>,

    #[serde(default)]
    version: Version,

    on_hand: i64,
    available: i64,
    reserved: i64,
    allocated: i64,
    backordered: i64,
    in_transit: i64,

    reorder_point: i64,
    reorder_quantity: i64,
    safety_stock: i64,
    allow_backorder: bool,
    allow_preorder: bool,

    updated_at: DateTime<Utc>,
}

impl Aggregate for InventoryLevel {
    type Id = SkuId;

    fn aggregate_type() -> &'static str {
        "InventoryLevel"
    }

    fn id(&self) -> SkuId {
        self.sku_id.clone()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

impl InventoryLevel {
    /// Creates a level for a SKU receiving its first stock.
    pub fn new(sku_id: impl Into<SkuId>, on_hand: u32) -> Self {
        Self {
            sku_id: sku_id.into(),
            warehouse: None,
            version: Version::initial(),
            on_hand: i64::from(on_hand),
            available: i64::from(on_hand),
            reserved: 0,
            allocated: 0,
            backordered: 0,
            in_transit: 0,
            reorder_point: 0,
            reorder_quantity: 0,
            safety_stock: 0,
            allow_backorder: false,
            allow_preorder: false,
            updated_at: Utc::now(),
        }
    }

    pub fn with_backorder(mut self, allow: bool) -> Self {
        self.allow_backorder = allow;
        self
    }

    pub fn with_preorder(mut self, allow: bool) -> Self {
        self.allow_preorder = allow;
        self
    }

    pub fn with_reorder(mut self, point: u32, quantity: u32) -> Self {
        self.reorder_point = i64::from(point);
        self.reorder_quantity = i64::from(quantity);
        self
    }

    pub fn with_safety_stock(mut self, safety_stock: u32) -> Self {
        self.safety_stock = i64::from(safety_stock);
        self
    }

    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }
}

// Query methods
impl InventoryLevel {
    pub fn sku_id(&self) -> &SkuId {
        &self.sku_id
    }

    pub fn warehouse(&self) -> Option<&str> {
        self.warehouse.as_deref()
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    pub fn available(&self) -> i64 {
        self.available
    }

    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    pub fn allocated(&self) -> i64 {
        self.allocated
    }

    pub fn backordered(&self) -> i64 {
        self.backordered
    }

    pub fn in_transit(&self) -> i64 {
        self.in_transit
    }

    pub fn reorder_point(&self) -> i64 {
        self.reorder_point
    }

    pub fn reorder_quantity(&self) -> i64 {
        self.reorder_quantity
    }

    pub fn safety_stock(&self) -> i64 {
        self.safety_stock
    }

    pub fn allows_backorder(&self) -> bool {
        self.allow_backorder
    }

    pub fn allows_preorder(&self) -> bool {
        self.allow_preorder
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// True iff a reorder point is set and on-hand plus in-transit stock has fallen to it.
    pub fn needs_reorder(&self) -> bool {
        self.reorder_point > 0 && self.on_hand + self.in_transit <= self.reorder_point
    }

    /// True iff available stock is below the configured safety stock.
    pub fn below_safety_stock(&self) -> bool {
        self.available < self.safety_stock
    }

    /// Checks the conservation invariant.
    pub fn is_balanced(&self) -> bool {
        self.available >= 0
            && self.backordered >= 0
            && self.on_hand + self.backordered == self.available + self.reserved + self.allocated
    }
}

// Counter operations
impl InventoryLevel {
    /// Moves `quantity` from available to reserved.
    ///
    /// With backorder or preorder allowed this always succeeds and the
    /// shortfall is tracked as backordered.
    pub fn reserve(&mut self, quantity: u32) -> Result<(), InventoryError> {
        let qty = Self::positive(quantity)?;

        if !(self.allow_backorder || self.allow_preorder) && self.available < qty {
            return Err(InventoryError::InsufficientInventory {
                sku_id: self.sku_id.clone(),
                requested: quantity,
                available: self.available,
            });
        }

        self.reserved += qty;
        self.shift_available(-qty);
        self.touch();
        Ok(())
    }

    /// Moves `quantity` from reserved back to available, settling backorders first.
    pub fn release(&mut self, quantity: u32) -> Result<(), InventoryError> {
        let qty = Self::positive(quantity)?;
        self.require_reserved(quantity)?;

        self.reserved -= qty;
        self.shift_available(qty);
        self.touch();
        Ok(())
    }

    /// Moves `quantity` from reserved to allocated.
    pub fn allocate(&mut self, quantity: u32) -> Result<(), InventoryError> {
        let qty = Self::positive(quantity)?;
        self.require_reserved(quantity)?;

        self.reserved -= qty;
        self.allocated += qty;
        self.touch();
        Ok(())
    }

    /// Moves `quantity` from allocated back to reserved.
    pub fn deallocate(&mut self, quantity: u32) -> Result<(), InventoryError> {
        let qty = Self::positive(quantity)?;
        self.require_allocated(quantity)?;

        self.allocated -= qty;
        self.reserved += qty;
        self.touch();
        Ok(())
    }

    /// Ships `quantity` allocated units; physical stock leaves.
    pub fn decrement(&mut self, quantity: u32) -> Result<(), InventoryError> {
        let qty = Self::positive(quantity)?;
        self.require_allocated(quantity)?;

        self.allocated -= qty;
        self.on_hand -= qty;
        self.touch();
        Ok(())
    }

    /// Receives `quantity` units of stock.
    ///
    /// Outstanding backorders are settled first, and in-transit stock is
    /// consumed up to the received amount.
    pub fn increment(&mut self, quantity: u32) -> Result<(), InventoryError> {
        let qty = Self::positive(quantity)?;

        self.on_hand += qty;
        self.in_transit -= qty.min(self.in_transit);
        self.shift_available(qty);
        self.touch();
        Ok(())
    }

    /// Reconciles on-hand to a physical count. The delta lands on available.
    pub fn record_count(&mut self, counted: u32) {
        let counted = i64::from(counted);
        let delta = counted - self.on_hand;

        self.on_hand = counted;
        self.shift_available(delta);
        self.touch();
    }

    /// Records stock ordered from a supplier but not yet received.
    pub fn mark_in_transit(&mut self, quantity: u32) -> Result<(), InventoryError> {
        let qty = Self::positive(quantity)?;
        self.in_transit += qty;
        self.touch();
        Ok(())
    }

    /// Overwrites the reserved and allocated counters with reconciled values,
    /// moving the difference through available/backordered.
    pub fn rebalance(&mut self, reserved: u64, allocated: u64) {
        let reserved = i64::try_from(reserved).unwrap_or(i64::MAX);
        let allocated = i64::try_from(allocated).unwrap_or(i64::MAX);
        let delta = (self.reserved + self.allocated) - (reserved + allocated);

        self.reserved = reserved;
        self.allocated = allocated;
        self.shift_available(delta);
        self.touch();
    }

    /// Applies a signed change to available. Incoming units settle backorders
    /// first; a shortfall moves into backordered instead of going negative.
    fn shift_available(&mut self, delta: i64) {
        if delta >= 0 {
            let covered = delta.min(self.backordered);
            self.backordered -= covered;
            self.available += delta - covered;
        } else {
            self.available += delta;
            if self.available < 0 {
                self.backordered += -self.available;
                self.available = 0;
            }
        }
    }

    fn require_reserved(&self, quantity: u32) -> Result<(), InventoryError> {
        if self.reserved < i64::from(quantity) {
            return Err(InventoryError::InsufficientReserved {
                sku_id: self.sku_id.clone(),
                requested: quantity,
                reserved: self.reserved,
            });
        }
        Ok(())
    }

    fn require_allocated(&self, quantity: u32) -> Result<(), InventoryError> {
        if self.allocated < i64::from(quantity) {
            return Err(InventoryError::InsufficientAllocated {
                sku_id: self.sku_id.clone(),
                requested: quantity,
                allocated: self.allocated,
            });
        }
        Ok(())
    }

    fn positive(quantity: u32) -> Result<i64, InventoryError> {
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity { quantity });
        }
        Ok(i64::from(quantity))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(on_hand: u32) -> InventoryLevel {
        InventoryLevel::new("SKU-001", on_hand)
    }

    #[test]
    fn test_reserve_moves_available_to_reserved() {
        let mut level = level(10);
        level.reserve(6).unwrap();

        assert_eq!(level.available(), 4);
        assert_eq!(level.reserved(), 6);
        assert!(level.is_balanced());
    }

    #[test]
    fn test_reserve_beyond_available_fails_without_backorder() {
        let mut level = level(10);
        level.reserve(6).unwrap();
        let before = level.clone();

        let result = level.reserve(6);
        assert!(matches!(
            result,
            Err(InventoryError::InsufficientInventory {
                requested: 6,
                available: 4,
                ..
            })
        ));
        assert_eq!(level, before);
    }

    #[test]
    fn test_reserve_with_backorder_tracks_deficit() {
        let mut level = level(2).with_backorder(true);
        level.reserve(5).unwrap();

        assert_eq!(level.available(), 0);
        assert_eq!(level.reserved(), 5);
        assert_eq!(level.backordered(), 3);
        assert!(level.is_balanced());
    }

    #[test]
    fn test_preorder_also_skips_availability_check() {
        let mut level = level(0).with_preorder(true);
        level.reserve(1).unwrap();
        assert_eq!(level.backordered(), 1);
    }

    #[test]
    fn test_zero_quantity_is_rejected() {
        let mut level = level(5);
        assert!(matches!(
            level.reserve(0),
            Err(InventoryError::InvalidQuantity { quantity: 0 })
        ));
        assert!(level.increment(0).is_err());
        assert_eq!(level.available(), 5);
    }

    #[test]
    fn test_release_requires_reserved() {
        let mut level = level(5);
        level.reserve(2).unwrap();
        assert!(matches!(
            level.release(3),
            Err(InventoryError::InsufficientReserved { .. })
        ));

        level.release(2).unwrap();
        assert_eq!(level.available(), 5);
        assert_eq!(level.reserved(), 0);
    }

    #[test]
    fn test_release_settles_backorder_first() {
        let mut level = level(1).with_backorder(true);
        level.reserve(3).unwrap();
        assert_eq!(level.backordered(), 2);

        level.release(3).unwrap();
        assert_eq!(level.backordered(), 0);
        assert_eq!(level.available(), 1);
        assert!(level.is_balanced());
    }

    #[test]
    fn test_allocate_then_decrement_ships_stock() {
        let mut level = level(10);
        level.reserve(4).unwrap();
        level.allocate(4).unwrap();
        assert_eq!(level.reserved(), 0);
        assert_eq!(level.allocated(), 4);

        level.decrement(4).unwrap();
        assert_eq!(level.allocated(), 0);
        assert_eq!(level.on_hand(), 6);
        assert_eq!(level.available(), 6);
        assert!(level.is_balanced());
    }

    #[test]
    fn test_decrement_requires_allocated() {
        let mut level = level(10);
        level.reserve(4).unwrap();
        assert!(matches!(
            level.decrement(1),
            Err(InventoryError::InsufficientAllocated { .. })
        ));
        assert_eq!(level.on_hand(), 10);
    }

    #[test]
    fn test_deallocate_returns_to_reserved() {
        let mut level = level(10);
        level.reserve(3).unwrap();
        level.allocate(3).unwrap();
        level.deallocate(2).unwrap();
        assert_eq!(level.allocated(), 1);
        assert_eq!(level.reserved(), 2);
    }

    #[test]
    fn test_increment_settles_backorder_and_in_transit() {
        let mut level = level(0).with_backorder(true);
        level.mark_in_transit(10).unwrap();
        level.reserve(4).unwrap();
        assert_eq!(level.backordered(), 4);

        level.increment(6).unwrap();
        assert_eq!(level.on_hand(), 6);
        assert_eq!(level.backordered(), 0);
        assert_eq!(level.available(), 2);
        assert_eq!(level.in_transit(), 4);
        assert!(level.is_balanced());
    }

    #[test]
    fn test_record_count_applies_delta() {
        let mut level = level(10);
        level.reserve(3).unwrap();

        level.record_count(8);
        assert_eq!(level.on_hand(), 8);
        assert_eq!(level.available(), 5);

        level.record_count(1);
        assert_eq!(level.available(), 0);
        assert_eq!(level.backordered(), 2);
        assert!(level.is_balanced());
    }

    #[test]
    fn test_needs_reorder() {
        let mut level = level(10).with_reorder(5, 20);
        assert!(!level.needs_reorder());

        level.record_count(5);
        assert!(level.needs_reorder());

        level.mark_in_transit(20).unwrap();
        assert!(!level.needs_reorder());

        assert!(!InventoryLevel::new("SKU-002", 0).needs_reorder());
    }

    #[test]
    fn test_below_safety_stock() {
        let mut level = level(10).with_safety_stock(5);
        assert!(!level.below_safety_stock());
        level.reserve(6).unwrap();
        assert!(level.below_safety_stock());
    }

    #[test]
    fn test_rebalance_preserves_conservation() {
        let mut level = level(10);
        level.reserve(4).unwrap();

        level.rebalance(1, 0);
        assert_eq!(level.reserved(), 1);
        assert_eq!(level.available(), 9);
        assert!(level.is_balanced());

        level.rebalance(12, 0);
        assert_eq!(level.available(), 0);
        assert_eq!(level.backordered(), 2);
        assert!(level.is_balanced());
    }
}
