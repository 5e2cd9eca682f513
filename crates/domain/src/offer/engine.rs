//! Full-recompute offer engine.

use std::sync::Arc;

use common::{Money, OfferId};

use crate::order::{Order, OrderAdjustment, OrderItem};

use super::{AdjustmentScope, Discount, Offer, OfferError};

/// Decides whether an item-scoped offer targets an item.
pub trait ItemEligibility: Send + Sync {
    fn is_eligible(&self, offer: &Offer, item: &OrderItem) -> bool;
}

/// Matches items against the offer's SKU and product lists.
///
/// An offer without criteria targets every item.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetCriteriaEligibility;

impl ItemEligibility for TargetCriteriaEligibility {
    fn is_eligible(&self, offer: &Offer, item: &OrderItem) -> bool {
        let target = &offer.target;
        target.is_empty()
            || target.skus.iter().any(|sku| sku == item.sku_id())
            || target.products.iter().any(|p| p == item.product_id())
    }
}

/// Outcome of one recompute pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecomputeSummary {
    /// Offers that produced a non-zero discount, in application order.
    pub applied: Vec<OfferId>,
    /// Total discount across order and item adjustments.
    pub discount_total: Money,
}

/// Evaluates offers against an order and rewrites its adjustments.
///
/// Every pass starts from a clean slate: adjustments are cleared and item
/// prices reset to their base before any offer is applied. Running the same
/// offers twice therefore yields the same totals.
#[derive(Clone)]
pub struct OfferEngine {
    eligibility: Arc<dyn ItemEligibility>,
}

impl Default for OfferEngine {
    fn default() -> Self {
        Self::new(Arc::new(TargetCriteriaEligibility))
    }
}

impl std::fmt::Debug for OfferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfferEngine").finish_non_exhaustive()
    }
}

impl OfferEngine {
    pub fn new(eligibility: Arc<dyn ItemEligibility>) -> Self {
        Self { eligibility }
    }

    /// Recomputes every adjustment and total on the order.
    ///
    /// `offers` is the active offer listing; only automatically added,
    /// unarchived ones are considered. `coupon` is the offer matching the
    /// order's coupon code, if any. An archived coupon fails before the order
    /// is touched.
    pub fn recompute(
        &self,
        order: &mut Order,
        offers: &[Offer],
        coupon: Option<&Offer>,
    ) -> Result<RecomputeSummary, OfferError> {
        if let Some(coupon) = coupon {
            if coupon.archived {
                let code = coupon
                    .coupon_code
                    .clone()
                    .unwrap_or_else(|| coupon.name.clone());
                return Err(OfferError::CouponArchived(code));
            }
        }

        order.clear_adjustments();
        for item in order.items_mut() {
            item.reset_price();
        }

        let candidates = Self::candidates(offers, coupon);
        let mut summary = RecomputeSummary::default();
        let mut order_discounts = Money::zero();

        for offer in candidates {
            if !offer.combinable && !summary.applied.is_empty() {
                tracing::debug!(offer = %offer.name, "skipping non-combinable offer");
                continue;
            }

            let running = order.items_subtotal() - order_discounts;
            if !offer.meets_minimum(running) {
                tracing::debug!(offer = %offer.name, subtotal = %running, "below offer minimum");
                continue;
            }

            let applied = match offer.scope {
                AdjustmentScope::Order => Self::apply_to_order(order, offer, running),
                AdjustmentScope::Item => self.apply_to_items(order, offer, running),
            };
            if applied.is_zero() {
                continue;
            }

            if offer.scope == AdjustmentScope::Order {
                order_discounts += applied;
            }
            summary.applied.push(offer.id);
            summary.discount_total += applied;

            if !offer.combinable {
                break;
            }
        }

        order.recompute_totals();
        Ok(summary)
    }

    /// Automatic offers plus the coupon, deduplicated and ordered by priority.
    fn candidates<'a>(offers: &'a [Offer], coupon: Option<&'a Offer>) -> Vec<&'a Offer> {
        let mut candidates: Vec<&Offer> = offers
            .iter()
            .filter(|o| o.automatically_added && !o.archived)
            .chain(coupon)
            .collect();
        candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));
        candidates.dedup_by_key(|o| o.id);
        candidates
    }

    fn apply_to_order(order: &mut Order, offer: &Offer, running: Money) -> Money {
        let raw = match offer.discount {
            Discount::PercentOff(rate) => rate.of(running),
            Discount::AmountOff(amount) => amount,
        };
        let value = cap(raw.non_negative(), offer.max_discount).min(running.non_negative());
        if value.is_zero() {
            return value;
        }

        order.push_adjustment(OrderAdjustment {
            offer_id: offer.id,
            offer_name: offer.name.clone(),
            value,
        });
        value
    }

    /// Discounts each eligible unit. The offer's cap and the running subtotal
    /// bound the total across all lines.
    fn apply_to_items(&self, order: &mut Order, offer: &Offer, running: Money) -> Money {
        let mut remaining = cap(running.non_negative(), offer.max_discount);
        let mut total = Money::zero();

        for item in order.items_mut() {
            if !self.eligibility.is_eligible(offer, item) {
                continue;
            }
            let quantity = item.quantity();
            if quantity == 0 {
                continue;
            }

            let mut unit = match offer.discount {
                Discount::PercentOff(rate) => rate.of(item.price()),
                Discount::AmountOff(amount) => amount,
            };
            unit = unit.min(Money::from_cents(remaining.cents() / i64::from(quantity)));

            let applied = item.apply_adjustment(offer.id, &offer.name, unit);
            let line = applied.saturating_mul(quantity);
            total += line;
            remaining -= line;
        }

        total
    }
}

fn cap(value: Money, max: Option<Money>) -> Money {
    match max {
        Some(max) => value.min(max.non_negative()),
        None => value,
    }
}
