//! Order line items and the adjustments offers attach to them.

use common::{Money, OfferId, OrderItemId, Percent, ProductId, ReservationId, SkuId};
use serde::{Deserialize, Serialize};

/// The monetary effect of one offer on the order as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAdjustment {
    pub offer_id: OfferId,
    pub offer_name: String,
    /// Amount subtracted from the order subtotal (always positive).
    pub value: Money,
}

/// The monetary effect of one offer on one line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemAdjustment {
    pub offer_id: OfferId,
    pub offer_name: String,
    /// Amount subtracted from each unit's price (always positive).
    pub value: Money,
}

/// A line item in an order.
///
/// Prices are derived: `price` is the base price minus the per-unit value of
/// every item adjustment, and `total_price` is always `price * quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    id: OrderItemId,
    sku_id: SkuId,
    product_id: ProductId,
    name: String,
    quantity: u32,
    retail_price: Money,
    sale_price: Option<Money>,
    price: Money,
    total_price: Money,
    tax_rate: Percent,
    tax_amount: Money,
    adjustments: Vec<OrderItemAdjustment>,
    reservation_id: Option<ReservationId>,
}

impl OrderItem {
    /// Creates a new line item priced at its base price.
    pub fn new(
        sku_id: impl Into<SkuId>,
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        quantity: u32,
        retail_price: Money,
        sale_price: Option<Money>,
    ) -> Self {
        let mut item = Self {
            id: OrderItemId::new(),
            sku_id: sku_id.into(),
            product_id: product_id.into(),
            name: name.into(),
            quantity,
            retail_price,
            sale_price,
            price: Money::zero(),
            total_price: Money::zero(),
            tax_rate: Percent::zero(),
            tax_amount: Money::zero(),
            adjustments: Vec::new(),
            reservation_id: None,
        };
        item.reset_price();
        item
    }

    /// Sets the tax rate captured from the catalog.
    pub fn with_tax_rate(mut self, rate: Percent) -> Self {
        self.tax_rate = rate;
        self.refresh_line();
        self
    }

    pub fn id(&self) -> OrderItemId {
        self.id
    }

    pub fn sku_id(&self) -> &SkuId {
        &self.sku_id
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn retail_price(&self) -> Money {
        self.retail_price
    }

    pub fn sale_price(&self) -> Option<Money> {
        self.sale_price
    }

    /// Current unit price after adjustments.
    pub fn price(&self) -> Money {
        self.price
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn tax_rate(&self) -> Percent {
        self.tax_rate
    }

    pub fn tax_amount(&self) -> Money {
        self.tax_amount
    }

    pub fn adjustments(&self) -> &[OrderItemAdjustment] {
        &self.adjustments
    }

    pub fn reservation_id(&self) -> Option<ReservationId> {
        self.reservation_id
    }

    /// Unit price before any adjustment: retail, or sale price if lower.
    pub fn base_price(&self) -> Money {
        match self.sale_price {
            Some(sale) if sale < self.retail_price => sale,
            _ => self.retail_price,
        }
    }

    /// Total per-unit discount currently applied.
    pub fn unit_discount(&self) -> Money {
        self.adjustments.iter().map(|a| a.value).sum()
    }

    pub(crate) fn set_quantity(&mut self, quantity: u32) {
        self.quantity = quantity;
        self.refresh_line();
    }

    pub(crate) fn set_reservation(&mut self, reservation_id: Option<ReservationId>) {
        self.reservation_id = reservation_id;
    }

    /// Drops every adjustment and returns the unit price to its base.
    pub(crate) fn reset_price(&mut self) {
        self.adjustments.clear();
        self.price = self.base_price();
        self.refresh_line();
    }

    /// Applies a per-unit discount, floored so the price never goes negative.
    ///
    /// Returns the per-unit value actually applied; nothing is recorded when it is zero.
    pub(crate) fn apply_adjustment(
        &mut self,
        offer_id: OfferId,
        offer_name: &str,
        unit_value: Money,
    ) -> Money {
        let applied = if unit_value > self.price {
            self.price
        } else {
            unit_value.non_negative()
        };
        if applied.is_zero() {
            return applied;
        }
        self.price -= applied;
        self.adjustments.push(OrderItemAdjustment {
            offer_id,
            offer_name: offer_name.to_string(),
            value: applied,
        });
        self.refresh_line();
        applied
    }

    pub(crate) fn refresh_line(&mut self) {
        self.total_price = self.price.saturating_mul(self.quantity);
        self.tax_amount = self.tax_rate.of(self.total_price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(retail: i64, sale: Option<i64>, quantity: u32) -> OrderItem {
        OrderItem::new(
            "SKU-001",
            "PROD-001",
            "Widget",
            quantity,
            Money::from_cents(retail),
            sale.map(Money::from_cents),
        )
    }

    #[test]
    fn test_base_price_prefers_lower_sale_price() {
        assert_eq!(item(1000, Some(800), 1).base_price().cents(), 800);
        assert_eq!(item(1000, Some(1200), 1).base_price().cents(), 1000);
        assert_eq!(item(1000, None, 1).base_price().cents(), 1000);
    }

    #[test]
    fn test_total_price_tracks_quantity() {
        let mut line = item(1000, None, 3);
        assert_eq!(line.total_price().cents(), 3000);

        line.set_quantity(5);
        assert_eq!(line.total_price().cents(), 5000);
    }

    #[test]
    fn test_oversized_line_saturates_instead_of_wrapping() {
        let line = item(3_000_000_000, None, u32::MAX);
        assert_eq!(line.total_price(), Money::from_cents(i64::MAX));
    }

    #[test]
    fn test_tax_amount_follows_total() {
        let line = item(1000, None, 2).with_tax_rate(Percent::from_basis_points(825));
        assert_eq!(line.tax_amount().cents(), 165);
    }

    #[test]
    fn test_adjustment_never_makes_price_negative() {
        let mut line = item(500, None, 2);
        let applied = line.apply_adjustment(OfferId::new(), "Big", Money::from_cents(900));

        assert_eq!(applied.cents(), 500);
        assert_eq!(line.price(), Money::zero());
        assert_eq!(line.total_price(), Money::zero());
    }

    #[test]
    fn test_zero_adjustment_is_not_recorded() {
        let mut line = item(500, None, 1);
        line.apply_adjustment(OfferId::new(), "Nothing", Money::zero());
        assert!(line.adjustments().is_empty());
    }

    #[test]
    fn test_reset_price_clears_adjustments() {
        let mut line = item(1000, Some(900), 1);
        line.apply_adjustment(OfferId::new(), "Promo", Money::from_cents(100));
        assert_eq!(line.price().cents(), 800);
        assert_eq!(line.unit_discount().cents(), 100);

        line.reset_price();
        assert!(line.adjustments().is_empty());
        assert_eq!(line.price().cents(), 900);
    }
}
