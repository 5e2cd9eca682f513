//! Offer definitions, consumed read-only by the engine.

use common::{Money, OfferId, Percent, ProductId, SkuId};
use serde::{Deserialize, Serialize};

/// How an offer computes its discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// A flat amount off.
    AmountOff(Money),
    /// A fraction of the price.
    PercentOff(Percent),
}

/// Whether an offer discounts the order subtotal or individual items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentScope {
    #[default]
    Order,
    Item,
}

/// SKUs and products an item-scoped offer targets. Empty means every item.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetCriteria {
    #[serde(default)]
    pub skus: Vec<SkuId>,
    #[serde(default)]
    pub products: Vec<ProductId>,
}

impl TargetCriteria {
    pub fn is_empty(&self) -> bool {
        self.skus.is_empty() && self.products.is_empty()
    }
}

/// A promotion definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub name: String,
    pub discount: Discount,
    pub scope: AdjustmentScope,
    /// Lower numbers apply first.
    pub priority: i32,
    /// The running subtotal must reach this before the offer applies.
    pub minimum_order: Option<Money>,
    /// Upper bound on the total discount this offer produces.
    pub max_discount: Option<Money>,
    pub combinable: bool,
    pub automatically_added: bool,
    pub coupon_code: Option<String>,
    pub archived: bool,
    #[serde(default)]
    pub target: TargetCriteria,
}

impl Offer {
    fn new(name: impl Into<String>, discount: Discount) -> Self {
        Self {
            id: OfferId::new(),
            name: name.into(),
            discount,
            scope: AdjustmentScope::Order,
            priority: 0,
            minimum_order: None,
            max_discount: None,
            combinable: true,
            automatically_added: false,
            coupon_code: None,
            archived: false,
            target: TargetCriteria::default(),
        }
    }

    /// An order-scoped flat discount.
    pub fn amount_off(name: impl Into<String>, amount: Money) -> Self {
        Self::new(name, Discount::AmountOff(amount))
    }

    /// An order-scoped percentage discount.
    pub fn percent_off(name: impl Into<String>, rate: Percent) -> Self {
        Self::new(name, Discount::PercentOff(rate))
    }

    /// Applies the discount per unit of each eligible item instead of to the subtotal.
    pub fn item_scoped(mut self) -> Self {
        self.scope = AdjustmentScope::Item;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_minimum_order(mut self, minimum: Money) -> Self {
        self.minimum_order = Some(minimum);
        self
    }

    pub fn with_max_discount(mut self, cap: Money) -> Self {
        self.max_discount = Some(cap);
        self
    }

    pub fn non_combinable(mut self) -> Self {
        self.combinable = false;
        self
    }

    pub fn automatic(mut self) -> Self {
        self.automatically_added = true;
        self
    }

    pub fn with_coupon(mut self, code: impl Into<String>) -> Self {
        self.coupon_code = Some(code.into());
        self
    }

    pub fn archived(mut self) -> Self {
        self.archived = true;
        self
    }

    pub fn targeting_skus<I, S>(mut self, skus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SkuId>,
    {
        self.target.skus = skus.into_iter().map(Into::into).collect();
        self
    }

    pub fn targeting_products<I, P>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProductId>,
    {
        self.target.products = products.into_iter().map(Into::into).collect();
        self
    }

    /// True iff the running subtotal reaches the offer's minimum.
    pub fn meets_minimum(&self, subtotal: Money) -> bool {
        self.minimum_order.is_none_or(|minimum| subtotal >= minimum)
    }
}
