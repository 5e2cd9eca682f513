//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CustomerId, FulfillmentGroupId, Money, OrderId, OrderItemId, ReservationId, Version};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{
    Address, CustomerInfo, FulfillmentGroup, OrderAdjustment, OrderError, OrderItem, OrderStatus,
    PaymentDetails, ShippingMethod,
};

/// Order aggregate root.
///
/// Totals are derived and never set directly: after every mutation
/// `total == subtotal + total_tax + total_shipping` and `subtotal` equals the
/// sum of item total prices minus the order-level adjustment values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,

    /// Current version for optimistic concurrency.
    #[serde(default)]
    version: Version,

    customer_id: CustomerId,
    status: OrderStatus,
    currency: String,

    /// Line items in insertion order.
    items: Vec<OrderItem>,

    /// Order-level adjustments, recreated on every offer recompute.
    adjustments: Vec<OrderAdjustment>,

    fulfillment_groups: Vec<FulfillmentGroup>,
    coupon_code: Option<String>,
    customer_info: Option<CustomerInfo>,
    payment: Option<PaymentDetails>,

    subtotal: Money,
    total_tax: Money,
    total_shipping: Money,
    total: Money,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    submit_date: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
}

impl Aggregate for Order {
    type Id = OrderId;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> OrderId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

impl Order {
    /// Creates a new, empty order in `Pending` status.
    pub fn new(customer_id: CustomerId, currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            version: Version::initial(),
            customer_id,
            status: OrderStatus::Pending,
            currency: currency.into(),
            items: Vec::new(),
            adjustments: Vec::new(),
            fulfillment_groups: Vec::new(),
            coupon_code: None,
            customer_info: None,
            payment: None,
            subtotal: Money::zero(),
            total_tax: Money::zero(),
            total_shipping: Money::zero(),
            total: Money::zero(),
            created_at: now,
            updated_at: now,
            submit_date: None,
            cancelled_at: None,
            cancel_reason: None,
        }
    }
}

// Query methods
impl Order {
    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Returns all items in insertion order.
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn item(&self, item_id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.id() == item_id)
    }

    /// Returns the line item for a SKU, if one exists.
    pub fn item_for_sku(&self, sku_id: &common::SkuId) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.sku_id() == sku_id)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn adjustments(&self) -> &[OrderAdjustment] {
        &self.adjustments
    }

    pub fn fulfillment_groups(&self) -> &[FulfillmentGroup] {
        &self.fulfillment_groups
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon_code.as_deref()
    }

    pub fn customer_info(&self) -> Option<&CustomerInfo> {
        self.customer_info.as_ref()
    }

    pub fn payment(&self) -> Option<&PaymentDetails> {
        self.payment.as_ref()
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn total_tax(&self) -> Money {
        self.total_tax
    }

    pub fn total_shipping(&self) -> Money {
        self.total_shipping
    }

    pub fn total(&self) -> Money {
        self.total
    }

    /// Sum of item total prices, before order-level adjustments.
    pub fn items_subtotal(&self) -> Money {
        self.items.iter().map(|i| i.total_price()).sum()
    }

    /// Sum of order-level adjustment values.
    pub fn adjustments_total(&self) -> Money {
        self.adjustments.iter().map(|a| a.value).sum()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn submit_date(&self) -> Option<DateTime<Utc>> {
        self.submit_date
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    /// Returns the reservations currently held for this order's items.
    pub fn reservation_ids(&self) -> Vec<ReservationId> {
        self.items.iter().filter_map(|i| i.reservation_id()).collect()
    }

    /// Returns true if the derived totals satisfy the order invariants.
    pub fn totals_consistent(&self) -> bool {
        let tax: Money = self.items.iter().map(|i| i.tax_amount()).sum();
        self.subtotal == self.items_subtotal() - self.adjustments_total()
            && self.total_tax == tax
            && self.total == self.subtotal + self.total_tax + self.total_shipping
    }

    /// Fails with `InvalidTransition` unless the order is exactly in `expected`.
    pub fn ensure_status(
        &self,
        expected: OrderStatus,
        action: &'static str,
    ) -> Result<(), OrderError> {
        if self.status != expected {
            return Err(OrderError::InvalidTransition {
                current: self.status,
                action,
            });
        }
        Ok(())
    }

    /// Fails with `InvalidTransition` unless items may still change.
    pub fn ensure_editable(&self, action: &'static str) -> Result<(), OrderError> {
        if !self.status.is_editable() {
            return Err(OrderError::InvalidTransition {
                current: self.status,
                action,
            });
        }
        Ok(())
    }
}

// Item and coupon commands
impl Order {
    /// Adds a line item.
    pub fn add_item(&mut self, item: OrderItem) -> Result<OrderItemId, OrderError> {
        self.ensure_editable("add item")?;

        if item.quantity() == 0 {
            return Err(OrderError::InvalidQuantity { quantity: 0 });
        }

        let lines = self.lines().chain(std::iter::once((&item, item.quantity())));
        ensure_amounts_fit(lines, self.total_shipping)?;

        let item_id = item.id();
        self.items.push(item);
        self.recompute_totals();
        Ok(item_id)
    }

    /// Changes an item's quantity, returning the previous quantity.
    pub fn update_item_quantity(
        &mut self,
        item_id: OrderItemId,
        quantity: u32,
    ) -> Result<u32, OrderError> {
        self.ensure_editable("update item quantity")?;

        if quantity == 0 {
            return Err(OrderError::InvalidQuantity { quantity });
        }

        let lines = self.items.iter().map(|i| {
            let q = if i.id() == item_id { quantity } else { i.quantity() };
            (i, q)
        });
        ensure_amounts_fit(lines, self.total_shipping)?;

        let item = self
            .items
            .iter_mut()
            .find(|i| i.id() == item_id)
            .ok_or(OrderError::ItemNotFound { item_id })?;
        let previous = item.quantity();
        item.set_quantity(quantity);
        self.recompute_totals();
        Ok(previous)
    }

    /// Removes an item, returning it.
    pub fn remove_item(&mut self, item_id: OrderItemId) -> Result<OrderItem, OrderError> {
        self.ensure_editable("remove item")?;

        let index = self
            .items
            .iter()
            .position(|i| i.id() == item_id)
            .ok_or(OrderError::ItemNotFound { item_id })?;
        let removed = self.items.remove(index);
        for group in &mut self.fulfillment_groups {
            group.item_ids.retain(|id| *id != item_id);
        }
        self.recompute_totals();
        Ok(removed)
    }

    /// Records which reservation holds stock for an item.
    pub fn set_item_reservation(
        &mut self,
        item_id: OrderItemId,
        reservation_id: Option<ReservationId>,
    ) -> Result<(), OrderError> {
        if self.status.is_frozen() {
            return Err(OrderError::InvalidTransition {
                current: self.status,
                action: "change item reservation",
            });
        }

        let item = self
            .items
            .iter_mut()
            .find(|i| i.id() == item_id)
            .ok_or(OrderError::ItemNotFound { item_id })?;
        item.set_reservation(reservation_id);
        self.touch();
        Ok(())
    }

    /// Stores a coupon code; the caller reprices the order afterwards.
    pub fn apply_coupon(&mut self, code: impl Into<String>) -> Result<(), OrderError> {
        self.ensure_editable("apply coupon")?;
        self.coupon_code = Some(code.into());
        self.touch();
        Ok(())
    }

    /// Clears the coupon code, returning the previous one.
    pub fn remove_coupon(&mut self) -> Result<Option<String>, OrderError> {
        self.ensure_editable("remove coupon")?;
        let previous = self.coupon_code.take();
        self.touch();
        Ok(previous)
    }
}

// Checkout transitions
impl Order {
    /// PENDING → CUSTOMER_INFO.
    pub fn start_checkout(&mut self) -> Result<(), OrderError> {
        self.ensure_status(OrderStatus::Pending, "start checkout")?;
        self.transition(OrderStatus::CustomerInfo);
        Ok(())
    }

    /// CUSTOMER_INFO → SHIPPING.
    pub fn confirm_customer_info(&mut self, info: CustomerInfo) -> Result<(), OrderError> {
        self.ensure_status(OrderStatus::CustomerInfo, "confirm customer info")?;

        if info.name.trim().is_empty() {
            return Err(OrderError::InvalidCustomerInfo(
                "name must not be blank".to_string(),
            ));
        }
        let email = info.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(OrderError::InvalidCustomerInfo(format!(
                "'{}' is not an email address",
                info.email
            )));
        }

        self.customer_info = Some(info);
        self.transition(OrderStatus::Shipping);
        Ok(())
    }

    /// SHIPPING → PAYMENT.
    ///
    /// Binds every item to a single fulfillment group and sets the shipping total.
    pub fn select_shipping(
        &mut self,
        address: Address,
        method: ShippingMethod,
        shipping_cost: Money,
    ) -> Result<FulfillmentGroupId, OrderError> {
        self.ensure_status(OrderStatus::Shipping, "select shipping")?;

        if !self.has_items() {
            return Err(OrderError::NoItems);
        }
        let missing = address.missing_fields();
        if !missing.is_empty() {
            return Err(OrderError::IncompleteAddress { fields: missing });
        }

        ensure_amounts_fit(self.lines(), shipping_cost.non_negative())?;

        let item_ids = self.items.iter().map(|i| i.id()).collect();
        let group = FulfillmentGroup::new(address, method, item_ids, shipping_cost.non_negative());
        let group_id = group.id;
        self.fulfillment_groups = vec![group];
        self.total_shipping = shipping_cost.non_negative();
        self.recompute_totals();
        self.transition(OrderStatus::Payment);
        Ok(group_id)
    }

    /// PAYMENT → REVIEW.
    pub fn select_payment(&mut self, payment: PaymentDetails) -> Result<(), OrderError> {
        self.ensure_status(OrderStatus::Payment, "select payment")?;
        self.payment = Some(payment);
        self.transition(OrderStatus::Review);
        Ok(())
    }

    /// REVIEW → SUBMITTED. Stamps the submit date; the order is frozen afterwards.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.ensure_status(OrderStatus::Review, "submit")?;

        if !self.has_items() {
            return Err(OrderError::NoItems);
        }

        self.submit_date = Some(now);
        self.transition(OrderStatus::Submitted);
        Ok(())
    }

    /// SUBMITTED → FULFILLED.
    pub fn mark_fulfilled(&mut self) -> Result<(), OrderError> {
        self.ensure_status(OrderStatus::Submitted, "fulfill")?;
        self.transition(OrderStatus::Fulfilled);
        Ok(())
    }

    /// Any non-terminal, unsubmitted status → CANCELLED.
    pub fn cancel(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidTransition {
                current: self.status,
                action: "cancel",
            });
        }

        self.cancelled_at = Some(now);
        self.cancel_reason = Some(reason.into());
        self.transition(OrderStatus::Cancelled);
        Ok(())
    }
}

// Pricing hooks used by the offer engine
impl Order {
    pub(crate) fn items_mut(&mut self) -> &mut [OrderItem] {
        &mut self.items
    }

    pub(crate) fn clear_adjustments(&mut self) {
        self.adjustments.clear();
    }

    pub(crate) fn push_adjustment(&mut self, adjustment: OrderAdjustment) {
        self.adjustments.push(adjustment);
    }

    /// Recomputes every derived total from the items and adjustments.
    pub fn recompute_totals(&mut self) {
        for item in &mut self.items {
            item.refresh_line();
        }
        self.subtotal = self.items_subtotal() - self.adjustments_total();
        self.total_tax = self.items.iter().map(|i| i.tax_amount()).sum();
        self.total = self.subtotal + self.total_tax + self.total_shipping;
        self.touch();
    }

    fn lines(&self) -> impl Iterator<Item = (&OrderItem, u32)> {
        self.items.iter().map(|i| (i, i.quantity()))
    }

    fn transition(&mut self, next: OrderStatus) {
        self.status = next;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Checks that the undiscounted lines, their tax and `shipping` can be summed
/// without overflow. Offers only lower prices, so every later recompute stays
/// within this bound.
fn ensure_amounts_fit<'a>(
    lines: impl Iterator<Item = (&'a OrderItem, u32)>,
    shipping: Money,
) -> Result<(), OrderError> {
    let mut total = shipping;
    for (item, quantity) in lines {
        let line = item
            .base_price()
            .non_negative()
            .checked_mul(quantity)
            .ok_or(OrderError::AmountOverflow)?;
        total = total
            .checked_add(line)
            .and_then(|t| t.checked_add(item.tax_rate().of(line)))
            .ok_or(OrderError::AmountOverflow)?;
    }
    Ok(())
}
