//! Checkout details collected along the way: customer, address, shipping, payment.

use common::{FulfillmentGroupId, Money, OrderItemId};
use serde::{Deserialize, Serialize};

/// Customer details confirmed at the customer-info step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
}

impl CustomerInfo {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A postal address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
}

impl Address {
    /// Returns the names of required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.recipient.trim().is_empty() {
            missing.push("recipient");
        }
        if self.line1.trim().is_empty() {
            missing.push("line1");
        }
        if self.city.trim().is_empty() {
            missing.push("city");
        }
        if self.postal_code.trim().is_empty() {
            missing.push("postal_code");
        }
        if self.country.trim().len() != 2 {
            missing.push("country");
        }
        missing
    }
}

/// Delivery speed chosen at the shipping step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    Standard,
    Express,
    Overnight,
}

impl ShippingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingMethod::Standard => "standard",
            ShippingMethod::Express => "express",
            ShippingMethod::Overnight => "overnight",
        }
    }
}

impl std::fmt::Display for ShippingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A subset of an order's items shipped to one address via one method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentGroup {
    pub id: FulfillmentGroupId,
    pub address: Address,
    pub method: ShippingMethod,
    pub item_ids: Vec<OrderItemId>,
    pub shipping_cost: Money,
}

impl FulfillmentGroup {
    pub fn new(
        address: Address,
        method: ShippingMethod,
        item_ids: Vec<OrderItemId>,
        shipping_cost: Money,
    ) -> Self {
        Self {
            id: FulfillmentGroupId::new(),
            address,
            method,
            item_ids,
            shipping_cost,
        }
    }
}

/// Payment instrument chosen at the payment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard { token: String },
    GiftCard { code: String },
    Invoice,
}

/// A payment authorization obtained for the order total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub method: PaymentMethod,
    pub authorization_id: String,
    pub amount: Money,
}
