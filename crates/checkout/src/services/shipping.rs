//! Shipping quote trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::Money;
use domain::{Address, Order, ShippingMethod};

use crate::error::{CheckoutError, Result};

/// Prices delivery of an order.
#[async_trait]
pub trait ShippingService: Send + Sync {
    /// Quotes the cost of shipping `order` to `address` via `method`.
    async fn quote(&self, order: &Order, address: &Address, method: ShippingMethod)
    -> Result<Money>;
}

#[derive(Debug)]
struct InMemoryShippingState {
    rates: HashMap<ShippingMethod, Money>,
    free_over: Option<Money>,
    fail_on_quote: bool,
}

impl Default for InMemoryShippingState {
    fn default() -> Self {
        Self {
            rates: HashMap::from([
                (ShippingMethod::Standard, Money::from_cents(500)),
                (ShippingMethod::Express, Money::from_cents(1500)),
                (ShippingMethod::Overnight, Money::from_cents(3000)),
            ]),
            free_over: None,
            fail_on_quote: false,
        }
    }
}

/// Flat-rate shipping service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShippingService {
    state: Arc<RwLock<InMemoryShippingState>>,
}

impl InMemoryShippingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate(&self, method: ShippingMethod, rate: Money) {
        self.state.write().unwrap().rates.insert(method, rate);
    }

    /// Standard shipping is free once the subtotal reaches `threshold`.
    pub fn set_free_standard_over(&self, threshold: Money) {
        self.state.write().unwrap().free_over = Some(threshold);
    }

    pub fn set_fail_on_quote(&self, fail: bool) {
        self.state.write().unwrap().fail_on_quote = fail;
    }
}

#[async_trait]
impl ShippingService for InMemoryShippingService {
    async fn quote(
        &self,
        order: &Order,
        _address: &Address,
        method: ShippingMethod,
    ) -> Result<Money> {
        let state = self.state.read().unwrap();
        if state.fail_on_quote {
            return Err(CheckoutError::Internal(
                "shipping service unavailable".to_string(),
            ));
        }

        if method == ShippingMethod::Standard
            && state.free_over.is_some_and(|t| order.subtotal() >= t)
        {
            return Ok(Money::zero());
        }
        Ok(state.rates.get(&method).copied().unwrap_or_default())
    }
}
