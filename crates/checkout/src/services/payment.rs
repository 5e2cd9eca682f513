//! Payment authorization trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, OrderId};
use domain::PaymentMethod;

use crate::error::{CheckoutError, Result};

/// Authorizes and voids payments.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Authorizes `amount` against `method`, returning the authorization ID.
    ///
    /// A decline fails with `PaymentFailed`.
    async fn authorize(
        &self,
        order_id: OrderId,
        amount: Money,
        method: &PaymentMethod,
    ) -> Result<String>;

    /// Voids a previous authorization. Voiding an unknown ID succeeds.
    async fn void(&self, authorization_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    authorizations: HashMap<String, (OrderId, Money)>,
    next_id: u32,
    fail_on_authorize: bool,
    fail_on_void: bool,
}

/// In-memory payment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declines every authorization until switched off.
    pub fn set_fail_on_authorize(&self, fail: bool) {
        self.state.write().unwrap().fail_on_authorize = fail;
    }

    pub fn set_fail_on_void(&self, fail: bool) {
        self.state.write().unwrap().fail_on_void = fail;
    }

    /// Returns the number of live authorizations.
    pub fn authorization_count(&self) -> usize {
        self.state.read().unwrap().authorizations.len()
    }

    pub fn has_authorization(&self, authorization_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .authorizations
            .contains_key(authorization_id)
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn authorize(
        &self,
        order_id: OrderId,
        amount: Money,
        _method: &PaymentMethod,
    ) -> Result<String> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_authorize {
            return Err(CheckoutError::PaymentFailed("Payment declined".to_string()));
        }

        state.next_id += 1;
        let authorization_id = format!("AUTH-{:04}", state.next_id);
        state
            .authorizations
            .insert(authorization_id.clone(), (order_id, amount));
        Ok(authorization_id)
    }

    async fn void(&self, authorization_id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_void {
            return Err(CheckoutError::Internal(
                "payment gateway unavailable".to_string(),
            ));
        }
        state.authorizations.remove(authorization_id);
        Ok(())
    }
}
