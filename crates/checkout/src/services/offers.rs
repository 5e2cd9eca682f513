//! Offer repository trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OfferId;
use domain::Offer;

use crate::error::{CheckoutError, Result};

/// Read-only access to offer definitions.
#[async_trait]
pub trait OfferRepository: Send + Sync {
    /// Unarchived offers that apply without a coupon.
    async fn active_offers(&self) -> Result<Vec<Offer>>;

    /// The offer carrying `code`, archived or not. Codes match case-insensitively.
    async fn find_by_coupon(&self, code: &str) -> Result<Option<Offer>>;
}

#[derive(Debug, Default)]
struct InMemoryOfferState {
    offers: Vec<Offer>,
    fail_on_read: bool,
}

/// In-memory offer repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOfferRepository {
    state: Arc<RwLock<InMemoryOfferState>>,
}

impl InMemoryOfferRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, offer: Offer) {
        self.state.write().unwrap().offers.push(offer);
    }

    /// Archives an offer in place.
    pub fn archive(&self, offer_id: OfferId) {
        let mut state = self.state.write().unwrap();
        if let Some(offer) = state.offers.iter_mut().find(|o| o.id == offer_id) {
            offer.archived = true;
        }
    }

    /// Makes every read fail as if the repository were unreachable.
    pub fn set_fail_on_read(&self, fail: bool) {
        self.state.write().unwrap().fail_on_read = fail;
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, InMemoryOfferState>> {
        let state = self.state.read().unwrap();
        if state.fail_on_read {
            return Err(CheckoutError::Internal(
                "offer repository unavailable".to_string(),
            ));
        }
        Ok(state)
    }
}

#[async_trait]
impl OfferRepository for InMemoryOfferRepository {
    async fn active_offers(&self) -> Result<Vec<Offer>> {
        let state = self.read()?;
        Ok(state
            .offers
            .iter()
            .filter(|o| o.automatically_added && !o.archived)
            .cloned()
            .collect())
    }

    async fn find_by_coupon(&self, code: &str) -> Result<Option<Offer>> {
        let state = self.read()?;
        let code = code.trim();
        Ok(state
            .offers
            .iter()
            .find(|o| {
                o.coupon_code
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(code))
            })
            .cloned())
    }
}
