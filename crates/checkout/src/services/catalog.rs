//! Catalog lookup trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, Percent, ProductId, SkuId};
use domain::OrderItem;

use crate::error::{CheckoutError, Result};

/// What the catalog knows about a sellable SKU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkuInfo {
    pub sku_id: SkuId,
    pub product_id: ProductId,
    pub name: String,
    pub retail_price: Money,
    pub sale_price: Option<Money>,
    pub tax_rate: Percent,
}

impl SkuInfo {
    pub fn new(
        sku_id: impl Into<SkuId>,
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        retail_price: Money,
    ) -> Self {
        Self {
            sku_id: sku_id.into(),
            product_id: product_id.into(),
            name: name.into(),
            retail_price,
            sale_price: None,
            tax_rate: Percent::zero(),
        }
    }

    pub fn with_sale_price(mut self, sale_price: Money) -> Self {
        self.sale_price = Some(sale_price);
        self
    }

    pub fn with_tax_rate(mut self, rate: Percent) -> Self {
        self.tax_rate = rate;
        self
    }

    /// Builds an order line priced from this catalog entry.
    pub fn to_item(&self, quantity: u32) -> OrderItem {
        OrderItem::new(
            self.sku_id.clone(),
            self.product_id.clone(),
            self.name.clone(),
            quantity,
            self.retail_price,
            self.sale_price,
        )
        .with_tax_rate(self.tax_rate)
    }
}

/// Read-only SKU lookups.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Looks up a SKU. Fails with `NotFound` when the catalog has no such SKU.
    async fn lookup(&self, sku_id: &SkuId) -> Result<SkuInfo>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    skus: HashMap<SkuId, SkuInfo>,
    fail_on_lookup: bool,
}

/// In-memory catalog for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a SKU.
    pub fn insert(&self, info: SkuInfo) {
        self.state
            .write()
            .unwrap()
            .skus
            .insert(info.sku_id.clone(), info);
    }

    /// Makes every lookup fail as if the catalog were unreachable.
    pub fn set_fail_on_lookup(&self, fail: bool) {
        self.state.write().unwrap().fail_on_lookup = fail;
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalog {
    async fn lookup(&self, sku_id: &SkuId) -> Result<SkuInfo> {
        let state = self.state.read().unwrap();
        if state.fail_on_lookup {
            return Err(CheckoutError::Internal("catalog unavailable".to_string()));
        }
        state
            .skus
            .get(sku_id)
            .cloned()
            .ok_or_else(|| CheckoutError::not_found("SKU", sku_id))
    }
}
