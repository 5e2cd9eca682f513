//! Checkout orchestration.
//!
//! This crate binds the pure domain model to persistence:
//! - `InventoryLedger` commits every reservation transition together with its
//!   counter mutation, serialized per SKU
//! - `CheckoutService` drives an order through the checkout state machine,
//!   compensating committed ledger work when a later step fails
//! - `ExpirySweeper` expires overdue reservations and reconciles counters in
//!   the background
//!
//! Collaborators (catalog, offers, shipping, payment) are traits with
//! in-memory implementations in [`services`].

pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod locks;
pub mod service;
pub mod services;
pub mod sweeper;

pub use config::{LedgerConfig, SweeperConfig};
pub use error::{CheckoutError, ErrorBody, Result};
pub use events::{CheckoutEvent, EventPublisher};
pub use ledger::{CounterDrift, InventoryLedger, ReconcileReport, ReleaseOutcome, SweepReport};
pub use service::{CheckoutService, Collaborators};
pub use services::{
    CatalogService, InMemoryCatalog, InMemoryOfferRepository, InMemoryPaymentService,
    InMemoryShippingService, OfferRepository, PaymentService, ShippingService, SkuInfo,
};
pub use sweeper::{ExpirySweeper, SweeperHandle};
