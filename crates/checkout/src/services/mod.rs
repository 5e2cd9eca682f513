//! Collaborator traits consumed by the checkout commands, with in-memory
//! implementations for tests and local runs.

pub mod catalog;
pub mod offers;
pub mod payment;
pub mod shipping;

pub use catalog::{CatalogService, InMemoryCatalog, SkuInfo};
pub use offers::{InMemoryOfferRepository, OfferRepository};
pub use payment::{InMemoryPaymentService, PaymentService};
pub use shipping::{InMemoryShippingService, ShippingService};
