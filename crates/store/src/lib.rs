pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use event::{EventEnvelope, EventId};
pub use memory::{InMemoryEventSink, InMemoryStore};
pub use postgres::PostgresStore;
pub use store::{CommittedVersions, EventSink, InventoryStore, OrderStore};
