//! Storefront persistence.
//!
//! The [`Store`] trait is the single seam between the workflow and storage.
//! Two implementations are provided: [`InMemoryStore`] for tests and local
//! runs, and [`PostgresStore`] backed by sqlx.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{InventoryLogQuery, OrderQuery, ProductQuery, ProductSort, ReviewQuery};
pub use store::{InventoryStats, LedgerStream, Store, TransitionOutcome};
