//! Record store for the adtrack validator
//!
//! Provides the [`Store`]/[`Session`] abstraction shared by the active, history
//! and main stores, an in-memory and a PostgreSQL backend, and the archival
//! migration from active to history.

pub mod error;
pub mod factory;
pub mod memory_store;
pub mod migration;
pub mod postgres_store;
pub mod traits;
pub mod unit_of_work;

pub use {
    error::{Result, StoreError},
    factory::{ConfiguredStoreFactory, Stores},
    memory_store::MemoryStore,
    migration::{migrate, MigrationReport},
    postgres_store::PostgresStore,
    traits::{Session, Store, StoreFactory},
    unit_of_work::UnitOfWork,
};
