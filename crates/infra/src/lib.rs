//! Entity and versioning layer over a sorted key-value store.
//!
//! Records live in one table keyed by `(PK, SK)`. The [`gateway`] turns entity operations
//! into store primitives; [`entity`] carries the plain and versioned record protocols.

pub mod config;
pub mod entity;
pub mod gateway;
pub mod store;


pub use config::{GatewayConfig, VersioningMode};
pub use entity::{
    CreateOptions, Creatable, Deletable, EntityKind, EntityRecord, PlainRecord, Queryable,
    Updatable, VersionedRecord, WriteOutcome,
};
pub use gateway::{QueryOptions, StorageGateway, WriteRequest};
pub use store::{InMemoryKvStore, KvClient, StoreError};
