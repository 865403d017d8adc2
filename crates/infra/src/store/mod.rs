//! Sorted key-value store boundary.
//!
//! This module defines the primitives the entity layer consumes from a store keyed by
//! `(PK, SK)`, without assuming any particular backend.

pub mod condition;
pub mod in_memory;
pub mod r#trait;

pub use condition::{Condition, Expression};
pub use in_memory::{CallCounts, InMemoryKvStore};
pub use r#trait::{
    BatchWrite, BatchWriteOutput, CancellationReason, DeleteItem, GetItem, KvClient, PutItem,
    QueryInput, QueryPage, StoreError, TransactItem, TransactWrite, UpdateItem, MAX_TRANSACT_ITEMS,
};
