//! Entity records over a single table.
//!
//! Concrete entity types are declared with [`EntityKind`] and wrap one of two record kinds:
//!
//! - [`PlainRecord`]: conditional create, full-attribute update, single-key delete.
//! - [`VersionedRecord`]: append-only; every create writes a new version and retires the
//!   previous head, update is refused, delete removes the whole history.
//!
//! Both share the field layout in [`EntityRecord`] and expose their protocol through the
//! capability traits below.

pub mod base;
pub mod plain;
pub mod versioned;

pub use base::EntityRecord;
pub use plain::PlainRecord;
pub use versioned::{VersionedRecord, SUPERSEDED_SUFFIX};

use tablekit_core::{EntityResult, Record};

use crate::gateway::{QueryOptions, WriteRequest};

/// Declarative definition of a concrete entity type.
pub trait EntityKind {
    const TABLE_NAME: &'static str;
    /// Head tag written to `ENTITY` and the `[type]` segment of sort keys.
    const ENTITY_TYPE: &'static str;
    /// Partition key new records start with, if the type has a fixed one.
    const PK_DEFAULT: Option<&'static str> = None;
    /// Whether records of this kind keep every version.
    const VERSIONED: bool = false;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    /// Refuse to overwrite an existing item at the same key.
    pub check_exists: bool,
    /// Build the request but do not send it.
    pub dry_run: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            check_exists: true,
            dry_run: false,
        }
    }
}

impl CreateOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    pub fn overwrite() -> Self {
        Self {
            check_exists: false,
            ..Self::default()
        }
    }
}

/// Result of a write operation.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Executed,
    /// The request that would have been sent.
    DryRun(WriteRequest),
}

impl WriteOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, WriteOutcome::Executed)
    }

    pub fn into_request(self) -> Option<WriteRequest> {
        match self {
            WriteOutcome::Executed => None,
            WriteOutcome::DryRun(request) => Some(request),
        }
    }
}

#[async_trait::async_trait]
pub trait Creatable {
    async fn create(&mut self, options: CreateOptions) -> EntityResult<WriteOutcome>;
}

#[async_trait::async_trait]
pub trait Updatable {
    async fn update(&mut self, dry_run: bool) -> EntityResult<WriteOutcome>;
}

#[async_trait::async_trait]
pub trait Deletable {
    async fn delete(&self) -> EntityResult<()>;
}

#[async_trait::async_trait]
pub trait Queryable {
    /// Point lookup; `None` when absent.
    async fn get(&self, pk: &str, sk: &str, consistent_read: bool) -> EntityResult<Option<Record>>;

    /// Prefix scan over sort keys within `pk`.
    async fn query(&self, pk: &str, sk_prefix: &str, options: QueryOptions) -> EntityResult<Vec<Record>>;
}
