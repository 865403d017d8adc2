use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use tablekit_core::{ItemKey, Record};

use super::condition::{render_set, Condition, Expression};

/// Maximum number of items in one transactional write.
pub const MAX_TRANSACT_ITEMS: usize = 100;

/// Point lookup of a single item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetItem {
    pub table: String,
    pub key: ItemKey,
    pub consistent_read: bool,
}

/// One page of a sort-key prefix scan within a partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryInput {
    pub table: String,
    pub pk: String,
    pub sk_prefix: String,
    pub scan_forward: bool,
    pub consistent_read: bool,
    /// Maximum number of items *evaluated* for this page (before `filter`).
    pub limit: Option<usize>,
    /// Continuation cursor from the previous page.
    pub exclusive_start_key: Option<ItemKey>,
    /// Applied after the page is read; a page may come back empty with a cursor.
    pub filter: Option<Condition>,
    /// Attributes to return; all when `None`.
    pub projection: Option<Vec<String>>,
}

impl QueryInput {
    pub fn new(table: impl Into<String>, pk: impl Into<String>, sk_prefix: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            pk: pk.into(),
            sk_prefix: sk_prefix.into(),
            scan_forward: true,
            consistent_read: false,
            limit: None,
            exclusive_start_key: None,
            filter: None,
            projection: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPage {
    pub items: Vec<Record>,
    /// Present when the scan stopped before the end of the key range.
    pub last_evaluated_key: Option<ItemKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PutItem {
    pub table: String,
    pub item: Record,
    pub condition: Option<Condition>,
}

impl PutItem {
    pub fn condition_expression(&self) -> Option<Expression> {
        self.condition.as_ref().map(Condition::render)
    }
}

/// Attribute-level update: listed attributes are replaced, others are kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateItem {
    pub table: String,
    pub key: ItemKey,
    pub set: Record,
    pub condition: Option<Condition>,
}

impl UpdateItem {
    pub fn update_expression(&self) -> Expression {
        render_set(&self.set)
    }

    pub fn condition_expression(&self) -> Option<Expression> {
        self.condition.as_ref().map(Condition::render)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteItem {
    pub table: String,
    pub key: ItemKey,
    pub condition: Option<Condition>,
}

/// Batched deletes against one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchWrite {
    pub table: String,
    pub deletes: Vec<ItemKey>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchWriteOutput {
    /// Keys the store did not get to; the caller decides what to do with them.
    pub unprocessed: Vec<ItemKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TransactItem {
    Put(PutItem),
    Update(UpdateItem),
    Delete(DeleteItem),
    ConditionCheck {
        table: String,
        key: ItemKey,
        condition: Condition,
    },
}

impl TransactItem {
    pub fn key(&self) -> Option<ItemKey> {
        match self {
            TransactItem::Put(put) => put.item.key(),
            TransactItem::Update(update) => Some(update.key.clone()),
            TransactItem::Delete(delete) => Some(delete.key.clone()),
            TransactItem::ConditionCheck { key, .. } => Some(key.clone()),
        }
    }
}

/// All-or-nothing write of several items.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TransactWrite {
    pub items: Vec<TransactItem>,
}

/// Why one item of a transaction was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationReason {
    None,
    ConditionalCheckFailed,
    Other(String),
}

/// Store operation error.
///
/// These are the failures a store client reports; the gateway maps them into
/// `EntityError` in one place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("conditional check failed: {0}")]
    ConditionFailed(String),

    #[error("transaction cancelled: {0:?}")]
    TransactionCanceled(Vec<CancellationReason>),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("throughput exceeded: {0}")]
    Throttled(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// True when a transaction was cancelled because one of its conditions failed.
    pub fn is_condition_failure(&self) -> bool {
        match self {
            StoreError::ConditionFailed(_) => true,
            StoreError::TransactionCanceled(reasons) => reasons
                .iter()
                .any(|r| *r == CancellationReason::ConditionalCheckFailed),
            _ => false,
        }
    }
}

/// Client for a sorted key-value store keyed by `(PK, SK)`.
///
/// This is the whole surface the entity layer needs from a store. Implementations wrap
/// a network client (and own its connection lifecycle) or keep data in memory for tests.
/// No implementation is expected to retry; errors propagate as-is.
#[async_trait::async_trait]
pub trait KvClient: Send + Sync {
    /// Returns `None` when no item exists at the key.
    async fn get_item(&self, input: GetItem) -> Result<Option<Record>, StoreError>;

    /// Read a single page; follow `last_evaluated_key` for the next one.
    async fn query(&self, input: QueryInput) -> Result<QueryPage, StoreError>;

    async fn put_item(&self, input: PutItem) -> Result<(), StoreError>;

    /// Returns the item as it is after the update.
    async fn update_item(&self, input: UpdateItem) -> Result<Record, StoreError>;

    /// Deleting a missing key is not an error.
    async fn delete_item(&self, input: DeleteItem) -> Result<(), StoreError>;

    async fn batch_write(&self, input: BatchWrite) -> Result<BatchWriteOutput, StoreError>;

    async fn transact_write(&self, input: TransactWrite) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S> KvClient for Arc<S>
where
    S: KvClient + ?Sized,
{
    async fn get_item(&self, input: GetItem) -> Result<Option<Record>, StoreError> {
        (**self).get_item(input).await
    }

    async fn query(&self, input: QueryInput) -> Result<QueryPage, StoreError> {
        (**self).query(input).await
    }

    async fn put_item(&self, input: PutItem) -> Result<(), StoreError> {
        (**self).put_item(input).await
    }

    async fn update_item(&self, input: UpdateItem) -> Result<Record, StoreError> {
        (**self).update_item(input).await
    }

    async fn delete_item(&self, input: DeleteItem) -> Result<(), StoreError> {
        (**self).delete_item(input).await
    }

    async fn batch_write(&self, input: BatchWrite) -> Result<BatchWriteOutput, StoreError> {
        (**self).batch_write(input).await
    }

    async fn transact_write(&self, input: TransactWrite) -> Result<(), StoreError> {
        (**self).transact_write(input).await
    }
}
