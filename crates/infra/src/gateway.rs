//! Single choke-point for reads and writes against one table.
//!
//! The gateway hides pagination, turns entity-level requests into store primitives and
//! maps store failures into `EntityError`. It adds no retries and no timeouts: whatever
//! the client reports is surfaced to the caller.
//!
//! ## Query accumulation
//!
//! `query` follows continuation cursors strictly sequentially:
//!
//! ```text
//! page 1 ──cursor──▶ page 2 ──cursor──▶ ... ──(no cursor | limit reached)──▶ done
//! ```
//!
//! A page may come back empty while still carrying a cursor (items read but removed by a
//! filter). That page is skipped, not treated as the end of the results.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use tablekit_core::{fields, BatchChunker, EntityError, EntityResult, ItemKey, Record};

use crate::config::GatewayConfig;
use crate::store::{
    BatchWrite, Condition, DeleteItem, GetItem, KvClient, PutItem, QueryInput, StoreError,
    TransactWrite, UpdateItem,
};

/// Options for an accumulated prefix query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOptions {
    /// Stop once this many items are accumulated. `Some(0)` is unbounded; `None` uses
    /// `GatewayConfig::query_limit`.
    pub limit: Option<usize>,
    /// Scan in descending sort-key order.
    pub scan_backward: bool,
    pub consistent_read: bool,
    pub filter: Option<Condition>,
    pub projection: Option<Vec<String>>,
}

impl QueryOptions {
    pub fn ascending() -> Self {
        Self::default()
    }

    pub fn descending() -> Self {
        Self {
            scan_backward: true,
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn unbounded(self) -> Self {
        self.limit(0)
    }

    pub fn consistent(mut self) -> Self {
        self.consistent_read = true;
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(condition);
        self
    }

    pub fn project<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    pub fn scan_forward(&self) -> bool {
        !self.scan_backward
    }
}

/// A write the gateway can execute, or hand back unexecuted for a dry run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WriteRequest {
    Put(PutItem),
    Update(UpdateItem),
    Transact(TransactWrite),
    /// Executed in order as independent calls; a failure leaves earlier steps applied.
    Sequence(Vec<WriteRequest>),
}

/// Handle to one table of the store.
///
/// Cheap to clone: the client is shared, and its lifecycle belongs to whoever built it.
#[derive(Clone)]
pub struct StorageGateway {
    client: Arc<dyn KvClient>,
    table: String,
    config: GatewayConfig,
    chunker: BatchChunker,
}

impl core::fmt::Debug for StorageGateway {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StorageGateway")
            .field("table", &self.table)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StorageGateway {
    pub fn new(client: Arc<dyn KvClient>, table: impl Into<String>, config: GatewayConfig) -> Self {
        let config = config.normalized();
        let chunker = BatchChunker::new(config.max_batch_items);
        Self {
            client,
            table: table.into(),
            config,
            chunker,
        }
    }

    pub fn with_defaults(client: Arc<dyn KvClient>, table: impl Into<String>) -> Self {
        Self::new(client, table, GatewayConfig::default())
    }

    /// Same client and config, different table.
    pub fn for_table(&self, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..self.clone()
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[instrument(skip(self), fields(table = %self.table), err)]
    pub async fn get(&self, pk: &str, sk: &str, consistent_read: bool) -> EntityResult<Option<Record>> {
        let input = GetItem {
            table: self.table.clone(),
            key: ItemKey::new(pk, sk),
            consistent_read,
        };
        let item = self.client.get_item(input).await.map_err(map_store_error)?;
        tracing::debug!(found = item.is_some(), "get");
        Ok(item)
    }

    /// First item of a prefix scan in the given direction.
    ///
    /// Keeps following cursors past empty pages until an item turns up.
    #[instrument(skip(self), fields(table = %self.table), err)]
    pub async fn query_first(
        &self,
        pk: &str,
        sk_prefix: &str,
        scan_forward: bool,
        consistent_read: bool,
    ) -> EntityResult<Option<Record>> {
        let mut input = QueryInput::new(self.table.clone(), pk, sk_prefix);
        input.scan_forward = scan_forward;
        input.consistent_read = consistent_read;
        input.limit = Some(1);

        loop {
            let page = self.client.query(input.clone()).await.map_err(map_store_error)?;
            if let Some(first) = page.items.into_iter().next() {
                return Ok(Some(first));
            }
            match page.last_evaluated_key {
                Some(cursor) => input.exclusive_start_key = Some(cursor),
                None => return Ok(None),
            }
        }
    }

    /// Prefix scan accumulated across pages, in store order for the chosen direction.
    #[instrument(skip(self, options), fields(table = %self.table, pages = tracing::field::Empty), err)]
    pub async fn query(
        &self,
        pk: &str,
        sk_prefix: &str,
        options: &QueryOptions,
    ) -> EntityResult<Vec<Record>> {
        let limit = options.limit.unwrap_or(self.config.query_limit);

        let mut input = QueryInput::new(self.table.clone(), pk, sk_prefix);
        input.scan_forward = options.scan_forward();
        input.consistent_read = options.consistent_read;
        input.filter = options.filter.clone();
        input.projection = options.projection.clone();

        let mut items = Vec::new();
        let mut pages = 0usize;
        loop {
            let page = self.client.query(input.clone()).await.map_err(map_store_error)?;
            pages += 1;
            items.extend(page.items);

            let reached = limit != 0 && items.len() >= limit;
            match page.last_evaluated_key {
                Some(cursor) if !reached => input.exclusive_start_key = Some(cursor),
                _ => break,
            }
        }

        if limit != 0 {
            items.truncate(limit);
        }
        tracing::Span::current().record("pages", pages);
        tracing::debug!(count = items.len(), pages, "query");
        Ok(items)
    }

    /// Build a put request without sending it.
    pub fn put_request(&self, item: Record, condition: Option<Condition>) -> PutItem {
        PutItem {
            table: self.table.clone(),
            item,
            condition,
        }
    }

    #[instrument(skip(self, item), fields(table = %self.table, pk = item.pk(), sk = item.sk()), err)]
    pub async fn put(&self, item: Record, condition: Option<Condition>) -> EntityResult<()> {
        self.execute(WriteRequest::Put(self.put_request(item, condition))).await
    }

    /// Build the update request for `attributes`, minus the immutable identity fields.
    ///
    /// The request only applies to an existing item.
    pub fn update_request(&self, key: &ItemKey, attributes: &Record) -> EntityResult<UpdateItem> {
        let set: Record = attributes
            .iter()
            .filter(|(field, _)| !fields::IMMUTABLE.contains(&field.as_str()))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        if set.is_empty() {
            return Err(EntityError::validation(format!("nothing to update at {key}")));
        }
        Ok(self.set_request(key, set, Some(Condition::Exists)))
    }

    /// Build a raw attribute rewrite. Unlike `update_request`, this may touch `ENTITY`.
    pub fn set_request(&self, key: &ItemKey, set: Record, condition: Option<Condition>) -> UpdateItem {
        UpdateItem {
            table: self.table.clone(),
            key: key.clone(),
            set,
            condition,
        }
    }

    /// Rewrite every non-identity attribute of an existing item.
    ///
    /// Fails with `RecordNotFound` when nothing is stored at `key`.
    #[instrument(skip(self, attributes), fields(table = %self.table, %key), err)]
    pub async fn update(&self, key: &ItemKey, attributes: &Record) -> EntityResult<Record> {
        let request = self.update_request(key, attributes)?;
        self.send_update(request).await
    }

    /// Rewrite the given attributes as-is.
    #[instrument(skip(self, set), fields(table = %self.table, %key), err)]
    pub async fn set_attributes(
        &self,
        key: &ItemKey,
        set: Record,
        condition: Option<Condition>,
    ) -> EntityResult<Record> {
        self.send_update(self.set_request(key, set, condition)).await
    }

    async fn send_update(&self, request: UpdateItem) -> EntityResult<Record> {
        let key = request.key.clone();
        self.client.update_item(request).await.map_err(|e| match e {
            StoreError::ConditionFailed(_) => EntityError::not_found(key.to_string()),
            other => map_store_error(other),
        })
    }

    /// Delete one item. Deleting a missing key succeeds.
    #[instrument(skip(self), fields(table = %self.table, %key), err)]
    pub async fn delete(&self, key: &ItemKey) -> EntityResult<()> {
        let input = DeleteItem {
            table: self.table.clone(),
            key: key.clone(),
            condition: None,
        };
        self.client.delete_item(input).await.map_err(map_store_error)
    }

    /// Delete every key, one batched request per chunk, sent one after another.
    ///
    /// Returns the number of batch requests issued.
    #[instrument(skip(self, keys), fields(table = %self.table, keys = keys.len()), err)]
    pub async fn batch_delete(&self, keys: Vec<ItemKey>) -> EntityResult<usize> {
        let chunks = self.chunker.chunk(keys);
        let requests = chunks.len();
        for chunk in chunks {
            let output = self
                .client
                .batch_write(BatchWrite {
                    table: self.table.clone(),
                    deletes: chunk,
                })
                .await
                .map_err(map_store_error)?;
            if !output.unprocessed.is_empty() {
                tracing::warn!(unprocessed = output.unprocessed.len(), "batch delete incomplete");
                return Err(EntityError::Unprocessed(output.unprocessed.len()));
            }
        }
        tracing::debug!(requests, "batch delete");
        Ok(requests)
    }

    /// All-or-nothing write. A failed condition surfaces as `ConflictExists`.
    #[instrument(skip(self, request), fields(table = %self.table, items = request.items.len()), err)]
    pub async fn transact(&self, request: TransactWrite) -> EntityResult<()> {
        self.client.transact_write(request).await.map_err(|e| {
            if e.is_condition_failure() {
                EntityError::conflict(e.to_string())
            } else {
                map_store_error(e)
            }
        })
    }

    /// Execute a request built by one of the `*_request` helpers.
    ///
    /// Steps of a `Sequence` run in order; the first failure stops it.
    pub async fn execute(&self, request: WriteRequest) -> EntityResult<()> {
        let mut pending = VecDeque::from([request]);
        while let Some(next) = pending.pop_front() {
            match next {
                WriteRequest::Put(put) => {
                    let key = put.item.key();
                    self.client.put_item(put).await.map_err(|e| match e {
                        StoreError::ConditionFailed(_) => {
                            tracing::warn!(error = %e, "store call failed");
                            EntityError::conflict(key.map(|k| k.to_string()).unwrap_or_default())
                        }
                        other => map_store_error(other),
                    })?;
                }
                WriteRequest::Update(update) => {
                    self.send_update(update).await?;
                }
                WriteRequest::Transact(tx) => self.transact(tx).await?,
                WriteRequest::Sequence(steps) => {
                    for step in steps.into_iter().rev() {
                        pending.push_front(step);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Map a store failure into the entity error taxonomy.
///
/// Condition failures default to `ConflictExists`; updates remap them to `RecordNotFound`.
pub fn map_store_error(err: StoreError) -> EntityError {
    tracing::warn!(error = %err, "store call failed");
    match err {
        StoreError::ConditionFailed(msg) => EntityError::conflict(msg),
        StoreError::TransactionCanceled(_) if err.is_condition_failure() => {
            EntityError::conflict(err.to_string())
        }
        StoreError::Validation(msg) => EntityError::validation(msg),
        other => EntityError::store(other.to_string()),
    }
}
