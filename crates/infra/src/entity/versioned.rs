//! Append-only versioned records.
//!
//! Every version of one logical key `(PK, type, sort)` is its own row, with sort key
//! `<type>#<sort>#<version>`. Versions start at 0 and grow by one per create:
//!
//! ```text
//! (none) ──create──▶ v0 ──create──▶ v1 ──create──▶ v2 ...
//! ```
//!
//! The newest row carries the head tag (`PAGE`); older rows are re-tagged as superseded
//! (`PAGE_V`). Rows are never rewritten otherwise, so `update` is refused.
//!
//! ## Retiring the previous head
//!
//! With `VersioningMode::Atomic` the retag and the insert go out as one transaction, so two
//! racing creators cannot both win: the loser's insert collides on the new key and the
//! whole transaction is cancelled with `ConflictExists`.
//!
//! With `VersioningMode::Sequential` the retag and the insert are independent calls. If the
//! insert fails after the retag succeeded, the previous head stays superseded with no new
//! head; nothing is rolled back.

use tablekit_core::{fields, EntityError, EntityResult, ItemKey, KeyCodec, Record};
use tracing::instrument;

use super::{
    base::EntityRecord, CreateOptions, Creatable, Deletable, EntityKind, Queryable, Updatable,
    WriteOutcome,
};
use crate::config::VersioningMode;
use crate::gateway::{QueryOptions, StorageGateway, WriteRequest};
use crate::store::{Condition, TransactItem, TransactWrite, UpdateItem};

/// Appended to the entity type to mark a row as an older version.
pub const SUPERSEDED_SUFFIX: &str = "_V";

/// First version number written for a logical key.
pub const INITIAL_VERSION: u64 = 0;

#[derive(Debug)]
pub struct VersionedRecord {
    base: EntityRecord,
}

fn versioned_codec(gateway: &StorageGateway) -> KeyCodec {
    KeyCodec::versioned().with_version_width(gateway.config().version_width)
}

impl VersionedRecord {
    pub fn new(gateway: StorageGateway, entity_type: impl Into<String>) -> Self {
        let codec = versioned_codec(&gateway);
        Self {
            base: EntityRecord::new(gateway, entity_type, codec),
        }
    }

    pub fn from_record(gateway: StorageGateway, entity_type: impl Into<String>, record: Record) -> Self {
        let codec = versioned_codec(&gateway);
        Self {
            base: EntityRecord::from_record(gateway, entity_type, codec, record),
        }
    }

    pub fn for_kind<K: EntityKind>(gateway: &StorageGateway) -> Self {
        Self {
            base: EntityRecord::for_kind_with::<K>(gateway, versioned_codec(gateway)),
        }
    }

    /// Extra checks run before each create.
    pub fn validate_with<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Record) -> EntityResult<()> + Send + Sync + 'static,
    {
        self.base = self.base.validate_with(validator);
        self
    }

    pub fn from_base(base: EntityRecord) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &EntityRecord {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut EntityRecord {
        &mut self.base
    }

    pub fn into_base(self) -> EntityRecord {
        self.base
    }

    pub fn head_tag(&self) -> &str {
        self.base.entity_type()
    }

    pub fn superseded_tag(&self) -> String {
        format!("{}{SUPERSEDED_SUFFIX}", self.base.entity_type())
    }

    /// Point SK at `sort`, keeping the current version, or version 0 with `reset`.
    pub fn set_sort(&mut self, sort: &str, reset: bool) -> EntityResult<&mut Self> {
        let version = if reset { INITIAL_VERSION } else { self.version()? };
        let sk = self
            .base
            .codec()
            .build(self.base.entity_type(), sort, Some(version))?;
        self.base.set_raw_sk(sk);
        Ok(self)
    }

    /// Version encoded in the current SK; 0 when no SK is set.
    pub fn version(&self) -> EntityResult<u64> {
        match self.base.sk() {
            Some(sk) => self.base.codec().version_of(sk),
            None => Ok(INITIAL_VERSION),
        }
    }

    /// Logical sort value of the current SK.
    pub fn sort_value(&self) -> EntityResult<Option<String>> {
        self.base
            .sk()
            .map(|sk| self.base.codec().parse(sk).map(|parts| parts.sort))
            .transpose()
    }

    fn logical_prefix(&self, sk: &str) -> EntityResult<String> {
        let parts = self.base.codec().parse(sk)?;
        self.base.codec().prefix(self.base.entity_type(), &parts.sort)
    }

    fn prefix_for_sort(&self, sort: &str) -> EntityResult<String> {
        self.base.codec().prefix(self.base.entity_type(), sort)
    }

    /// Logical prefix for either a full SK of this type or a bare sort value.
    fn prefix_for_lookup(&self, sort_or_sk: &str) -> EntityResult<String> {
        match self.base.codec().parse(sort_or_sk) {
            Ok(parts) if parts.entity_type == self.base.entity_type() => {
                self.base.codec().without_version(sort_or_sk, true)
            }
            _ => self.prefix_for_sort(sort_or_sk),
        }
    }

    fn consistent_reads(&self) -> bool {
        self.base.gateway().config().consistent_reads
    }

    /// Write the next version. Alias of `create`.
    pub async fn put(&mut self, dry_run: bool) -> EntityResult<WriteOutcome> {
        let options = CreateOptions {
            dry_run,
            ..CreateOptions::default()
        };
        self.create(options).await
    }

    /// Latest version of the logical key `(pk, sort)`, whatever its tag.
    pub async fn get_latest(&self, pk: &str, sort: &str, consistent_read: bool) -> EntityResult<Option<Record>> {
        let prefix = self.prefix_for_sort(sort)?;
        self.base
            .gateway()
            .query_first(pk, &prefix, false, consistent_read)
            .await
    }

    /// Exact fetch of one version.
    pub async fn get_version(&self, pk: &str, sort: &str, version: u64) -> EntityResult<Option<Record>> {
        let sk = self
            .base
            .codec()
            .build(self.base.entity_type(), sort, Some(version))?;
        self.base.gateway().get(pk, &sk, self.consistent_reads()).await
    }

    /// Every version of `(pk, sort)`, oldest first.
    pub async fn history(&self, pk: &str, sort: &str) -> EntityResult<Vec<Record>> {
        let prefix = self.prefix_for_sort(sort)?;
        let mut options = QueryOptions::ascending().unbounded();
        options.consistent_read = self.consistent_reads();
        self.base.gateway().query(pk, &prefix, &options).await
    }

    /// Delete only the row at the current SK; older versions stay.
    #[instrument(skip(self), err)]
    pub async fn delete_current_version(&self) -> EntityResult<()> {
        let key = self.base.key()?;
        self.base.gateway().delete(&key).await
    }

    fn retag_request(&self, head: &ItemKey) -> UpdateItem {
        let mut set = Record::new();
        set.insert(fields::ENTITY, self.superseded_tag());
        self.base
            .gateway()
            .set_request(head, set, Some(Condition::Exists))
    }
}

#[async_trait::async_trait]
impl Creatable for VersionedRecord {
    /// Append a new version after the current head.
    ///
    /// `check_exists` is ignored: the new key is always guarded with `NotExists`.
    #[instrument(skip(self), err)]
    async fn create(&mut self, options: CreateOptions) -> EntityResult<WriteOutcome> {
        self.base.validate()?;
        self.base.stamp_created();

        let (pk, sk) = {
            let key = self.base.key()?;
            (key.pk, key.sk)
        };
        let parts = self.base.codec().parse(&sk)?;
        let prefix = self.logical_prefix(&sk)?;

        let gateway = self.base.gateway().clone();
        let head = gateway.query_first(&pk, &prefix, false, true).await?;
        let (head_key, next) = match &head {
            Some(row) => {
                let head_sk = row
                    .sk()
                    .ok_or_else(|| EntityError::malformed_key("stored version has no SK"))?;
                let current = self.base.codec().version_of(head_sk)?;
                let next = current.checked_add(1).ok_or_else(|| {
                    EntityError::malformed_key(format!("'{head_sk}' is the last representable version"))
                })?;
                (Some(ItemKey::new(pk.clone(), head_sk)), next)
            }
            None => (None, INITIAL_VERSION),
        };

        let new_sk = self
            .base
            .codec()
            .build(self.base.entity_type(), &parts.sort, Some(next))?;
        self.base.set_raw_sk(new_sk);
        let tag = self.head_tag().to_string();
        self.base.set_entity_tag(tag);

        let put = gateway.put_request(self.base.data().clone(), Some(Condition::NotExists));
        let request = match (head_key, gateway.config().versioning) {
            (None, _) => WriteRequest::Put(put),
            (Some(head), VersioningMode::Atomic) => WriteRequest::Transact(TransactWrite {
                items: vec![
                    TransactItem::Update(self.retag_request(&head)),
                    TransactItem::Put(put),
                ],
            }),
            (Some(head), VersioningMode::Sequential) => WriteRequest::Sequence(vec![
                WriteRequest::Update(self.retag_request(&head)),
                WriteRequest::Put(put),
            ]),
        };

        tracing::debug!(version = next, pk = %pk, "versioned create");
        if options.dry_run {
            return Ok(WriteOutcome::DryRun(request));
        }

        gateway.execute(request).await?;
        self.base.mark_linked();
        Ok(WriteOutcome::Executed)
    }
}

#[async_trait::async_trait]
impl Updatable for VersionedRecord {
    async fn update(&mut self, _dry_run: bool) -> EntityResult<WriteOutcome> {
        Err(EntityError::unsupported(
            "versioned records are immutable; create a new version instead",
        ))
    }
}

#[async_trait::async_trait]
impl Deletable for VersionedRecord {
    /// Remove every version of the current logical key.
    #[instrument(skip(self), err)]
    async fn delete(&self) -> EntityResult<()> {
        let key = self.base.key()?;
        let prefix = self.logical_prefix(&key.sk)?;

        let options = QueryOptions::ascending()
            .unbounded()
            .consistent()
            .project([fields::PK, fields::SK]);
        let rows = self.base.gateway().query(&key.pk, &prefix, &options).await?;
        let keys: Vec<ItemKey> = rows.iter().filter_map(Record::key).collect();

        let requests = self.base.gateway().batch_delete(keys).await?;
        tracing::debug!(versions = rows.len(), requests, "deleted version history");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Queryable for VersionedRecord {
    /// Latest version for a bare sort value or a full SK; the version segment is ignored.
    async fn get(&self, pk: &str, sk: &str, consistent_read: bool) -> EntityResult<Option<Record>> {
        let prefix = self.prefix_for_lookup(sk)?;
        self.base
            .gateway()
            .query_first(pk, &prefix, false, consistent_read)
            .await
    }

    async fn query(&self, pk: &str, sk_prefix: &str, options: QueryOptions) -> EntityResult<Vec<Record>> {
        self.base.gateway().query(pk, sk_prefix, &options).await
    }
}
