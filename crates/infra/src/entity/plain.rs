use tablekit_core::{EntityResult, KeyCodec, Record};
use tracing::instrument;

use super::{
    base::EntityRecord, CreateOptions, Creatable, Deletable, EntityKind, Queryable, Updatable,
    WriteOutcome,
};
use crate::gateway::{QueryOptions, StorageGateway, WriteRequest};
use crate::store::Condition;

/// Record with generic conditional CRUD and sort keys of the form `[type]#[sort]`.
#[derive(Debug)]
pub struct PlainRecord {
    base: EntityRecord,
}

impl PlainRecord {
    pub fn new(gateway: StorageGateway, entity_type: impl Into<String>) -> Self {
        Self::with_codec(gateway, entity_type, KeyCodec::plain())
    }

    /// Use a custom sort-key template instead of `[type]#[sort]`.
    pub fn with_codec(gateway: StorageGateway, entity_type: impl Into<String>, codec: KeyCodec) -> Self {
        Self {
            base: EntityRecord::new(gateway, entity_type, codec),
        }
    }

    pub fn from_record(gateway: StorageGateway, entity_type: impl Into<String>, record: Record) -> Self {
        Self {
            base: EntityRecord::from_record(gateway, entity_type, KeyCodec::plain(), record),
        }
    }

    pub fn for_kind<K: EntityKind>(gateway: &StorageGateway) -> Self {
        Self {
            base: EntityRecord::for_kind_with::<K>(gateway, KeyCodec::plain()),
        }
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
}

#[async_trait::async_trait]
impl Creatable for PlainRecord {
    /// Put the record, stamping `DT_CREATED` and the entity tag.
    ///
    /// With `check_exists`, an item already at the key fails with `ConflictExists`.
    #[instrument(skip(self), err)]
    async fn create(&mut self, options: CreateOptions) -> EntityResult<WriteOutcome> {
        self.base.validate()?;
        self.base.stamp_created();
        let tag = self.base.entity_type().to_string();
        self.base.set_entity_tag(tag);

        let condition = options.check_exists.then_some(Condition::NotExists);
        let request = WriteRequest::Put(
            self.base
                .gateway()
                .put_request(self.base.data().clone(), condition),
        );
        if options.dry_run {
            return Ok(WriteOutcome::DryRun(request));
        }

        self.base.gateway().execute(request).await?;
        self.base.mark_linked();
        Ok(WriteOutcome::Executed)
    }
}

#[async_trait::async_trait]
impl Updatable for PlainRecord {
    /// Rewrite every attribute except `PK`, `SK` and `ENTITY`, stamping `DT_MODIFIED`.
    #[instrument(skip(self), err)]
    async fn update(&mut self, dry_run: bool) -> EntityResult<WriteOutcome> {
        self.base.validate()?;
        self.base.stamp_modified();

        let key = self.base.key()?;
        let request = self.base.gateway().update_request(&key, self.base.data())?;
        if dry_run {
            return Ok(WriteOutcome::DryRun(WriteRequest::Update(request)));
        }

        let stored = self.base.gateway().update(&key, self.base.data()).await?;
        self.base.replace_data(stored);
        self.base.mark_linked();
        Ok(WriteOutcome::Executed)
    }
}

#[async_trait::async_trait]
impl Deletable for PlainRecord {
    async fn delete(&self) -> EntityResult<()> {
        let key = self.base.key()?;
        self.base.gateway().delete(&key).await
    }
}

#[async_trait::async_trait]
impl Queryable for PlainRecord {
    async fn get(&self, pk: &str, sk: &str, consistent_read: bool) -> EntityResult<Option<Record>> {
        self.base.gateway().get(pk, sk, consistent_read).await
    }

    async fn query(&self, pk: &str, sk_prefix: &str, options: QueryOptions) -> EntityResult<Vec<Record>> {
        self.base.gateway().query(pk, sk_prefix, &options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tablekit_core::{fields, AttrValue, EntityError};

    use crate::store::InMemoryKvStore;

    fn record(store: &Arc<InMemoryKvStore>) -> PlainRecord {
        let gw = StorageGateway::with_defaults(store.clone(), "plain-test");
        let mut record = PlainRecord::new(gw, "PEOPLE");
        record.base_mut().set_pk("a@b.c").set_sk("a@b.c").unwrap();
        record.base_mut().set_value("NAME", "Ada");
        record
    }

    #[tokio::test]
    async fn create_then_get_round_trips_attributes() {
        let store = Arc::new(InMemoryKvStore::new());
        let mut person = record(&store);
        assert!(person.create(CreateOptions::default()).await.unwrap().is_executed());
        assert!(person.base().is_linked());

        let row = person.get("a@b.c", "PEOPLE#a@b.c", true).await.unwrap().unwrap();
        assert_eq!(row.get("NAME"), Some(&AttrValue::from("Ada")));
        assert_eq!(row.entity(), Some("PEOPLE"));
        assert!(row.created_at().is_some());
    }

    #[tokio::test]
    async fn dry_run_returns_conditional_put() {
        let store = Arc::new(InMemoryKvStore::new());
        let mut person = record(&store);

        let outcome = person.create(CreateOptions::dry_run()).await.unwrap();
        match outcome.into_request() {
            Some(WriteRequest::Put(put)) => {
                assert_eq!(put.table, "plain-test");
                assert_eq!(put.condition, Some(Condition::NotExists));
                assert_eq!(put.item.get("NAME"), Some(&AttrValue::from("Ada")));
            }
            other => panic!("unexpected request: {other:?}"),
        }
        assert_eq!(store.calls().put, 0);
        assert!(store.items("plain-test").is_empty());
    }

    #[tokio::test]
    async fn overwrite_skips_existence_check() {
        let store = Arc::new(InMemoryKvStore::new());
        record(&store).create(CreateOptions::default()).await.unwrap();

        let err = record(&store).create(CreateOptions::default()).await.unwrap_err();
        assert!(matches!(err, EntityError::ConflictExists(_)));

        record(&store).create(CreateOptions::overwrite()).await.unwrap();
        assert_eq!(store.items("plain-test").len(), 1);
    }

    #[tokio::test]
    async fn create_without_key_never_reaches_the_store() {
        let store = Arc::new(InMemoryKvStore::new());
        let gw = StorageGateway::with_defaults(store.clone(), "plain-test");
        let mut person = PlainRecord::new(gw, "PEOPLE");
        let err = person.create(CreateOptions::default()).await.unwrap_err();
        assert!(matches!(err, EntityError::Validation(_)));
        assert_eq!(store.calls(), Default::default());
    }

    #[tokio::test]
    async fn update_stamps_modified_and_keeps_tag() {
        let store = Arc::new(InMemoryKvStore::new());
        let mut person = record(&store);
        person.create(CreateOptions::default()).await.unwrap();

        person.base_mut().set_value("NAME", "Grace");
        person.base_mut().set_value(fields::ENTITY, "OTHER");
        person.update(false).await.unwrap();

        let row = person.get("a@b.c", "PEOPLE#a@b.c", true).await.unwrap().unwrap();
        assert_eq!(row.get("NAME"), Some(&AttrValue::from("Grace")));
        assert_eq!(row.entity(), Some("PEOPLE"));
        assert!(row.modified_at().is_some());
        assert_eq!(person.base().data().entity(), Some("PEOPLE"));
    }

    #[tokio::test]
    async fn update_of_missing_item_is_not_found() {
        let store = Arc::new(InMemoryKvStore::new());
        let mut person = record(&store);
        let err = person.update(false).await.unwrap_err();
        assert!(matches!(err, EntityError::RecordNotFound(_)));

        let dry = person.update(true).await.unwrap().into_request();
        assert!(matches!(dry, Some(WriteRequest::Update(u)) if u.condition == Some(Condition::Exists)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = Arc::new(InMemoryKvStore::new());
        let mut person = record(&store);
        person.create(CreateOptions::default()).await.unwrap();

        person.delete().await.unwrap();
        person.delete().await.unwrap();
        assert!(person.get("a@b.c", "PEOPLE#a@b.c", true).await.unwrap().is_none());
        assert_eq!(store.calls().delete, 2);
    }
}
