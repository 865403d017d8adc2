use std::sync::Arc;

use chrono::Utc;

use tablekit_core::{
    fields, is_non_blank, AttrValue, EntityError, EntityResult, ItemKey, KeyCodec, Record,
};

use super::EntityKind;
use crate::gateway::StorageGateway;

type Validator = Arc<dyn Fn(&Record) -> EntityResult<()> + Send + Sync>;

/// Field layout shared by every record kind.
///
/// Owns its in-memory `Record` exclusively; only the gateway handle is shared.
pub struct EntityRecord {
    gateway: StorageGateway,
    entity_type: String,
    codec: KeyCodec,
    data: Record,
    linked: bool,
    validator: Option<Validator>,
}

impl core::fmt::Debug for EntityRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EntityRecord")
            .field("table", &self.gateway.table())
            .field("entity_type", &self.entity_type)
            .field("template", &self.codec.template())
            .field("data", &self.data)
            .field("linked", &self.linked)
            .finish()
    }
}

impl EntityRecord {
    pub fn new(gateway: StorageGateway, entity_type: impl Into<String>, codec: KeyCodec) -> Self {
        Self {
            gateway,
            entity_type: entity_type.into(),
            codec,
            data: Record::new(),
            linked: false,
            validator: None,
        }
    }

    /// Wrap a row read from storage. The result is linked to storage.
    pub fn from_record(
        gateway: StorageGateway,
        entity_type: impl Into<String>,
        codec: KeyCodec,
        record: Record,
    ) -> Self {
        Self {
            data: record,
            linked: true,
            ..Self::new(gateway, entity_type, codec)
        }
    }

    /// Fresh record for a declared entity kind, on that kind's table.
    ///
    /// The sort-key template follows `K::VERSIONED`.
    pub fn for_kind<K: EntityKind>(gateway: &StorageGateway) -> Self {
        let codec = if K::VERSIONED {
            KeyCodec::versioned().with_version_width(gateway.config().version_width)
        } else {
            KeyCodec::plain()
        };
        Self::for_kind_with::<K>(gateway, codec)
    }

    pub(crate) fn for_kind_with<K: EntityKind>(gateway: &StorageGateway, codec: KeyCodec) -> Self {
        let mut record = Self::new(gateway.for_table(K::TABLE_NAME), K::ENTITY_TYPE, codec);
        if let Some(pk) = K::PK_DEFAULT {
            record.set_pk(pk);
        }
        record
    }

    /// Extra checks run by `validate()` after the identity fields.
    pub fn validate_with<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Record) -> EntityResult<()> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn data(&self) -> &Record {
        &self.data
    }

    pub fn into_data(self) -> Record {
        self.data
    }

    /// Whether this record was read from, or written to, storage.
    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub(crate) fn mark_linked(&mut self) {
        self.linked = true;
    }

    pub(crate) fn replace_data(&mut self, data: Record) {
        self.data = data;
    }

    pub fn pk(&self) -> Option<&str> {
        self.data.pk()
    }

    pub fn sk(&self) -> Option<&str> {
        self.data.sk()
    }

    pub fn set_pk(&mut self, pk: impl Into<String>) -> &mut Self {
        self.data.insert(fields::PK, pk.into());
        self
    }

    /// Set SK from the template using this record's entity type.
    pub fn set_sk(&mut self, sort: &str) -> EntityResult<&mut Self> {
        let version = if self.codec.is_versioned() { Some(0) } else { None };
        let sk = self.codec.build(&self.entity_type, sort, version)?;
        Ok(self.set_raw_sk(sk))
    }

    pub fn set_raw_sk(&mut self, sk: impl Into<String>) -> &mut Self {
        self.data.insert(fields::SK, sk.into());
        self
    }

    pub(crate) fn set_entity_tag(&mut self, tag: impl Into<String>) {
        self.data.insert(fields::ENTITY, tag.into());
    }

    /// Write a field by dotted path, e.g. `ADDRESS.CITY`.
    pub fn set_value(&mut self, path: &str, value: impl Into<AttrValue>) -> &mut Self {
        self.data.set_path(path, value);
        self
    }

    pub fn get_value(&self, path: &str) -> Option<&AttrValue> {
        self.data.get_path(path)
    }

    pub fn remove_value(&mut self, path: &str) -> Option<AttrValue> {
        self.data.remove_path(path)
    }

    pub(crate) fn stamp_created(&mut self) {
        self.data.insert(fields::DT_CREATED, Utc::now());
    }

    pub(crate) fn stamp_modified(&mut self) {
        self.data.insert(fields::DT_MODIFIED, Utc::now());
    }

    /// Identity checks, then the entity's own rules. Runs before any store call.
    pub fn validate(&self) -> EntityResult<()> {
        if !is_non_blank(self.pk()) {
            return Err(EntityError::validation("PK required"));
        }
        if !is_non_blank(self.sk()) {
            return Err(EntityError::validation("SK required"));
        }
        match &self.validator {
            Some(validator) => validator(&self.data),
            None => Ok(()),
        }
    }

    /// Current composite key; fails when either component is missing or blank.
    pub fn key(&self) -> EntityResult<ItemKey> {
        match (self.pk(), self.sk()) {
            (Some(pk), Some(sk)) if is_non_blank(Some(pk)) && is_non_blank(Some(sk)) => {
                Ok(ItemKey::new(pk, sk))
            }
            _ => Err(EntityError::validation("PK and SK required")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryKvStore;

    struct Order;

    impl EntityKind for Order {
        const TABLE_NAME: &'static str = "orders";
        const ENTITY_TYPE: &'static str = "ORDER";
        const PK_DEFAULT: Option<&'static str> = Some("ORDERS");
    }

    fn gateway() -> StorageGateway {
        StorageGateway::with_defaults(Arc::new(InMemoryKvStore::new()), "default")
    }

    #[test]
    fn for_kind_uses_declared_table_and_pk() {
        let record = EntityRecord::for_kind::<Order>(&gateway());
        assert_eq!(record.gateway().table(), "orders");
        assert_eq!(record.pk(), Some("ORDERS"));
        assert!(!record.is_linked());
        assert!(!record.codec().is_versioned());
    }

    #[test]
    fn versioned_kind_gets_versioned_template() {
        struct Note;

        impl EntityKind for Note {
            const TABLE_NAME: &'static str = "notes";
            const ENTITY_TYPE: &'static str = "NOTE";
            const VERSIONED: bool = true;
        }

        let mut record = EntityRecord::for_kind::<Note>(&gateway());
        assert!(record.codec().is_versioned());
        assert_eq!(record.pk(), None);
        record.set_sk("today").unwrap();
        assert_eq!(record.sk(), Some("NOTE#today#0000000000"));
    }

    #[test]
    fn from_record_is_linked() {
        let mut row = Record::new();
        row.insert(fields::PK, "P");
        let record = EntityRecord::from_record(gateway(), "ORDER", KeyCodec::plain(), row);
        assert!(record.is_linked());
        assert_eq!(record.pk(), Some("P"));
    }

    #[test]
    fn validate_requires_non_blank_identity() {
        let mut record = EntityRecord::new(gateway(), "ORDER", KeyCodec::plain());
        assert_eq!(record.validate(), Err(EntityError::validation("PK required")));
        record.set_pk("  ");
        assert_eq!(record.validate(), Err(EntityError::validation("PK required")));
        record.set_pk("P");
        assert_eq!(record.validate(), Err(EntityError::validation("SK required")));
        record.set_sk("1").unwrap();
        assert_eq!(record.sk(), Some("ORDER#1"));
        assert!(record.validate().is_ok());
    }

    #[test]
    fn custom_validator_runs_after_identity() {
        let mut record = EntityRecord::new(gateway(), "ORDER", KeyCodec::plain()).validate_with(|r| {
            match r.get("TOTAL") {
                Some(_) => Ok(()),
                None => Err(EntityError::validation("TOTAL required")),
            }
        });
        record.set_pk("P").set_sk("1").unwrap();
        assert_eq!(record.validate(), Err(EntityError::validation("TOTAL required")));
        record.set_value("TOTAL", 10i64);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn field_paths_on_the_record() {
        let mut record = EntityRecord::new(gateway(), "ORDER", KeyCodec::plain());
        record.set_value("SHIP.CITY", "Lisbon");
        assert_eq!(record.get_value("SHIP.CITY").and_then(AttrValue::as_str), Some("Lisbon"));
        assert!(record.get_value("SHIP.ZIP").is_none());
        assert!(record.remove_value("SHIP.CITY").is_some());
    }
}
