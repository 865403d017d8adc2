//! Flat attribute maps as stored in the table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{EntityError, EntityResult};
use crate::value::AttrValue;

/// Well-known attribute names shared by every entity.
pub mod fields {
    pub const PK: &str = "PK";
    pub const SK: &str = "SK";
    pub const ENTITY: &str = "ENTITY";
    pub const DT_CREATED: &str = "DT_CREATED";
    pub const DT_MODIFIED: &str = "DT_MODIFIED";

    /// Attributes an update never rewrites.
    pub const IMMUTABLE: [&str; 3] = [PK, SK, ENTITY];
}

const PATH_SEPARATOR: char = '.';

/// Composite primary key of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

impl core::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.pk, self.sk)
    }
}

/// A single item: attribute name to value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, AttrValue>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&AttrValue> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<AttrValue>) -> Option<AttrValue> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<AttrValue> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, AttrValue> {
        self.0
    }

    /// Read a (possibly nested) field by dotted path, e.g. `ADDRESS.CITY`.
    pub fn get_path(&self, path: &str) -> Option<&AttrValue> {
        let mut segments = path.split(PATH_SEPARATOR);
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    /// Write a field by dotted path, creating intermediate maps as needed.
    ///
    /// A non-map value sitting on the path is replaced by a map.
    pub fn set_path(&mut self, path: &str, value: impl Into<AttrValue>) {
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        let (last, parents) = match segments.split_last() {
            Some(split) => split,
            None => return,
        };

        let mut map = &mut self.0;
        for segment in parents {
            let slot = map
                .entry((*segment).to_string())
                .or_insert_with(|| AttrValue::Map(BTreeMap::new()));
            if !matches!(slot, AttrValue::Map(_)) {
                *slot = AttrValue::Map(BTreeMap::new());
            }
            let AttrValue::Map(inner) = slot else {
                return;
            };
            map = inner;
        }
        map.insert((*last).to_string(), value.into());
    }

    /// Remove a field by dotted path. Missing segments are ignored.
    pub fn remove_path(&mut self, path: &str) -> Option<AttrValue> {
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        let (last, parents) = segments.split_last()?;

        let mut map = &mut self.0;
        for segment in parents {
            map = match map.get_mut(*segment)? {
                AttrValue::Map(inner) => inner,
                _ => return None,
            };
        }
        map.remove(*last)
    }

    fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(AttrValue::as_str)
    }

    pub fn pk(&self) -> Option<&str> {
        self.str_field(fields::PK)
    }

    pub fn sk(&self) -> Option<&str> {
        self.str_field(fields::SK)
    }

    pub fn entity(&self) -> Option<&str> {
        self.str_field(fields::ENTITY)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.get(fields::DT_CREATED).and_then(AttrValue::as_timestamp)
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.get(fields::DT_MODIFIED).and_then(AttrValue::as_timestamp)
    }

    /// The composite key, if both components are present.
    pub fn key(&self) -> Option<ItemKey> {
        Some(ItemKey::new(self.pk()?, self.sk()?))
    }

    /// Copy of this record restricted to the given attributes.
    pub fn project(&self, attributes: &[String]) -> Record {
        Record(
            self.0
                .iter()
                .filter(|(k, _)| attributes.iter().any(|a| a == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Build a record from any serializable struct that renders as a JSON object.
    pub fn from_serialize<T: Serialize>(value: &T) -> EntityResult<Self> {
        match serde_json::to_value(value)
            .map_err(|e| EntityError::validation(format!("record serialization failed: {e}")))?
        {
            JsonValue::Object(map) => Ok(Record(
                map.into_iter().map(|(k, v)| (k, AttrValue::from(v))).collect(),
            )),
            other => Err(EntityError::validation(format!(
                "record must serialize to an object, got {other}"
            ))),
        }
    }

    /// Decode this record into a typed struct.
    pub fn to_deserialize<T: DeserializeOwned>(&self) -> EntityResult<T> {
        let json = JsonValue::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.clone().into_json()))
                .collect(),
        );
        serde_json::from_value(json)
            .map_err(|e| EntityError::validation(format!("record deserialization failed: {e}")))
    }
}

impl FromIterator<(String, AttrValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
        Record(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, AttrValue>> for Record {
    fn from(value: BTreeMap<String, AttrValue>) -> Self {
        Record(value)
    }
}

/// Returns true when `value` holds a non-empty, non-whitespace string.
pub fn is_non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_path_creates_intermediate_maps() {
        let mut record = Record::new();
        record.set_path("ADDRESS.GEO.LAT", 1.5);
        assert_eq!(record.get_path("ADDRESS.GEO.LAT"), Some(&AttrValue::Number(1.5)));
        assert!(record.get_path("ADDRESS.GEO.LNG").is_none());
        assert!(record.get_path("ADDRESS.GEO.LAT.X").is_none());
    }

    #[test]
    fn set_path_replaces_scalar_on_the_way() {
        let mut record = Record::new();
        record.insert("A", "scalar");
        record.set_path("A.B", "nested");
        assert_eq!(record.get_path("A.B").and_then(AttrValue::as_str), Some("nested"));
    }

    #[test]
    fn remove_path_ignores_missing_segments() {
        let mut record = Record::new();
        record.set_path("A.B", 1i64);
        assert!(record.remove_path("A.C").is_none());
        assert!(record.remove_path("X.Y").is_none());
        assert_eq!(record.remove_path("A.B"), Some(AttrValue::Number(1.0)));
        assert!(record.get_path("A").and_then(AttrValue::as_map).unwrap().is_empty());
    }

    #[test]
    fn typed_struct_round_trips_through_record() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Person {
            #[serde(rename = "EMAIL")]
            email: String,
            #[serde(rename = "AGE")]
            age: u32,
        }

        let person = Person {
            email: "a@b.c".into(),
            age: 42,
        };
        let record = Record::from_serialize(&person).unwrap();
        assert_eq!(record.get("EMAIL").and_then(AttrValue::as_str), Some("a@b.c"));
        assert_eq!(record.to_deserialize::<Person>().unwrap(), person);
    }

    #[test]
    fn non_object_serialization_is_rejected() {
        let err = Record::from_serialize(&42).unwrap_err();
        assert!(matches!(err, EntityError::Validation(_)));
    }

    #[test]
    fn blank_strings_are_not_identity() {
        assert!(!is_non_blank(None));
        assert!(!is_non_blank(Some("")));
        assert!(!is_non_blank(Some("   ")));
        assert!(is_non_blank(Some("PAGE")));
    }
}
