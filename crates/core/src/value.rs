//! Attribute values stored on a record.
//!
//! Records are semi-structured: any field may hold any of the variants below, and
//! typed accessors are layered on top for the fields an entity knows about.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AttrValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Rendered as an ISO-8601 string (millisecond precision, `Z` suffix) on the wire.
    Timestamp(DateTime<Utc>),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
}

/// Formats a timestamp the way records carry it, e.g. `2020-12-14T01:07:22.016Z`.
pub fn iso_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Timestamps read back from a remote store arrive as strings, so both forms are accepted.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            AttrValue::Timestamp(ts) => Some(*ts),
            AttrValue::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, AttrValue>> {
        match self {
            AttrValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            AttrValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Convert into the JSON shape used on the wire.
    pub fn into_json(self) -> JsonValue {
        match self {
            AttrValue::Null => JsonValue::Null,
            AttrValue::Bool(b) => JsonValue::Bool(b),
            AttrValue::Number(n) => number_to_json(n),
            AttrValue::String(s) => JsonValue::String(s),
            AttrValue::Timestamp(ts) => JsonValue::String(iso_timestamp(&ts)),
            AttrValue::List(items) => {
                JsonValue::Array(items.into_iter().map(AttrValue::into_json).collect())
            }
            AttrValue::Map(m) => JsonValue::Object(
                m.into_iter().map(|(k, v)| (k, v.into_json())).collect(),
            ),
        }
    }
}

// Whole numbers go out as integers so typed structs with integer fields read them back.
fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

impl From<JsonValue> for AttrValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => AttrValue::Null,
            JsonValue::Bool(b) => AttrValue::Bool(b),
            JsonValue::Number(n) => n.as_f64().map(AttrValue::Number).unwrap_or(AttrValue::Null),
            JsonValue::String(s) => AttrValue::String(s),
            JsonValue::Array(items) => {
                AttrValue::List(items.into_iter().map(AttrValue::from).collect())
            }
            JsonValue::Object(m) => {
                AttrValue::Map(m.into_iter().map(|(k, v)| (k, AttrValue::from(v))).collect())
            }
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Number(value as f64)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for AttrValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttrValue::Timestamp(value)
    }
}

impl Serialize for AttrValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttrValue::Null => serializer.serialize_unit(),
            AttrValue::Bool(b) => serializer.serialize_bool(*b),
            AttrValue::Number(n) => number_to_json(*n).serialize(serializer),
            AttrValue::String(s) => serializer.serialize_str(s),
            AttrValue::Timestamp(ts) => serializer.serialize_str(&iso_timestamp(ts)),
            AttrValue::List(items) => serializer.collect_seq(items),
            AttrValue::Map(m) => serializer.collect_map(m),
        }
    }
}

impl<'de> Deserialize<'de> for AttrValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(AttrValue::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_renders_like_iso_strings() {
        let ts = Utc.with_ymd_and_hms(2020, 12, 14, 1, 7, 22).unwrap()
            + chrono::Duration::milliseconds(16);
        let json = serde_json::to_value(AttrValue::Timestamp(ts)).unwrap();
        assert_eq!(json, JsonValue::String("2020-12-14T01:07:22.016Z".into()));
    }

    #[test]
    fn timestamp_accessor_parses_strings() {
        let v = AttrValue::from("2020-12-14T01:07:22.016Z");
        let ts = v.as_timestamp().expect("parses");
        assert_eq!(iso_timestamp(&ts), "2020-12-14T01:07:22.016Z");
        assert!(AttrValue::from("not a date").as_timestamp().is_none());
    }

    #[test]
    fn whole_numbers_stay_integers_in_json() {
        assert_eq!(AttrValue::from(3i64).into_json(), serde_json::json!(3));
        assert_eq!(AttrValue::from(1.5).into_json(), serde_json::json!(1.5));
    }

    #[test]
    fn nested_json_converts_both_ways() {
        let json = serde_json::json!({"a": [1, "x", true, null], "b": {"c": "d"}});
        let value = AttrValue::from(json.clone());
        assert_eq!(value.as_map().unwrap()["b"].as_map().unwrap()["c"].as_str(), Some("d"));
        assert_eq!(value.into_json(), json);
    }
}
