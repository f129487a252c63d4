use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::serde_utils::{deserialize_fields_from_map, serialize_fields_as_map};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode record: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A single field value.
///
/// Timestamps serialize as RFC 3339 strings. `Raw` holds bytes taken
/// straight off the wire; it serializes as a string and fails to
/// serialize when the bytes are not UTF-8.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Timestamp(DateTime<Utc>),
    Raw(Bytes),
    Null,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Raw(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<u8> for FieldValue {
    fn from(value: u8) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Bytes> for FieldValue {
    fn from(value: Bytes) -> Self {
        FieldValue::Raw(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl Serialize for FieldValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Int(n) => serializer.serialize_i64(*n),
            FieldValue::Timestamp(ts) => ts.serialize(serializer),
            FieldValue::Raw(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => serializer.serialize_str(s),
                Err(e) => Err(serde::ser::Error::custom(format!(
                    "raw field is not valid UTF-8 (invalid byte at offset {})",
                    e.valid_up_to()
                ))),
            },
            FieldValue::Null => serializer.serialize_unit(),
        }
    }
}

// Timestamps and raw bytes come back as `Text`; the wire form cannot tell them apart.
impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = FieldValue;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string, an integer or null")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<FieldValue, E> {
                Ok(FieldValue::Text(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<FieldValue, E> {
                Ok(FieldValue::Text(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<FieldValue, E> {
                Ok(FieldValue::Int(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<FieldValue, E> {
                i64::try_from(v)
                    .map(FieldValue::Int)
                    .map_err(|_| E::custom(format!("integer {} out of range", v)))
            }

            fn visit_unit<E: de::Error>(self) -> Result<FieldValue, E> {
                Ok(FieldValue::Null)
            }

            fn visit_none<E: de::Error>(self) -> Result<FieldValue, E> {
                Ok(FieldValue::Null)
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Where a record came from. Never serialized; used to name a record in
/// error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOrigin {
    pub peer: SocketAddr,
    /// Per-listener arrival counter, starting at 0.
    pub sequence: u64,
}

impl fmt::Display for RecordOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} from {}", self.sequence, self.peer)
    }
}

/// One decoded log message: an ordered list of named values.
///
/// Serializes to a JSON object whose keys appear in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecord {
    fields: Vec<(String, FieldValue)>,
    origin: Option<RecordOrigin>,
}

impl LogRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
            origin: None,
        }
    }

    /// Builder-style [`LogRecord::push`].
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.push(key, value);
        self
    }

    /// Append a field. Keys are not deduplicated.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.push((key.into(), value.into()));
    }

    pub fn with_origin(mut self, origin: RecordOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn origin(&self) -> Option<&RecordOrigin> {
        self.origin.as_ref()
    }

    /// Human-readable identity for error reports, when the origin is known.
    pub fn identity(&self) -> Option<String> {
        self.origin.as_ref().map(|o| o.to_string())
    }

    /// Encode as a compact JSON object.
    pub fn to_json(&self) -> Result<String, RecordError> {
        serde_json::to_string(self).map_err(RecordError::Encode)
    }

    /// Decode a payload produced by [`LogRecord::to_json`]. The origin is not restored.
    pub fn from_json(payload: &str) -> Result<Self, RecordError> {
        serde_json::from_str(payload).map_err(RecordError::Decode)
    }
}

impl Serialize for LogRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serialize_fields_as_map(&self.fields, serializer)
    }
}

impl<'de> Deserialize<'de> for LogRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self {
            fields: deserialize_fields_from_map(deserializer)?,
            origin: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn origin() -> RecordOrigin {
        RecordOrigin {
            peer: "10.0.0.7:51514".parse().unwrap(),
            sequence: 42,
        }
    }

    #[test]
    fn test_to_json_keeps_insertion_order() {
        let record = LogRecord::new()
            .field("severity", 3)
            .field("hostname", "web-01")
            .field("app_name", "nginx");
        assert_eq!(
            record.to_json().unwrap(),
            r#"{"severity":3,"hostname":"web-01","app_name":"nginx"}"#
        );
    }

    #[test]
    fn test_round_trip_text_and_int() {
        let record = LogRecord::new().field("a", 1).field("b", "x");
        let decoded = LogRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.get("a").and_then(FieldValue::as_int), Some(1));
        assert_eq!(decoded.get("b").and_then(FieldValue::as_str), Some("x"));
    }

    #[test]
    fn test_timestamp_serializes_as_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2003, 10, 11, 22, 14, 15).unwrap();
        let record = LogRecord::new().field("timestamp", ts);
        assert_eq!(record.to_json().unwrap(), r#"{"timestamp":"2003-10-11T22:14:15Z"}"#);
    }

    #[test]
    fn test_null_and_option_values() {
        let missing: Option<String> = None;
        let record = LogRecord::new()
            .field("proc_id", missing)
            .field("msg_id", Some("ID47".to_string()));
        assert_eq!(record.to_json().unwrap(), r#"{"proc_id":null,"msg_id":"ID47"}"#);
        assert!(record.get("proc_id").unwrap().is_null());
    }

    #[test]
    fn test_raw_utf8_serializes_as_string() {
        let record = LogRecord::new().field("content", Bytes::from_static(b"plain text"));
        assert_eq!(record.to_json().unwrap(), r#"{"content":"plain text"}"#);
    }

    #[test]
    fn test_raw_invalid_utf8_fails_to_encode() {
        let record = LogRecord::new()
            .field("content", Bytes::from_static(b"ok\xff\xfe"))
            .with_origin(origin());
        let err = record.to_json().unwrap_err();
        assert!(matches!(err, RecordError::Encode(_)));
        assert!(err.to_string().contains("not valid UTF-8"), "got: {}", err);
    }

    #[test]
    fn test_origin_is_not_serialized() {
        let record = LogRecord::new().field("msg", "a").with_origin(origin());
        assert_eq!(record.to_json().unwrap(), r#"{"msg":"a"}"#);
        assert_eq!(record.identity().as_deref(), Some("#42 from 10.0.0.7:51514"));
    }

    #[test]
    fn test_identity_absent_without_origin() {
        assert!(LogRecord::new().field("msg", "a").identity().is_none());
    }

    #[test]
    fn test_duplicate_keys_are_preserved() {
        let mut record = LogRecord::with_capacity(2);
        record.push("tag", "first");
        record.push("tag", "second");
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("tag").and_then(FieldValue::as_str), Some("first"));
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["tag", "tag"]);
    }

    #[test]
    fn test_from_json_rejects_nested_values() {
        let err = LogRecord::from_json(r#"{"a":{"nested":true}}"#).unwrap_err();
        assert!(matches!(err, RecordError::Decode(_)));
    }
}
