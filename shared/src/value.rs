//! Document values as the roster core sees them.
//!
//! The backing store distinguishes a field that was never provided from one
//! that is explicitly `null`, and refuses writes that carry the former. This
//! module models that distinction with [`Value::Absent`], strips it with
//! [`Value::sanitized`], and provides the change-detection comparator used
//! before every write.

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Insertion-ordered field map of a document or nested object.
pub type Fields = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value provided. Never persisted.
    #[default]
    Absent,
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Value>),
    Object(Fields),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `true` for absent and null.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Absent | Value::Null)
    }

    /// JavaScript truthiness: `false`, `0`, `""`, null and absent are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Absent | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Fields> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Deep copy with every absent marker removed.
    ///
    /// Object keys holding [`Value::Absent`] are dropped and the remaining
    /// keys keep their order. Array elements are sanitized in place; an absent
    /// element becomes `Null` so the array keeps its length. Idempotent.
    pub fn sanitized(&self) -> Value {
        match self {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Absent => Value::Null,
                        other => other.sanitized(),
                    })
                    .collect(),
            ),
            Value::Object(fields) => Value::Object(sanitize_fields(fields)),
            other => other.clone(),
        }
    }

    /// Path of the first absent marker, if any, e.g. `staff[1].photo`.
    pub fn absent_path(&self) -> Option<String> {
        match self {
            Value::Absent => Some(String::new()),
            Value::Array(items) => items.iter().enumerate().find_map(|(i, item)| {
                item.absent_path().map(|rest| join_path(&format!("[{}]", i), &rest))
            }),
            Value::Object(fields) => fields_absent_path(fields),
            _ => None,
        }
    }

    /// Deterministic text form used for change detection.
    ///
    /// Object keys are emitted in the order currently held, so two maps with
    /// the same entries in a different order do not compare equal.
    pub fn canonical_string(&self) -> String {
        // Serializing a string-keyed tree into a String cannot fail.
        serde_json::to_string(&self.sanitized()).unwrap_or_default()
    }
}

/// Change-detection comparator: equal when both sanitize to the same text.
///
/// This is a heuristic, not an equality law. See [`Value::canonical_string`]
/// for the key-order caveat.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    a.canonical_string() == b.canonical_string()
}

pub fn sanitize_fields(fields: &Fields) -> Fields {
    fields
        .iter()
        .filter(|(_, v)| !v.is_absent())
        .map(|(k, v)| (k.clone(), v.sanitized()))
        .collect()
}

/// Path of the first absent marker inside a field map.
pub fn fields_absent_path(fields: &Fields) -> Option<String> {
    fields
        .iter()
        .find_map(|(k, v)| v.absent_path().map(|rest| join_path(k, &rest)))
}

fn join_path(head: &str, rest: &str) -> String {
    if rest.is_empty() {
        head.to_string()
    } else if rest.starts_with('[') {
        format!("{}{}", head, rest)
    } else {
        format!("{}.{}", head, rest)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Option<String>> for Value {
    fn from(s: Option<String>) -> Self {
        s.map(Value::String).unwrap_or(Value::Absent)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::Array(items.into_iter().map(Value::String).collect())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Absent | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => n.serialize(serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(None)?;
                for (k, v) in fields.iter().filter(|(_, v)| !v.is_absent()) {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(pairs: Vec<(&str, Value)>) -> Value {
        Value::Object(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn test_sanitize_drops_absent_at_any_depth() {
        let nested = obj(vec![
            ("id", "u1".into()),
            ("photo", Value::Absent),
            (
                "profile",
                obj(vec![
                    ("contact", Value::Absent),
                    ("tags", Value::Array(vec!["a".into(), Value::Absent, obj(vec![("x", Value::Absent)])])),
                ]),
            ),
            ("status", Value::Null),
        ]);

        let clean = nested.sanitized();
        assert_eq!(clean.absent_path(), None);
        assert_eq!(
            serde_json::to_value(&clean).unwrap(),
            json!({"id": "u1", "profile": {"tags": ["a", null, {}]}, "status": null})
        );
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let v = obj(vec![
            ("a", Value::Absent),
            ("b", Value::Array(vec![Value::Absent, obj(vec![("c", Value::Absent)])])),
        ]);
        let once = v.sanitized();
        assert_eq!(once.sanitized(), once);
    }

    #[test]
    fn test_sanitize_keeps_key_order_and_leaves() {
        let v = Value::from(json!({"z": 1, "a": [true, "x"], "m": null}));
        assert_eq!(v.sanitized(), v);
        assert_eq!(v.canonical_string(), r#"{"z":1,"a":[true,"x"],"m":null}"#);
    }

    #[test]
    fn test_absent_path_reports_location() {
        let v = obj(vec![(
            "staff",
            Value::Array(vec![obj(vec![("id", "u1".into())]), obj(vec![("photo", Value::Absent)])]),
        )]);
        assert_eq!(v.absent_path().as_deref(), Some("staff[1].photo"));
    }

    #[test]
    fn test_values_equal_ignores_absent_keys() {
        let a = obj(vec![("id", "u1".into()), ("photo", Value::Absent)]);
        let b = obj(vec![("id", "u1".into())]);
        assert!(values_equal(&a, &b));
    }

    #[test]
    fn test_values_equal_is_key_order_sensitive() {
        let a = Value::from(json!({"id": "u1", "email": "a@x.edu"}));
        let b = Value::from(json!({"email": "a@x.edu", "id": "u1"}));
        assert!(!values_equal(&a, &b));
    }

    #[test]
    fn test_json_roundtrip_never_yields_absent() {
        let v: Value = serde_json::from_str(r#"{"a": null, "b": [1, 2]}"#).unwrap();
        assert_eq!(v.absent_path(), None);
        assert!(v.as_object().unwrap()["a"].is_null());
    }

    #[test]
    fn test_truthiness() {
        for falsy in [json!(false), json!(0), json!(""), json!(null)] {
            assert!(!Value::from(falsy).is_truthy());
        }
        for truthy in [json!(true), json!(-1), json!("0"), json!([]), json!({})] {
            assert!(Value::from(truthy).is_truthy());
        }
        assert!(!Value::Absent.is_truthy());
    }
}
