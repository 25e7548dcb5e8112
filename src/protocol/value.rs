// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Dynamically shaped value carried by contexts, step parameters and condition operands.
///
/// Deserializes untagged, so a YAML or JSON document maps onto it directly:
///
/// ```
/// use tactical_protocols::protocol::Value;
///
/// let value: Value = serde_json::from_str(r#"{"status": "red", "units": [1, 2]}"#).unwrap();
/// assert_eq!(value.get("status"), Some(&Value::from("red")));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Field lookup for map values; `None` for every other shape.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Interpret a two-element numeric list as a `[lat, lon]` pair.
    pub fn as_coordinates(&self) -> Option<[f64; 2]> {
        match self.as_list()? {
            [lat, lon] => Some([lat.as_f64()?, lon.as_f64()?]),
            _ => None,
        }
    }

    /// Ordering between two values of the same comparable kind.
    ///
    /// Numbers compare numerically and strings lexicographically. Every other
    /// pairing is unordered, which keeps `greater_than`/`less_than` total.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Value::List(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_yaml_shapes() {
        let yaml = r#"
threat: high
level: 3
armed: true
sectors: [north, east]
position: [51.5, -0.12]
nested:
  wind: 12.5
missing: ~
"#;
        let value: Value = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(value.get("threat"), Some(&Value::from("high")));
        assert_eq!(value.get("level"), Some(&Value::Number(3.0)));
        assert_eq!(value.get("armed"), Some(&Value::Bool(true)));
        assert_eq!(
            value.get("sectors"),
            Some(&Value::List(vec!["north".into(), "east".into()]))
        );
        assert_eq!(
            value.get("position").and_then(Value::as_coordinates),
            Some([51.5, -0.12])
        );
        assert_eq!(
            value.get("nested").and_then(|n| n.get("wind")),
            Some(&Value::Number(12.5))
        );
        assert!(value.get("missing").map(Value::is_null).unwrap_or(false));
    }

    #[test]
    fn test_compare_only_orders_like_kinds() {
        assert_eq!(Value::from(2).compare(&Value::from(1)), Some(Ordering::Greater));
        assert_eq!(Value::from("a").compare(&Value::from("b")), Some(Ordering::Less));
        assert_eq!(Value::from(1).compare(&Value::from("1")), None);
        assert_eq!(Value::Bool(true).compare(&Value::Bool(false)), None);
    }

    #[test]
    fn test_coordinates_require_two_numbers() {
        assert_eq!(Value::from_iter([1.0, 2.0]).as_coordinates(), Some([1.0, 2.0]));
        assert_eq!(Value::from_iter([1.0]).as_coordinates(), None);
        assert_eq!(
            Value::List(vec![Value::from(1.0), Value::from("x")]).as_coordinates(),
            None
        );
    }
}
