//! Dynamic plain-data value type.

use std::collections::BTreeMap;
use std::fmt;

/// A plain-data value.
///
/// This is the behavior-free shape every stored record takes: scalars,
/// arrays and text-keyed maps. Map entries are kept in a `BTreeMap`, so
/// iteration order (and therefore encoding) is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Finite floating point number.
    Float(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map from text keys to values.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a map value from key/value pairs.
    ///
    /// Later pairs overwrite earlier ones with the same key.
    pub fn map<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns a short name for the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Returns true if this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer if this is an `Integer`.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns a numeric view of `Integer` and `Float` values.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the text if this is a `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements if this is an `Array`.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the entries if this is a `Map`.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up a key in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|entries| entries.get(key))
    }

    /// Follows a dotted path (`"a.b.c"`) through nested maps.
    ///
    /// An empty path returns the value itself.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.').try_fold(self, |current, segment| current.get(segment))
    }

    /// JavaScript-style truthiness.
    ///
    /// `Null`, `false`, `0`, `0.0` and the empty string are falsy; arrays
    /// and maps are always truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Array(_) | Value::Map(_) => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::map([
            ("id", Value::from("123")),
            (
                "address",
                Value::map([("city", Value::from("Rosario")), ("zip", Value::from(2000))]),
            ),
        ])
    }

    #[test]
    fn get_returns_map_entry() {
        let v = sample();
        assert_eq!(v.get("id"), Some(&Value::from("123")));
        assert_eq!(v.get("missing"), None);
        assert_eq!(Value::Integer(1).get("id"), None);
    }

    #[test]
    fn get_path_walks_nested_maps() {
        let v = sample();
        assert_eq!(v.get_path("address.city"), Some(&Value::from("Rosario")));
        assert_eq!(v.get_path("address.street"), None);
        assert_eq!(v.get_path("id.nested"), None);
        assert_eq!(v.get_path(""), Some(&v));
    }

    #[test]
    fn map_last_pair_wins() {
        let v = Value::map([("a", Value::from(1)), ("a", Value::from(2))]);
        assert_eq!(v.get("a"), Some(&Value::Integer(2)));
    }

    #[test]
    fn truthiness_follows_loose_rules() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(Value::from(1).is_truthy());
        assert!(Value::from("no").is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn numeric_view_covers_both_number_kinds() {
        assert_eq!(Value::from(8).as_f64(), Some(8.0));
        assert_eq!(Value::from(7.5).as_f64(), Some(7.5));
        assert_eq!(Value::from("8").as_f64(), None);
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }

    #[test]
    fn display_is_readable() {
        let v = Value::map([("k", Value::from(vec![1, 2]))]);
        assert_eq!(v.to_string(), r#"{"k": [1, 2]}"#);
    }
}
