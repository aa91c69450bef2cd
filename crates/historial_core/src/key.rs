//! Record keys, key paths and key ranges.

use crate::error::{CoreError, CoreResult};
use historial_codec::Value;
use std::fmt;

/// A primary or index key.
///
/// Integers order before text, and each kind orders naturally within
/// itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Integer key.
    Integer(i64),
    /// Text key.
    Text(String),
}

impl Key {
    /// Converts a plain value into a key.
    ///
    /// # Errors
    ///
    /// Only integers and text are valid keys.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Integer(n) => Ok(Key::Integer(*n)),
            Value::Text(s) => Ok(Key::Text(s.clone())),
            other => Err(CoreError::data(format!(
                "{} is not a valid key",
                other.type_name()
            ))),
        }
    }

    /// Converts the key back into a plain value.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Integer(n) => Value::Integer(*n),
            Key::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Integer(n) => write!(f, "{n}"),
            Key::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Integer(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Text(s.clone())
    }
}

/// A dotted path locating a key inside a record (`"id"`, `"profile.email"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath(String);

impl KeyPath {
    /// Creates a key path.
    pub fn new(path: impl Into<String>) -> Self {
        KeyPath(path.into())
    }

    /// Returns the path as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extracts the key this path points at.
    ///
    /// # Errors
    ///
    /// Returns a data error if the path is missing or does not hold a
    /// valid key.
    pub fn extract(&self, record: &Value) -> CoreResult<Key> {
        let value = record.get_path(&self.0).ok_or_else(|| {
            CoreError::data(format!("record has no value at key path {:?}", self.0))
        })?;
        Key::from_value(value)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A contiguous interval of keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyRange {
    lower: Option<Key>,
    upper: Option<Key>,
    lower_open: bool,
    upper_open: bool,
}

impl KeyRange {
    /// A range matching every key.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A range matching exactly one key.
    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        }
    }

    /// Keys above `key` (excluding it when `open`).
    pub fn lower_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: Some(key.into()),
            lower_open: open,
            ..Self::default()
        }
    }

    /// Keys below `key` (excluding it when `open`).
    pub fn upper_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            upper: Some(key.into()),
            upper_open: open,
            ..Self::default()
        }
    }

    /// Keys between `lower` and `upper`.
    ///
    /// # Errors
    ///
    /// Returns a data error if the range is empty by construction.
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> CoreResult<Self> {
        let (lower, upper) = (lower.into(), upper.into());
        if lower > upper || (lower == upper && (lower_open || upper_open)) {
            return Err(CoreError::data(format!(
                "empty key range: {lower} .. {upper}"
            )));
        }
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_open,
            upper_open,
        })
    }

    /// Lower end, if any.
    pub fn lower(&self) -> Option<&Key> {
        self.lower.as_ref()
    }

    /// Upper end, if any.
    pub fn upper(&self) -> Option<&Key> {
        self.upper.as_ref()
    }

    /// Whether `key` falls inside the range.
    pub fn contains(&self, key: &Key) -> bool {
        let above = match &self.lower {
            Some(lower) if self.lower_open => key > lower,
            Some(lower) => key >= lower,
            None => true,
        };
        let below = match &self.upper {
            Some(upper) if self.upper_open => key < upper,
            Some(upper) => key <= upper,
            None => true,
        };
        above && below
    }
}

impl From<Key> for KeyRange {
    fn from(key: Key) -> Self {
        KeyRange::only(key)
    }
}

impl From<&str> for KeyRange {
    fn from(key: &str) -> Self {
        KeyRange::only(key)
    }
}

/// Cursor traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending keys.
    #[default]
    Next,
    /// Ascending keys, first record per distinct key.
    NextUnique,
    /// Descending keys.
    Prev,
    /// Descending keys, first record per distinct key.
    PrevUnique,
}

impl Direction {
    pub(crate) fn is_reverse(self) -> bool {
        matches!(self, Direction::Prev | Direction::PrevUnique)
    }

    pub(crate) fn is_unique(self) -> bool {
        matches!(self, Direction::NextUnique | Direction::PrevUnique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_sort_before_text() {
        assert!(Key::Integer(i64::MAX) < Key::from("0"));
        assert!(Key::from("a") < Key::from("b"));
    }

    #[test]
    fn key_from_value_rejects_non_keys() {
        assert_eq!(Key::from_value(&Value::from("x")).unwrap(), Key::from("x"));
        assert!(matches!(
            Key::from_value(&Value::Bool(true)),
            Err(CoreError::Data { .. })
        ));
    }

    #[test]
    fn key_path_extracts_nested_keys() {
        let record = Value::map([
            ("id", Value::from("42")),
            ("profile", Value::map([("email", Value::from("a@b"))])),
        ]);
        assert_eq!(KeyPath::new("id").extract(&record).unwrap(), Key::from("42"));
        assert_eq!(
            KeyPath::new("profile.email").extract(&record).unwrap(),
            Key::from("a@b")
        );
        assert!(KeyPath::new("missing").extract(&record).is_err());
    }

    #[test]
    fn only_contains_single_key() {
        let range = KeyRange::only("b");
        assert!(range.contains(&Key::from("b")));
        assert!(!range.contains(&Key::from("a")));
    }

    #[test]
    fn open_and_closed_bounds() {
        let range = KeyRange::bound(2i64, 5i64, true, false).unwrap();
        assert!(!range.contains(&Key::Integer(2)));
        assert!(range.contains(&Key::Integer(3)));
        assert!(range.contains(&Key::Integer(5)));
        assert!(!range.contains(&Key::Integer(6)));

        assert!(KeyRange::lower_bound(3i64, false).contains(&Key::Integer(3)));
        assert!(!KeyRange::upper_bound(3i64, true).contains(&Key::Integer(3)));
        assert!(KeyRange::unbounded().contains(&Key::from("anything")));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(KeyRange::bound(5i64, 2i64, false, false).is_err());
        assert!(KeyRange::bound(2i64, 2i64, true, false).is_err());
        assert!(KeyRange::bound(2i64, 2i64, false, false).is_ok());
    }
}
