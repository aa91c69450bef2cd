//! Conversion between students and their stored records.
//!
//! A stored record is a plain [`Value`] map:
//!
//! ```text
//! { id, name, birth_date, nationality, status: "active" | "inactive",
//!   records: [{ name, score, passed }],
//!   credentials: [{ title, obtained_on, note }] }
//! ```
//!
//! Reading is lenient. Missing nested arrays become empty, the pass flag is
//! accepted as a boolean or as the text `"true"`/`"false"`, and scores may
//! be stored as integers or floats.

use crate::error::{AcademicError, AcademicResult};
use crate::model::{Credential, Student, StudentStatus, SubjectRecord};
use historial_codec::Value;

/// Types that convert to and from a stored plain-data record.
pub trait Record: Sized {
    /// Deep-copies the entity into a plain value.
    fn to_value(&self) -> Value;

    /// Rebuilds the entity from a plain value.
    fn from_value(value: &Value) -> AcademicResult<Self>;
}

fn text(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_text)
        .unwrap_or_default()
        .to_string()
}

/// Reads a pass flag that may have drifted to text.
fn pass_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(passed)) => *passed,
        Some(Value::Text(text)) => text == "true",
        Some(other) => other.is_truthy(),
        None => false,
    }
}

fn nested<T: Record>(record: &Value, field: &str) -> Vec<T> {
    let items = match record.get(field) {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => {
            tracing::warn!(field, found = other.type_name(), "expected an array; using none");
            return Vec::new();
        }
    };
    items
        .iter()
        .filter_map(|item| match T::from_value(item) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(field, error = %err, "skipping nested entry");
                None
            }
        })
        .collect()
}

fn expect_map<'a>(value: &'a Value, what: &str) -> AcademicResult<&'a Value> {
    if value.as_map().is_some() {
        Ok(value)
    } else {
        Err(AcademicError::malformed(format!(
            "{what} must be a map, got {}",
            value.type_name()
        )))
    }
}

impl Record for SubjectRecord {
    fn to_value(&self) -> Value {
        Value::map([
            ("name", Value::from(self.name.as_str())),
            ("score", Value::from(self.score)),
            ("passed", Value::from(self.passed)),
        ])
    }

    fn from_value(value: &Value) -> AcademicResult<Self> {
        let value = expect_map(value, "subject record")?;
        Ok(SubjectRecord {
            name: text(value, "name"),
            score: value.get("score").and_then(Value::as_f64).unwrap_or(0.0),
            passed: pass_flag(value.get("passed")),
        })
    }
}

impl Record for Credential {
    fn to_value(&self) -> Value {
        Value::map([
            ("title", Value::from(self.title.as_str())),
            ("obtained_on", Value::from(self.obtained_on.as_str())),
            ("note", Value::from(self.note.clone())),
        ])
    }

    fn from_value(value: &Value) -> AcademicResult<Self> {
        let value = expect_map(value, "credential")?;
        Ok(Credential {
            title: text(value, "title"),
            obtained_on: text(value, "obtained_on"),
            note: value.get("note").and_then(Value::as_text).map(str::to_string),
        })
    }
}

impl Record for Student {
    fn to_value(&self) -> Value {
        Value::map([
            ("id", Value::from(self.id.as_str())),
            ("name", Value::from(self.name.as_str())),
            ("birth_date", Value::from(self.birth_date.as_str())),
            ("nationality", Value::from(self.nationality.as_str())),
            ("status", Value::from(self.status.as_str())),
            (
                "records",
                Value::Array(self.records.iter().map(Record::to_value).collect()),
            ),
            (
                "credentials",
                Value::Array(self.credentials.iter().map(Record::to_value).collect()),
            ),
        ])
    }

    fn from_value(value: &Value) -> AcademicResult<Self> {
        let value = expect_map(value, "student record")?;
        let id = match value.get("id") {
            Some(Value::Text(id)) => id.clone(),
            Some(Value::Integer(id)) => id.to_string(),
            Some(other) => {
                return Err(AcademicError::malformed(format!(
                    "student id must be text, got {}",
                    other.type_name()
                )))
            }
            None => return Err(AcademicError::malformed("student record has no id")),
        };
        let status = value
            .get("status")
            .and_then(Value::as_text)
            .map(StudentStatus::parse)
            .unwrap_or_default();
        Ok(Student {
            id,
            name: text(value, "name"),
            birth_date: text(value, "birth_date"),
            nationality: text(value, "nationality"),
            status,
            records: nested(value, "records"),
            credentials: nested(value, "credentials"),
        })
    }
}

/// Flattens a student for storage.
pub fn flatten(student: &Student) -> Value {
    student.to_value()
}

/// Rebuilds one student.
///
/// # Errors
///
/// Returns [`AcademicError::Malformed`] if `value` is not a map or lacks
/// an id.
pub fn rehydrate(value: &Value) -> AcademicResult<Student> {
    Student::from_value(value)
}

/// Rebuilds every student that can be rebuilt, skipping the rest with a
/// warning.
pub fn rehydrate_all(values: &[Value]) -> Vec<Student> {
    values
        .iter()
        .enumerate()
        .filter_map(|(position, value)| match rehydrate(value) {
            Ok(student) => Some(student),
            Err(err) => {
                tracing::warn!(position, error = %err, "skipping stored record");
                None
            }
        })
        .collect()
}
