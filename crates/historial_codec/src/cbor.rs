//! CBOR encoding of [`Value`] trees.
//!
//! Encoding goes through `ciborium`'s dynamic value so that the wire form is
//! standard CBOR. Because [`Value::Map`] is ordered by key, identical trees
//! always produce identical bytes.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::{Integer, Value as CborValue};
use std::collections::BTreeMap;

/// Encodes a value to CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::NonFiniteFloat`] for NaN or infinite floats.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let cbor = into_cbor(value)?;
    let mut buffer = Vec::new();
    ciborium::into_writer(&cbor, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes a value from CBOR bytes.
///
/// # Errors
///
/// Fails on malformed input, byte strings, tags, non-text map keys and
/// integers outside the `i64` range.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let cbor: CborValue =
        ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    from_cbor_value(cbor)
}

fn into_cbor(value: &Value) -> CodecResult<CborValue> {
    Ok(match value {
        Value::Null => CborValue::Null,
        Value::Bool(b) => CborValue::Bool(*b),
        Value::Integer(n) => CborValue::Integer(Integer::from(*n)),
        Value::Float(x) => {
            if !x.is_finite() {
                return Err(CodecError::NonFiniteFloat);
            }
            CborValue::Float(*x)
        }
        Value::Text(s) => CborValue::Text(s.clone()),
        Value::Array(items) => {
            CborValue::Array(items.iter().map(into_cbor).collect::<CodecResult<_>>()?)
        }
        Value::Map(entries) => CborValue::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((CborValue::Text(k.clone()), into_cbor(v)?)))
                .collect::<CodecResult<_>>()?,
        ),
    })
}

fn from_cbor_value(cbor: CborValue) -> CodecResult<Value> {
    Ok(match cbor {
        CborValue::Null => Value::Null,
        CborValue::Bool(b) => Value::Bool(b),
        CborValue::Integer(n) => {
            Value::Integer(i64::try_from(n).map_err(|_| CodecError::IntegerOverflow)?)
        }
        CborValue::Float(x) => {
            if !x.is_finite() {
                return Err(CodecError::NonFiniteFloat);
            }
            Value::Float(x)
        }
        CborValue::Text(s) => Value::Text(s),
        CborValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_cbor_value)
                .collect::<CodecResult<_>>()?,
        ),
        CborValue::Map(entries) => {
            let mut map = BTreeMap::new();
            for (key, value) in entries {
                let key = match key {
                    CborValue::Text(k) => k,
                    other => {
                        return Err(CodecError::NonTextKey {
                            found: cbor_type_name(&other).to_string(),
                        })
                    }
                };
                map.insert(key, from_cbor_value(value)?);
            }
            Value::Map(map)
        }
        other => return Err(CodecError::unsupported_type(cbor_type_name(&other))),
    })
}

fn cbor_type_name(value: &CborValue) -> &'static str {
    match value {
        CborValue::Integer(_) => "integer",
        CborValue::Bytes(_) => "bytes",
        CborValue::Float(_) => "float",
        CborValue::Text(_) => "text",
        CborValue::Bool(_) => "bool",
        CborValue::Null => "null",
        CborValue::Tag(_, _) => "tag",
        CborValue::Array(_) => "array",
        CborValue::Map(_) => "map",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn student_like() -> Value {
        Value::map([
            ("id", Value::from("123")),
            ("name", Value::from("Ana")),
            (
                "records",
                Value::Array(vec![Value::map([
                    ("name", Value::from("Math")),
                    ("score", Value::from(8)),
                    ("passed", Value::from(true)),
                ])]),
            ),
            ("note", Value::Null),
            ("average", Value::from(7.25)),
        ])
    }

    #[test]
    fn nested_record_survives_encoding() {
        let value = student_like();
        let bytes = to_cbor(&value).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), value);
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = Value::map([("b", Value::from(1)), ("a", Value::from(2))]);
        let b = Value::map([("a", Value::from(2)), ("b", Value::from(1))]);
        assert_eq!(to_cbor(&a).unwrap(), to_cbor(&b).unwrap());
    }

    #[test]
    fn nan_is_rejected() {
        let result = to_cbor(&Value::Float(f64::NAN));
        assert_eq!(result, Err(CodecError::NonFiniteFloat));
    }

    #[test]
    fn byte_strings_are_unsupported() {
        let mut bytes = Vec::new();
        ciborium::into_writer(&CborValue::Bytes(vec![1, 2]), &mut bytes).unwrap();
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn integer_keys_are_rejected() {
        let mut bytes = Vec::new();
        let map = CborValue::Map(vec![(CborValue::Integer(1.into()), CborValue::Null)]);
        ciborium::into_writer(&map, &mut bytes).unwrap();
        assert!(matches!(from_cbor(&bytes), Err(CodecError::NonTextKey { .. })));
    }

    #[test]
    fn truncated_input_fails() {
        let bytes = to_cbor(&student_like()).unwrap();
        assert!(matches!(
            from_cbor(&bytes[..bytes.len() / 2]),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            (-1.0e9f64..1.0e9).prop_map(Value::Float),
            "[a-z ]{0,12}".prop_map(Value::Text),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn any_value_decodes_to_itself(value in arb_value()) {
            let bytes = to_cbor(&value).unwrap();
            prop_assert_eq!(from_cbor(&bytes).unwrap(), value);
        }
    }
}
