//! SenML CBOR wire codec
//!
//! LWM2M (and RFC 8428) replace the JSON string keys with small integer
//! keys in CBOR. The mapping is fixed and must be preserved for interop:
//!
//! | field | key  |
//! |-------|------|
//! | `bn`  | `-2` |
//! | `bt`  | `-3` |
//! | `n`   | `0`  |
//! | `v`   | `2`  |
//! | `vs`  | `3`  |
//! | `vb`  | `4`  |
//! | `t`   | `6`  |
//! | `vd`  | `8`  |
//!
//! The object-link extension keeps the text key `"vlo"`. Opaque values are
//! raw byte strings, not base64.

use ciborium::value::Value;

use crate::{Number, Result, SenMLError, SenMLPack, SenMLRecord, SenMLValue};

const KEY_BASE_NAME: i64 = -2;
const KEY_BASE_TIME: i64 = -3;
const KEY_NAME: i64 = 0;
const KEY_VALUE: i64 = 2;
const KEY_STRING_VALUE: i64 = 3;
const KEY_BOOLEAN_VALUE: i64 = 4;
const KEY_TIME: i64 = 6;
const KEY_OPAQUE_VALUE: i64 = 8;
const KEY_OBJECT_LINK: &str = "vlo";

/// Serialize a pack to SenML CBOR bytes.
pub fn to_cbor(pack: &SenMLPack) -> Result<Vec<u8>> {
    let array: Vec<Value> = pack.iter().map(record_to_value).collect();
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(&Value::Array(array), &mut buffer)?;
    Ok(buffer)
}

/// Deserialize a pack from SenML CBOR bytes.
///
/// See [`crate::json::from_json`] for the meaning of `allow_no_value`.
pub fn from_cbor(bytes: &[u8], allow_no_value: bool) -> Result<SenMLPack> {
    let value: Value = ciborium::de::from_reader(bytes)?;
    let array = match value {
        Value::Array(entries) => entries,
        _ => {
            return Err(SenMLError::deserialization(
                "SenML CBOR must be an array of records",
            ));
        }
    };

    let mut pack = SenMLPack::new();
    for entry in array {
        let map = match entry {
            Value::Map(map) => map,
            _ => {
                return Err(SenMLError::deserialization(
                    "SenML CBOR record must be a map",
                ));
            }
        };
        pack.add_record(record_from_map(map, allow_no_value)?);
    }
    Ok(pack)
}

fn record_to_value(record: &SenMLRecord) -> Value {
    let mut map: Vec<(Value, Value)> = Vec::new();

    if let Some(bn) = &record.base_name {
        if !bn.is_empty() {
            map.push((int_key(KEY_BASE_NAME), Value::Text(bn.clone())));
        }
    }
    if let Some(bt) = record.base_time {
        map.push((int_key(KEY_BASE_TIME), number_to_cbor(float_or_int(bt))));
    }
    if let Some(n) = &record.name {
        if !n.is_empty() {
            map.push((int_key(KEY_NAME), Value::Text(n.clone())));
        }
    }
    if let Some(t) = record.time {
        map.push((int_key(KEY_TIME), number_to_cbor(float_or_int(t))));
    }

    match &record.value {
        Some(SenMLValue::Number(v)) => {
            map.push((int_key(KEY_VALUE), number_to_cbor(*v)));
        }
        Some(SenMLValue::Boolean(v)) => {
            map.push((int_key(KEY_BOOLEAN_VALUE), Value::Bool(*v)));
        }
        Some(SenMLValue::String(v)) => {
            map.push((int_key(KEY_STRING_VALUE), Value::Text(v.clone())));
        }
        Some(SenMLValue::Opaque(v)) => {
            map.push((int_key(KEY_OPAQUE_VALUE), Value::Bytes(v.clone())));
        }
        Some(SenMLValue::ObjectLink(v)) => {
            map.push((
                Value::Text(KEY_OBJECT_LINK.to_string()),
                Value::Text(v.clone()),
            ));
        }
        None => {}
    }

    Value::Map(map)
}

fn record_from_map(map: Vec<(Value, Value)>, allow_no_value: bool) -> Result<SenMLRecord> {
    let mut record = SenMLRecord::new();

    for (key, value) in map {
        match key {
            Value::Integer(i) => match i128::from(i) as i64 {
                KEY_BASE_NAME => {
                    if let Value::Text(s) = value {
                        record.base_name = Some(s);
                    }
                }
                KEY_BASE_TIME => {
                    record.base_time = Some(cbor_to_number(&value)?.as_f64());
                }
                KEY_NAME => {
                    if let Value::Text(s) = value {
                        record.name = Some(s);
                    }
                }
                KEY_TIME => {
                    record.time = Some(cbor_to_number(&value)?.as_f64());
                }
                KEY_VALUE => {
                    record.value = Some(SenMLValue::Number(cbor_to_number(&value)?));
                }
                KEY_STRING_VALUE => {
                    if let Value::Text(s) = value {
                        record.value = Some(SenMLValue::String(s));
                    }
                }
                KEY_BOOLEAN_VALUE => {
                    if let Value::Bool(b) = value {
                        record.value = Some(SenMLValue::Boolean(b));
                    }
                }
                KEY_OPAQUE_VALUE => {
                    if let Value::Bytes(b) = value {
                        record.value = Some(SenMLValue::Opaque(b));
                    }
                }
                // Unknown integer keys are ignored, per RFC 8428 §4.4.
                _ => {}
            },
            Value::Text(ref s) if s == KEY_OBJECT_LINK => {
                if let Value::Text(v) = value {
                    record.value = Some(SenMLValue::ObjectLink(v));
                }
            }
            _ => {}
        }
    }

    if !allow_no_value && !record.has_value() {
        return Err(SenMLError::missing_value(format!("{:?}", record)));
    }

    Ok(record)
}

fn int_key(key: i64) -> Value {
    Value::Integer(key.into())
}

fn number_to_cbor(number: Number) -> Value {
    match number {
        Number::Int(i) => Value::Integer(i.into()),
        Number::Float(f) => Value::Float(f),
    }
}

fn cbor_to_number(value: &Value) -> Result<Number> {
    match value {
        Value::Integer(i) => i64::try_from(i128::from(*i))
            .map(Number::Int)
            .map_err(|_| SenMLError::deserialization("integer out of i64 range")),
        Value::Float(f) => Ok(Number::Float(*f)),
        other => Err(SenMLError::deserialization(format!(
            "expected a number, got {:?}",
            other
        ))),
    }
}

// Integral base/relative times are encoded as CBOR integers for compactness.
fn float_or_int(t: f64) -> Number {
    if t.fract() == 0.0 && t.abs() < i64::MAX as f64 {
        Number::Int(t as i64)
    } else {
        Number::Float(t)
    }
}
