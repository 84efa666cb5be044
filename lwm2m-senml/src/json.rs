//! SenML JSON wire codec
//!
//! Field-by-field (de)serialization over `serde_json::Value`, using the
//! RFC 8428 string keys: `bn`, `bt`, `n`, `t`, `v`, `vb`, `vs`, `vd` and
//! the LWM2M object-link extension `vlo`. Opaque values (`vd`) are base64
//! encoded.

use serde_json::{Map, Value};

use crate::{Number, Result, SenMLError, SenMLPack, SenMLRecord, SenMLValue};

/// Serialize a pack to SenML JSON bytes.
pub fn to_json(pack: &SenMLPack) -> Result<Vec<u8>> {
    let array: Vec<Value> = pack.iter().map(record_to_value).collect();
    serde_json::to_vec(&Value::Array(array))
        .map_err(|e| SenMLError::serialization(e.to_string()))
}

/// Deserialize a pack from SenML JSON bytes.
///
/// With `allow_no_value` set, records without any value field are accepted;
/// this is needed for composite-read payloads where records only carry
/// names.
pub fn from_json(bytes: &[u8], allow_no_value: bool) -> Result<SenMLPack> {
    let value: Value = serde_json::from_slice(bytes)?;
    let array = value
        .as_array()
        .ok_or_else(|| SenMLError::deserialization("SenML JSON must be an array of records"))?;

    let mut pack = SenMLPack::new();
    for entry in array {
        let obj = entry.as_object().ok_or_else(|| {
            SenMLError::deserialization("SenML JSON record must be an object")
        })?;
        pack.add_record(record_from_object(obj, allow_no_value)?);
    }
    Ok(pack)
}

fn record_to_value(record: &SenMLRecord) -> Value {
    let mut obj = Map::new();

    if let Some(bn) = &record.base_name {
        if !bn.is_empty() {
            obj.insert("bn".into(), Value::String(bn.clone()));
        }
    }
    if let Some(bt) = record.base_time {
        obj.insert("bt".into(), number_to_json(float_or_int(bt)));
    }
    if let Some(n) = &record.name {
        if !n.is_empty() {
            obj.insert("n".into(), Value::String(n.clone()));
        }
    }
    if let Some(t) = record.time {
        obj.insert("t".into(), number_to_json(float_or_int(t)));
    }

    match &record.value {
        Some(SenMLValue::Number(v)) => {
            obj.insert("v".into(), number_to_json(*v));
        }
        Some(SenMLValue::Boolean(v)) => {
            obj.insert("vb".into(), Value::Bool(*v));
        }
        Some(SenMLValue::String(v)) => {
            obj.insert("vs".into(), Value::String(v.clone()));
        }
        Some(SenMLValue::Opaque(v)) => {
            obj.insert("vd".into(), Value::String(base64_encode(v)));
        }
        Some(SenMLValue::ObjectLink(v)) => {
            obj.insert("vlo".into(), Value::String(v.clone()));
        }
        None => {}
    }

    Value::Object(obj)
}

fn record_from_object(obj: &Map<String, Value>, allow_no_value: bool) -> Result<SenMLRecord> {
    let mut record = SenMLRecord::new();

    if let Some(bn) = obj.get("bn").and_then(Value::as_str) {
        record.base_name = Some(bn.to_string());
    }
    if let Some(bt) = obj.get("bt").and_then(Value::as_f64) {
        record.base_time = Some(bt);
    }
    if let Some(n) = obj.get("n").and_then(Value::as_str) {
        record.name = Some(n.to_string());
    }
    if let Some(t) = obj.get("t").and_then(Value::as_f64) {
        record.time = Some(t);
    }

    if let Some(v) = obj.get("v") {
        record.value = Some(SenMLValue::Number(json_to_number(v)?));
    } else if let Some(vb) = obj.get("vb").and_then(Value::as_bool) {
        record.value = Some(SenMLValue::Boolean(vb));
    } else if let Some(vs) = obj.get("vs").and_then(Value::as_str) {
        record.value = Some(SenMLValue::String(vs.to_string()));
    } else if let Some(vlo) = obj.get("vlo").and_then(Value::as_str) {
        record.value = Some(SenMLValue::ObjectLink(vlo.to_string()));
    } else if let Some(vd) = obj.get("vd").and_then(Value::as_str) {
        let data = base64_decode(vd)
            .map_err(|e| SenMLError::deserialization(format!("invalid base64 in vd: {}", e)))?;
        record.value = Some(SenMLValue::Opaque(data));
    }

    if !allow_no_value && !record.has_value() {
        return Err(SenMLError::missing_value(
            serde_json::to_string(obj).unwrap_or_default(),
        ));
    }

    Ok(record)
}

fn number_to_json(number: Number) -> Value {
    match number {
        Number::Int(i) => Value::Number(i.into()),
        Number::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}

// Integral base/relative times are written without a fraction for
// compactness, matching the CBOR codec.
fn float_or_int(t: f64) -> Number {
    if t.fract() == 0.0 && t.abs() < i64::MAX as f64 {
        Number::Int(t as i64)
    } else {
        Number::Float(t)
    }
}

fn json_to_number(value: &Value) -> Result<Number> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Number::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Number::Float(f))
            } else {
                Err(SenMLError::deserialization(format!(
                    "unrepresentable number: {}",
                    n
                )))
            }
        }
        other => Err(SenMLError::deserialization(format!(
            "expected a number for field 'v', got {}",
            other
        ))),
    }
}

const BASE64_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Standard base64 with padding, as required for `vd` values.
pub fn base64_encode(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len().div_ceil(3) * 4);
    let chunks = data.chunks_exact(3);
    let remainder = chunks.remainder();

    for chunk in chunks {
        let combined = ((chunk[0] as u32) << 16) | ((chunk[1] as u32) << 8) | chunk[2] as u32;
        result.push(BASE64_ALPHABET[((combined >> 18) & 0x3F) as usize] as char);
        result.push(BASE64_ALPHABET[((combined >> 12) & 0x3F) as usize] as char);
        result.push(BASE64_ALPHABET[((combined >> 6) & 0x3F) as usize] as char);
        result.push(BASE64_ALPHABET[(combined & 0x3F) as usize] as char);
    }

    match remainder.len() {
        1 => {
            let combined = (remainder[0] as u32) << 16;
            result.push(BASE64_ALPHABET[((combined >> 18) & 0x3F) as usize] as char);
            result.push(BASE64_ALPHABET[((combined >> 12) & 0x3F) as usize] as char);
            result.push_str("==");
        }
        2 => {
            let combined = ((remainder[0] as u32) << 16) | ((remainder[1] as u32) << 8);
            result.push(BASE64_ALPHABET[((combined >> 18) & 0x3F) as usize] as char);
            result.push(BASE64_ALPHABET[((combined >> 12) & 0x3F) as usize] as char);
            result.push(BASE64_ALPHABET[((combined >> 6) & 0x3F) as usize] as char);
            result.push('=');
        }
        _ => {}
    }

    result
}

/// Decode standard base64, tolerating missing padding.
pub fn base64_decode(s: &str) -> std::result::Result<Vec<u8>, &'static str> {
    let chars: Vec<char> = s.chars().filter(|&c| c != '=').collect();
    let mut result = Vec::with_capacity(chars.len() / 4 * 3 + 2);

    for chunk in chars.chunks(4) {
        if chunk.len() < 2 {
            return Err("truncated base64 input");
        }

        let mut combined = 0u32;
        for (i, &c) in chunk.iter().enumerate() {
            let val = match c {
                'A'..='Z' => (c as u32) - ('A' as u32),
                'a'..='z' => (c as u32) - ('a' as u32) + 26,
                '0'..='9' => (c as u32) - ('0' as u32) + 52,
                '+' => 62,
                '/' => 63,
                _ => return Err("invalid base64 character"),
            };
            combined |= val << (6 * (3 - i));
        }

        result.push((combined >> 16) as u8);
        if chunk.len() > 2 {
            result.push((combined >> 8) as u8);
        }
        if chunk.len() > 3 {
            result.push(combined as u8);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_names() {
        let mut pack = SenMLPack::new();
        pack.add_record(
            SenMLRecord::with_number("0", 22.5)
                .with_base_name("/3303/0/")
                .with_base_time(268_500_000.0),
        );

        let json = to_json(&pack).unwrap();
        let text = String::from_utf8(json).unwrap();
        assert!(text.contains("\"bn\":\"/3303/0/\""));
        assert!(text.contains("\"bt\":268500000"));
        assert!(text.contains("\"n\":\"0\""));
        assert!(text.contains("\"v\":22.5"));
    }

    #[test]
    fn test_integer_preserved() {
        let mut pack = SenMLPack::new();
        pack.add_record(SenMLRecord::with_number("0", 9_007_199_254_740_993i64));

        let json = to_json(&pack).unwrap();
        let restored = from_json(&json, false).unwrap();
        assert_eq!(
            restored.records[0].value,
            Some(SenMLValue::Number(Number::Int(9_007_199_254_740_993)))
        );
    }

    #[test]
    fn test_opaque_base64() {
        let mut pack = SenMLPack::new();
        pack.add_record(SenMLRecord::with_opaque_value("5", b"hello world".to_vec()));

        let json = to_json(&pack).unwrap();
        let text = String::from_utf8(json.clone()).unwrap();
        assert!(text.contains("\"vd\":\"aGVsbG8gd29ybGQ=\""));

        let restored = from_json(&json, false).unwrap();
        assert_eq!(
            restored.records[0].value,
            Some(SenMLValue::Opaque(b"hello world".to_vec()))
        );
    }

    #[test]
    fn test_missing_value_rejected() {
        let json = br#"[{"n":"0"}]"#;
        assert!(from_json(json, false).is_err());
        assert!(from_json(json, true).is_ok());
    }

    #[test]
    fn test_not_an_array() {
        let json = br#"{"n":"0","v":1}"#;
        assert!(from_json(json, false).is_err());
    }

    #[test]
    fn test_object_link_value() {
        let json = br#"[{"n":"0","vlo":"1:3"}]"#;
        let pack = from_json(json, false).unwrap();
        assert_eq!(
            pack.records[0].value,
            Some(SenMLValue::ObjectLink("1:3".to_string()))
        );
    }

    #[test]
    fn test_base64_encode_decode() {
        let data = b"hello world";
        let encoded = base64_encode(data);
        let decoded = base64_decode(&encoded).unwrap();
        assert_eq!(data, decoded.as_slice());
    }
}
