//! SenML Record types and values

use std::fmt;

/// A numeric SenML value.
///
/// SenML distinguishes integers from floating point numbers on the wire
/// (most visibly in CBOR), and LWM2M integer resources may exceed the range
/// where an `f64` is exact, so both representations are kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
}

impl Number {
    /// Get this number as an `f64`, possibly losing precision.
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Int(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }

    /// Get this number as an `i64` if it is an integer or an integral float.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(*i),
            Number::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Some(*f as i64)
                } else {
                    None
                }
            }
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Int(v)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Float(v)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Union type for SenML record values.
///
/// A record holds at most one of these; on the wire they map to the `v`,
/// `vb`, `vs`, `vd` and `vlo` fields respectively.
#[derive(Debug, Clone, PartialEq)]
pub enum SenMLValue {
    /// Numeric value (`v`)
    Number(Number),
    /// Boolean value (`vb`)
    Boolean(bool),
    /// String value (`vs`)
    String(String),
    /// Opaque binary data (`vd`, base64 in JSON, byte string in CBOR)
    Opaque(Vec<u8>),
    /// Object link value (`vlo`), encoded as "OID:IID"
    ObjectLink(String),
}

/// A single SenML record as it appears on the wire, before base-name and
/// base-time resolution.
///
/// Only the fields LWM2M uses are modeled; units, sums and update times are
/// not part of the LWM2M payload vocabulary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SenMLRecord {
    /// Base Name - prefix applied to this and all subsequent records (`bn`)
    pub base_name: Option<String>,

    /// Base Time - seconds, applied to this and all subsequent records (`bt`)
    pub base_time: Option<f64>,

    /// Name - relative record name (`n`)
    pub name: Option<String>,

    /// Time - seconds, relative to the running base time (`t`)
    pub time: Option<f64>,

    /// The record value, if any
    pub value: Option<SenMLValue>,
}

impl SenMLRecord {
    /// Create a new empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record with a numeric value
    pub fn with_number<S: Into<String>, N: Into<Number>>(name: S, value: N) -> Self {
        Self {
            name: Some(name.into()),
            value: Some(SenMLValue::Number(value.into())),
            ..Default::default()
        }
    }

    /// Create a record with a string value
    pub fn with_string_value<S: Into<String>, V: Into<String>>(name: S, value: V) -> Self {
        Self {
            name: Some(name.into()),
            value: Some(SenMLValue::String(value.into())),
            ..Default::default()
        }
    }

    /// Create a record with a boolean value
    pub fn with_bool_value<S: Into<String>>(name: S, value: bool) -> Self {
        Self {
            name: Some(name.into()),
            value: Some(SenMLValue::Boolean(value)),
            ..Default::default()
        }
    }

    /// Create a record with opaque binary data
    pub fn with_opaque_value<S: Into<String>>(name: S, data: Vec<u8>) -> Self {
        Self {
            name: Some(name.into()),
            value: Some(SenMLValue::Opaque(data)),
            ..Default::default()
        }
    }

    /// Set the base name for this record
    pub fn with_base_name<S: Into<String>>(mut self, base_name: S) -> Self {
        self.base_name = Some(base_name.into());
        self
    }

    /// Set the base time for this record
    pub fn with_base_time(mut self, base_time: f64) -> Self {
        self.base_time = Some(base_time);
        self
    }

    /// Set the relative time for this record
    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    /// Check if this record has a value
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}
