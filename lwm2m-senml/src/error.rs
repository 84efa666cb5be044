//! Error types for SenML operations

use thiserror::Error;

/// Result type alias for SenML operations
pub type Result<T> = std::result::Result<T, SenMLError>;

/// Errors that can occur during SenML operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SenMLError {
    /// Invalid SenML structure or data
    #[error("Invalid SenML data: {message}")]
    InvalidData { message: String },

    /// A record carries no value field at all
    #[error("Invalid SenML record: record must have a value (v, vb, vs, vd, vlo): {record}")]
    MissingValue { record: String },

    /// Serialization error
    #[error("Serialization error: {message}")]
    SerializationError { message: String },

    /// Deserialization error
    #[error("Deserialization error: {message}")]
    DeserializationError { message: String },
}

impl SenMLError {
    /// Create an invalid data error
    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a missing value error
    pub fn missing_value<S: Into<String>>(record: S) -> Self {
        Self::MissingValue {
            record: record.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a deserialization error
    pub fn deserialization<S: Into<String>>(message: S) -> Self {
        Self::DeserializationError {
            message: message.into(),
        }
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for SenMLError {
    fn from(err: serde_json::Error) -> Self {
        Self::DeserializationError {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "cbor")]
impl From<ciborium::de::Error<std::io::Error>> for SenMLError {
    fn from(err: ciborium::de::Error<std::io::Error>) -> Self {
        Self::DeserializationError {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "cbor")]
impl From<ciborium::ser::Error<std::io::Error>> for SenMLError {
    fn from(err: ciborium::ser::Error<std::io::Error>) -> Self {
        Self::SerializationError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SenMLError::invalid_data("test message");
        assert!(matches!(err, SenMLError::InvalidData { .. }));
        assert_eq!(err.to_string(), "Invalid SenML data: test message");
    }

    #[test]
    fn test_missing_value_error() {
        let err = SenMLError::missing_value("{\"n\":\"0\"}");
        assert!(err.to_string().contains("must have a value"));
    }
}
