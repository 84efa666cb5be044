//! SenML Pack - an ordered collection of SenML records

use crate::{Result, SenMLRecord};

/// A SenML Pack is an ordered array of SenML records.
///
/// Record order matters: base names and base times set by one record apply
/// to all subsequent records until overridden, so a pack must preserve
/// declaration order through (de)serialization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SenMLPack {
    /// Array of SenML records
    pub records: Vec<SenMLRecord>,
}

impl SenMLPack {
    /// Create a new empty pack
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Add a record to this pack
    pub fn add_record(&mut self, record: SenMLRecord) {
        self.records.push(record);
    }

    /// Add multiple records to this pack
    pub fn add_records<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = SenMLRecord>,
    {
        self.records.extend(records);
    }

    /// Get the number of records in this pack
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if this pack is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over records in this pack
    pub fn iter(&self) -> impl Iterator<Item = &SenMLRecord> {
        self.records.iter()
    }
}

impl FromIterator<SenMLRecord> for SenMLPack {
    fn from_iter<I: IntoIterator<Item = SenMLRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for SenMLPack {
    type Item = SenMLRecord;
    type IntoIter = std::vec::IntoIter<SenMLRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a SenMLPack {
    type Item = &'a SenMLRecord;
    type IntoIter = std::slice::Iter<'a, SenMLRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// Convenience methods for serialization
impl SenMLPack {
    /// Serialize to SenML JSON bytes
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<Vec<u8>> {
        crate::json::to_json(self)
    }

    /// Deserialize from SenML JSON bytes
    #[cfg(feature = "json")]
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        crate::json::from_json(bytes, false)
    }

    /// Serialize to SenML CBOR bytes
    #[cfg(feature = "cbor")]
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        crate::cbor::to_cbor(self)
    }

    /// Deserialize from SenML CBOR bytes
    #[cfg(feature = "cbor")]
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        crate::cbor::from_cbor(bytes, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SenMLRecord;

    #[test]
    fn test_empty_pack_creation() {
        let pack = SenMLPack::new();
        assert!(pack.is_empty());
        assert_eq!(pack.len(), 0);
    }

    #[test]
    fn test_pack_with_records() {
        let mut pack = SenMLPack::new();
        pack.add_record(SenMLRecord::with_number("0", 22.5));
        pack.add_record(SenMLRecord::with_number("1", 45.0));

        assert_eq!(pack.len(), 2);
        assert!(!pack.is_empty());
    }

    #[test]
    fn test_pack_iteration() {
        let records = vec![
            SenMLRecord::with_number("0", 20.0),
            SenMLRecord::with_number("1", 50.0),
        ];
        let pack: SenMLPack = records.into_iter().collect();

        let mut count = 0;
        for record in &pack {
            count += 1;
            assert!(record.has_value());
        }
        assert_eq!(count, 2);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_roundtrip() {
        let mut pack = SenMLPack::new();
        pack.add_record(SenMLRecord::with_number("0", 22.5).with_base_name("/3303/0/"));
        pack.add_record(SenMLRecord::with_string_value("1", "OK"));

        let json = pack.to_json().unwrap();
        let restored = SenMLPack::from_json(&json).unwrap();

        assert_eq!(pack, restored);
    }

    #[cfg(feature = "cbor")]
    #[test]
    fn test_cbor_roundtrip() {
        let mut pack = SenMLPack::new();
        pack.add_record(SenMLRecord::with_number("0", 25i64));
        pack.add_record(SenMLRecord::with_bool_value("1", true));

        let cbor = pack.to_cbor().unwrap();
        let restored = SenMLPack::from_cbor(&cbor).unwrap();

        assert_eq!(pack, restored);
    }
}
