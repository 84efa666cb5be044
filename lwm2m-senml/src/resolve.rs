//! Base-name / base-time resolution
//!
//! RFC 8428 §4.5: a base name or base time carried by a record applies to
//! that record and all subsequent records until another record reassigns
//! it. Resolution turns a pack of relative records into records with
//! absolute names and absolute timestamps.

use crate::{SenMLPack, SenMLRecord, SenMLValue};

/// A record with its base context applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    /// Absolute name: running base name + the record's own name.
    pub name: String,
    /// Absolute time in seconds, or `None` when neither a base time nor an
    /// own time was given.
    pub time: Option<f64>,
    /// The record value, unchanged by resolution.
    pub value: Option<SenMLValue>,
}

/// Resolve all records of a pack in declaration order.
pub fn resolve_records(pack: &SenMLPack) -> Vec<ResolvedRecord> {
    let mut base_name = String::new();
    let mut base_time: Option<f64> = None;

    pack.iter()
        .map(|record| resolve_record(record, &mut base_name, &mut base_time))
        .collect()
}

fn resolve_record(
    record: &SenMLRecord,
    base_name: &mut String,
    base_time: &mut Option<f64>,
) -> ResolvedRecord {
    if let Some(bn) = &record.base_name {
        if !bn.is_empty() {
            *base_name = bn.clone();
        }
    }
    if let Some(bt) = record.base_time {
        *base_time = Some(bt);
    }

    let name = match &record.name {
        Some(n) => format!("{}{}", base_name, n),
        None => base_name.clone(),
    };

    // A base time makes the record's own time relative to it; without one
    // the own time stands on its own (and may be absent entirely).
    let time = match *base_time {
        Some(bt) => Some(bt + record.time.unwrap_or(0.0)),
        None => record.time,
    };

    ResolvedRecord {
        name,
        time,
        value: record.value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Number, SenMLRecord};

    #[test]
    fn test_base_name_persists_until_overridden() {
        let mut pack = SenMLPack::new();
        pack.add_record(SenMLRecord::with_number("0", 1i64).with_base_name("/3/0/"));
        pack.add_record(SenMLRecord::with_number("1", 2i64));
        pack.add_record(SenMLRecord::with_number("0", 3i64).with_base_name("/3/1/"));

        let resolved = resolve_records(&pack);
        let names: Vec<&str> = resolved.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["/3/0/0", "/3/0/1", "/3/1/0"]);
    }

    #[test]
    fn test_record_without_name_uses_base() {
        let mut pack = SenMLPack::new();
        let mut record = SenMLRecord::new();
        record.base_name = Some("/3/0/5".to_string());
        record.value = Some(SenMLValue::Number(Number::Int(7)));
        pack.add_record(record);

        let resolved = resolve_records(&pack);
        assert_eq!(resolved[0].name, "/3/0/5");
    }

    #[test]
    fn test_base_time_added_to_own_time() {
        let mut pack = SenMLPack::new();
        pack.add_record(
            SenMLRecord::with_number("0", 1i64)
                .with_base_name("/3/0/")
                .with_base_time(1_000_000.0),
        );
        pack.add_record(SenMLRecord::with_number("1", 2i64).with_time(60.0));

        let resolved = resolve_records(&pack);
        assert_eq!(resolved[0].time, Some(1_000_000.0));
        assert_eq!(resolved[1].time, Some(1_000_060.0));
    }

    #[test]
    fn test_no_time_at_all_stays_none() {
        let mut pack = SenMLPack::new();
        pack.add_record(SenMLRecord::with_number("0", 1i64).with_base_name("/3/0/"));

        let resolved = resolve_records(&pack);
        assert_eq!(resolved[0].time, None);
    }

    #[test]
    fn test_base_time_replaced_not_accumulated() {
        let mut pack = SenMLPack::new();
        pack.add_record(SenMLRecord::with_number("0", 1i64).with_base_time(1000.0));
        pack.add_record(SenMLRecord::with_number("1", 2i64).with_base_time(5000.0));

        let resolved = resolve_records(&pack);
        assert_eq!(resolved[0].time, Some(1000.0));
        assert_eq!(resolved[1].time, Some(5000.0));
    }

    #[test]
    fn test_own_time_without_base_is_verbatim() {
        let mut pack = SenMLPack::new();
        pack.add_record(SenMLRecord::with_number("0", 1i64).with_time(42.0));

        let resolved = resolve_records(&pack);
        assert_eq!(resolved[0].time, Some(42.0));
    }
}
