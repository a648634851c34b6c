//! The `pwr` power table

use super::{parse_table, CellValue, TableParseError, TelemetryRecord};

/// Battery status column
pub const STATUS_FIELD: &str = "Base.St";

/// Status of an empty battery slot
pub const STATUS_ABSENT: &str = "Absent";

/// Columns holding plain integers (mV, mA, m°C)
pub const INTEGER_FIELDS: &[&str] = &[
    "Power", "Volt", "Curr", "Tempr", "Tlow", "Thigh", "Vlow", "Vhigh", "MosTempr",
];

/// State-of-charge column, printed with a trailing unit such as `%`
pub const COULOMB_FIELD: &str = "Coulomb";

/// Parse a plain integer cell
pub fn parse_integer(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}

/// Parse an integer cell followed by a single non-digit unit character
pub fn parse_with_unit(text: &str) -> Option<i64> {
    let mut chars = text.trim().chars();
    let unit = chars.next_back()?;
    if unit.is_ascii_digit() {
        return None;
    }
    parse_integer(chars.as_str())
}

/// Replace a text field with `parse(text)` when it succeeds; otherwise leave it alone
pub fn coerce_field(record: &mut TelemetryRecord, name: &str, parse: fn(&str) -> Option<i64>) {
    if let Some(value) = record.get_mut(name) {
        if let Some(parsed) = value.as_text().and_then(parse) {
            *value = CellValue::Integer(parsed);
        }
    }
}

/// Parse the output of `pwr` into one record per populated battery slot
pub fn parse_power_table(payload: &str) -> Result<Vec<TelemetryRecord>, TableParseError> {
    let records = parse_table(payload)?;

    if let Some(first) = records.first() {
        if first.get(STATUS_FIELD).is_none() {
            return Err(TableParseError::new(
                format!("missing {} column", STATUS_FIELD),
                payload,
            ));
        }
    }

    Ok(records
        .into_iter()
        .filter(|record| {
            record.get(STATUS_FIELD).and_then(CellValue::as_text) != Some(STATUS_ABSENT)
        })
        .map(|mut record| {
            for field in INTEGER_FIELDS {
                coerce_field(&mut record, field, parse_integer);
            }
            coerce_field(&mut record, COULOMB_FIELD, parse_with_unit);
            record
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("123"), Some(123));
        assert_eq!(parse_integer("-1650"), Some(-1650));
        assert_eq!(parse_integer("12a"), None);
        assert_eq!(parse_integer(""), None);
    }

    #[test]
    fn test_parse_with_unit() {
        assert_eq!(parse_with_unit("4500C"), Some(4500));
        assert_eq!(parse_with_unit("87%"), Some(87));
        assert_eq!(parse_with_unit("4500"), None);
        assert_eq!(parse_with_unit("%"), None);
        assert_eq!(parse_with_unit(""), None);
        assert_eq!(parse_with_unit("-"), None);
    }

    #[test]
    fn test_coerce_field_keeps_text_on_failure() {
        let mut record: TelemetryRecord = vec![("Volt", "-"), ("Power", "3")].into_iter().collect();
        coerce_field(&mut record, "Volt", parse_integer);
        coerce_field(&mut record, "Power", parse_integer);
        coerce_field(&mut record, "Missing", parse_integer);

        assert_eq!(record.get("Volt"), Some(&CellValue::from("-")));
        assert_eq!(record.get("Power"), Some(&CellValue::Integer(3)));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_parse_power_table_filters_absent() {
        let payload = "Power Volt   Base.St\n1     49000  Normal\n2     -      Absent\n3     48000  Idle";
        let records = parse_power_table(payload).unwrap();

        let slots: Vec<i64> = records
            .iter()
            .filter_map(|r| r.get("Power").and_then(CellValue::as_integer))
            .collect();
        assert_eq!(slots, vec![1, 3]);
    }

    #[test]
    fn test_parse_power_table_requires_status_column() {
        let err = parse_power_table("Power Volt\n1     49000").unwrap_err();
        assert!(err.message.contains(STATUS_FIELD));
        assert_eq!(err.response, "Power Volt\n1     49000");
    }

    #[test]
    fn test_parse_power_table_header_only() {
        assert!(parse_power_table("Power Volt  Base.St").unwrap().is_empty());
    }
}
