use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::domain::{BiometricRecord, MemberId, MetricType};

#[derive(Debug)]
pub enum RecordImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { line: usize, detail: String },
}

impl std::fmt::Display for RecordImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordImportError::Io(err) => write!(f, "failed to read biometric export: {}", err),
            RecordImportError::Csv(err) => write!(f, "invalid biometric CSV data: {}", err),
            RecordImportError::InvalidRow { line, detail } => {
                write!(f, "line {}: {}", line, detail)
            }
        }
    }
}

impl std::error::Error for RecordImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordImportError::Io(err) => Some(err),
            RecordImportError::Csv(err) => Some(err),
            RecordImportError::InvalidRow { .. } => None,
        }
    }
}

impl From<std::io::Error> for RecordImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RecordImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

#[derive(Debug, Deserialize)]
struct RecordRow {
    member_id: String,
    metric_type: MetricType,
    value: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    unit: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    source: Option<String>,
    recorded_at: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    verified: Option<String>,
}

impl RecordRow {
    fn into_record(self, line: usize) -> Result<BiometricRecord, RecordImportError> {
        let invalid = |detail: String| RecordImportError::InvalidRow { line, detail };

        let value = Decimal::from_str(self.value.trim())
            .map_err(|err| invalid(format!("value '{}' is not a decimal: {err}", self.value)))?;
        let recorded_at = parse_timestamp(&self.recorded_at)
            .ok_or_else(|| invalid(format!("recorded_at '{}' is not a date", self.recorded_at)))?;
        let verified = match self.verified.as_deref() {
            None => false,
            Some(flag) => parse_flag(flag)
                .ok_or_else(|| invalid(format!("verified '{flag}' is not a boolean")))?,
        };

        Ok(BiometricRecord {
            member_id: MemberId(self.member_id),
            metric_type: self.metric_type,
            value,
            unit: self.unit.unwrap_or_default(),
            source: self.source.unwrap_or_else(|| "import".to_string()),
            recorded_at,
            verified,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

/// RFC 3339 timestamps, or bare dates taken as midnight UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Loads biometric readings from a CSV export with the header
/// `member_id,metric_type,value,unit,source,recorded_at,verified`.
pub struct BiometricCsvImporter;

impl BiometricCsvImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<BiometricRecord>, RecordImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<BiometricRecord>, RecordImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = Vec::new();
        for (index, row) in csv_reader.deserialize::<RecordRow>().enumerate() {
            // Header is line 1.
            records.push(row?.into_record(index + 2)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "member_id,metric_type,value,unit,source,recorded_at,verified\n";

    #[test]
    fn parse_timestamp_supports_rfc3339_and_dates() {
        let rfc = parse_timestamp("2025-02-10T07:30:00+01:00").expect("parse rfc");
        assert_eq!(
            rfc,
            Utc.with_ymd_and_hms(2025, 2, 10, 6, 30, 0).single().expect("valid")
        );

        let date = parse_timestamp("2025-02-11").expect("parse date");
        assert_eq!(
            date,
            Utc.with_ymd_and_hms(2025, 2, 11, 0, 0, 0).single().expect("valid")
        );

        assert!(parse_timestamp(" ").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn importer_reads_rows_and_defaults_blank_columns() {
        let csv = format!(
            "{HEADER}m-1,STEPS,7200,steps,fitbit,2025-02-10T08:00:00Z,true\n\
m-1,SLEEP_DURATION,7.25,,,2025-02-10,\n"
        );

        let records = BiometricCsvImporter::from_reader(Cursor::new(csv)).expect("import");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metric_type, MetricType::Steps);
        assert_eq!(records[0].value, Decimal::from(7_200));
        assert!(records[0].verified);
        assert_eq!(records[1].value, Decimal::new(725, 2));
        assert_eq!(records[1].source, "import");
        assert!(!records[1].verified);
    }

    #[test]
    fn importer_reports_the_offending_line() {
        let csv = format!(
            "{HEADER}m-1,STEPS,7200,steps,fitbit,2025-02-10,yes\n\
m-1,STEPS,lots,steps,fitbit,2025-02-11,yes\n"
        );

        match BiometricCsvImporter::from_reader(Cursor::new(csv)) {
            Err(RecordImportError::InvalidRow { line, detail }) => {
                assert_eq!(line, 3);
                assert!(detail.contains("lots"));
            }
            other => panic!("expected invalid row, got {other:?}"),
        }
    }

    #[test]
    fn importer_rejects_unknown_metric_types() {
        let csv = format!("{HEADER}m-1,CALORIES,2000,kcal,app,2025-02-10,no\n");

        assert!(matches!(
            BiometricCsvImporter::from_reader(Cursor::new(csv)),
            Err(RecordImportError::Csv(_))
        ));
    }

    #[test]
    fn importer_from_path_propagates_io_errors() {
        match BiometricCsvImporter::from_path("./does-not-exist.csv") {
            Err(RecordImportError::Io(_)) => {}
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
