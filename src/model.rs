use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One spreadsheet line: header name -> cell text, in sheet column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(cells: Vec<(String, String)>) -> Self {
        Self { cells }
    }

    /// Zip a header with one row of values; missing trailing cells become "".
    pub fn from_header(header: &[String], values: &[String]) -> Self {
        let cells = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), values.get(i).cloned().unwrap_or_default()))
            .collect();
        Self { cells }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }
}

/// Something wrong with a single record. The record is kept either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationWarning {
    MissingField(&'static str),
    ContentTooShort { len: usize, min: usize },
    ContentTooLong { len: usize, max: usize },
    UnparseableTimestamp(String),
    UnparseableDate(String),
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::MissingField(field) => write!(f, "missing {}", field),
            ValidationWarning::ContentTooShort { len, min } => {
                write!(f, "content too short ({} < {})", len, min)
            }
            ValidationWarning::ContentTooLong { len, max } => {
                write!(f, "content too long ({} > {})", len, max)
            }
            ValidationWarning::UnparseableTimestamp(s) => write!(f, "unparseable timestamp {:?}", s),
            ValidationWarning::UnparseableDate(s) => write!(f, "unparseable date {:?}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrayerRecord {
    pub submitter: String,
    pub target_name: String,
    pub gender: String,
    pub age: String,
    pub relationship: String,
    pub church: String,
    pub prayer_content: String,
    pub submitted_at: Option<NaiveDateTime>,
    pub event_date: Option<NaiveDate>,
    pub warnings: Vec<ValidationWarning>,
}

impl PrayerRecord {
    pub fn is_flagged(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitterGroup {
    pub submitter: String,
    pub records: Vec<PrayerRecord>,
}

/// Output of one pipeline run, handed to the publisher. Groups are kept in
/// first-seen submitter order.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedBatch {
    pub last_updated: DateTime<Local>,
    pub groups: Vec<SubmitterGroup>,
}

impl ProcessedBatch {
    pub fn records_for(&self, submitter: &str) -> &[PrayerRecord] {
        self.groups
            .iter()
            .find(|g| g.submitter == submitter)
            .map(|g| g.records.as_slice())
            .unwrap_or(&[])
    }

    pub fn submitters(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.submitter.as_str())
    }

    pub fn total_records(&self) -> usize {
        self.groups.iter().map(|g| g.records.len()).sum()
    }

    pub fn records(&self) -> impl Iterator<Item = &PrayerRecord> {
        self.groups.iter().flat_map(|g| g.records.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_row_pads_missing_cells() {
        let header = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let row = RawRow::from_header(&header, &["1".to_string()]);
        assert_eq!(row.get("a"), Some("1"));
        assert_eq!(row.get("b"), Some(""));
        assert_eq!(row.get("c"), Some(""));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.cells().len(), 3);
    }

    #[test]
    fn warning_display() {
        assert_eq!(
            ValidationWarning::MissingField("target_name").to_string(),
            "missing target_name"
        );
        assert_eq!(
            ValidationWarning::ContentTooShort { len: 3, min: 10 }.to_string(),
            "content too short (3 < 10)"
        );
    }
}
