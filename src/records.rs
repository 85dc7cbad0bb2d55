//! Turns raw sheet rows into per-submitter groups of sanitized records.
use chrono::{DateTime, Local};
use std::collections::HashMap;
use tracing::warn;

use crate::config::{Columns, Validation};
use crate::model::{PrayerRecord, ProcessedBatch, RawRow, SubmitterGroup, ValidationWarning};
use crate::sanitize::{sanitize_content, sanitize_name};
use crate::timestamp::{parse_date, parse_timestamp};

pub struct PrayerRecordBuilder<'a> {
    columns: &'a Columns,
    rules: &'a Validation,
}

impl<'a> PrayerRecordBuilder<'a> {
    pub fn new(columns: &'a Columns, rules: &'a Validation) -> Self {
        Self { columns, rules }
    }

    /// Group rows by submitter in first-seen order. No row is ever dropped:
    /// incomplete rows are kept with warnings attached.
    pub fn build(&self, rows: &[RawRow], last_updated: DateTime<Local>) -> ProcessedBatch {
        let mut groups: Vec<SubmitterGroup> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (line, row) in rows.iter().enumerate() {
            let record = self.record(row, line);
            let slot = *index.entry(record.submitter.clone()).or_insert_with(|| {
                groups.push(SubmitterGroup {
                    submitter: record.submitter.clone(),
                    records: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].records.push(record);
        }

        ProcessedBatch {
            last_updated,
            groups,
        }
    }

    fn record(&self, row: &RawRow, line: usize) -> PrayerRecord {
        let cols = self.columns;
        let cell = |name: &str| row.get(name).unwrap_or("");
        let mut warnings = Vec::new();

        let submitter = sanitize_name(cell(&cols.submitter));
        let target_name = sanitize_name(cell(&cols.target_name));
        let prayer_content = sanitize_content(cell(&cols.prayer_content));

        for (field, value) in [
            ("submitter", &submitter),
            ("target_name", &target_name),
            ("prayer_content", &prayer_content),
        ] {
            if value.is_empty() {
                warnings.push(ValidationWarning::MissingField(field));
            }
        }

        if !prayer_content.is_empty() {
            let len = prayer_content.chars().count();
            if len < self.rules.min_content_length {
                warnings.push(ValidationWarning::ContentTooShort {
                    len,
                    min: self.rules.min_content_length,
                });
            } else if len > self.rules.max_content_length {
                warnings.push(ValidationWarning::ContentTooLong {
                    len,
                    max: self.rules.max_content_length,
                });
            }
        }

        let raw_ts = cell(&cols.timestamp).trim();
        let submitted_at = if raw_ts.is_empty() {
            None
        } else {
            match parse_timestamp(raw_ts) {
                Ok(ts) => Some(ts),
                Err(err) => {
                    warn!(line, literal = %err.literal(), "unparseable timestamp: {}", err);
                    warnings.push(ValidationWarning::UnparseableTimestamp(raw_ts.to_string()));
                    None
                }
            }
        };

        let raw_date = cols
            .event_date
            .as_deref()
            .map(|c| cell(c).trim())
            .unwrap_or("");
        let event_date = if raw_date.is_empty() {
            None
        } else {
            match parse_date(raw_date) {
                Ok(d) => Some(d),
                Err(err) => {
                    warn!(line, literal = %err.literal(), "unparseable event date: {}", err);
                    warnings.push(ValidationWarning::UnparseableDate(raw_date.to_string()));
                    None
                }
            }
        };

        PrayerRecord {
            submitter,
            target_name,
            gender: sanitize_name(cell(&cols.gender)),
            age: sanitize_name(cell(&cols.age)),
            relationship: sanitize_name(cell(&cols.relationship)),
            church: sanitize_name(cell(&cols.church)),
            prayer_content,
            submitted_at,
            event_date,
            warnings,
        }
    }
}

/// Required columns absent from the sheet header, in configured order.
pub fn check_headers<'c>(header: &[String], required: &'c [String]) -> Vec<&'c str> {
    required
        .iter()
        .filter(|col| !header.iter().any(|h| h.trim() == col.trim()))
        .map(String::as_str)
        .collect()
}
