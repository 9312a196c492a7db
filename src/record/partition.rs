//! Reduced sample record used once a sample has been routed to a partition.

use crate::ledger::{LedgerRecord, format_float, parse_float};
use crate::record::{episode_name, sanitize_field, sanitized};

/// Column count of the partition ledger schema.
pub const FIELD_COUNT: usize = 6;

/// Narrow projection of a sample: corpus, identity, duration, speaker, dialect and text.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRecord {
    /// Source corpus, also the name of the store the payload is read from.
    pub dataset_name: String,
    pub sample_name: String,
    pub duration: f64,
    pub speaker_id: String,
    pub dialect: String,
    pub de_text: String,
}

impl PartitionRecord {
    /// Creates a record. Tabs and line breaks in any text column become spaces.
    pub fn new(
        dataset_name: impl Into<String>,
        sample_name: impl Into<String>,
        duration: f64,
        speaker_id: impl Into<String>,
        dialect: impl Into<String>,
        de_text: impl Into<String>,
    ) -> Self {
        Self {
            dataset_name: sanitized(dataset_name),
            sample_name: sanitized(sample_name),
            duration,
            speaker_id: sanitized(speaker_id),
            dialect: sanitized(dialect),
            de_text: sanitized(de_text),
        }
    }

    pub fn episode_name(&self) -> &str {
        episode_name(&self.sample_name)
    }
}

impl LedgerRecord for PartitionRecord {
    fn key(&self) -> &str {
        &self.sample_name
    }

    fn to_fields(&self) -> Vec<String> {
        vec![
            sanitize_field(&self.dataset_name),
            sanitize_field(&self.sample_name),
            format_float(self.duration),
            sanitize_field(&self.speaker_id),
            sanitize_field(&self.dialect),
            sanitize_field(&self.de_text),
        ]
    }

    fn from_fields(fields: &[&str]) -> std::result::Result<Self, String> {
        if fields.len() != FIELD_COUNT {
            return Err(format!(
                "expected {} fields, got {}",
                FIELD_COUNT,
                fields.len()
            ));
        }
        Ok(Self {
            dataset_name: fields[0].to_string(),
            sample_name: fields[1].to_string(),
            duration: parse_float(fields[2], "duration")?,
            speaker_id: fields[3].to_string(),
            dialect: fields[4].to_string(),
            de_text: fields[5].to_string(),
        })
    }
}
