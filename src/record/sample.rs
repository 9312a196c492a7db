//! Detailed per-corpus sample record.

use crate::ledger::{LedgerRecord, format_float, parse_float};
use crate::record::{PartitionRecord, episode_name, sanitize_field, sanitized};

/// Number of columns every detailed ledger line carries.
pub const REQUIRED_FIELDS: usize = 6;

/// Number of optional enrichment columns that may trail the required ones.
pub const OPTIONAL_FIELDS: usize = 4;

/// One sample of a source corpus, as produced by the segmenter and enriched afterwards.
///
/// The enrichment fields are `None` until a collaborator has produced a value.
/// An empty string is never stored; setters normalise it to `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub sample_name: String,
    pub track_id: u32,
    /// Duration in seconds.
    pub duration: f64,
    /// Start within the source recording, in seconds.
    pub track_start: f64,
    /// End within the source recording, in seconds.
    pub track_end: f64,
    pub speaker_id: String,
    /// Standard German transcript.
    pub de_text: Option<String>,
    pub phoneme: Option<String>,
    pub dialect: Option<String>,
    /// Swiss German (dialect) text.
    pub ch_text: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    let value = sanitize_field(value);
    if value.is_empty() { None } else { Some(value) }
}

impl SampleRecord {
    /// Creates a record without enrichment values.
    ///
    /// Tabs and line breaks in the name and speaker become spaces.
    pub fn new(
        sample_name: impl Into<String>,
        track_id: u32,
        duration: f64,
        track_start: f64,
        track_end: f64,
        speaker_id: impl Into<String>,
    ) -> Self {
        Self {
            sample_name: sanitized(sample_name),
            track_id,
            duration,
            track_start,
            track_end,
            speaker_id: sanitized(speaker_id),
            de_text: None,
            phoneme: None,
            dialect: None,
            ch_text: None,
        }
    }

    pub fn with_de_text(mut self, text: &str) -> Self {
        self.set_de_text(text);
        self
    }

    pub fn with_phoneme(mut self, phoneme: &str) -> Self {
        self.set_phoneme(phoneme);
        self
    }

    pub fn with_dialect(mut self, dialect: &str) -> Self {
        self.set_dialect(dialect);
        self
    }

    pub fn with_ch_text(mut self, text: &str) -> Self {
        self.set_ch_text(text);
        self
    }

    pub fn set_de_text(&mut self, text: &str) {
        self.de_text = non_empty(text);
    }

    pub fn set_phoneme(&mut self, phoneme: &str) {
        self.phoneme = non_empty(phoneme);
    }

    pub fn set_dialect(&mut self, dialect: &str) {
        self.dialect = non_empty(dialect);
    }

    pub fn set_ch_text(&mut self, text: &str) {
        self.ch_text = non_empty(text);
    }

    /// Name of the recording this sample was cut from.
    pub fn episode_name(&self) -> &str {
        episode_name(&self.sample_name)
    }

    /// Project onto the reduced partition form.
    ///
    /// Drops the phoneme string, the track position and the dialect text.
    pub fn to_partition_record(&self, dataset_name: &str) -> PartitionRecord {
        PartitionRecord {
            dataset_name: dataset_name.to_string(),
            sample_name: self.sample_name.clone(),
            duration: self.duration,
            speaker_id: self.speaker_id.clone(),
            dialect: self.dialect.clone().unwrap_or_default(),
            de_text: self.de_text.clone().unwrap_or_default(),
        }
    }

    fn optional_fields(&self) -> [&Option<String>; OPTIONAL_FIELDS] {
        [&self.de_text, &self.phoneme, &self.dialect, &self.ch_text]
    }
}

impl LedgerRecord for SampleRecord {
    fn key(&self) -> &str {
        &self.sample_name
    }

    fn to_fields(&self) -> Vec<String> {
        let mut fields = vec![
            sanitize_field(&self.sample_name),
            self.track_id.to_string(),
            format_float(self.duration),
            format_float(self.track_start),
            format_float(self.track_end),
            sanitize_field(&self.speaker_id),
        ];

        // Trailing unset columns are omitted; unset columns before a set one stay as gaps.
        let optional = self.optional_fields();
        let optional = optional.map(|value| sanitize_field(value.as_deref().unwrap_or_default()));
        let present = optional
            .iter()
            .rposition(|value| !value.is_empty())
            .map_or(0, |idx| idx + 1);
        fields.extend(optional.into_iter().take(present));
        fields
    }

    fn from_fields(fields: &[&str]) -> std::result::Result<Self, String> {
        if fields.len() < REQUIRED_FIELDS || fields.len() > REQUIRED_FIELDS + OPTIONAL_FIELDS {
            return Err(format!(
                "expected {} to {} fields, got {}",
                REQUIRED_FIELDS,
                REQUIRED_FIELDS + OPTIONAL_FIELDS,
                fields.len()
            ));
        }

        let track_id = fields[1]
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid track id '{}': {}", fields[1], e))?;
        let optional = |idx: usize| {
            fields
                .get(REQUIRED_FIELDS + idx)
                .filter(|value| !value.is_empty())
                .map(|value| value.to_string())
        };

        Ok(Self {
            sample_name: fields[0].to_string(),
            track_id,
            duration: parse_float(fields[2], "duration")?,
            track_start: parse_float(fields[3], "track_start")?,
            track_end: parse_float(fields[4], "track_end")?,
            speaker_id: fields[5].to_string(),
            de_text: optional(0),
            phoneme: optional(1),
            dialect: optional(2),
            ch_text: optional(3),
        })
    }
}
