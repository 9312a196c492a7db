//! Diarized segment input, in the JSON shape produced by whisperX-style alignment.

use crate::error::{CorpusError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One aligned word. Alignment sometimes fails, leaving the timestamps unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    #[serde(rename = "word")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl Word {
    pub fn new(text: &str, start: f64, end: f64) -> Self {
        Self {
            text: text.to_string(),
            start: Some(start),
            end: Some(end),
            score: None,
            speaker: None,
        }
    }

    /// A word whose alignment failed.
    pub fn untimed(text: &str) -> Self {
        Self {
            text: text.to_string(),
            start: None,
            end: None,
            score: None,
            speaker: None,
        }
    }

    pub fn with_speaker(mut self, speaker: &str) -> Self {
        self.speaker = Some(speaker.to_string());
        self
    }

    /// Start and end, when both are known.
    pub fn span(&self) -> Option<(f64, f64)> {
        Some((self.start?, self.end?))
    }
}

/// A time-bounded span of a recording with text, words and usually a speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub words: Vec<Word>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    /// Set on fragments produced by cutting a longer segment.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_cut: bool,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: &str) -> Self {
        Self {
            start,
            end,
            text: text.to_string(),
            words: Vec::new(),
            speaker: None,
            is_cut: false,
        }
    }

    pub fn with_speaker(mut self, speaker: &str) -> Self {
        self.speaker = Some(speaker.to_string());
        self
    }

    pub fn with_words(mut self, words: Vec<Word>) -> Self {
        self.words = words;
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether the segment is unreliable as a single-speaker sample.
    ///
    /// True without a segment speaker, without any speaker-tagged word, or when
    /// several speakers occur and the most frequent one covers less than
    /// `threshold` of all words.
    pub fn is_complex(&self, threshold: f64) -> bool {
        if self.speaker.is_none() {
            return true;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for speaker in self.words.iter().filter_map(|w| w.speaker.as_deref()) {
            *counts.entry(speaker).or_default() += 1;
        }

        match counts.len() {
            0 => true,
            1 => false,
            _ => {
                let dominant = counts.values().copied().max().unwrap_or(0);
                (dominant as f64 / self.words.len() as f64) < threshold
            }
        }
    }
}

/// Load the diarized segments of one recording from a JSON array file.
pub fn load_segments(path: &Path) -> Result<Vec<Segment>> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| CorpusError::SegmentInput {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
