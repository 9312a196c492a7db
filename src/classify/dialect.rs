//! Dialect identification by majority vote over per-speaker groups.

use crate::classify::accumulator::SpeakerAccumulator;
use crate::error::{CorpusError, Result};
use crate::ledger;
use crate::record::SampleRecord;
use std::path::Path;
use std::sync::Arc;

/// Dialect labels in classifier output order.
pub const DIALECT_CLASSES: [&str; 9] = [
    "Zürich",
    "Innerschweiz",
    "Wallis",
    "Graubünden",
    "Ostschweiz",
    "Basel",
    "Bern",
    "Deutschland",
    "English",
];

/// Short tags used by downstream synthesis for each dialect label.
const DIALECT_TAGS: [(&str, &str); 8] = [
    ("Zürich", "ch_zh"),
    ("Innerschweiz", "ch_lu"),
    ("Wallis", "ch_vs"),
    ("Graubünden", "ch_gr"),
    ("Ostschweiz", "ch_sg"),
    ("Basel", "ch_bs"),
    ("Bern", "ch_be"),
    ("Deutschland", "de"),
];

/// Label of a classifier output index.
pub fn class_label(index: usize) -> Option<&'static str> {
    DIALECT_CLASSES.get(index).copied()
}

/// Tag of a dialect label, `None` for labels without one (e.g. English).
pub fn dialect_tag(label: &str) -> Option<&'static str> {
    DIALECT_TAGS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, tag)| *tag)
}

/// Text classifier predicting a dialect class index per input text.
///
/// Inputs are phoneme strings with spaces removed inside each sample and
/// samples joined by single spaces.
pub trait DialectClassifier: Send + Sync {
    /// Predict one class index per text, in input order.
    fn predict(&self, texts: &[String]) -> Result<Vec<usize>>;

    fn model_name(&self) -> &str;
}

impl<T: DialectClassifier> DialectClassifier for Arc<T> {
    fn predict(&self, texts: &[String]) -> Result<Vec<usize>> {
        (**self).predict(texts)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Mock classifier for testing
#[derive(Debug, Clone)]
pub struct MockClassifier {
    model_name: String,
    default_class: usize,
    rules: Vec<(String, usize)>,
    should_fail: bool,
}

impl MockClassifier {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            default_class: 0,
            rules: Vec::new(),
            should_fail: false,
        }
    }

    /// Class predicted when no rule matches.
    pub fn with_default_class(mut self, class: usize) -> Self {
        self.default_class = class;
        self
    }

    /// Predict `class` for every text containing `needle`. First matching rule wins.
    pub fn with_rule(mut self, needle: &str, class: usize) -> Self {
        self.rules.push((needle.to_string(), class));
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl DialectClassifier for MockClassifier {
    fn predict(&self, texts: &[String]) -> Result<Vec<usize>> {
        if self.should_fail {
            return Err(CorpusError::Classification {
                message: "mock classification failure".to_string(),
            });
        }
        Ok(texts
            .iter()
            .map(|text| {
                self.rules
                    .iter()
                    .find(|(needle, _)| text.contains(needle.as_str()))
                    .map_or(self.default_class, |(_, class)| *class)
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Counts from one dialect assignment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignmentSummary {
    pub speakers: usize,
    pub groups: usize,
    pub labelled: usize,
    /// Records without a phoneme string, left untouched.
    pub unclassifiable: usize,
}

/// Most frequent value; ties go to the value seen first.
fn majority(predictions: &[usize]) -> Option<usize> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for &prediction in predictions {
        match counts.iter_mut().find(|(class, _)| *class == prediction) {
            Some((_, count)) => *count += 1,
            None => counts.push((prediction, 1)),
        }
    }
    let best = counts.iter().map(|(_, count)| *count).max()?;
    counts
        .iter()
        .find(|(_, count)| *count == best)
        .map(|(class, _)| *class)
}

fn group_text(records: &[SampleRecord], members: &[usize]) -> String {
    members
        .iter()
        .filter_map(|&idx| records[idx].phoneme.as_deref())
        .map(|phoneme| phoneme.replace(' ', ""))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Label every record with the majority dialect of its (episode, speaker).
///
/// Records are grouped with [`SpeakerAccumulator`] into units of at most
/// `group_max_secs`; the classifier labels each unit and the most common
/// label is written to every record of the speaker.
pub fn assign_dialects(
    records: &mut [SampleRecord],
    classifier: &dyn DialectClassifier,
    group_max_secs: f64,
) -> Result<AssignmentSummary> {
    tracing::info!(
        "Assigning dialects with {} over groups of up to {}s",
        classifier.model_name(),
        group_max_secs
    );

    let mut accumulator = SpeakerAccumulator::new(group_max_secs);
    let mut summary = AssignmentSummary::default();
    for (index, record) in records.iter().enumerate() {
        if record.phoneme.is_none() {
            summary.unclassifiable += 1;
            continue;
        }
        accumulator.add(index, record.episode_name(), &record.speaker_id, record.duration);
    }
    if summary.unclassifiable > 0 {
        tracing::warn!(
            "{} records have no phoneme string and keep their dialect",
            summary.unclassifiable
        );
    }

    let mut labels: Vec<(Vec<usize>, &'static str)> = Vec::new();
    for speaker in accumulator.speakers() {
        let texts: Vec<String> = speaker
            .groups
            .iter()
            .map(|group| group_text(records, &group.members))
            .collect();

        let predictions = classifier.predict(&texts)?;
        if predictions.len() != texts.len() {
            return Err(CorpusError::Classification {
                message: format!(
                    "classifier returned {} predictions for {} inputs",
                    predictions.len(),
                    texts.len()
                ),
            });
        }

        let Some(winner) = majority(&predictions) else {
            continue;
        };
        let label = class_label(winner).ok_or_else(|| CorpusError::Classification {
            message: format!("unknown dialect class {}", winner),
        })?;
        tracing::info!(
            "Most common prediction for {} in {}: {}",
            speaker.speaker,
            speaker.episode,
            label
        );

        let members: Vec<usize> = speaker
            .groups
            .iter()
            .flat_map(|group| group.members.iter().copied())
            .collect();
        summary.speakers += 1;
        summary.groups += speaker.groups.len();
        labels.push((members, label));
    }

    for (members, label) in labels {
        for idx in members {
            records[idx].set_dialect(label);
            tracing::debug!("{} -> {}", records[idx].sample_name, label);
            summary.labelled += 1;
        }
    }

    Ok(summary)
}

/// Run [`assign_dialects`] over a detailed ledger file and rewrite it.
pub fn classify_ledger(
    path: &Path,
    classifier: &dyn DialectClassifier,
    group_max_secs: f64,
) -> Result<AssignmentSummary> {
    let mut records: Vec<SampleRecord> = ledger::load(path)?;
    let summary = assign_dialects(&mut records, classifier, group_max_secs)?;
    ledger::write_all(path, &records)?;
    Ok(summary)
}
