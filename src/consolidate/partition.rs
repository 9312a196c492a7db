//! Partition keys, per-partition tasks and the file layout they write to.

use crate::defaults::{EXCLUDED_DIALECT, LEDGER_EXTENSION, MISSING_TEXT, STORE_EXTENSION};
use crate::error::{CorpusError, Result};
use crate::record::PartitionRecord;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

/// Routes a record into one destination store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartitionKey {
    Dialect(String),
    Shard(usize),
}

impl PartitionKey {
    /// File name (without extension) of the partition's store and ledger.
    pub fn file_stem(&self) -> String {
        match self {
            PartitionKey::Dialect(dialect) => dialect
                .chars()
                .map(|c| if c == '/' || c == '\\' { '_' } else { c })
                .collect(),
            PartitionKey::Shard(idx) => format!("subset_{}", idx),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::Dialect(dialect) => write!(f, "dialect '{}'", dialect),
            PartitionKey::Shard(idx) => write!(f, "shard {}", idx),
        }
    }
}

/// Where source stores are read from and partition stores are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    source_dir: PathBuf,
    destination_dir: PathBuf,
}

impl StoreLayout {
    pub fn new(source_dir: &Path, destination_dir: &Path) -> Self {
        Self {
            source_dir: source_dir.to_path_buf(),
            destination_dir: destination_dir.to_path_buf(),
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    /// Store holding the payloads of one source corpus.
    pub fn source_store(&self, dataset: &str) -> PathBuf {
        corpus_store_path(&self.source_dir, dataset)
    }

    pub fn destination_store(&self, key: &PartitionKey) -> PathBuf {
        self.destination_dir
            .join(format!("{}.{}", key.file_stem(), STORE_EXTENSION))
    }

    pub fn destination_ledger(&self, key: &PartitionKey) -> PathBuf {
        self.destination_dir
            .join(format!("{}.{}", key.file_stem(), LEDGER_EXTENSION))
    }
}

/// `{dir}/{dataset}.blob`
pub fn corpus_store_path(dir: &Path, dataset: &str) -> PathBuf {
    dir.join(format!("{}.{}", dataset, STORE_EXTENSION))
}

/// `{dir}/{dataset}.txt`
pub fn corpus_ledger_path(dir: &Path, dataset: &str) -> PathBuf {
    dir.join(format!("{}.{}", dataset, LEDGER_EXTENSION))
}

/// All records routed to one partition, with the files the partition owns.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionTask {
    pub key: PartitionKey,
    pub store_path: PathBuf,
    pub ledger_path: PathBuf,
    pub records: Vec<PartitionRecord>,
}

impl PartitionTask {
    pub fn new(key: PartitionKey, layout: &StoreLayout, records: Vec<PartitionRecord>) -> Self {
        Self {
            store_path: layout.destination_store(&key),
            ledger_path: layout.destination_ledger(&key),
            key,
            records,
        }
    }

    /// Total duration of the partition's records, in seconds.
    pub fn duration(&self) -> f64 {
        self.records.iter().map(|r| r.duration).sum()
    }

    /// Records grouped by source corpus, corpora in order of first appearance.
    pub fn by_dataset(&self) -> Vec<(&str, Vec<&PartitionRecord>)> {
        let mut groups: Vec<(&str, Vec<&PartitionRecord>)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for record in &self.records {
            let dataset = record.dataset_name.as_str();
            match index.get(dataset) {
                Some(&idx) => groups[idx].1.push(record),
                None => {
                    index.insert(dataset, groups.len());
                    groups.push((dataset, vec![record]));
                }
            }
        }
        groups
    }
}

/// Decides which records take part in partitioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityFilter {
    missing_text: String,
    excluded_dialects: Vec<String>,
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self {
            missing_text: MISSING_TEXT.to_string(),
            excluded_dialects: vec![EXCLUDED_DIALECT.to_string()],
        }
    }
}

impl EligibilityFilter {
    pub fn new(missing_text: &str, excluded_dialects: &[String]) -> Self {
        Self {
            missing_text: missing_text.to_string(),
            excluded_dialects: excluded_dialects.to_vec(),
        }
    }

    /// Whether the record has a usable dialect label.
    pub fn has_dialect(&self, record: &PartitionRecord) -> bool {
        !record.dialect.is_empty() && !self.excluded_dialects.contains(&record.dialect)
    }

    /// Text present, dialect usable and source corpus known.
    pub fn is_eligible(&self, record: &PartitionRecord) -> bool {
        record.de_text != self.missing_text
            && self.has_dialect(record)
            && !record.dataset_name.is_empty()
    }

    /// Keep eligible records, returning them and the number dropped.
    pub fn apply(&self, records: Vec<PartitionRecord>) -> (Vec<PartitionRecord>, usize) {
        let before = records.len();
        let kept: Vec<PartitionRecord> = records
            .into_iter()
            .filter(|record| self.is_eligible(record))
            .collect();
        let dropped = before - kept.len();
        (kept, dropped)
    }
}

/// Build one task per key from `(key, record)` pairs. Empty keys produce no task.
pub fn group_by_key(
    records: impl IntoIterator<Item = (PartitionKey, PartitionRecord)>,
    layout: &StoreLayout,
) -> Vec<PartitionTask> {
    let mut grouped: BTreeMap<PartitionKey, Vec<PartitionRecord>> = BTreeMap::new();
    for (key, record) in records {
        grouped.entry(key).or_default().push(record);
    }
    grouped
        .into_iter()
        .map(|(key, records)| PartitionTask::new(key, layout, records))
        .collect()
}

/// Route records by their dialect label.
///
/// Records without a usable dialect are not routed; their count is returned.
pub fn group_by_dialect(
    records: Vec<PartitionRecord>,
    filter: &EligibilityFilter,
    layout: &StoreLayout,
) -> (Vec<PartitionTask>, usize) {
    let total = records.len();
    let keyed: Vec<(PartitionKey, PartitionRecord)> = records
        .into_iter()
        .filter(|record| filter.has_dialect(record))
        .map(|record| (PartitionKey::Dialect(record.dialect.clone()), record))
        .collect();
    let skipped = total - keyed.len();
    if skipped > 0 {
        tracing::warn!("{} records have no usable dialect and are not moved", skipped);
    }
    (group_by_key(keyed, layout), skipped)
}

/// Route shard groups: group `i` becomes [`PartitionKey::Shard`]`(i)`.
pub fn group_by_shard(shards: Vec<Vec<PartitionRecord>>, layout: &StoreLayout) -> Vec<PartitionTask> {
    shards
        .into_iter()
        .enumerate()
        .filter(|(_, records)| !records.is_empty())
        .map(|(idx, records)| PartitionTask::new(PartitionKey::Shard(idx), layout, records))
        .collect()
}

/// Reject plans where two partitions, or a partition and a source corpus, share a file.
///
/// Every destination must have exactly one writer for the whole run.
pub fn check_destinations(tasks: &[PartitionTask], layout: &StoreLayout) -> Result<()> {
    let mut owners: HashMap<&Path, &PartitionKey> = HashMap::new();
    for task in tasks {
        for path in [task.store_path.as_path(), task.ledger_path.as_path()] {
            if let Some(first) = owners.insert(path, &task.key) {
                return Err(CorpusError::DuplicateDestination {
                    first: first.to_string(),
                    second: task.key.to_string(),
                    path: path.display().to_string(),
                });
            }
        }
    }

    for task in tasks {
        for record in &task.records {
            let source = layout.source_store(&record.dataset_name);
            if let Some(owner) = owners.get(source.as_path()) {
                return Err(CorpusError::DuplicateDestination {
                    first: owner.to_string(),
                    second: format!("source corpus '{}'", record.dataset_name),
                    path: source.display().to_string(),
                });
            }
        }
    }
    Ok(())
}
