//! Copies the records of one partition into its destination store and ledger.

use crate::consolidate::partition::{PartitionKey, PartitionTask, StoreLayout};
use crate::error::{CorpusError, Result};
use crate::ledger::{self, LedgerAppender, LedgerRecord};
use crate::record::PartitionRecord;
use crate::store::{StoreBackend, StoreReader};
use std::collections::HashMap;
use std::path::PathBuf;

/// What a worker did for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOutcome {
    pub key: PartitionKey,
    pub store_path: PathBuf,
    /// Payloads copied in this run.
    pub copied: usize,
    /// Records whose key was already in the destination store.
    pub skipped: usize,
    /// Skipped records whose ledger line was missing and has been written.
    pub ledger_repaired: usize,
    /// Records whose payload was not found in their source store.
    pub missing: Vec<String>,
    /// Records not copied because a sample of the same name from another corpus holds the key.
    pub collisions: Vec<String>,
}

impl PartitionOutcome {
    fn new(task: &PartitionTask) -> Self {
        Self {
            key: task.key.clone(),
            store_path: task.store_path.clone(),
            copied: 0,
            skipped: 0,
            ledger_repaired: 0,
            missing: Vec::new(),
            collisions: Vec::new(),
        }
    }

    /// Every record is now in the destination store and ledger.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Run one partition to completion.
///
/// The caller guarantees this worker is the only writer of the task's store
/// and ledger. A record already in the destination store is not copied again,
/// and a ledger line is only written for keys the ledger does not hold yet, so
/// re-running a partition changes neither file. A record whose payload is
/// missing from its source is reported and gets no ledger line.
pub fn run_partition(
    task: &PartitionTask,
    layout: &StoreLayout,
    backend: &dyn StoreBackend,
) -> Result<PartitionOutcome> {
    tracing::info!(
        "Moving {} records ({:.1}s) into {}",
        task.records.len(),
        task.duration(),
        task.key
    );

    if let Some(parent) = task.ledger_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Sample name to the corpus that owns it in this partition.
    let mut recorded: HashMap<String, String> =
        ledger::load_or_empty::<PartitionRecord>(&task.ledger_path)?
            .into_iter()
            .map(|record| (record.sample_name, record.dataset_name))
            .collect();
    let mut destination = backend.open_append(&task.store_path)?;
    let mut ledger = LedgerAppender::open(&task.ledger_path)?;
    let mut outcome = PartitionOutcome::new(task);

    for (dataset, records) in task.by_dataset() {
        let source_path = layout.source_store(dataset);
        let mut source: Option<Box<dyn StoreReader>> = None;

        for record in records {
            let key = record.key();

            if destination.contains(key) {
                match recorded.get(key) {
                    Some(owner) if *owner != record.dataset_name => {
                        tracing::warn!(
                            "{} from {} collides with the sample of the same name from {} in {}, not copied",
                            key,
                            record.dataset_name,
                            owner,
                            task.key
                        );
                        outcome.collisions.push(key.to_string());
                    }
                    Some(_) => outcome.skipped += 1,
                    None => {
                        tracing::warn!("{} is stored in {} but not in its ledger", key, task.key);
                        ledger.append(record)?;
                        recorded.insert(key.to_string(), record.dataset_name.clone());
                        outcome.skipped += 1;
                        outcome.ledger_repaired += 1;
                    }
                }
                continue;
            }

            if source.is_none() {
                source = Some(backend.open_read(&source_path)?);
            }
            let Some(reader) = source.as_mut() else {
                continue;
            };

            let Some(sample) = reader.read(key)? else {
                let error = CorpusError::MissingPayload {
                    key: key.to_string(),
                    store: source_path.display().to_string(),
                };
                tracing::error!("{}", error);
                outcome.missing.push(key.to_string());
                continue;
            };

            destination.create(key, &sample.payload, &sample.attributes)?;
            destination.flush()?;
            if !recorded.contains_key(key) {
                ledger.append(record)?;
                recorded.insert(key.to_string(), record.dataset_name.clone());
            }
            outcome.copied += 1;
        }
    }

    ledger.sync()?;
    tracing::info!(
        "Finished {}: {} copied, {} already present, {} missing, {} name collisions",
        task.key,
        outcome.copied,
        outcome.skipped,
        outcome.missing.len(),
        outcome.collisions.len()
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AttrValue, Attributes, MemoryBackend, attr};
    use std::path::Path;
    use tempfile::TempDir;

    fn record(dataset: &str, name: &str) -> PartitionRecord {
        PartitionRecord::new(dataset, name, 2.5, "SPEAKER_00", "Bern", "Grüezi")
    }

    fn seed(backend: &MemoryBackend, layout: &StoreLayout, dataset: &str, names: &[&str]) {
        for name in names {
            let mut attributes = Attributes::new();
            attributes.insert(attr::SPEAKER.to_string(), "SPEAKER_00".into());
            attributes.insert(attr::DIALECT.to_string(), "Bern".into());
            attributes.insert(attr::MEL_SPECTROGRAM.to_string(), vec![0.25f32; 4].into());
            backend
                .insert(&layout.source_store(dataset), name, vec![0.5; 8], attributes)
                .unwrap();
        }
    }

    fn task(layout: &StoreLayout, records: Vec<PartitionRecord>) -> PartitionTask {
        PartitionTask::new(PartitionKey::Dialect("Bern".into()), layout, records)
    }

    fn ledger_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn copies_payload_attributes_and_ledger() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(&dir.path().join("src"), &dir.path().join("dst"));
        let backend = MemoryBackend::new();
        seed(&backend, &layout, "pod", &["ep_1000", "ep_1001"]);
        let task = task(&layout, vec![record("pod", "ep_1000"), record("pod", "ep_1001")]);

        let outcome = run_partition(&task, &layout, &backend).unwrap();

        assert_eq!(outcome.copied, 2);
        assert!(outcome.is_complete());
        assert_eq!(backend.keys(&task.store_path), vec!["ep_1000", "ep_1001"]);
        assert_eq!(backend.flush_count(&task.store_path), 2);

        let mut reader = backend.open_read(&task.store_path).unwrap();
        let copied = reader.read("ep_1000").unwrap().unwrap();
        assert_eq!(copied.payload, vec![0.5; 8]);
        assert_eq!(copied.attributes[attr::DIALECT].as_text(), Some("Bern"));
        assert_eq!(
            copied.attributes[attr::MEL_SPECTROGRAM],
            AttrValue::Series(vec![0.25; 4])
        );

        assert_eq!(
            ledger_lines(&task.ledger_path),
            vec![
                "pod\tep_1000\t2.5\tSPEAKER_00\tBern\tGrüezi",
                "pod\tep_1001\t2.5\tSPEAKER_00\tBern\tGrüezi",
            ]
        );
    }

    #[test]
    fn second_run_changes_neither_store_nor_ledger() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(&dir.path().join("src"), &dir.path().join("dst"));
        let backend = MemoryBackend::new();
        seed(&backend, &layout, "pod", &["ep_1000", "ep_1001"]);
        let task = task(&layout, vec![record("pod", "ep_1000"), record("pod", "ep_1001")]);

        run_partition(&task, &layout, &backend).unwrap();
        let lines = ledger_lines(&task.ledger_path);
        let again = run_partition(&task, &layout, &backend).unwrap();

        assert_eq!(again.copied, 0);
        assert_eq!(again.skipped, 2);
        assert_eq!(again.ledger_repaired, 0);
        assert_eq!(backend.keys(&task.store_path).len(), 2);
        assert_eq!(ledger_lines(&task.ledger_path), lines);
    }

    #[test]
    fn stored_key_missing_from_ledger_is_repaired() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(&dir.path().join("src"), &dir.path().join("dst"));
        let backend = MemoryBackend::new();
        seed(&backend, &layout, "pod", &["ep_1000", "ep_1001"]);
        let task = task(&layout, vec![record("pod", "ep_1000"), record("pod", "ep_1001")]);

        // Crash after the first store flush, before its ledger line.
        backend
            .insert(&task.store_path, "ep_1000", vec![0.5; 8], Attributes::new())
            .unwrap();

        let outcome = run_partition(&task, &layout, &backend).unwrap();

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.ledger_repaired, 1);
        assert_eq!(outcome.copied, 1);
        assert_eq!(ledger_lines(&task.ledger_path).len(), 2);
    }

    #[test]
    fn duplicate_records_in_one_task_write_one_line() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(&dir.path().join("src"), &dir.path().join("dst"));
        let backend = MemoryBackend::new();
        seed(&backend, &layout, "pod", &["ep_1000"]);
        let task = task(&layout, vec![record("pod", "ep_1000"), record("pod", "ep_1000")]);

        let outcome = run_partition(&task, &layout, &backend).unwrap();

        assert_eq!(outcome.copied, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(ledger_lines(&task.ledger_path).len(), 1);
    }

    #[test]
    fn missing_payload_is_reported_without_ledger_line() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(&dir.path().join("src"), &dir.path().join("dst"));
        let backend = MemoryBackend::new();
        seed(&backend, &layout, "pod", &["ep_1000", "ep_1002"]);
        let task = task(
            &layout,
            vec![
                record("pod", "ep_1000"),
                record("pod", "ep_1001"),
                record("pod", "ep_1002"),
            ],
        );

        let outcome = run_partition(&task, &layout, &backend).unwrap();

        assert_eq!(outcome.copied, 2);
        assert_eq!(outcome.missing, vec!["ep_1001"]);
        assert!(!outcome.is_complete());
        assert_eq!(backend.keys(&task.store_path), vec!["ep_1000", "ep_1002"]);
        let lines = ledger_lines(&task.ledger_path);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| !l.contains("ep_1001")));
    }

    #[test]
    fn same_name_from_another_corpus_is_reported_as_collision() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(&dir.path().join("src"), &dir.path().join("dst"));
        let backend = MemoryBackend::new();
        seed(&backend, &layout, "srf_a", &["ep_1000"]);
        seed(&backend, &layout, "srf_b", &["ep_1000"]);
        let task = task(&layout, vec![record("srf_a", "ep_1000"), record("srf_b", "ep_1000")]);

        let outcome = run_partition(&task, &layout, &backend).unwrap();

        assert_eq!(outcome.copied, 1);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.collisions, vec!["ep_1000"]);
        assert_eq!(
            ledger_lines(&task.ledger_path),
            vec!["srf_a\tep_1000\t2.5\tSPEAKER_00\tBern\tGrüezi"]
        );

        // A rerun still sees the collision instead of counting it as present.
        let again = run_partition(&task, &layout, &backend).unwrap();
        assert_eq!(again.skipped, 1);
        assert_eq!(again.collisions, vec!["ep_1000"]);
    }

    #[test]
    fn unopenable_source_fails_the_partition() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(&dir.path().join("src"), &dir.path().join("dst"));
        let backend = MemoryBackend::new();
        let task = task(&layout, vec![record("nowhere", "ep_1000")]);

        assert!(run_partition(&task, &layout, &backend).is_err());
    }

    #[test]
    fn source_is_not_opened_when_everything_is_present() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::new(&dir.path().join("src"), &dir.path().join("dst"));
        let backend = MemoryBackend::new();
        let task = task(&layout, vec![record("gone", "ep_1000")]);
        backend
            .insert(&task.store_path, "ep_1000", vec![0.5], Attributes::new())
            .unwrap();

        let outcome = run_partition(&task, &layout, &backend).unwrap();
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.is_complete());
    }
}
