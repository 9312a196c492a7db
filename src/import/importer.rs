//! Writes externally prepared clips into a corpus store and reduced ledger.

use crate::audio::read_wav_file;
use crate::defaults::{SAMPLE_RATE, round_time};
use crate::error::Result;
use crate::import::manifest::ImportEntry;
use crate::ledger::{self, LedgerAppender};
use crate::record::PartitionRecord;
use crate::store::{Attributes, StoreBackend, StoreReader, attr};
use std::path::{Path, PathBuf};

/// Counts from one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    /// Clips already recorded by an earlier run.
    pub skipped: usize,
    /// Clips found in the store but missing from the ledger, now recorded.
    pub ledger_repaired: usize,
    /// Keys whose clip could not be decoded.
    pub failed: Vec<String>,
}

/// Imports clips of one external corpus.
///
/// Every clip is decoded to mono at the corpus sample rate and stored under
/// its key with dataset, speaker, duration, text and dialect attributes. The
/// ledger uses the reduced schema, so the corpus can go straight to
/// dialect or shard consolidation. Re-running skips recorded keys.
pub struct CorpusImporter<'a> {
    backend: &'a dyn StoreBackend,
    dataset: String,
    store_path: PathBuf,
    ledger_path: PathBuf,
    sample_rate: u32,
}

impl<'a> CorpusImporter<'a> {
    pub fn new(
        backend: &'a dyn StoreBackend,
        dataset: &str,
        store_path: &Path,
        ledger_path: &Path,
    ) -> Self {
        Self {
            backend,
            dataset: dataset.to_string(),
            store_path: store_path.to_path_buf(),
            ledger_path: ledger_path.to_path_buf(),
            sample_rate: SAMPLE_RATE,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn import(&self, entries: &[ImportEntry]) -> Result<ImportSummary> {
        tracing::info!("Importing {} clips into {}", entries.len(), self.dataset);

        if let Some(parent) = self.ledger_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut recorded = ledger::load_keys::<PartitionRecord>(&self.ledger_path)?;
        let mut store = self.backend.open_append(&self.store_path)?;
        let mut ledger = LedgerAppender::open(&self.ledger_path)?;
        let mut summary = ImportSummary::default();

        for entry in entries {
            if recorded.contains(&entry.key) {
                summary.skipped += 1;
                continue;
            }

            if store.contains(&entry.key) {
                let duration = store
                    .read(&entry.key)?
                    .map_or(0.0, |sample| self.seconds(sample.payload.len()));
                tracing::warn!("Clip {} is stored but not in the ledger, recording it", entry.key);
                ledger.append(&self.record(entry, duration))?;
                recorded.insert(entry.key.clone());
                summary.ledger_repaired += 1;
                continue;
            }

            let waveform = match read_wav_file(&entry.clip, self.sample_rate) {
                Ok(waveform) if !waveform.samples.is_empty() => waveform,
                Ok(_) => {
                    tracing::error!("Clip {} ({}) holds no audio", entry.key, entry.clip.display());
                    summary.failed.push(entry.key.clone());
                    continue;
                }
                Err(e) => {
                    tracing::error!("Clip {} ({}): {}", entry.key, entry.clip.display(), e);
                    summary.failed.push(entry.key.clone());
                    continue;
                }
            };

            let record = self.record(entry, waveform.duration());
            store.create(&entry.key, &waveform.samples, &self.attributes(&record))?;
            store.flush()?;
            ledger.append(&record)?;
            recorded.insert(entry.key.clone());
            summary.imported += 1;
        }

        ledger.sync()?;
        tracing::info!(
            "{}: {} imported, {} already present, {} failed",
            self.dataset,
            summary.imported,
            summary.skipped + summary.ledger_repaired,
            summary.failed.len()
        );
        Ok(summary)
    }

    fn seconds(&self, samples: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        samples as f64 / self.sample_rate as f64
    }

    fn record(&self, entry: &ImportEntry, duration: f64) -> PartitionRecord {
        PartitionRecord::new(
            self.dataset.as_str(),
            entry.key.as_str(),
            round_time(duration),
            entry.speaker.as_str(),
            entry.dialect.as_str(),
            entry.text.as_str(),
        )
    }

    fn attributes(&self, record: &PartitionRecord) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(attr::DATASET_NAME.to_string(), record.dataset_name.as_str().into());
        attributes.insert(attr::SPEAKER.to_string(), record.speaker_id.as_str().into());
        attributes.insert(attr::DURATION.to_string(), record.duration.into());
        attributes.insert(attr::DE_TEXT.to_string(), record.de_text.as_str().into());
        attributes.insert(attr::DIALECT.to_string(), record.dialect.as_str().into());
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use tempfile::TempDir;

    fn write_clip(path: &Path, samples: usize) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..samples {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn entry(dir: &Path, key: &str, dialect: &str) -> ImportEntry {
        ImportEntry {
            key: key.to_string(),
            clip: dir.join(format!("{}.wav", key)),
            speaker: "SPEAKER_ch_zh".to_string(),
            dialect: dialect.to_string(),
            text: "Grüezi\tmitenand".to_string(),
        }
    }

    struct Fixture {
        dir: TempDir,
        backend: MemoryBackend,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                backend: MemoryBackend::new(),
            }
        }

        fn store(&self) -> PathBuf {
            self.dir.path().join("SwissDial.blob")
        }

        fn ledger(&self) -> PathBuf {
            self.dir.path().join("SwissDial.txt")
        }

        fn importer(&self) -> CorpusImporter<'_> {
            CorpusImporter::new(&self.backend, "SwissDial", &self.store(), &self.ledger())
        }
    }

    #[test]
    fn clips_are_stored_with_attributes_and_reduced_ledger() {
        let fx = Fixture::new();
        write_clip(&fx.dir.path().join("ch-zh_0001.wav"), 40000);
        let entries = vec![entry(fx.dir.path(), "ch-zh_0001", "Zürich")];

        let summary = fx.importer().import(&entries).unwrap();

        assert_eq!(summary.imported, 1);
        let mut reader = fx.backend.open_read(&fx.store()).unwrap();
        let sample = reader.read("ch-zh_0001").unwrap().unwrap();
        assert_eq!(sample.payload.len(), 40000);
        assert_eq!(sample.attributes[attr::DATASET_NAME].as_text(), Some("SwissDial"));
        assert_eq!(sample.attributes[attr::DIALECT].as_text(), Some("Zürich"));
        assert_eq!(sample.attributes[attr::DURATION].as_number(), Some(2.5));

        assert_eq!(
            std::fs::read_to_string(fx.ledger()).unwrap(),
            "SwissDial\tch-zh_0001\t2.5\tSPEAKER_ch_zh\tZürich\tGrüezi mitenand\n"
        );
    }

    #[test]
    fn rerun_skips_recorded_clips() {
        let fx = Fixture::new();
        write_clip(&fx.dir.path().join("ch-zh_0001.wav"), 16000);
        let entries = vec![entry(fx.dir.path(), "ch-zh_0001", "Zürich")];

        fx.importer().import(&entries).unwrap();
        let again = fx.importer().import(&entries).unwrap();

        assert_eq!(again.imported, 0);
        assert_eq!(again.skipped, 1);
        assert_eq!(fx.backend.keys(&fx.store()).len(), 1);
        assert_eq!(ledger::load::<PartitionRecord>(&fx.ledger()).unwrap().len(), 1);
    }

    #[test]
    fn stored_clip_missing_from_ledger_is_recorded_with_its_length() {
        let fx = Fixture::new();
        fx.backend
            .insert(&fx.store(), "ch-zh_0001", vec![0.0; 24000], Attributes::new())
            .unwrap();
        let entries = vec![entry(fx.dir.path(), "ch-zh_0001", "Zürich")];

        let summary = fx.importer().import(&entries).unwrap();

        assert_eq!(summary.ledger_repaired, 1);
        let records: Vec<PartitionRecord> = ledger::load(&fx.ledger()).unwrap();
        assert_eq!(records[0].duration, 1.5);
    }

    #[test]
    fn undecodable_clip_is_reported_and_others_continue() {
        let fx = Fixture::new();
        write_clip(&fx.dir.path().join("ch-be_0002.wav"), 16000);
        std::fs::write(fx.dir.path().join("ch-be_0001.wav"), b"not a wav").unwrap();
        let entries = vec![
            entry(fx.dir.path(), "ch-be_0001", "Bern"),
            entry(fx.dir.path(), "ch-be_0002", "Bern"),
            entry(fx.dir.path(), "ch-be_0003", "Bern"),
        ];

        let summary = fx.importer().import(&entries).unwrap();

        assert_eq!(summary.imported, 1);
        assert_eq!(summary.failed, vec!["ch-be_0001", "ch-be_0003"]);
        assert_eq!(fx.backend.keys(&fx.store()), vec!["ch-be_0002"]);
        assert_eq!(ledger::load::<PartitionRecord>(&fx.ledger()).unwrap().len(), 1);
    }
}
