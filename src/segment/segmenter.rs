//! Cuts filtered segments out of a recording into a corpus store and ledger.

use crate::audio::{Waveform, read_wav_file};
use crate::defaults::{FIRST_SAMPLE_ID, SAMPLE_RATE, round_time};
use crate::error::Result;
use crate::ledger::{self, LedgerAppender, LedgerRecord};
use crate::record::SampleRecord;
use crate::segment::filter::filter_segments;
use crate::segment::types::{Segment, load_segments};
use crate::store::{Attributes, StoreBackend, StoreReader, attr};
use std::path::{Path, PathBuf};

/// Counts from segmenting one episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpisodeSummary {
    /// Segments left after filtering.
    pub filtered: usize,
    pub written: usize,
    /// Samples already recorded by an earlier run.
    pub skipped: usize,
    /// Samples found in the store but missing from the ledger, now recorded.
    pub ledger_repaired: usize,
    /// Segments not fully covered by the decoded audio.
    pub out_of_range: usize,
}

impl EpisodeSummary {
    pub fn merge(&mut self, other: EpisodeSummary) {
        self.filtered += other.filtered;
        self.written += other.written;
        self.skipped += other.skipped;
        self.ledger_repaired += other.ledger_repaired;
        self.out_of_range += other.out_of_range;
    }
}

/// Writes the samples of one corpus (dataset) into its store and detailed ledger.
///
/// Sample names are `{episode}_{id}` with ids counted per episode from
/// `first_id`. Re-running over the same episode skips every sample already
/// in the ledger, so an interrupted run resumes where it stopped.
pub struct RecordingSegmenter<'a> {
    backend: &'a dyn StoreBackend,
    dataset: String,
    store_path: PathBuf,
    ledger_path: PathBuf,
    sample_rate: u32,
    first_id: u32,
}

impl<'a> RecordingSegmenter<'a> {
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
            first_id: FIRST_SAMPLE_ID,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_first_id(mut self, first_id: u32) -> Self {
        self.first_id = first_id;
        self
    }

    /// Load diarization JSON and WAV audio of one episode from disk and segment it.
    pub fn segment_files(
        &self,
        episode: &str,
        segments_path: &Path,
        audio_path: &Path,
    ) -> Result<EpisodeSummary> {
        let segments = load_segments(segments_path)?;
        let audio = read_wav_file(audio_path, self.sample_rate)?;
        self.segment_episode(episode, &segments, &audio)
    }

    /// Filter the raw segments of one episode and store every usable sample.
    pub fn segment_episode(
        &self,
        episode: &str,
        segments: &[Segment],
        audio: &Waveform,
    ) -> Result<EpisodeSummary> {
        tracing::info!("Segmenting episode {} of {}", episode, self.dataset);

        let filtered = filter_segments(segments);
        let recorded = ledger::load_keys::<SampleRecord>(&self.ledger_path)?;
        let mut store = self.backend.open_append(&self.store_path)?;
        let mut ledger = LedgerAppender::open(&self.ledger_path)?;

        let mut summary = EpisodeSummary {
            filtered: filtered.len(),
            ..EpisodeSummary::default()
        };

        for (i, segment) in filtered.iter().enumerate() {
            let track_id = self.first_id + i as u32;
            let record = self.sample_record(episode, track_id, segment);
            let name = record.key();

            if recorded.contains(name) {
                tracing::debug!("Sample {} is already cut", name);
                summary.skipped += 1;
                continue;
            }
            if store.contains(name) {
                tracing::warn!("Sample {} is stored but not in the ledger, recording it", name);
                ledger.append(&record)?;
                summary.ledger_repaired += 1;
                continue;
            }

            if !audio.covers(segment.start, segment.end) {
                tracing::warn!(
                    "Sample {} ({:.2}s-{:.2}s) is not covered by the audio ({:.2}s)",
                    name,
                    segment.start,
                    segment.end,
                    audio.duration()
                );
                summary.out_of_range += 1;
                continue;
            }

            let payload = audio.slice_seconds(segment.start, segment.end);
            store.create(name, payload, &self.attributes(&record))?;
            store.flush()?;
            ledger.append(&record)?;
            summary.written += 1;
        }

        ledger.sync()?;
        tracing::info!(
            "Episode {}: {} written, {} already present, {} of {} raw segments kept",
            episode,
            summary.written,
            summary.skipped + summary.ledger_repaired,
            summary.filtered,
            segments.len()
        );
        Ok(summary)
    }

    fn sample_record(&self, episode: &str, track_id: u32, segment: &Segment) -> SampleRecord {
        SampleRecord::new(
            format!("{}_{}", episode, track_id),
            track_id,
            round_time(segment.duration()),
            round_time(segment.start),
            round_time(segment.end),
            segment.speaker.clone().unwrap_or_default(),
        )
        .with_de_text(&segment.text)
    }

    fn attributes(&self, record: &SampleRecord) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(attr::DATASET_NAME.to_string(), self.dataset.as_str().into());
        attributes.insert(attr::SPEAKER.to_string(), record.speaker_id.as_str().into());
        attributes.insert(attr::DURATION.to_string(), record.duration.into());
        attributes.insert(attr::TRACK_START.to_string(), record.track_start.into());
        attributes.insert(attr::TRACK_END.to_string(), record.track_end.into());
        attributes.insert(
            attr::DE_TEXT.to_string(),
            record.de_text.clone().unwrap_or_default().into(),
        );
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::types::Word;
    use crate::store::MemoryBackend;
    use tempfile::TempDir;

    fn spoken(start: f64, end: f64, speaker: &str, text: &str) -> Segment {
        let mut words = Vec::new();
        let mut t = start;
        while t < end - 1e-9 {
            words.push(Word::new("w", t, (t + 0.5).min(end)).with_speaker(speaker));
            t += 0.5;
        }
        Segment::new(start, end, text)
            .with_speaker(speaker)
            .with_words(words)
    }

    fn episode_segments() -> Vec<Segment> {
        vec![
            spoken(0.0, 3.0, "SPEAKER_00", " Grüezi mitenand "),
            spoken(3.0, 3.5, "SPEAKER_00", "kurz"),
            spoken(5.0, 9.0, "SPEAKER_01", "Merci vielmal"),
        ]
    }

    fn audio(seconds: usize) -> Waveform {
        Waveform::new(vec![0.1; seconds * 100], 100)
    }

    struct Fixture {
        _dir: TempDir,
        backend: MemoryBackend,
        store: PathBuf,
        ledger: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let ledger = dir.path().join("podcast.txt");
        Fixture {
            backend: MemoryBackend::new(),
            store: dir.path().join("podcast.blob"),
            ledger,
            _dir: dir,
        }
    }

    #[test]
    fn writes_samples_with_names_attributes_and_ledger() {
        let f = fixture();
        let segmenter = RecordingSegmenter::new(&f.backend, "podcast", &f.store, &f.ledger);

        let summary = segmenter
            .segment_episode("ep_7", &episode_segments(), &audio(10))
            .unwrap();

        assert_eq!(summary.filtered, 2);
        assert_eq!(summary.written, 2);
        assert_eq!(f.backend.keys(&f.store), vec!["ep_7_1000", "ep_7_1001"]);

        let mut reader = f.backend.open_read(&f.store).unwrap();
        let first = reader.read("ep_7_1000").unwrap().unwrap();
        assert_eq!(first.payload.len(), 300);
        assert_eq!(first.attributes[attr::DATASET_NAME].as_text(), Some("podcast"));
        assert_eq!(first.attributes[attr::SPEAKER].as_text(), Some("SPEAKER_00"));
        assert_eq!(first.attributes[attr::DURATION].as_number(), Some(3.0));
        assert_eq!(
            first.attributes[attr::DE_TEXT].as_text(),
            Some("Grüezi mitenand")
        );

        let records: Vec<SampleRecord> = ledger::load(&f.ledger).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].sample_name, "ep_7_1001");
        assert_eq!(records[1].track_id, 1001);
        assert_eq!(records[1].track_start, 5.0);
        assert_eq!(records[1].speaker_id, "SPEAKER_01");
        assert_eq!(records[1].de_text.as_deref(), Some("Merci vielmal"));
        assert_eq!(f.backend.flush_count(&f.store), 2);
    }

    #[test]
    fn rerun_skips_recorded_samples() {
        let f = fixture();
        let segmenter = RecordingSegmenter::new(&f.backend, "podcast", &f.store, &f.ledger);

        segmenter
            .segment_episode("ep_7", &episode_segments(), &audio(10))
            .unwrap();
        let again = segmenter
            .segment_episode("ep_7", &episode_segments(), &audio(10))
            .unwrap();

        assert_eq!(again.written, 0);
        assert_eq!(again.skipped, 2);
        assert_eq!(f.backend.keys(&f.store).len(), 2);
        assert_eq!(ledger::load::<SampleRecord>(&f.ledger).unwrap().len(), 2);
    }

    #[test]
    fn stored_sample_missing_from_ledger_is_recorded() {
        let f = fixture();
        let mut writer = f.backend.open_append(&f.store).unwrap();
        writer.create("ep_7_1000", &[0.0], &Attributes::new()).unwrap();

        let segmenter = RecordingSegmenter::new(&f.backend, "podcast", &f.store, &f.ledger);
        let summary = segmenter
            .segment_episode("ep_7", &episode_segments(), &audio(10))
            .unwrap();

        assert_eq!(summary.ledger_repaired, 1);
        assert_eq!(summary.written, 1);
        let keys = ledger::load_keys::<SampleRecord>(&f.ledger).unwrap();
        assert!(keys.contains("ep_7_1000"));
        assert!(keys.contains("ep_7_1001"));
    }

    #[test]
    fn segments_beyond_audio_are_skipped() {
        let f = fixture();
        let segmenter = RecordingSegmenter::new(&f.backend, "podcast", &f.store, &f.ledger);

        let summary = segmenter
            .segment_episode("ep_7", &episode_segments(), &audio(4))
            .unwrap();

        assert_eq!(summary.written, 1);
        assert_eq!(summary.out_of_range, 1);
        assert_eq!(f.backend.keys(&f.store), vec!["ep_7_1000"]);
    }

    #[test]
    fn segment_running_past_audio_end_is_not_truncated() {
        let f = fixture();
        let segmenter = RecordingSegmenter::new(&f.backend, "podcast", &f.store, &f.ledger);

        // The second sample spans 5-9s but the audio stops at 7s.
        let summary = segmenter
            .segment_episode("ep_7", &episode_segments(), &audio(7))
            .unwrap();

        assert_eq!(summary.written, 1);
        assert_eq!(summary.out_of_range, 1);
        assert_eq!(f.backend.keys(&f.store), vec!["ep_7_1000"]);
        let records: Vec<SampleRecord> = ledger::load(&f.ledger).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn first_id_is_configurable() {
        let f = fixture();
        let segmenter =
            RecordingSegmenter::new(&f.backend, "podcast", &f.store, &f.ledger).with_first_id(1);

        segmenter
            .segment_episode("ep", &episode_segments(), &audio(10))
            .unwrap();
        assert_eq!(f.backend.keys(&f.store), vec!["ep_1", "ep_2"]);
    }

    #[test]
    fn segment_files_reads_json_and_wav() {
        let f = fixture();
        let dir = TempDir::new().unwrap();
        let json_path = dir.path().join("ep.json");
        let wav_path = dir.path().join("ep.wav");
        std::fs::write(&json_path, serde_json::to_string(&episode_segments()).unwrap()).unwrap();

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&wav_path, spec).unwrap();
        for _ in 0..8000 * 10 {
            writer.write_sample(1000i16).unwrap();
        }
        writer.finalize().unwrap();

        let segmenter = RecordingSegmenter::new(&f.backend, "podcast", &f.store, &f.ledger);
        let summary = segmenter.segment_files("ep", &json_path, &wav_path).unwrap();

        assert_eq!(summary.written, 2);
        let mut reader = f.backend.open_read(&f.store).unwrap();
        let sample = reader.read("ep_1000").unwrap().unwrap();
        assert_eq!(sample.payload.len(), 3 * 16000);
    }
}
