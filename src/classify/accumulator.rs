//! Greedy per-speaker grouping of samples into duration-bounded units.

use crate::record::SampleRecord;
use std::collections::HashMap;

/// Samples of one speaker within one episode whose durations add up to at most the bound.
///
/// Members are indices into the record slice the accumulator was fed from.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeGroup {
    pub duration: f64,
    pub members: Vec<usize>,
}

impl MergeGroup {
    fn open(index: usize, duration: f64) -> Self {
        Self {
            duration,
            members: vec![index],
        }
    }
}

/// Groups of one speaker in one episode.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerGroups {
    pub episode: String,
    pub speaker: String,
    pub groups: Vec<MergeGroup>,
}

#[derive(Debug, Default)]
struct EpisodeEntry {
    speakers: Vec<SpeakerGroups>,
    by_speaker: HashMap<String, usize>,
}

/// First-fit accumulation of samples into [`MergeGroup`]s per (episode, speaker).
///
/// Each sample goes into the first open group of its speaker that still fits
/// `max_length`, or opens a new group. Single pass, not packing-optimal. A
/// sample longer than `max_length` on its own still gets a group of its own.
#[derive(Debug)]
pub struct SpeakerAccumulator {
    max_length: f64,
    episodes: Vec<EpisodeEntry>,
    by_episode: HashMap<String, usize>,
}

impl SpeakerAccumulator {
    pub fn new(max_length: f64) -> Self {
        Self {
            max_length,
            episodes: Vec::new(),
            by_episode: HashMap::new(),
        }
    }

    /// Accumulate every record, using its position in `records` as member index.
    pub fn from_records(records: &[SampleRecord], max_length: f64) -> Self {
        let mut accumulator = Self::new(max_length);
        for (index, record) in records.iter().enumerate() {
            accumulator.add(index, record.episode_name(), &record.speaker_id, record.duration);
        }
        accumulator
    }

    pub fn max_length(&self) -> f64 {
        self.max_length
    }

    pub fn add(&mut self, index: usize, episode: &str, speaker: &str, duration: f64) {
        let max_length = self.max_length;
        let groups = self.groups_mut(episode, speaker);

        match groups
            .iter_mut()
            .find(|group| group.duration + duration <= max_length)
        {
            Some(group) => {
                group.duration += duration;
                group.members.push(index);
            }
            None => groups.push(MergeGroup::open(index, duration)),
        }
    }

    fn groups_mut(&mut self, episode: &str, speaker: &str) -> &mut Vec<MergeGroup> {
        let episode_idx = match self.by_episode.get(episode) {
            Some(&idx) => idx,
            None => {
                self.episodes.push(EpisodeEntry::default());
                self.by_episode
                    .insert(episode.to_string(), self.episodes.len() - 1);
                self.episodes.len() - 1
            }
        };
        let entry = &mut self.episodes[episode_idx];

        let speaker_idx = match entry.by_speaker.get(speaker) {
            Some(&idx) => idx,
            None => {
                entry.speakers.push(SpeakerGroups {
                    episode: episode.to_string(),
                    speaker: speaker.to_string(),
                    groups: Vec::new(),
                });
                entry
                    .by_speaker
                    .insert(speaker.to_string(), entry.speakers.len() - 1);
                entry.speakers.len() - 1
            }
        };
        &mut entry.speakers[speaker_idx].groups
    }

    /// Groups of one speaker in one episode, if any sample was added for them.
    pub fn groups(&self, episode: &str, speaker: &str) -> Option<&[MergeGroup]> {
        let entry = &self.episodes[*self.by_episode.get(episode)?];
        let idx = *entry.by_speaker.get(speaker)?;
        Some(&entry.speakers[idx].groups)
    }

    /// Every (episode, speaker), episodes and speakers in order of first appearance.
    pub fn speakers(&self) -> impl Iterator<Item = &SpeakerGroups> {
        self.episodes.iter().flat_map(|entry| entry.speakers.iter())
    }

    pub fn group_count(&self) -> usize {
        self.speakers().map(|s| s.groups.len()).sum()
    }
}
