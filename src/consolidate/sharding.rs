//! Duration-bounded shard planning over shuffled records.

use crate::defaults::{
    DISTRIBUTED_PADDING, SHARD_COUNT, SHARD_SLACK_HOURS, SHUFFLE_SEED, round_time,
};
use crate::error::{CorpusError, Result};
use crate::record::PartitionRecord;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Splits records into shards of roughly equal total duration.
///
/// Records are shuffled with a fixed seed, then accumulated into a shard until
/// its duration reaches the target; the last shard takes the remainder. A
/// designated corpus can afterwards be spread over all shards by count.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardPlanner {
    shard_count: usize,
    slack_hours: f64,
    seed: u64,
    distributed_padding: usize,
}

impl Default for ShardPlanner {
    fn default() -> Self {
        Self {
            shard_count: SHARD_COUNT,
            slack_hours: SHARD_SLACK_HOURS,
            seed: SHUFFLE_SEED,
            distributed_padding: DISTRIBUTED_PADDING,
        }
    }
}

impl ShardPlanner {
    pub fn new(shard_count: usize) -> Result<Self> {
        if shard_count == 0 {
            return Err(CorpusError::ConfigInvalidValue {
                key: "sharding.shard_count".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            shard_count,
            ..Self::default()
        })
    }

    pub fn with_slack_hours(mut self, slack_hours: f64) -> Self {
        self.slack_hours = slack_hours;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_distributed_padding(mut self, padding: usize) -> Self {
        self.distributed_padding = padding;
        self
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// Target shard duration in seconds for the given records.
    ///
    /// `(round(total_hours / shard_count, 4) + slack_hours) * 3600`, with the
    /// total itself rounded to 4 decimals.
    pub fn target_duration(&self, records: &[PartitionRecord]) -> f64 {
        let total_hours = round_time(records.iter().map(|r| r.duration).sum::<f64>() / 3600.0);
        (round_time(total_hours / self.shard_count as f64) + self.slack_hours) * 3600.0
    }

    /// Plan shards for `records`, then spread `distributed` over them.
    pub fn plan(
        &self,
        mut records: Vec<PartitionRecord>,
        mut distributed: Vec<PartitionRecord>,
    ) -> Vec<Vec<PartitionRecord>> {
        let target = self.target_duration(&records);
        tracing::info!(
            "Planning shards for {} records, target duration {:.1}s",
            records.len(),
            target
        );

        let mut rng = StdRng::seed_from_u64(self.seed);
        records.shuffle(&mut rng);

        let mut shards: Vec<Vec<PartitionRecord>> = Vec::new();
        let mut current: Vec<PartitionRecord> = Vec::new();
        let mut current_duration = 0.0;
        for record in records {
            current_duration += record.duration;
            current.push(record);
            if current_duration >= target {
                shards.push(std::mem::take(&mut current));
                current_duration = 0.0;
            }
        }
        if !current.is_empty() {
            shards.push(current);
        }

        if !distributed.is_empty() {
            distributed.shuffle(&mut rng);
            if shards.is_empty() {
                shards = vec![Vec::new(); self.shard_count];
            }
            self.distribute(&mut shards, distributed);
        }

        for (idx, shard) in shards.iter().enumerate() {
            tracing::debug!(
                "Shard {}: {} records, {:.1}s",
                idx,
                shard.len(),
                shard.iter().map(|r| r.duration).sum::<f64>()
            );
        }
        shards
    }

    /// Shard `i` takes slice `i` of size `n / shard_count + padding`; the last
    /// shard takes whatever is left so nothing is lost.
    fn distribute(&self, shards: &mut [Vec<PartitionRecord>], records: Vec<PartitionRecord>) {
        let per_shard = records.len() / self.shard_count + self.distributed_padding;
        let last = shards.len().saturating_sub(1);
        let mut rest = records.into_iter();

        for (idx, shard) in shards.iter_mut().enumerate() {
            let before = shard.len();
            if idx == last {
                shard.extend(rest.by_ref());
            } else {
                shard.extend(rest.by_ref().take(per_shard));
            }
            tracing::debug!("Added {} distributed records to shard {}", shard.len() - before, idx);
        }
    }
}
