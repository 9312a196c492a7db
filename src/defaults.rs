//! Default configuration constants for corpusmill.
//!
//! The segmentation policy values are fixed at compile time; changing them
//! changes which samples every downstream store contains.

/// Shortest sample the filter pipeline will emit, in seconds.
pub const MIN_SAMPLE_DURATION: f64 = 2.0;

/// Longest sample the filter pipeline will emit, in seconds.
///
/// Longer segments are cut into `ceil(duration / MAX_SAMPLE_DURATION)` parts.
pub const MAX_SAMPLE_DURATION: f64 = 15.0;

/// Largest silence between two segments that may still be merged, in seconds.
pub const MAX_SILENCE_GAP: f64 = 2.0;

/// Share of words the dominant speaker needs for a multi-speaker segment to be kept.
pub const DOMINANT_SPEAKER_THRESHOLD: f64 = 0.75;

/// Sample rate of every stored payload in Hz.
pub const SAMPLE_RATE: u32 = 16000;

/// First ordinal handed out to samples of a recording.
///
/// Starting at 1000 keeps names lexicographically ordered (`ep_1001` < `ep_1010`).
pub const FIRST_SAMPLE_ID: u32 = 1000;

/// Decimal places kept for durations and track positions.
pub const TIME_PRECISION: i32 = 4;

/// Upper bound of accumulated audio per speaker group during dialect classification.
pub const CLASSIFICATION_GROUP_SECS: f64 = 100.0;

/// Placeholder text written by transcription when nothing was recognised.
pub const MISSING_TEXT: &str = "NO_TEXT";

/// Dialect label given to samples that are not Swiss German or Standard German.
pub const EXCLUDED_DIALECT: &str = "English";

/// Default number of shards for duration-bounded bucketing.
pub const SHARD_COUNT: usize = 8;

/// Slack added to the per-shard target, in hours.
pub const SHARD_SLACK_HOURS: f64 = 0.5;

/// Seed for the shuffle that precedes shard bucketing.
pub const SHUFFLE_SEED: u64 = 18670209;

/// Extra records per shard when spreading a designated corpus over all shards.
pub const DISTRIBUTED_PADDING: usize = 10;

/// File extension of keyed sample stores.
pub const STORE_EXTENSION: &str = "blob";

/// File extension of metadata ledgers.
pub const LEDGER_EXTENSION: &str = "txt";

/// Round a time value to [`TIME_PRECISION`] decimals.
pub fn round_time(value: f64) -> f64 {
    let factor = 10f64.powi(TIME_PRECISION);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_time_keeps_four_decimals() {
        assert_eq!(round_time(2.123456), 2.1235);
        assert_eq!(round_time(8.25), 8.25);
        assert_eq!(round_time(0.0), 0.0);
    }

    #[test]
    fn duration_bounds_are_ordered() {
        assert!(MIN_SAMPLE_DURATION < MAX_SAMPLE_DURATION);
        assert!(DOMINANT_SPEAKER_THRESHOLD > 0.5 && DOMINANT_SPEAKER_THRESHOLD <= 1.0);
    }
}
