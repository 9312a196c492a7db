//! Segmentation: diarized segments → filtered samples → corpus store.

pub mod filter;
pub mod segmenter;
pub mod types;

pub use filter::{cut_to_maximum, drop_unusable, filter_segments, merge_to_minimum};
pub use segmenter::{EpisodeSummary, RecordingSegmenter};
pub use types::{Segment, Word, load_segments};
