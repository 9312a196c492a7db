//! corpusmill - Speech corpus preparation
//!
//! Cuts diarized recordings into duration-bounded samples, labels them by
//! dialect and consolidates them into per-dialect or per-shard stores.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod classify;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod consolidate;
pub mod defaults;
pub mod error;
pub mod import;
pub mod ledger;
pub mod record;
pub mod segment;
pub mod store;

// Records and ledgers
pub use ledger::{LedgerAppender, LedgerRecord, LedgerSchema};
pub use record::{PartitionRecord, SampleRecord, episode_name};

// Segmentation
pub use segment::{RecordingSegmenter, Segment, Word, filter_segments};

// External corpora
pub use import::{CorpusImporter, ImportEntry, KeyStyle};

// Stores (collaborator seam)
pub use store::{BlobFileBackend, MemoryBackend, StoreBackend, StoreReader, StoreWriter};

// Classification (collaborator seam)
pub use classify::{
    CommandClassifier, DialectClassifier, MockClassifier, SpeakerAccumulator, assign_dialects,
};

// Consolidation
pub use consolidate::{
    ConsolidationReport, Consolidator, PartitionKey, PartitionTask, ShardPlanner, StoreLayout,
};

// Error handling
pub use error::{CorpusError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
