//! Import of externally prepared corpora.
//!
//! Clips that already are single samples (crowd-sourced or read-speech
//! corpora) skip segmentation: they are decoded, named after the sample
//! convention and written to a corpus store with a reduced ledger.

pub mod importer;
pub mod manifest;

pub use importer::{CorpusImporter, ImportSummary};
pub use manifest::{
    CantonRegions, ImportEntry, KeyStyle, TableManifest, load_speaker_metadata, load_table,
};
