//! Keyed blob stores: sample name → waveform payload + named attributes.
//!
//! Stores are opened through a [`StoreBackend`] so the segmenter and the
//! consolidator never depend on a particular file format. Any number of
//! readers may open the same store; a store open for append must have exactly
//! one writer. Nothing here enforces that, callers own it by construction.

pub mod blob_file;
pub mod memory;

pub use blob_file::{BlobFile, BlobFileBackend};
pub use memory::MemoryBackend;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Well-known attribute names.
pub mod attr {
    pub const DATASET_NAME: &str = "dataset_name";
    pub const SPEAKER: &str = "speaker";
    pub const DURATION: &str = "duration";
    pub const TRACK_START: &str = "track_start";
    pub const TRACK_END: &str = "track_end";
    pub const DE_TEXT: &str = "de_text";
    pub const PHONEME: &str = "phoneme";
    /// Dialect label.
    pub const DIALECT: &str = "did";
    pub const CH_TEXT: &str = "ch_text";
    pub const MEL_SPECTROGRAM: &str = "mel_spec";
}

/// Attribute value attached to a stored sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Text(String),
    /// Derived feature data such as a flattened spectrogram.
    Series(Vec<f32>),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

impl From<Vec<f32>> for AttrValue {
    fn from(value: Vec<f32>) -> Self {
        AttrValue::Series(value)
    }
}

/// Attributes of one sample, ordered by name.
pub type Attributes = BTreeMap<String, AttrValue>;

/// A sample as read back from a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSample {
    pub payload: Vec<f32>,
    pub attributes: Attributes,
}

/// Read access to an open store.
pub trait StoreReader: Send {
    /// Location of the store, used in logs and errors.
    fn location(&self) -> &Path;

    fn contains(&self, key: &str) -> bool;

    /// All keys in insertion order.
    fn keys(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read payload and attributes of `key`, or `None` when the key is absent.
    fn read(&mut self, key: &str) -> Result<Option<StoredSample>>;
}

/// Append access to an open store.
pub trait StoreWriter: StoreReader {
    /// Create `key` with payload and attributes. Fails when the key exists.
    fn create(&mut self, key: &str, payload: &[f32], attributes: &Attributes) -> Result<()>;

    /// Make every created key durable.
    fn flush(&mut self) -> Result<()>;
}

/// Opens stores by path.
pub trait StoreBackend: Send + Sync {
    fn open_read(&self, path: &Path) -> Result<Box<dyn StoreReader>>;

    /// Open for append, creating the store when it does not exist.
    fn open_append(&self, path: &Path) -> Result<Box<dyn StoreWriter>>;

    fn exists(&self, path: &Path) -> bool;
}

/// One key of a store with the names of its attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySummary {
    pub key: String,
    pub payload_len: usize,
    pub attributes: Vec<String>,
}

/// List every key of a store, in insertion order, with its attribute names.
pub fn inspect(backend: &dyn StoreBackend, path: &Path) -> Result<Vec<KeySummary>> {
    let mut reader = backend.open_read(path)?;
    let mut summaries = Vec::with_capacity(reader.len());
    for key in reader.keys() {
        let Some(sample) = reader.read(&key)? else {
            continue;
        };
        summaries.push(KeySummary {
            payload_len: sample.payload.len(),
            attributes: sample.attributes.into_keys().collect(),
            key,
        });
    }
    Ok(summaries)
}
