//! Error types for corpusmill.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorpusError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Ledger errors
    #[error("Malformed ledger line {line} in {path}: {message}")]
    LedgerParse {
        path: String,
        line: usize,
        message: String,
    },

    // Import manifest errors
    #[error("Malformed manifest {path} at line {line}: {message}")]
    Manifest {
        path: String,
        line: usize,
        message: String,
    },

    // Keyed blob store errors
    #[error("Store {path} is not a valid sample store: {message}")]
    StoreFormat { path: String, message: String },

    #[error("Key {key} already exists in store {store}")]
    StoreKeyExists { key: String, store: String },

    #[error("Sample {key} has no payload in source store {store}")]
    MissingPayload { key: String, store: String },

    // Audio errors
    #[error("Audio decoding failed: {message}")]
    AudioDecode { message: String },

    // Diarization input errors
    #[error("Invalid segment input {path}: {message}")]
    SegmentInput { path: String, message: String },

    // Consolidation planning errors
    #[error("Partitions {first} and {second} would both write {path}")]
    DuplicateDestination {
        first: String,
        second: String,
        path: String,
    },

    // Dialect classification errors
    #[error("Dialect classification failed: {message}")]
    Classification { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CorpusError>;
