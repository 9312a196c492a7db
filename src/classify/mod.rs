//! Per-speaker accumulation and dialect assignment.

pub mod accumulator;
pub mod command;
pub mod dialect;

pub use accumulator::{MergeGroup, SpeakerAccumulator, SpeakerGroups};
pub use command::CommandClassifier;
pub use dialect::{
    AssignmentSummary, DIALECT_CLASSES, DialectClassifier, MockClassifier, assign_dialects,
    class_label, classify_ledger, dialect_tag,
};
