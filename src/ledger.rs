//! Tab-separated metadata ledgers.
//!
//! A ledger holds one line per sample of a store. Two schemas exist (detailed
//! per-corpus and reduced per-partition); a file only ever holds one of them,
//! and the caller picks which by choosing the record type it loads.

use crate::error::{CorpusError, Result};
use crate::record::{PartitionRecord, SampleRecord};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Column separator.
pub const SEPARATOR: char = '\t';

/// A record that can be stored as one ledger line.
pub trait LedgerRecord: Sized {
    /// Key shared with the keyed store (the sample name).
    fn key(&self) -> &str;

    /// Positional columns of this record.
    fn to_fields(&self) -> Vec<String>;

    /// Rebuild a record from positional columns.
    fn from_fields(fields: &[&str]) -> std::result::Result<Self, String>;

    /// Serialize to a single line without the trailing newline.
    fn to_line(&self) -> String {
        self.to_fields().join("\t")
    }

    /// Parse a single line; a trailing newline is tolerated.
    fn from_line(line: &str) -> std::result::Result<Self, String> {
        let line = line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = line.split(SEPARATOR).collect();
        Self::from_fields(&fields)
    }
}

/// Column layout of a corpus ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerSchema {
    /// Per-recording samples ([`SampleRecord`]).
    Detailed,
    /// Dialect-labelled samples tagged with their corpus ([`PartitionRecord`]).
    Reduced,
}

impl LedgerSchema {
    /// Tell the schema of a ledger from its first non-blank line.
    ///
    /// A ledger without records reads as detailed.
    pub fn detect(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if SampleRecord::from_line(&line).is_ok() {
                return Ok(LedgerSchema::Detailed);
            }
            return match PartitionRecord::from_line(&line) {
                Ok(_) => Ok(LedgerSchema::Reduced),
                Err(message) => Err(CorpusError::LedgerParse {
                    path: path.display().to_string(),
                    line: idx + 1,
                    message: format!("matches neither ledger schema: {}", message),
                }),
            };
        }
        Ok(LedgerSchema::Detailed)
    }
}

impl std::fmt::Display for LedgerSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerSchema::Detailed => f.write_str("detailed"),
            LedgerSchema::Reduced => f.write_str("reduced"),
        }
    }
}

impl std::str::FromStr for LedgerSchema {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "detailed" => Ok(LedgerSchema::Detailed),
            "reduced" => Ok(LedgerSchema::Reduced),
            other => Err(format!(
                "unknown ledger schema '{}' (expected detailed or reduced)",
                other
            )),
        }
    }
}

/// Format a float so that it parses back to the same value and always shows a decimal point.
pub fn format_float(value: f64) -> String {
    format!("{:?}", value)
}

pub(crate) fn parse_float(value: &str, name: &str) -> std::result::Result<f64, String> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid {} '{}': {}", name, value, e))
}

/// Load every record of a ledger file. Blank lines are ignored.
pub fn load<T: LedgerRecord>(path: &Path) -> Result<Vec<T>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = T::from_line(&line).map_err(|message| CorpusError::LedgerParse {
            path: path.display().to_string(),
            line: idx + 1,
            message,
        })?;
        records.push(record);
    }
    tracing::debug!("Loaded {} ledger records from {}", records.len(), path.display());
    Ok(records)
}

/// Like [`load`], but a missing file yields an empty ledger.
pub fn load_or_empty<T: LedgerRecord>(path: &Path) -> Result<Vec<T>> {
    if path.exists() {
        load(path)
    } else {
        Ok(Vec::new())
    }
}

/// Collect the keys (first column that identifies the sample) of a ledger file.
pub fn load_keys<T: LedgerRecord>(path: &Path) -> Result<HashSet<String>> {
    Ok(load_or_empty::<T>(path)?
        .into_iter()
        .map(|record| record.key().to_string())
        .collect())
}

/// Replace a ledger file with the given records.
///
/// Writes to a sibling temporary file first and renames it over the target.
pub fn write_all<T: LedgerRecord>(path: &Path, records: &[T]) -> Result<()> {
    let tmp_path = path.with_extension("txt.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        for record in records {
            writeln!(writer, "{}", record.to_line())?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Append-only handle on a ledger file.
///
/// Every appended line is flushed to the file before `append` returns, so a
/// crash leaves at most the line being written incomplete.
pub struct LedgerAppender {
    path: PathBuf,
    writer: BufWriter<File>,
    appended: usize,
}

impl LedgerAppender {
    /// Opens (or creates) a ledger for appending.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            appended: 0,
        })
    }

    pub fn append<T: LedgerRecord>(&mut self, record: &T) -> Result<()> {
        writeln!(self.writer, "{}", record.to_line())?;
        self.writer.flush()?;
        self.appended += 1;
        Ok(())
    }

    /// Number of lines appended through this handle.
    pub fn appended(&self) -> usize {
        self.appended
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and fsync the underlying file.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}
