//! Single-file keyed sample store.
//!
//! ```text
//! [4B magic "CMST"] [4B version=1]
//! For each sample:
//!   [4B tag "SMPL"] [8B body length]
//!   body:
//!     [4B keyLen] [keyLen bytes key]
//!     [4B attrsLen] [attrsLen bytes attributes as JSON]
//!     [8B sampleCount] [sampleCount x 4B float32 payload]
//! ```
//!
//! All multi-byte values are little-endian. Entries are only ever appended.
//! An entry cut short by a crash is ignored by readers and truncated away the
//! next time the store is opened for append.

use crate::error::{CorpusError, Result};
use crate::store::{Attributes, StoreBackend, StoreReader, StoreWriter, StoredSample};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const STORE_MAGIC: [u8; 4] = *b"CMST";
const STORE_VERSION: u32 = 1;
const ENTRY_TAG: [u8; 4] = *b"SMPL";
const HEADER_LEN: u64 = 8;
const ENTRY_HEADER_LEN: u64 = 12;

#[derive(Debug, Clone, Copy)]
struct EntryLocation {
    attrs_offset: u64,
    attrs_len: u32,
    payload_offset: u64,
    sample_count: u64,
}

/// File-backed store. Open with [`BlobFile::open_read`] or [`BlobFile::open_append`].
pub struct BlobFile {
    path: PathBuf,
    file: File,
    index: HashMap<String, EntryLocation>,
    order: Vec<String>,
    end: u64,
    writable: bool,
}

enum ScanEnd {
    Clean,
    Torn,
}

impl BlobFile {
    /// Open an existing store read-only.
    pub fn open_read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut store = Self::empty(path, file, false);
        if let ScanEnd::Torn = store.scan()? {
            tracing::warn!(
                "Ignoring incomplete trailing entry in {} (store is being written or was interrupted)",
                path.display()
            );
        }
        Ok(store)
    }

    /// Open a store for append, creating it when missing.
    pub fn open_append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let mut store = Self::empty(path, file, true);

        if store.file.metadata()?.len() == 0 {
            let mut header = Vec::with_capacity(HEADER_LEN as usize);
            header.extend_from_slice(&STORE_MAGIC);
            header.extend_from_slice(&STORE_VERSION.to_le_bytes());
            store.file.write_all(&header)?;
            store.file.sync_data()?;
            store.end = HEADER_LEN;
            return Ok(store);
        }

        if let ScanEnd::Torn = store.scan()? {
            tracing::warn!(
                "Truncating incomplete trailing entry of {} at byte {}",
                path.display(),
                store.end
            );
            store.file.set_len(store.end)?;
            store.file.sync_data()?;
        }
        Ok(store)
    }

    fn empty(path: &Path, file: File, writable: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            file,
            index: HashMap::new(),
            order: Vec::new(),
            end: HEADER_LEN,
            writable,
        }
    }

    fn format_error(&self, message: impl Into<String>) -> CorpusError {
        CorpusError::StoreFormat {
            path: self.path.display().to_string(),
            message: message.into(),
        }
    }

    /// Rebuild the key index from the file. Leaves `end` after the last complete entry.
    fn scan(&mut self) -> Result<ScanEnd> {
        let file_len = self.file.metadata()?.len();
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&self.file);

        let mut header = [0u8; HEADER_LEN as usize];
        if reader.read_exact(&mut header).is_err() {
            return Err(self.format_error("file shorter than header"));
        }
        if header[..4] != STORE_MAGIC {
            return Err(self.format_error(format!("invalid magic {:?}", &header[..4])));
        }
        let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if version != STORE_VERSION {
            return Err(self.format_error(format!("unsupported version {}", version)));
        }

        let mut offset = HEADER_LEN;
        let mut entries = Vec::new();
        let outcome = loop {
            if offset == file_len {
                break ScanEnd::Clean;
            }
            if offset + ENTRY_HEADER_LEN > file_len {
                break ScanEnd::Torn;
            }

            let mut entry_header = [0u8; ENTRY_HEADER_LEN as usize];
            reader.read_exact(&mut entry_header)?;
            if entry_header[..4] != ENTRY_TAG {
                return Err(CorpusError::StoreFormat {
                    path: self.path.display().to_string(),
                    message: format!("invalid entry tag at byte {}", offset),
                });
            }
            let body_len = read_u64(&entry_header[4..12]);
            let body_offset = offset + ENTRY_HEADER_LEN;
            let Some(body_end) = body_offset
                .checked_add(body_len)
                .filter(|end| *end <= file_len)
            else {
                break ScanEnd::Torn;
            };

            let mut body = vec![0u8; body_len as usize];
            reader.read_exact(&mut body)?;
            let (key, location) = parse_body(&body, body_offset).map_err(|message| {
                CorpusError::StoreFormat {
                    path: self.path.display().to_string(),
                    message: format!("entry at byte {}: {}", offset, message),
                }
            })?;
            entries.push((key, location));
            offset = body_end;
        };
        drop(reader);

        for (key, location) in entries {
            if self.index.insert(key.clone(), location).is_some() {
                return Err(self.format_error(format!("duplicate key {}", key)));
            }
            self.order.push(key);
        }
        self.end = offset;
        Ok(outcome)
    }

    fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

fn parse_body(body: &[u8], body_offset: u64) -> std::result::Result<(String, EntryLocation), String> {
    let take = |pos: usize, len: usize| -> std::result::Result<&[u8], String> {
        pos.checked_add(len)
            .and_then(|end| body.get(pos..end))
            .ok_or_else(|| format!("body truncated at {}", pos))
    };

    let key_len = read_u32(take(0, 4)?) as usize;
    let key = String::from_utf8(take(4, key_len)?.to_vec()).map_err(|e| e.to_string())?;
    let mut pos = 4 + key_len;

    let attrs_len = read_u32(take(pos, 4)?);
    pos += 4;
    let attrs_offset = body_offset + pos as u64;
    take(pos, attrs_len as usize)?;
    pos += attrs_len as usize;

    let sample_count = read_u64(take(pos, 8)?);
    pos += 8;
    let payload_offset = body_offset + pos as u64;
    if sample_count.checked_mul(4) != Some((body.len() - pos) as u64) {
        return Err(format!(
            "payload holds {} bytes, expected {}",
            body.len() - pos,
            sample_count * 4
        ));
    }

    Ok((
        key,
        EntryLocation {
            attrs_offset,
            attrs_len,
            payload_offset,
            sample_count,
        },
    ))
}

fn encode_entry(key: &str, payload: &[f32], attributes: &Attributes) -> Result<Vec<u8>> {
    let attrs = serde_json::to_vec(attributes)?;
    let body_len = 4 + key.len() + 4 + attrs.len() + 8 + payload.len() * 4;

    let mut buf = Vec::with_capacity(ENTRY_HEADER_LEN as usize + body_len);
    buf.extend_from_slice(&ENTRY_TAG);
    buf.extend_from_slice(&(body_len as u64).to_le_bytes());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(&(attrs.len() as u32).to_le_bytes());
    buf.extend_from_slice(&attrs);
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    for sample in payload {
        buf.extend_from_slice(&sample.to_le_bytes());
    }
    Ok(buf)
}

impl StoreReader for BlobFile {
    fn location(&self) -> &Path {
        &self.path
    }

    fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        self.order.clone()
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn read(&mut self, key: &str) -> Result<Option<StoredSample>> {
        let Some(location) = self.index.get(key).copied() else {
            return Ok(None);
        };

        let attrs = self.read_exact_at(location.attrs_offset, location.attrs_len as usize)?;
        let attributes: Attributes = serde_json::from_slice(&attrs)?;

        let raw = self.read_exact_at(location.payload_offset, location.sample_count as usize * 4)?;
        let payload = raw
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Some(StoredSample {
            payload,
            attributes,
        }))
    }
}

impl StoreWriter for BlobFile {
    fn create(&mut self, key: &str, payload: &[f32], attributes: &Attributes) -> Result<()> {
        if !self.writable {
            return Err(CorpusError::Other(format!(
                "store {} is open read-only",
                self.path.display()
            )));
        }
        if self.index.contains_key(key) {
            return Err(CorpusError::StoreKeyExists {
                key: key.to_string(),
                store: self.path.display().to_string(),
            });
        }

        let entry = encode_entry(key, payload, attributes)?;
        let body_offset = self.end + ENTRY_HEADER_LEN;
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&entry)?;

        let body = &entry[ENTRY_HEADER_LEN as usize..];
        let (_, location) =
            parse_body(body, body_offset).map_err(|message| self.format_error(message))?;
        self.index.insert(key.to_string(), location);
        self.order.push(key.to_string());
        self.end += entry.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}

/// Backend opening [`BlobFile`] stores on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobFileBackend;

impl StoreBackend for BlobFileBackend {
    fn open_read(&self, path: &Path) -> Result<Box<dyn StoreReader>> {
        Ok(Box::new(BlobFile::open_read(path)?))
    }

    fn open_append(&self, path: &Path) -> Result<Box<dyn StoreWriter>> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Box::new(BlobFile::open_append(path)?))
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AttrValue, attr};
    use tempfile::TempDir;

    fn attrs(speaker: &str, duration: f64) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(attr::SPEAKER.to_string(), AttrValue::from(speaker));
        attributes.insert(attr::DURATION.to_string(), AttrValue::from(duration));
        attributes
    }

    #[test]
    fn create_then_reopen_reads_same_sample() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("podcast.blob");
        let payload = vec![0.25f32, -0.5, 1.0];

        {
            let mut store = BlobFile::open_append(&path).unwrap();
            store.create("ep_1000", &payload, &attrs("A", 2.5)).unwrap();
            store.flush().unwrap();
        }

        let mut store = BlobFile::open_read(&path).unwrap();
        assert!(store.contains("ep_1000"));
        let sample = store.read("ep_1000").unwrap().unwrap();
        assert_eq!(sample.payload, payload);
        assert_eq!(sample.attributes, attrs("A", 2.5));
    }

    #[test]
    fn keys_keep_insertion_order_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("order.blob");

        {
            let mut store = BlobFile::open_append(&path).unwrap();
            for key in ["c", "a", "b"] {
                store.create(key, &[0.0], &Attributes::new()).unwrap();
            }
            store.flush().unwrap();
        }
        {
            let mut store = BlobFile::open_append(&path).unwrap();
            store.create("d", &[1.0], &Attributes::new()).unwrap();
            store.flush().unwrap();
        }

        let store = BlobFile::open_read(&path).unwrap();
        assert_eq!(store.keys(), vec!["c", "a", "b", "d"]);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn create_existing_key_fails() {
        let dir = TempDir::new().unwrap();
        let mut store = BlobFile::open_append(&dir.path().join("dup.blob")).unwrap();
        store.create("k", &[0.0], &Attributes::new()).unwrap();

        let err = store.create("k", &[1.0], &Attributes::new()).unwrap_err();
        assert!(matches!(err, CorpusError::StoreKeyExists { .. }));
    }

    #[test]
    fn missing_key_reads_none() {
        let dir = TempDir::new().unwrap();
        let mut store = BlobFile::open_append(&dir.path().join("empty.blob")).unwrap();
        assert!(store.read("nothing").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn torn_tail_is_ignored_by_reader_and_truncated_by_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("torn.blob");

        {
            let mut store = BlobFile::open_append(&path).unwrap();
            store.create("complete", &[0.5; 8], &attrs("A", 1.0)).unwrap();
            store.flush().unwrap();
        }
        let good_len = std::fs::metadata(&path).unwrap().len();

        // Simulate a crash halfway through the next entry.
        let partial = encode_entry("partial", &[0.5; 8], &attrs("A", 1.0)).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&partial[..partial.len() / 2]).unwrap();
        }

        let reader = BlobFile::open_read(&path).unwrap();
        assert_eq!(reader.keys(), vec!["complete"]);
        drop(reader);

        let mut writer = BlobFile::open_append(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
        writer.create("partial", &[0.5; 8], &attrs("A", 1.0)).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let reader = BlobFile::open_read(&path).unwrap();
        assert_eq!(reader.keys(), vec!["complete", "partial"]);
    }

    #[test]
    fn oversized_entry_length_is_treated_as_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("overflow.blob");

        {
            let mut store = BlobFile::open_append(&path).unwrap();
            store.create("complete", &[0.5; 4], &attrs("A", 1.0)).unwrap();
            store.flush().unwrap();
        }
        let good_len = std::fs::metadata(&path).unwrap().len();

        // An entry header whose length would wrap past u64::MAX.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&ENTRY_TAG).unwrap();
            file.write_all(&u64::MAX.to_le_bytes()).unwrap();
        }

        let reader = BlobFile::open_read(&path).unwrap();
        assert_eq!(reader.keys(), vec!["complete"]);
        drop(reader);

        let writer = BlobFile::open_append(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
        assert_eq!(writer.keys(), vec!["complete"]);
    }

    #[test]
    fn rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not_a_store.blob");
        std::fs::write(&path, b"RIFF\x00\x00\x00\x00WAVE").unwrap();

        match BlobFile::open_read(&path) {
            Err(CorpusError::StoreFormat { message, .. }) => {
                assert!(message.contains("magic"));
            }
            Err(other) => panic!("Expected StoreFormat error, got {:?}", other),
            Ok(_) => panic!("Expected StoreFormat error"),
        }
    }

    #[test]
    fn open_read_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = BlobFile::open_read(&dir.path().join("absent.blob"));
        assert!(matches!(result, Err(CorpusError::Io(_))));
    }

    #[test]
    fn series_attributes_survive_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mel.blob");
        let mut attributes = attrs("B", 3.0);
        attributes.insert(
            attr::MEL_SPECTROGRAM.to_string(),
            AttrValue::Series(vec![0.1, 0.2, 0.3]),
        );

        let mut store = BlobFile::open_append(&path).unwrap();
        store.create("ep_1001", &[0.0; 4], &attributes).unwrap();
        let sample = store.read("ep_1001").unwrap().unwrap();
        assert_eq!(sample.attributes, attributes);
    }

    #[test]
    fn backend_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dialects").join("Bern.blob");
        let backend = BlobFileBackend;

        assert!(!backend.exists(&path));
        let mut writer = backend.open_append(&path).unwrap();
        writer.create("k", &[0.0], &Attributes::new()).unwrap();
        writer.flush().unwrap();
        assert!(backend.exists(&path));
    }
}
