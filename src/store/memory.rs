//! In-memory store backend for tests and dry runs.

use crate::error::{CorpusError, Result};
use crate::store::{Attributes, StoreBackend, StoreReader, StoreWriter, StoredSample};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryStoreData {
    order: Vec<String>,
    entries: HashMap<String, StoredSample>,
    flushes: usize,
}

type Shared = Arc<Mutex<HashMap<PathBuf, MemoryStoreData>>>;

/// Backend that keeps every store in a shared map keyed by path.
///
/// Clones share the same stores, so a test can hand one clone to the code
/// under test and inspect the result through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    stores: Shared,
}

fn lock(stores: &Shared) -> Result<MutexGuard<'_, HashMap<PathBuf, MemoryStoreData>>> {
    stores
        .lock()
        .map_err(|_| CorpusError::Other("memory store lock poisoned".to_string()))
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with one sample.
    pub fn insert(
        &self,
        path: &Path,
        key: &str,
        payload: Vec<f32>,
        attributes: Attributes,
    ) -> Result<()> {
        let mut store = self.open_append(path)?;
        store.create(key, &payload, &attributes)
    }

    /// Keys of a store in insertion order, empty when it does not exist.
    pub fn keys(&self, path: &Path) -> Vec<String> {
        lock(&self.stores)
            .ok()
            .and_then(|stores| stores.get(path).map(|data| data.order.clone()))
            .unwrap_or_default()
    }

    /// Number of flushes issued against a store.
    pub fn flush_count(&self, path: &Path) -> usize {
        lock(&self.stores)
            .ok()
            .and_then(|stores| stores.get(path).map(|data| data.flushes))
            .unwrap_or_default()
    }

    /// Paths of all stores, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = lock(&self.stores)
            .map(|stores| stores.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }
}

impl StoreBackend for MemoryBackend {
    fn open_read(&self, path: &Path) -> Result<Box<dyn StoreReader>> {
        if !lock(&self.stores)?.contains_key(path) {
            return Err(CorpusError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no store at {}", path.display()),
            )));
        }
        Ok(Box::new(MemoryStore {
            path: path.to_path_buf(),
            stores: self.stores.clone(),
        }))
    }

    fn open_append(&self, path: &Path) -> Result<Box<dyn StoreWriter>> {
        lock(&self.stores)?
            .entry(path.to_path_buf())
            .or_default();
        Ok(Box::new(MemoryStore {
            path: path.to_path_buf(),
            stores: self.stores.clone(),
        }))
    }

    fn exists(&self, path: &Path) -> bool {
        lock(&self.stores)
            .map(|stores| stores.contains_key(path))
            .unwrap_or(false)
    }
}

struct MemoryStore {
    path: PathBuf,
    stores: Shared,
}

impl MemoryStore {
    fn with_data<R>(&self, f: impl FnOnce(&mut MemoryStoreData) -> R) -> Result<R> {
        let mut stores = lock(&self.stores)?;
        let data = stores.entry(self.path.clone()).or_default();
        Ok(f(data))
    }
}

impl StoreReader for MemoryStore {
    fn location(&self) -> &Path {
        &self.path
    }

    fn contains(&self, key: &str) -> bool {
        self.with_data(|data| data.entries.contains_key(key))
            .unwrap_or(false)
    }

    fn keys(&self) -> Vec<String> {
        self.with_data(|data| data.order.clone()).unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.with_data(|data| data.order.len()).unwrap_or_default()
    }

    fn read(&mut self, key: &str) -> Result<Option<StoredSample>> {
        self.with_data(|data| data.entries.get(key).cloned())
    }
}

impl StoreWriter for MemoryStore {
    fn create(&mut self, key: &str, payload: &[f32], attributes: &Attributes) -> Result<()> {
        let store = self.path.display().to_string();
        self.with_data(|data| {
            if data.entries.contains_key(key) {
                return Err(CorpusError::StoreKeyExists {
                    key: key.to_string(),
                    store,
                });
            }
            data.order.push(key.to_string());
            data.entries.insert(
                key.to_string(),
                StoredSample {
                    payload: payload.to_vec(),
                    attributes: attributes.clone(),
                },
            );
            Ok(())
        })?
    }

    fn flush(&mut self) -> Result<()> {
        self.with_data(|data| data.flushes += 1)
    }
}
