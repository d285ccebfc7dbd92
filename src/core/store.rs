//! Durable prefixed key-value store for workload records and settings.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No stored value for `{prefix}/{key}`.")]
    NotFound { prefix: String, key: String },
    #[error("Datastore I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Byte-oriented storage keyed by `(prefix, key)`. Different record kinds use
/// different prefixes in the same store.
pub trait ProcessStore: Send + Sync {
    fn put(&self, prefix: &str, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Missing keys are reported as [`StoreError::NotFound`].
    fn get(&self, prefix: &str, key: &str) -> StoreResult<Vec<u8>>;

    /// Deleting a missing key succeeds.
    fn delete(&self, prefix: &str, key: &str) -> StoreResult<()>;

    /// All values under `prefix`, ordered by key.
    fn list(&self, prefix: &str) -> StoreResult<Vec<Vec<u8>>>;
}

/// One file per key under `<root>/<prefix>/`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn prefix_dir(&self, prefix: &str) -> PathBuf {
        self.root.join(encode_component(prefix))
    }

    fn entry_path(&self, prefix: &str, key: &str) -> PathBuf {
        self.prefix_dir(prefix)
            .join(format!("{}.json", encode_component(key)))
    }
}

impl ProcessStore for FileStore {
    fn put(&self, prefix: &str, key: &str, value: &[u8]) -> StoreResult<()> {
        let dir = self.prefix_dir(prefix);
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let path = self.entry_path(prefix, key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value).map_err(|source| StoreError::Io {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &path).map_err(|source| StoreError::Io { path, source })
    }

    fn get(&self, prefix: &str, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.entry_path(prefix, key);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                prefix: prefix.to_string(),
                key: key.to_string(),
            }),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn delete(&self, prefix: &str, key: &str) -> StoreResult<()> {
        let path = self.entry_path(prefix, key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<Vec<u8>>> {
        let dir = self.prefix_dir(prefix);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut values = Vec::with_capacity(paths.len());
        for path in paths {
            match fs::read(&path) {
                Ok(bytes) => values.push(bytes),
                // Deleted between the directory scan and the read.
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(source) => return Err(StoreError::Io { path, source }),
            }
        }
        Ok(values)
    }
}

/// Keys are names chosen by callers; anything outside `[A-Za-z0-9._-]` is
/// percent-encoded so every key maps to exactly one file name.
fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => encoded.push(byte as char),
            b'.' if !encoded.is_empty() => encoded.push('.'),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

/// Process-local store, mainly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .keys()
            .filter(|(entry_prefix, _)| entry_prefix == prefix)
            .map(|(_, key)| key.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), Vec<u8>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProcessStore for MemoryStore {
    fn put(&self, prefix: &str, key: &str, value: &[u8]) -> StoreResult<()> {
        self.lock()
            .insert((prefix.to_string(), key.to_string()), value.to_vec());
        Ok(())
    }

    fn get(&self, prefix: &str, key: &str) -> StoreResult<Vec<u8>> {
        self.lock()
            .get(&(prefix.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                prefix: prefix.to_string(),
                key: key.to_string(),
            })
    }

    fn delete(&self, prefix: &str, key: &str) -> StoreResult<()> {
        self.lock().remove(&(prefix.to_string(), key.to_string()));
        Ok(())
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<Vec<u8>>> {
        Ok(self
            .lock()
            .iter()
            .filter(|((entry_prefix, _), _)| entry_prefix == prefix)
            .map(|(_, value)| value.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_round_trips_and_lists_by_prefix() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.put("rtsp_process", "cam2", b"two").unwrap();
        store.put("rtsp_process", "cam1", b"one").unwrap();
        store.put("settings", "default", b"{}").unwrap();

        assert_eq!(store.get("rtsp_process", "cam1").unwrap(), b"one");
        assert_eq!(
            store.list("rtsp_process").unwrap(),
            vec![b"one".to_vec(), b"two".to_vec()]
        );
        assert_eq!(store.list("settings").unwrap().len(), 1);
    }

    #[test]
    fn file_store_reports_missing_keys_as_not_found() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let err = store.get("rtsp_process", "ghost").unwrap_err();
        assert!(err.is_not_found());
        assert!(store.list("rtsp_process").unwrap().is_empty());
    }

    #[test]
    fn file_store_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.put("rtsp_process", "cam1", b"one").unwrap();
        store.delete("rtsp_process", "cam1").unwrap();
        store.delete("rtsp_process", "cam1").unwrap();
        assert!(store.get("rtsp_process", "cam1").unwrap_err().is_not_found());
    }

    #[test]
    fn file_store_keeps_unsafe_keys_inside_the_prefix() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.put("rtsp_process", "../escape", b"x").unwrap();
        store.put("rtsp_process", "Cam 1/north", b"y").unwrap();

        assert_eq!(store.get("rtsp_process", "../escape").unwrap(), b"x");
        assert_eq!(store.get("rtsp_process", "Cam 1/north").unwrap(), b"y");
        assert!(!dir.path().join("escape.json").exists());
        assert_eq!(store.list("rtsp_process").unwrap().len(), 2);
    }

    #[test]
    fn encode_component_escapes_separators() {
        assert_eq!(encode_component("cam-1_a.b"), "cam-1_a.b");
        assert_eq!(encode_component("a/b"), "a%2Fb");
        assert_eq!(encode_component(".hidden"), "%2Ehidden");
    }

    #[test]
    fn memory_store_lists_only_matching_prefix() {
        let store = MemoryStore::new();
        store.put("rtsp_process", "cam1", b"one").unwrap();
        store.put("settings", "default", b"{}").unwrap();
        assert_eq!(store.list("rtsp_process").unwrap(), vec![b"one".to_vec()]);
        assert_eq!(store.keys("settings"), vec!["default".to_string()]);
    }
}
