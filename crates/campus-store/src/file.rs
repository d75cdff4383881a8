//! A durable store backed by one JSON file.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::{KeyValueStore, StoreError};

/// The durable tier: survives restarts, like `localStorage`.
///
/// The whole map lives in memory and is rewritten to disk on every
/// mutation (write to `<path>.tmp`, then rename over `<path>`), so a crash
/// mid-write leaves the previous file intact. Session data is a handful of
/// small keys; rewriting the file is cheaper than being clever.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens (or lazily creates) the store at `path`.
    ///
    /// A missing file is an empty store; the file is created on the first
    /// write. A file that exists but isn't a JSON string map is logged and
    /// treated as empty; it gets overwritten on the next write.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the file exists but can't be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "durable store file is corrupt, starting empty"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "file store opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Where this store persists its data.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(StoreError::Encode)?;
        let tmp = self.path.with_extension("tmp");
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        fs::write(&tmp, bytes).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    // Memory only changes once the new map is on disk.

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = entries.clone();
        next.insert(key.to_owned(), value.to_owned());
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("storage.json")).unwrap();

        assert_eq!(store.get("anything").unwrap(), None);
        assert!(!store.path().exists(), "no file until the first write");
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set("theme", "dark").unwrap();
            store.set("auth_token", "abc").unwrap();
            store.remove("auth_token").unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(reopened.get("auth_token").unwrap(), None);
    }

    #[test]
    fn test_open_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, b"{ not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("theme").unwrap(), None);

        // The next write replaces the corrupt file with a valid one.
        store.set("theme", "light").unwrap();
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("theme").unwrap().as_deref(), Some("light"));
    }

    #[test]
    fn test_set_into_missing_directory_returns_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("no-such-dir").join("s.json")).unwrap();

        let result = store.set("k", "v");

        assert!(matches!(result, Err(StoreError::Io { .. })));
    }

    #[test]
    fn test_set_failed_flush_leaves_value_unset() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("no-such-dir").join("s.json")).unwrap();

        assert!(store.set("k", "v").is_err());

        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_remove_failed_flush_keeps_value() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let store = FileStore::open(sub.join("s.json")).unwrap();
        store.set("k", "v").unwrap();
        fs::remove_dir_all(&sub).unwrap();

        assert!(store.remove("k").is_err());

        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
