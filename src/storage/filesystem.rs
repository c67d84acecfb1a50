//! File-backed key-value store
//!
//! All values live in one JSON object file. The file is read once at open
//! time and rewritten atomically (write-to-temp + fsync + rename) on every
//! mutation, so a crash never leaves a half-written session file behind.

use super::traits::{KeyValueStore, StorageError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// JSON-file store. Safe to share between threads; writes are serialized.
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let parent = parent_dir(&path)?;
        std::fs::create_dir_all(&parent).map_err(|e| {
            StorageError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
        })?;

        let values = match std::fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StorageError::Io(e)),
        };

        debug!(
            "Opened session store at {} ({} keys)",
            path.display(),
            values.len()
        );

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let data = serde_json::to_vec_pretty(values)?;
        atomic_write(&self.path, &data)
    }
}

fn parent_dir(path: &Path) -> Result<PathBuf, StorageError> {
    match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Ok(PathBuf::from(".")),
        Some(p) => Ok(p.to_path_buf()),
        None => Err(StorageError::Unavailable(format!(
            "{} has no parent directory",
            path.display()
        ))),
    }
}

/// Atomically write data to a file using write-to-temp + fsync + rename.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let parent = parent_dir(path)?;
    let mut tmp = NamedTempFile::new_in(&parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        let previous = values.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&values) {
            // Keep memory and disk in agreement.
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        let Some(previous) = values.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.persist(&values) {
            values.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}
