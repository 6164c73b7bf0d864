use crate::{default_project_dirs, KeyValueStore, StorageError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// One file per key under `<root>/kv`.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = default_project_dirs()?;
        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        self.root.join("kv").join(format!("{file_name}.json"))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.key_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.key_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, value)?;
        fs::rename(&temp_path, &path)?;

        log::debug!("wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_returns_the_same_bytes() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = FileKeyValueStore::with_root(temp.path());

        store.set("pdf-text-highlights", b"[]").expect("set should succeed");
        let value = store.get("pdf-text-highlights").expect("get should succeed");

        assert_eq!(value.as_deref(), Some(&b"[]"[..]));
        assert!(!temp.path().join("kv").join("pdf-text-highlights.tmp").exists());
    }

    #[test]
    fn missing_key_reads_as_none() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = FileKeyValueStore::with_root(temp.path());

        assert_eq!(store.get("absent").expect("get should succeed"), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = FileKeyValueStore::with_root(temp.path());

        store.set("k", b"1").expect("set should succeed");
        store.remove("k").expect("first remove should succeed");
        store.remove("k").expect("second remove should succeed");
        assert_eq!(store.get("k").expect("get should succeed"), None);
    }

    #[test]
    fn keys_with_path_separators_stay_inside_root() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = FileKeyValueStore::with_root(temp.path());

        store.set("../escape/key", b"x").expect("set should succeed");
        assert!(temp.path().join("kv").join(".._escape_key.json").exists());
    }
}
