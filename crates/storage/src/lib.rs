//! Local key-value storage for annotation collections and settings.

mod file;
mod memory;
mod settings;

pub use file::FileKeyValueStore;
pub use memory::MemoryKeyValueStore;
pub use settings::{Settings, SettingsStore};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("write rejected for key '{0}'")]
    WriteRejected(String),
}

/// Whole-value key-value storage.
///
/// Values are opaque bytes; callers own the encoding.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

pub(crate) fn default_project_dirs() -> Result<directories::ProjectDirs, StorageError> {
    directories::ProjectDirs::from("dev", "PdfAnnotate", "PdfAnnotate")
        .ok_or(StorageError::NoDataDirectory)
}
