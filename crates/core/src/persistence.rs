//! Collection encoding under the two fixed storage keys.
//!
//! Each collection is stored as one JSON array and rewritten whole.

use doc_model::{Highlight, StickyNote};
use serde::de::DeserializeOwned;
use serde::Serialize;
use storage::{KeyValueStore, StorageError};

pub const STICKY_NOTES_KEY: &str = "pdf-post-it-notes";
pub const HIGHLIGHTS_KEY: &str = "pdf-text-highlights";

/// Read a collection, failing on I/O or parse errors.
///
/// A missing key is an empty collection.
pub fn read_collection<T, S>(store: &S, key: &str) -> Result<Vec<T>, StorageError>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    match store.get(key)? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(Vec::new()),
    }
}

/// Read a collection, logging and discarding anything unreadable.
pub fn load_collection<T, S>(store: &S, key: &str) -> Vec<T>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    read_collection(store, key).unwrap_or_else(|err| {
        log::warn!("failed to load '{key}', starting with an empty collection: {err}");
        Vec::new()
    })
}

pub fn load_highlights<S: KeyValueStore + ?Sized>(store: &S) -> Vec<Highlight> {
    load_collection(store, HIGHLIGHTS_KEY)
}

pub fn load_sticky_notes<S: KeyValueStore + ?Sized>(store: &S) -> Vec<StickyNote> {
    load_collection(store, STICKY_NOTES_KEY)
}

pub fn encode_collection<T: Serialize>(items: &[T]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(items)
}
