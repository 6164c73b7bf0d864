//! Annotation core library
//!
//! Annotation store, collection persistence and the write coordinator that
//! keeps storage in step with the in-memory collections.

pub mod persistence;
pub mod store;
pub mod write_coordinator;

pub use persistence::{HIGHLIGHTS_KEY, STICKY_NOTES_KEY};
pub use store::{
    AnnotationRef, AnnotationStore, PageAnnotationSource, PageAnnotations, PageRangeReport,
    StoreError, StoreResult,
};
pub use write_coordinator::{PersistStatus, WriteCoordinator, WriteCoordinatorConfig};
