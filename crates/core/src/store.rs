//! Annotation store for one open document
//!
//! Owns the highlight and sticky-note collections, applies mutations in
//! memory first and hands the rewritten collection to the write coordinator.
//! The in-memory state is authoritative: a failed write never rolls a
//! mutation back, it stays pending until storage accepts it.

use crate::persistence::{
    encode_collection, load_highlights, load_sticky_notes, HIGHLIGHTS_KEY, STICKY_NOTES_KEY,
};
use crate::write_coordinator::{PersistStatus, WriteCoordinator, WriteCoordinatorConfig};
use doc_model::{
    now_millis, AnnotationId, AnnotationKind, AnnotationPatch, Highlight, NewAnnotation,
    PageDisposition, PageRangePolicy, StickyNote,
};
use serde::Serialize;
use storage::{KeyValueStore, Settings, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("annotation {0} not found")]
    NotFound(AnnotationId),
    #[error("annotation {id} is a {actual}, not a {expected}")]
    KindMismatch { id: AnnotationId, expected: AnnotationKind, actual: AnnotationKind },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Annotations on one page, each kind in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAnnotations<'a> {
    pub page_index: u32,
    pub highlights: Vec<&'a Highlight>,
    pub sticky_notes: Vec<&'a StickyNote>,
}

impl PageAnnotations<'_> {
    pub fn is_empty(&self) -> bool {
        self.highlights.is_empty() && self.sticky_notes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.highlights.len() + self.sticky_notes.len()
    }
}

/// Read access to per-page annotations, as consumed by the overlay.
pub trait PageAnnotationSource {
    fn list_for_page(&self, page_index: u32) -> PageAnnotations<'_>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnnotationRef<'a> {
    Highlight(&'a Highlight),
    StickyNote(&'a StickyNote),
}

impl AnnotationRef<'_> {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::Highlight(_) => AnnotationKind::Highlight,
            Self::StickyNote(_) => AnnotationKind::StickyNote,
        }
    }

    pub fn page_index(&self) -> u32 {
        match self {
            Self::Highlight(highlight) => highlight.page_index,
            Self::StickyNote(note) => note.page_index,
        }
    }
}

/// Outcome of enforcing the page-range policy against a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRangeReport {
    pub out_of_range: usize,
    pub removed: Vec<AnnotationId>,
    pub moved: Vec<AnnotationId>,
}

pub struct AnnotationStore<S: KeyValueStore + Send + 'static> {
    highlights: Vec<Highlight>,
    sticky_notes: Vec<StickyNote>,
    policy: PageRangePolicy,
    writer: WriteCoordinator<S>,
}

impl<S: KeyValueStore + Send + 'static> AnnotationStore<S> {
    /// Load both collections from `kv` and start persisting into it.
    pub fn open(kv: S, settings: &Settings) -> Self {
        Self::open_with_config(
            kv,
            WriteCoordinatorConfig::from_settings(settings),
            settings.page_range_policy,
        )
    }

    pub fn open_with_config(
        kv: S,
        config: WriteCoordinatorConfig,
        policy: PageRangePolicy,
    ) -> Self {
        let highlights = load_highlights(&kv);
        let sticky_notes = load_sticky_notes(&kv);
        log::debug!(
            "loaded {} highlight(s) and {} sticky note(s)",
            highlights.len(),
            sticky_notes.len()
        );

        Self { highlights, sticky_notes, policy, writer: WriteCoordinator::with_config(kv, config) }
    }

    /// Append a new annotation and schedule its collection for writing.
    pub fn create(&mut self, new: NewAnnotation) -> AnnotationId {
        let id = AnnotationId::generate();
        let now = now_millis();

        match new {
            NewAnnotation::Highlight { page_index, rects, content, note, color } => {
                self.highlights.push(Highlight {
                    id: id.clone(),
                    page_index,
                    rects,
                    content,
                    note: note.filter(|text| !text.is_empty()),
                    color,
                    created_at: now,
                    updated_at: now,
                });
                self.persist(AnnotationKind::Highlight);
            }
            NewAnnotation::StickyNote { page_index, position, width, height, content, color } => {
                self.sticky_notes.push(StickyNote {
                    id: id.clone(),
                    page_index,
                    x: position.x,
                    y: position.y,
                    width,
                    height,
                    content,
                    color,
                    minimized: false,
                    created_at: now,
                    updated_at: now,
                });
                self.persist(AnnotationKind::StickyNote);
            }
        }

        id
    }

    /// Merge `patch` into the matching record and refresh `updatedAt`.
    pub fn update(&mut self, id: &AnnotationId, patch: AnnotationPatch) -> StoreResult<()> {
        let actual = self
            .get(id)
            .map(|found| found.kind())
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if actual != patch.kind() {
            return Err(StoreError::KindMismatch { id: id.clone(), expected: patch.kind(), actual });
        }

        let now = now_millis();
        match patch {
            AnnotationPatch::Highlight(patch) => {
                if let Some(highlight) = self.highlights.iter_mut().find(|h| &h.id == id) {
                    patch.apply(highlight);
                    highlight.updated_at = now;
                }
            }
            AnnotationPatch::StickyNote(patch) => {
                if let Some(note) = self.sticky_notes.iter_mut().find(|n| &n.id == id) {
                    patch.apply(note);
                    note.updated_at = now;
                }
            }
        }

        self.persist(actual);
        Ok(())
    }

    pub fn delete(&mut self, id: &AnnotationId) -> StoreResult<AnnotationKind> {
        if let Some(index) = self.highlights.iter().position(|h| &h.id == id) {
            self.highlights.remove(index);
            self.persist(AnnotationKind::Highlight);
            return Ok(AnnotationKind::Highlight);
        }

        if let Some(index) = self.sticky_notes.iter().position(|n| &n.id == id) {
            self.sticky_notes.remove(index);
            self.persist(AnnotationKind::StickyNote);
            return Ok(AnnotationKind::StickyNote);
        }

        Err(StoreError::NotFound(id.clone()))
    }

    pub fn get(&self, id: &AnnotationId) -> Option<AnnotationRef<'_>> {
        self.highlights
            .iter()
            .find(|h| &h.id == id)
            .map(AnnotationRef::Highlight)
            .or_else(|| {
                self.sticky_notes.iter().find(|n| &n.id == id).map(AnnotationRef::StickyNote)
            })
    }

    /// Filter both collections by page. Linear in the collection size.
    pub fn list_for_page(&self, page_index: u32) -> PageAnnotations<'_> {
        PageAnnotations {
            page_index,
            highlights: self.highlights.iter().filter(|h| h.page_index == page_index).collect(),
            sticky_notes: self
                .sticky_notes
                .iter()
                .filter(|n| n.page_index == page_index)
                .collect(),
        }
    }

    pub fn highlights(&self) -> &[Highlight] {
        &self.highlights
    }

    pub fn sticky_notes(&self) -> &[StickyNote] {
        &self.sticky_notes
    }

    pub fn len(&self) -> usize {
        self.highlights.len() + self.sticky_notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn policy(&self) -> PageRangePolicy {
        self.policy
    }

    /// Enforce the page-range policy for a document with `page_count` pages.
    pub fn apply_page_range(&mut self, page_count: u32) -> PageRangeReport {
        let policy = self.policy;
        let now = now_millis();
        let mut report = PageRangeReport::default();
        let mut highlights_changed = false;
        let mut notes_changed = false;

        self.highlights.retain_mut(|highlight| {
            match resolve(policy, highlight.page_index, page_count, &mut report) {
                PageDisposition::Keep => true,
                PageDisposition::Remove => {
                    report.removed.push(highlight.id.clone());
                    highlights_changed = true;
                    false
                }
                PageDisposition::MoveTo(page) => {
                    highlight.page_index = page;
                    highlight.updated_at = now;
                    report.moved.push(highlight.id.clone());
                    highlights_changed = true;
                    true
                }
            }
        });

        self.sticky_notes.retain_mut(|note| {
            match resolve(policy, note.page_index, page_count, &mut report) {
                PageDisposition::Keep => true,
                PageDisposition::Remove => {
                    report.removed.push(note.id.clone());
                    notes_changed = true;
                    false
                }
                PageDisposition::MoveTo(page) => {
                    note.page_index = page;
                    note.updated_at = now;
                    report.moved.push(note.id.clone());
                    notes_changed = true;
                    true
                }
            }
        });

        if highlights_changed {
            self.persist(AnnotationKind::Highlight);
        }
        if notes_changed {
            self.persist(AnnotationKind::StickyNote);
        }
        if report.out_of_range > 0 {
            log::info!(
                "{} annotation(s) beyond page {page_count} handled with {policy:?}",
                report.out_of_range
            );
        }

        report
    }

    /// Write every pending collection now.
    pub fn flush(&self) -> StoreResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn persist_status(&self) -> PersistStatus {
        self.writer.status()
    }

    pub fn writer(&self) -> &WriteCoordinator<S> {
        &self.writer
    }

    fn persist(&self, kind: AnnotationKind) {
        let (key, encoded) = match kind {
            AnnotationKind::Highlight => (HIGHLIGHTS_KEY, encode_collection(&self.highlights)),
            AnnotationKind::StickyNote => (STICKY_NOTES_KEY, encode_collection(&self.sticky_notes)),
        };

        match encoded {
            Ok(payload) => self.writer.mark_dirty(key, payload),
            Err(err) => log::error!("failed to encode '{key}', change kept in memory only: {err}"),
        }
    }
}

impl<S: KeyValueStore + Send + 'static> PageAnnotationSource for AnnotationStore<S> {
    fn list_for_page(&self, page_index: u32) -> PageAnnotations<'_> {
        AnnotationStore::list_for_page(self, page_index)
    }
}

fn resolve(
    policy: PageRangePolicy,
    page_index: u32,
    page_count: u32,
    report: &mut PageRangeReport,
) -> PageDisposition {
    if page_index >= page_count {
        report.out_of_range += 1;
    }
    policy.resolve(page_index, page_count)
}
