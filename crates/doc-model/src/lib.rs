//! Annotation data model for the PDF viewer overlay.
//!
//! Records are stored in page space (zoom divided out); all scale
//! multiplication happens at render time.

pub mod annotation;
pub mod geometry;

pub use annotation::{
    AnnotationColor, AnnotationId, AnnotationKind, AnnotationPatch, Highlight, HighlightPatch,
    NewAnnotation, PageDisposition, PageRangePolicy, StickyNote, StickyNotePatch,
};
pub use geometry::{
    point_to_page_space, point_to_screen_space, selection_to_page_rects, to_page_space,
    to_screen_space, ClientPoint, ClientRect, PagePoint, PageRect, ScreenRect,
};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
