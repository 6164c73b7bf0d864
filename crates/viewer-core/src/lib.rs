//! Viewport math and the annotation overlay that sits on top of rendered pages.

pub mod overlay;
pub mod viewport;

pub use overlay::{
    build_scene, diff, NodeContent, NodeKey, OverlayNode, OverlayPatch, OverlayScene, PageLayout,
    PageOverlay, Reconciler, MINIMIZED_NOTE_SIZE,
};
pub use viewport::{
    clamp_scale, current_page_from_viewport, fit_width_scale, page_layouts,
    rescale_preserving_page, visible_pages, ViewportState, MAX_SCALE, MIN_SCALE,
};
