//! Declarative annotation overlay.
//!
//! The overlay for a render pass is a pure function of the stored annotations,
//! the zoom scale and the mounted page layouts. [`Reconciler`] keeps the last
//! scene and turns each new one into keyed patches, so a zoom change updates
//! existing overlay nodes in place instead of rebuilding them.

use annotation_core::PageAnnotationSource;
use doc_model::{
    point_to_screen_space, to_screen_space, AnnotationColor, AnnotationId, ClientPoint,
    ScreenRect,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Edge length, in CSS pixels, of a minimized sticky note marker.
pub const MINIMIZED_NOTE_SIZE: f64 = 24.0;

/// A page that is currently mounted by the document renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLayout {
    pub page_index: u32,
    /// Client position of the page container's top-left corner.
    pub origin: ClientPoint,
    /// Set when the renderer failed to draw the page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_error: Option<String>,
}

impl PageLayout {
    pub fn new(page_index: u32, origin: ClientPoint) -> Self {
        Self { page_index, origin, render_error: None }
    }

    pub fn failed(page_index: u32, origin: ClientPoint, message: impl Into<String>) -> Self {
        Self { page_index, origin, render_error: Some(message.into()) }
    }
}

/// Stable identity of an overlay node: the annotation plus which of its
/// rectangles the node draws.
///
/// Ids are not guaranteed unique, so records sharing an id on one page are
/// told apart by `occurrence`, their order among those records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeKey {
    pub annotation: AnnotationId,
    pub occurrence: u32,
    pub part: u32,
}

impl NodeKey {
    pub fn new(annotation: AnnotationId, part: u32) -> Self {
        Self { annotation, occurrence: 0, part }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeContent {
    #[serde(rename_all = "camelCase")]
    HighlightRect { color: AnnotationColor, has_note: bool },
    #[serde(rename_all = "camelCase")]
    StickyNote { color: AnnotationColor, content: String, minimized: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayNode {
    pub key: NodeKey,
    /// CSS pixels relative to the page container.
    pub rect: ScreenRect,
    pub content: NodeContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOverlay {
    pub page_index: u32,
    /// Paint order: highlights first, sticky notes on top.
    pub nodes: Vec<OverlayNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OverlayScene {
    pub scale: f64,
    pub pages: Vec<PageOverlay>,
}

impl OverlayScene {
    pub fn page(&self, page_index: u32) -> Option<&PageOverlay> {
        self.pages.iter().find(|page| page.page_index == page_index)
    }

    pub fn node_count(&self) -> usize {
        self.pages.iter().map(|page| page.nodes.len()).sum()
    }

    /// Topmost node under a client-space pointer on the given page.
    pub fn hit_test(&self, layout: &PageLayout, point: ClientPoint) -> Option<&OverlayNode> {
        let local_x = point.x - layout.origin.x;
        let local_y = point.y - layout.origin.y;

        self.page(layout.page_index)?
            .nodes
            .iter()
            .rev()
            .find(|node| node.rect.contains(local_x, local_y))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum OverlayPatch {
    #[serde(rename_all = "camelCase")]
    Insert { page_index: u32, node: OverlayNode },
    #[serde(rename_all = "camelCase")]
    Update { page_index: u32, node: OverlayNode },
    #[serde(rename_all = "camelCase")]
    Remove { page_index: u32, key: NodeKey },
    /// The page's error banner appeared, changed, or (with `None`) cleared.
    #[serde(rename_all = "camelCase")]
    PageError { page_index: u32, message: Option<String> },
}

/// Project stored annotations onto the mounted pages at `scale`.
///
/// Layouts for pages outside `0..page_count` are skipped, as are duplicates
/// of a page already seen. A page whose render failed carries its error and
/// no annotation nodes.
pub fn build_scene<A: PageAnnotationSource + ?Sized>(
    source: &A,
    scale: f64,
    layouts: &[PageLayout],
    page_count: u32,
) -> OverlayScene {
    let mut seen = HashSet::new();
    let mut pages = Vec::with_capacity(layouts.len());

    for layout in layouts {
        if layout.page_index >= page_count || !seen.insert(layout.page_index) {
            continue;
        }

        if let Some(message) = &layout.render_error {
            pages.push(PageOverlay {
                page_index: layout.page_index,
                nodes: Vec::new(),
                error: Some(message.clone()),
            });
            continue;
        }

        let annotations = source.list_for_page(layout.page_index);
        let mut nodes = Vec::with_capacity(annotations.len());
        let mut occurrences = HashMap::new();

        for highlight in &annotations.highlights {
            let has_note = highlight.note.is_some();
            let occurrence = next_occurrence(&mut occurrences, &highlight.id);
            for (part, rect) in highlight.rects.iter().enumerate() {
                nodes.push(OverlayNode {
                    key: NodeKey {
                        annotation: highlight.id.clone(),
                        occurrence,
                        part: part as u32,
                    },
                    rect: to_screen_space(*rect, scale),
                    content: NodeContent::HighlightRect { color: highlight.color, has_note },
                });
            }
        }

        for note in &annotations.sticky_notes {
            let rect = if note.minimized {
                let (x, y) = point_to_screen_space(note.anchor(), scale);
                ScreenRect::new(x, y, MINIMIZED_NOTE_SIZE, MINIMIZED_NOTE_SIZE)
            } else {
                to_screen_space(note.rect(), scale)
            };

            nodes.push(OverlayNode {
                key: NodeKey {
                    annotation: note.id.clone(),
                    occurrence: next_occurrence(&mut occurrences, &note.id),
                    part: 0,
                },
                rect,
                content: NodeContent::StickyNote {
                    color: note.color,
                    content: note.content.clone(),
                    minimized: note.minimized,
                },
            });
        }

        pages.push(PageOverlay { page_index: layout.page_index, nodes, error: None });
    }

    OverlayScene { scale, pages }
}

fn next_occurrence<'a>(seen: &mut HashMap<&'a AnnotationId, u32>, id: &'a AnnotationId) -> u32 {
    let count = seen.entry(id).or_insert(0);
    *count += 1;
    *count - 1
}

/// Keyed difference between two scenes.
///
/// Removals come first, then inserts and updates in the new scene's paint
/// order.
pub fn diff(old: &OverlayScene, new: &OverlayScene) -> Vec<OverlayPatch> {
    let mut patches = Vec::new();

    let old_nodes: HashMap<(u32, &NodeKey), &OverlayNode> = old
        .pages
        .iter()
        .flat_map(|page| page.nodes.iter().map(move |node| ((page.page_index, &node.key), node)))
        .collect();
    let new_keys: HashSet<(u32, &NodeKey)> = new
        .pages
        .iter()
        .flat_map(|page| page.nodes.iter().map(move |node| (page.page_index, &node.key)))
        .collect();

    for page in &old.pages {
        for node in &page.nodes {
            if !new_keys.contains(&(page.page_index, &node.key)) {
                patches.push(OverlayPatch::Remove {
                    page_index: page.page_index,
                    key: node.key.clone(),
                });
            }
        }
    }

    for page in &new.pages {
        let old_error = old.page(page.page_index).and_then(|old_page| old_page.error.as_ref());
        if old_error != page.error.as_ref() {
            patches.push(OverlayPatch::PageError {
                page_index: page.page_index,
                message: page.error.clone(),
            });
        }

        for node in &page.nodes {
            match old_nodes.get(&(page.page_index, &node.key)) {
                None => patches.push(OverlayPatch::Insert {
                    page_index: page.page_index,
                    node: node.clone(),
                }),
                Some(previous) if *previous != node => patches.push(OverlayPatch::Update {
                    page_index: page.page_index,
                    node: node.clone(),
                }),
                Some(_) => {}
            }
        }
    }

    patches
}

/// Retains the last overlay scene and emits patches for each render pass.
#[derive(Debug, Default)]
pub struct Reconciler {
    current: OverlayScene,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the scene for a page-render or zoom event and return what changed.
    ///
    /// A non-positive or non-finite scale is ignored; the previous scene stays.
    pub fn reconcile<A: PageAnnotationSource + ?Sized>(
        &mut self,
        source: &A,
        scale: f64,
        layouts: &[PageLayout],
        page_count: u32,
    ) -> Vec<OverlayPatch> {
        if !scale.is_finite() || scale <= 0.0 {
            log::debug!("ignoring render pass with scale {scale}");
            return Vec::new();
        }

        let next = build_scene(source, scale, layouts, page_count);
        let patches = diff(&self.current, &next);
        self.current = next;
        patches
    }

    pub fn scene(&self) -> &OverlayScene {
        &self.current
    }

    /// Forget the retained scene, e.g. when the document is closed.
    pub fn reset(&mut self) -> Vec<OverlayPatch> {
        let patches = diff(&self.current, &OverlayScene::default());
        self.current = OverlayScene::default();
        patches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotation_core::PageAnnotations;
    use doc_model::{Highlight, PageRect, StickyNote};

    #[derive(Default)]
    struct Fixture {
        highlights: Vec<Highlight>,
        notes: Vec<StickyNote>,
    }

    impl PageAnnotationSource for Fixture {
        fn list_for_page(&self, page_index: u32) -> PageAnnotations<'_> {
            PageAnnotations {
                page_index,
                highlights: self.highlights.iter().filter(|h| h.page_index == page_index).collect(),
                sticky_notes: self.notes.iter().filter(|n| n.page_index == page_index).collect(),
            }
        }
    }

    fn highlight(id: &str, page_index: u32, rects: Vec<PageRect>) -> Highlight {
        Highlight {
            id: AnnotationId::from(id),
            page_index,
            rects,
            content: "text".to_owned(),
            note: None,
            color: AnnotationColor::Yellow,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn note(id: &str, page_index: u32) -> StickyNote {
        StickyNote {
            id: AnnotationId::from(id),
            page_index,
            x: 50.0,
            y: 50.0,
            width: 200.0,
            height: 150.0,
            content: "note".to_owned(),
            color: AnnotationColor::Pink,
            minimized: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn layouts(pages: &[u32]) -> Vec<PageLayout> {
        pages
            .iter()
            .map(|&page| PageLayout::new(page, ClientPoint::new(0.0, page as f64 * 1000.0)))
            .collect()
    }

    #[test]
    fn zooming_scales_stored_rects() {
        let fixture = Fixture {
            highlights: vec![highlight("h", 2, vec![PageRect::new(10.0, 20.0, 100.0, 15.0)])],
            ..Default::default()
        };

        let at_one = build_scene(&fixture, 1.0, &layouts(&[2]), 5);
        assert_eq!(at_one.pages[0].nodes[0].rect, ScreenRect::new(10.0, 20.0, 100.0, 15.0));

        let at_two = build_scene(&fixture, 2.0, &layouts(&[2]), 5);
        assert_eq!(at_two.pages[0].nodes[0].rect, ScreenRect::new(20.0, 40.0, 200.0, 30.0));
    }

    #[test]
    fn one_node_per_highlight_rect_with_notes_on_top() {
        let fixture = Fixture {
            highlights: vec![highlight(
                "h",
                0,
                vec![PageRect::new(0.0, 0.0, 10.0, 5.0), PageRect::new(0.0, 6.0, 8.0, 5.0)],
            )],
            notes: vec![note("n", 0)],
        };

        let scene = build_scene(&fixture, 1.0, &layouts(&[0]), 1);
        let keys: Vec<(&str, u32)> = scene.pages[0]
            .nodes
            .iter()
            .map(|node| (node.key.annotation.as_str(), node.key.part))
            .collect();
        assert_eq!(keys, vec![("h", 0), ("h", 1), ("n", 0)]);
    }

    #[test]
    fn only_mounted_in_range_pages_are_projected() {
        let fixture = Fixture {
            highlights: vec![
                highlight("a", 0, vec![PageRect::new(0.0, 0.0, 1.0, 1.0)]),
                highlight("b", 1, vec![PageRect::new(0.0, 0.0, 1.0, 1.0)]),
                highlight("far", 8, vec![PageRect::new(0.0, 0.0, 1.0, 1.0)]),
            ],
            ..Default::default()
        };

        let scene = build_scene(&fixture, 1.0, &layouts(&[1, 8, 1]), 3);
        assert_eq!(scene.pages.len(), 1);
        assert_eq!(scene.pages[0].page_index, 1);
        assert_eq!(scene.node_count(), 1);
    }

    #[test]
    fn minimized_note_renders_fixed_marker() {
        let mut minimized = note("n", 0);
        minimized.minimized = true;
        let fixture = Fixture { notes: vec![minimized], ..Default::default() };

        let scene = build_scene(&fixture, 3.0, &layouts(&[0]), 1);
        assert_eq!(
            scene.pages[0].nodes[0].rect,
            ScreenRect::new(150.0, 150.0, MINIMIZED_NOTE_SIZE, MINIMIZED_NOTE_SIZE)
        );
    }

    #[test]
    fn reconciling_unchanged_input_is_a_no_op() {
        let fixture = Fixture {
            highlights: vec![highlight("h", 0, vec![PageRect::new(1.0, 2.0, 3.0, 4.0)])],
            notes: vec![note("n", 1)],
        };
        let mut reconciler = Reconciler::new();

        let first = reconciler.reconcile(&fixture, 1.5, &layouts(&[0, 1]), 2);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|patch| matches!(patch, OverlayPatch::Insert { .. })));
        let scene = reconciler.scene().clone();

        let second = reconciler.reconcile(&fixture, 1.5, &layouts(&[0, 1]), 2);
        assert!(second.is_empty());
        assert_eq!(reconciler.scene(), &scene);
        assert_eq!(reconciler.scene().node_count(), 2);
    }

    #[test]
    fn zoom_change_updates_nodes_in_place() {
        let fixture = Fixture {
            highlights: vec![highlight("h", 0, vec![PageRect::new(1.0, 2.0, 3.0, 4.0)])],
            ..Default::default()
        };
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&fixture, 1.0, &layouts(&[0]), 1);

        let patches = reconciler.reconcile(&fixture, 2.0, &layouts(&[0]), 1);
        assert_eq!(patches.len(), 1);
        let OverlayPatch::Update { node, .. } = &patches[0] else {
            panic!("update expected, got {patches:?}");
        };
        assert_eq!(node.rect, ScreenRect::new(2.0, 4.0, 6.0, 8.0));
    }

    #[test]
    fn unmounting_a_page_removes_its_nodes() {
        let fixture = Fixture {
            highlights: vec![
                highlight("a", 0, vec![PageRect::new(0.0, 0.0, 1.0, 1.0)]),
                highlight("b", 1, vec![PageRect::new(0.0, 0.0, 1.0, 1.0)]),
            ],
            ..Default::default()
        };
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&fixture, 1.0, &layouts(&[0, 1]), 2);

        let patches = reconciler.reconcile(&fixture, 1.0, &layouts(&[1]), 2);
        assert_eq!(
            patches,
            vec![OverlayPatch::Remove {
                page_index: 0,
                key: NodeKey::new(AnnotationId::from("a"), 0),
            }]
        );
    }

    #[test]
    fn records_sharing_an_id_get_distinct_keys() {
        let fixture = Fixture {
            highlights: vec![
                highlight("dup", 0, vec![PageRect::new(1.0, 1.0, 10.0, 5.0)]),
                highlight("dup", 0, vec![PageRect::new(1.0, 20.0, 10.0, 5.0)]),
            ],
            notes: vec![note("dup", 0)],
        };
        let mut reconciler = Reconciler::new();

        let first = reconciler.reconcile(&fixture, 1.0, &layouts(&[0]), 1);
        assert_eq!(first.len(), 3);
        let occurrences: Vec<u32> =
            reconciler.scene().pages[0].nodes.iter().map(|node| node.key.occurrence).collect();
        assert_eq!(occurrences, vec![0, 1, 2]);

        assert!(reconciler.reconcile(&fixture, 1.0, &layouts(&[0]), 1).is_empty());

        let zoomed = reconciler.reconcile(&fixture, 2.0, &layouts(&[0]), 1);
        assert_eq!(zoomed.len(), 3);
        assert!(zoomed.iter().all(|patch| matches!(patch, OverlayPatch::Update { .. })));
    }

    #[test]
    fn invalid_scale_keeps_previous_scene() {
        let fixture = Fixture { notes: vec![note("n", 0)], ..Default::default() };
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&fixture, 1.0, &layouts(&[0]), 1);
        let before = reconciler.scene().clone();

        assert!(reconciler.reconcile(&fixture, 0.0, &layouts(&[0]), 1).is_empty());
        assert!(reconciler.reconcile(&fixture, f64::NAN, &layouts(&[0]), 1).is_empty());
        assert_eq!(reconciler.scene(), &before);
    }

    #[test]
    fn failed_page_shows_error_instead_of_annotations() {
        let fixture = Fixture { notes: vec![note("n", 0)], ..Default::default() };
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&fixture, 1.0, &layouts(&[0]), 1);

        let failed = vec![PageLayout::failed(0, ClientPoint::default(), "text layer failed")];
        let patches = reconciler.reconcile(&fixture, 1.0, &failed, 1);

        assert!(patches.contains(&OverlayPatch::PageError {
            page_index: 0,
            message: Some("text layer failed".to_owned()),
        }));
        assert!(patches.iter().any(|patch| matches!(patch, OverlayPatch::Remove { .. })));

        let recovered = reconciler.reconcile(&fixture, 1.0, &layouts(&[0]), 1);
        assert!(recovered.contains(&OverlayPatch::PageError { page_index: 0, message: None }));
    }

    #[test]
    fn hit_test_prefers_topmost_node() {
        let fixture = Fixture {
            highlights: vec![highlight("h", 0, vec![PageRect::new(40.0, 40.0, 100.0, 20.0)])],
            notes: vec![note("n", 0)],
        };
        let scene = build_scene(&fixture, 1.0, &layouts(&[0]), 1);
        let layout = PageLayout::new(0, ClientPoint::new(100.0, 100.0));

        let top = scene.hit_test(&layout, ClientPoint::new(160.0, 155.0)).expect("hit expected");
        assert_eq!(top.key.annotation.as_str(), "n");

        let under = scene.hit_test(&layout, ClientPoint::new(145.0, 145.0)).expect("hit expected");
        assert_eq!(under.key.annotation.as_str(), "h");

        assert!(scene.hit_test(&layout, ClientPoint::new(10.0, 10.0)).is_none());
    }

    #[test]
    fn patches_serialize_with_op_tag() {
        let patch = OverlayPatch::Remove {
            page_index: 3,
            key: NodeKey::new(AnnotationId::from("x"), 1),
        };
        let json = serde_json::to_value(&patch).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "op": "remove",
                "pageIndex": 3,
                "key": { "annotation": "x", "occurrence": 0, "part": 1 },
            })
        );
    }

    #[test]
    fn reset_removes_everything() {
        let fixture = Fixture { notes: vec![note("n", 0)], ..Default::default() };
        let mut reconciler = Reconciler::new();
        reconciler.reconcile(&fixture, 1.0, &layouts(&[0]), 1);

        assert_eq!(reconciler.reset().len(), 1);
        assert_eq!(reconciler.scene().node_count(), 0);
    }
}
