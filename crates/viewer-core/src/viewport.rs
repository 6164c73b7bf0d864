use crate::overlay::PageLayout;
use doc_model::ClientPoint;
use std::ops::Range;

pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 16.0;

/// Continuous vertical layout of the document inside the scroll container.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    pub viewport_height_px: f64,
    pub scroll_offset_px: f64,
    pub scale: f64,
    /// Unscaled page heights, one per page.
    pub page_heights_pt: Vec<f64>,
    pub page_spacing_px: f64,
    /// Client position of the scroll container's top-left corner.
    pub origin: ClientPoint,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            viewport_height_px: 800.0,
            scroll_offset_px: 0.0,
            scale: 1.0,
            page_heights_pt: vec![792.0],
            page_spacing_px: 16.0,
            origin: ClientPoint::default(),
        }
    }
}

impl ViewportState {
    pub fn page_count(&self) -> u32 {
        self.page_heights_pt.len() as u32
    }
}

pub fn clamp_scale(scale: f64) -> f64 {
    if !scale.is_finite() {
        return 1.0;
    }
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

pub fn fit_width_scale(viewport_width_px: f64, page_width_pt: f64) -> f64 {
    if viewport_width_px <= 0.0 || page_width_pt <= 0.0 {
        return 1.0;
    }

    clamp_scale(viewport_width_px / page_width_pt)
}

/// Pages intersecting the viewport, half-open.
pub fn visible_pages(state: &ViewportState) -> Range<u32> {
    if state.page_heights_pt.is_empty() {
        return 0..0;
    }

    let start = page_at_offset(state.scroll_offset_px.max(0.0), state);
    let end = page_at_offset((state.scroll_offset_px + state.viewport_height_px).max(0.0), state);

    start..end + 1
}

pub fn current_page_from_viewport(state: &ViewportState) -> u32 {
    if state.page_heights_pt.is_empty() {
        return 0;
    }

    let center_offset = (state.scroll_offset_px + state.viewport_height_px / 2.0).max(0.0);
    page_at_offset(center_offset, state)
}

/// Client origins of every visible page, ready for the reconciler.
pub fn page_layouts(state: &ViewportState) -> Vec<PageLayout> {
    visible_pages(state)
        .map(|page_index| {
            let top = page_start_offset(page_index, state) - state.scroll_offset_px;
            PageLayout::new(page_index, ClientPoint::new(state.origin.x, state.origin.y + top))
        })
        .collect()
}

/// Keep `page_index` at the top of the viewport after a zoom change.
pub fn rescale_preserving_page(state: &mut ViewportState, scale: f64, page_index: u32) {
    state.scale = clamp_scale(scale);

    if state.page_heights_pt.is_empty() {
        state.scroll_offset_px = 0.0;
        return;
    }

    let target_page = page_index.min(state.page_count().saturating_sub(1));
    state.scroll_offset_px = page_start_offset(target_page, state);
}

fn page_at_offset(offset: f64, state: &ViewportState) -> u32 {
    let mut cursor = 0.0;

    for (index, page_height) in state.page_heights_pt.iter().enumerate() {
        let page_end = cursor + page_height * state.scale;
        if offset <= page_end {
            return index as u32;
        }

        cursor = page_end + state.page_spacing_px;
    }

    state.page_heights_pt.len().saturating_sub(1) as u32
}

fn page_start_offset(page_index: u32, state: &ViewportState) -> f64 {
    let mut cursor = 0.0;

    for (index, page_height) in state.page_heights_pt.iter().enumerate() {
        if index as u32 == page_index {
            return cursor;
        }
        cursor += page_height * state.scale + state.page_spacing_px;
    }

    cursor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_pages() -> ViewportState {
        ViewportState {
            viewport_height_px: 900.0,
            scroll_offset_px: 1100.0,
            page_heights_pt: vec![1000.0, 1000.0, 1000.0],
            page_spacing_px: 100.0,
            ..ViewportState::default()
        }
    }

    #[test]
    fn fit_width_respects_expected_scale() {
        assert_eq!(fit_width_scale(1000.0, 500.0), 2.0);
        assert_eq!(fit_width_scale(100_000.0, 100.0), MAX_SCALE);
        assert_eq!(fit_width_scale(0.0, 100.0), 1.0);
    }

    #[test]
    fn visible_range_tracks_scroll_window() {
        let state = three_pages();
        assert_eq!(visible_pages(&state), 1..2);

        let shifted = ViewportState { scroll_offset_px: 1500.0, ..state };
        assert_eq!(visible_pages(&shifted), 1..3);
    }

    #[test]
    fn visible_range_accounts_for_zoom() {
        let state = ViewportState { scale: 0.5, scroll_offset_px: 0.0, ..three_pages() };
        // Pages are 500px tall at half zoom, so the 900px window reaches page 1.
        assert_eq!(visible_pages(&state), 0..2);
    }

    #[test]
    fn empty_document_has_no_visible_pages() {
        let state = ViewportState { page_heights_pt: Vec::new(), ..ViewportState::default() };
        assert!(visible_pages(&state).is_empty());
        assert!(page_layouts(&state).is_empty());
    }

    #[test]
    fn current_page_uses_viewport_center() {
        let state = ViewportState {
            viewport_height_px: 1000.0,
            scroll_offset_px: 1200.0,
            ..three_pages()
        };

        assert_eq!(current_page_from_viewport(&state), 1);
    }

    #[test]
    fn layouts_place_pages_relative_to_scroll() {
        let state = ViewportState {
            scroll_offset_px: 1500.0,
            origin: ClientPoint::new(20.0, 60.0),
            ..three_pages()
        };

        let layouts = page_layouts(&state);
        assert_eq!(
            layouts,
            vec![
                PageLayout::new(1, ClientPoint::new(20.0, 60.0 + 1100.0 - 1500.0)),
                PageLayout::new(2, ClientPoint::new(20.0, 60.0 + 2200.0 - 1500.0)),
            ]
        );
    }

    #[test]
    fn rescale_keeps_requested_page_at_top() {
        let mut state = three_pages();

        rescale_preserving_page(&mut state, 2.0, 2);
        assert_eq!(state.scale, 2.0);
        assert_eq!(state.scroll_offset_px, 4200.0);

        rescale_preserving_page(&mut state, 100.0, 9);
        assert_eq!(state.scale, MAX_SCALE);
    }
}
