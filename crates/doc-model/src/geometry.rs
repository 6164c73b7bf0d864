//! Coordinate spaces and the mapping between them.
//!
//! Three spaces are involved when an annotation travels from a pointer event
//! to storage and back onto the screen:
//!
//! - **client space**: viewport pixels as reported by pointer events and
//!   text-selection rectangles,
//! - **page space**: offsets from the page's top-left corner with the zoom
//!   scale divided out; this is the only space that is ever persisted,
//! - **screen space**: CSS pixels relative to the page container at the
//!   current scale.

use serde::{Deserialize, Serialize};

/// Rectangle in viewport (client) pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClientRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ClientRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

/// Point in viewport (client) pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientPoint {
    pub x: f64,
    pub y: f64,
}

impl ClientPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rectangle in zoom-independent page space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PageRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

/// Point in zoom-independent page space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PagePoint {
    pub x: f64,
    pub y: f64,
}

impl PagePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rectangle in CSS pixels relative to the page container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// Convert a client rectangle into page space.
///
/// Subtracts the page container's client origin, then divides every field by
/// `scale`. `scale` is expected to be positive; no validation happens here.
pub fn to_page_space(client: ClientRect, page_origin: ClientPoint, scale: f64) -> PageRect {
    PageRect {
        x: (client.x - page_origin.x) / scale,
        y: (client.y - page_origin.y) / scale,
        width: client.width / scale,
        height: client.height / scale,
    }
}

/// Convert a stored page rectangle into screen space at `scale`.
pub fn to_screen_space(rect: PageRect, scale: f64) -> ScreenRect {
    ScreenRect {
        x: rect.x * scale,
        y: rect.y * scale,
        width: rect.width * scale,
        height: rect.height * scale,
    }
}

pub fn point_to_page_space(point: ClientPoint, page_origin: ClientPoint, scale: f64) -> PagePoint {
    PagePoint { x: (point.x - page_origin.x) / scale, y: (point.y - page_origin.y) / scale }
}

pub fn point_to_screen_space(point: PagePoint, scale: f64) -> (f64, f64) {
    (point.x * scale, point.y * scale)
}

/// Map every fragment of a text selection into page space, keeping order.
///
/// Callers pass only fragments that belong to a single page.
pub fn selection_to_page_rects(
    client_rects: &[ClientRect],
    page_origin: ClientPoint,
    scale: f64,
) -> Vec<PageRect> {
    client_rects.iter().map(|rect| to_page_space(*rect, page_origin, scale)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: PageRect, b: PageRect) {
        let eps = 1e-9;
        assert!((a.x - b.x).abs() < eps, "x: {a:?} vs {b:?}");
        assert!((a.y - b.y).abs() < eps, "y: {a:?} vs {b:?}");
        assert!((a.width - b.width).abs() < eps, "width: {a:?} vs {b:?}");
        assert!((a.height - b.height).abs() < eps, "height: {a:?} vs {b:?}");
    }

    #[test]
    fn page_space_subtracts_origin_then_divides_by_scale() {
        let client = ClientRect::new(140.0, 260.0, 200.0, 30.0);
        let origin = ClientPoint::new(100.0, 200.0);

        let page = to_page_space(client, origin, 2.0);
        assert_eq!(page, PageRect::new(20.0, 30.0, 100.0, 15.0));
    }

    #[test]
    fn screen_space_scales_every_field() {
        let rect = PageRect::new(10.0, 20.0, 100.0, 15.0);
        assert_eq!(to_screen_space(rect, 2.0), ScreenRect::new(20.0, 40.0, 200.0, 30.0));
    }

    #[test]
    fn screen_then_page_space_recovers_the_stored_rect() {
        let stored = PageRect::new(12.5, 301.25, 88.0, 14.75);
        let origin = ClientPoint::default();

        for scale in [0.25, 0.5, 0.75, 1.0, 1.1, 1.333, 2.0, 3.7, 16.0] {
            let screen = to_screen_space(stored, scale);
            let back = to_page_space(
                ClientRect::new(screen.x, screen.y, screen.width, screen.height),
                origin,
                scale,
            );
            assert_close(back, stored);
        }
    }

    #[test]
    fn same_visual_selection_is_stable_across_zoom() {
        let origin = ClientPoint::new(50.0, 80.0);
        let at_one = to_page_space(ClientRect::new(60.0, 100.0, 40.0, 10.0), origin, 1.0);
        let at_two = to_page_space(ClientRect::new(70.0, 120.0, 80.0, 20.0), origin, 2.0);

        assert_close(at_one, at_two);
    }

    #[test]
    fn zero_size_rects_pass_through() {
        let page = to_page_space(ClientRect::new(5.0, 5.0, 0.0, 0.0), ClientPoint::default(), 1.0);
        assert_eq!(page.width, 0.0);
        assert_eq!(page.height, 0.0);
    }

    #[test]
    fn selection_fragments_keep_their_order() {
        let fragments = [
            ClientRect::new(10.0, 10.0, 50.0, 12.0),
            ClientRect::new(10.0, 24.0, 80.0, 12.0),
            ClientRect::new(10.0, 38.0, 20.0, 12.0),
        ];

        let rects = selection_to_page_rects(&fragments, ClientPoint::new(10.0, 10.0), 2.0);
        assert_eq!(
            rects,
            vec![
                PageRect::new(0.0, 0.0, 25.0, 6.0),
                PageRect::new(0.0, 7.0, 40.0, 6.0),
                PageRect::new(0.0, 14.0, 10.0, 6.0),
            ]
        );
    }

    #[test]
    fn point_mapping_matches_rect_mapping() {
        let origin = ClientPoint::new(100.0, 100.0);
        let page = point_to_page_space(ClientPoint::new(160.0, 130.0), origin, 1.5);
        assert_eq!(page, PagePoint::new(40.0, 20.0));
        assert_eq!(point_to_screen_space(page, 1.5), (60.0, 30.0));
    }
}
