//! Annotation records as they live in memory and in storage.
//!
//! Field names are camelCase on the wire so previously stored collections
//! load without a migration step.

use crate::geometry::{PagePoint, PageRect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque annotation identifier: `<epoch-ms>-<random suffix>`.
///
/// Uniqueness is probabilistic; nothing checks for collisions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(String);

impl AnnotationId {
    pub fn generate() -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", crate::now_millis(), &suffix[..9]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AnnotationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for AnnotationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed five-color palette shared by highlights and sticky notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationColor {
    #[default]
    Yellow,
    Green,
    Blue,
    Pink,
    Orange,
}

impl AnnotationColor {
    pub const ALL: [AnnotationColor; 5] = [
        AnnotationColor::Yellow,
        AnnotationColor::Green,
        AnnotationColor::Blue,
        AnnotationColor::Pink,
        AnnotationColor::Orange,
    ];

    /// RGBA with the translucent alpha used for overlays.
    pub fn rgba(self) -> [u8; 4] {
        match self {
            Self::Yellow => [255, 235, 59, 102],
            Self::Green => [129, 199, 132, 102],
            Self::Blue => [100, 181, 246, 102],
            Self::Pink => [240, 98, 146, 102],
            Self::Orange => [255, 183, 77, 102],
        }
    }

    pub fn hex(self) -> &'static str {
        match self {
            Self::Yellow => "#ffeb3b",
            Self::Green => "#81c784",
            Self::Blue => "#64b5f6",
            Self::Pink => "#f06292",
            Self::Orange => "#ffb74d",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Pink => "pink",
            Self::Orange => "orange",
        }
    }
}

impl fmt::Display for AnnotationColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for AnnotationColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|color| color.name() == lowered || color.hex() == lowered)
            .ok_or_else(|| {
                format!("unknown color '{s}' (expected one of yellow, green, blue, pink, orange)")
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnnotationKind {
    Highlight,
    StickyNote,
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Highlight => f.write_str("highlight"),
            Self::StickyNote => f.write_str("sticky note"),
        }
    }
}

/// Colored overlay bound to the rectangles of a text selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub id: AnnotationId,
    pub page_index: u32,
    /// One rect per selected line fragment, in page space.
    pub rects: Vec<PageRect>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub color: AnnotationColor,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Free-floating note anchored to a page point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickyNote {
    pub id: AnnotationId,
    pub page_index: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub color: AnnotationColor,
    #[serde(default)]
    pub minimized: bool,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl StickyNote {
    pub fn anchor(&self) -> PagePoint {
        PagePoint::new(self.x, self.y)
    }

    pub fn rect(&self) -> PageRect {
        PageRect::new(self.x, self.y, self.width, self.height)
    }
}

/// Creation request; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub enum NewAnnotation {
    Highlight {
        page_index: u32,
        rects: Vec<PageRect>,
        content: String,
        note: Option<String>,
        color: AnnotationColor,
    },
    StickyNote {
        page_index: u32,
        position: PagePoint,
        width: f64,
        height: f64,
        content: String,
        color: AnnotationColor,
    },
}

impl NewAnnotation {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::Highlight { .. } => AnnotationKind::Highlight,
            Self::StickyNote { .. } => AnnotationKind::StickyNote,
        }
    }

    pub fn page_index(&self) -> u32 {
        match self {
            Self::Highlight { page_index, .. } | Self::StickyNote { page_index, .. } => {
                *page_index
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighlightPatch {
    /// `Some(None)` clears the note.
    pub note: Option<Option<String>>,
    pub color: Option<AnnotationColor>,
    pub content: Option<String>,
}

impl HighlightPatch {
    pub fn is_empty(&self) -> bool {
        self.note.is_none() && self.color.is_none() && self.content.is_none()
    }

    pub fn apply(self, highlight: &mut Highlight) {
        if let Some(note) = self.note {
            highlight.note = note.filter(|text| !text.is_empty());
        }
        if let Some(color) = self.color {
            highlight.color = color;
        }
        if let Some(content) = self.content {
            highlight.content = content;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StickyNotePatch {
    pub position: Option<PagePoint>,
    pub size: Option<(f64, f64)>,
    pub content: Option<String>,
    pub color: Option<AnnotationColor>,
    pub minimized: Option<bool>,
}

impl StickyNotePatch {
    pub fn is_empty(&self) -> bool {
        self.position.is_none()
            && self.size.is_none()
            && self.content.is_none()
            && self.color.is_none()
            && self.minimized.is_none()
    }

    pub fn apply(self, note: &mut StickyNote) {
        if let Some(position) = self.position {
            note.x = position.x;
            note.y = position.y;
        }
        if let Some((width, height)) = self.size {
            note.width = width;
            note.height = height;
        }
        if let Some(content) = self.content {
            note.content = content;
        }
        if let Some(color) = self.color {
            note.color = color;
        }
        if let Some(minimized) = self.minimized {
            note.minimized = minimized;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationPatch {
    Highlight(HighlightPatch),
    StickyNote(StickyNotePatch),
}

impl AnnotationPatch {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::Highlight(_) => AnnotationKind::Highlight,
            Self::StickyNote(_) => AnnotationKind::StickyNote,
        }
    }
}

/// What to do with annotations whose page index falls outside the loaded
/// document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageRangePolicy {
    /// Keep them stored; they are never rendered while out of range.
    #[default]
    Preserve,
    /// Delete them.
    Drop,
    /// Move them to the last page.
    Clamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDisposition {
    Keep,
    Remove,
    MoveTo(u32),
}

impl PageRangePolicy {
    pub fn resolve(self, page_index: u32, page_count: u32) -> PageDisposition {
        if page_index < page_count {
            return PageDisposition::Keep;
        }

        match self {
            Self::Preserve => PageDisposition::Keep,
            Self::Drop => PageDisposition::Remove,
            Self::Clamp if page_count == 0 => PageDisposition::Keep,
            Self::Clamp => PageDisposition::MoveTo(page_count - 1),
        }
    }
}
