//! The boundary to the PDF rendering/mutation library.
//!
//! The core never parses PDF itself. Everything it needs from an engine is
//! expressed by [`DocumentEngine`] (opening files) and [`PdfBackend`] (one
//! opened document). Page indices are 0-based throughout.

use std::fmt;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::geometry::{Color, Point, Rect, Rotation, Size};

/// Default size of a page inserted into a document (ISO A4 in points).
pub const BLANK_PAGE_SIZE: Size = Size::new(595.0, 842.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(pub u64);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transient handle to an annotation living inside the document.
///
/// Valid only while the document that produced it stays loaded and its page
/// is not deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnnotationRef {
    pub page: usize,
    pub id: AnnotationId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Highlight,
    Underline,
    Strikeout,
    Note,
    FreeText,
    Redaction,
    Square,
    Other,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::Highlight => "highlight",
            AnnotationKind::Underline => "underline",
            AnnotationKind::Strikeout => "strikeout",
            AnnotationKind::Note => "note",
            AnnotationKind::FreeText => "free_text",
            AnnotationKind::Redaction => "redaction",
            AnnotationKind::Square => "square",
            AnnotationKind::Other => "other",
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text-markup annotations that share the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkupKind {
    Highlight,
    Underline,
    Strikeout,
}

impl From<MarkupKind> for AnnotationKind {
    fn from(kind: MarkupKind) -> Self {
        match kind {
            MarkupKind::Highlight => AnnotationKind::Highlight,
            MarkupKind::Underline => AnnotationKind::Underline,
            MarkupKind::Strikeout => AnnotationKind::Strikeout,
        }
    }
}

/// Everything an engine needs to commit one new annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnnotationSpec {
    Markup {
        kind: MarkupKind,
        rect: Rect,
        color: Color,
        opacity: f32,
    },
    Note {
        at: Point,
        text: String,
        icon: String,
        color: Color,
        opacity: f32,
    },
    FreeText {
        rect: Rect,
        text: String,
        font_size: f32,
        text_color: Color,
        background: Color,
        border_width: f32,
    },
    Square {
        rect: Rect,
        stroke: Option<Color>,
        fill: Option<Color>,
        opacity: f32,
    },
}

impl AnnotationSpec {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            AnnotationSpec::Markup { kind, .. } => (*kind).into(),
            AnnotationSpec::Note { .. } => AnnotationKind::Note,
            AnnotationSpec::FreeText { .. } => AnnotationKind::FreeText,
            AnnotationSpec::Square { .. } => AnnotationKind::Square,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationMetadata {
    pub contents: Option<String>,
    pub author: Option<String>,
    pub modified: Option<String>,
}

/// Read-only view of one annotation as returned by [`PdfBackend::annotations`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationInfo {
    pub id: AnnotationId,
    pub kind: AnnotationKind,
    pub rect: Rect,
    pub metadata: AnnotationMetadata,
}

/// One occurrence of a search query: where it is and the text as it
/// appears on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextHit {
    pub rect: Rect,
    pub text: String,
}

/// RGB8 pixel buffer of one rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    pub fn size(&self) -> Size {
        Size::new(self.width as f32, self.height as f32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Append changes to the existing file, keeping its encryption.
    Incremental,
    /// Write a rebuilt, garbage-collected and compressed copy.
    Full,
}

pub trait DocumentEngine {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfBackend>>;

    /// A new document with a single blank page and no file behind it.
    fn create(&self) -> Result<Box<dyn PdfBackend>>;
}

/// One opened document.
///
/// `annotations` returns a materialized snapshot in the engine's traversal
/// order, so callers may delete while iterating the returned list.
pub trait PdfBackend {
    fn page_count(&self) -> usize;
    fn page_rect(&self, index: usize) -> Result<Rect>;
    fn rotation(&self, index: usize) -> Result<Rotation>;
    fn set_rotation(&mut self, index: usize, rotation: Rotation) -> Result<()>;

    /// Rasterizes a page at `zoom` with annotations composited in.
    fn render_page(&self, index: usize, zoom: f32) -> Result<RenderImage>;

    fn text_blocks(&self, index: usize) -> Result<Vec<Rect>>;
    fn page_text(&self, index: usize) -> Result<String>;
    fn text_in_rect(&self, index: usize, rect: Rect) -> Result<String>;

    /// Every occurrence of `query`, in the order the engine reports them.
    fn search_page(&self, index: usize, query: &str) -> Result<Vec<TextHit>>;

    fn annotations(&self, index: usize) -> Result<Vec<AnnotationInfo>>;
    fn add_annotation(&mut self, index: usize, spec: &AnnotationSpec) -> Result<AnnotationId>;
    fn delete_annotation(&mut self, index: usize, id: AnnotationId) -> Result<()>;

    /// Permanently removes the content under `rect`. Engines without a
    /// redaction primitive return an error.
    fn apply_redaction(&mut self, index: usize, rect: Rect, fill: Color) -> Result<()>;

    fn delete_page(&mut self, index: usize) -> Result<()>;

    /// Inserts a blank page at `position`, or appends when `None`.
    fn insert_page(&mut self, position: Option<usize>) -> Result<()>;

    fn save(&mut self, path: &Path, mode: SaveMode) -> Result<()>;

    /// Writes a new document made of copies of `indices` (already validated,
    /// ascending) to `path`.
    fn export_pages(&self, indices: &[usize], path: &Path) -> Result<()>;
}
