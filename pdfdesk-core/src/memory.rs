//! A document engine that keeps pages as plain data.
//!
//! Pages carry positioned text runs and annotations; files are written as
//! JSON. It backs the unit tests and lets tools exercise the core without a
//! native PDF library.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::{
    AnnotationId, AnnotationInfo, AnnotationKind, AnnotationMetadata, AnnotationSpec,
    DocumentEngine, PdfBackend, RenderImage, SaveMode, TextHit, BLANK_PAGE_SIZE,
};
use crate::geometry::{Color, Rect, Rotation};

const LINE_HEIGHT: f32 = 12.0;
const CHAR_WIDTH: f32 = 6.0;
const NOTE_ICON_SIZE: f32 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub rect: Rect,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryAnnotation {
    pub info: AnnotationInfo,
    pub color: Option<Color>,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPage {
    pub rect: Rect,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default)]
    pub runs: Vec<TextRun>,
    #[serde(default)]
    pub annotations: Vec<MemoryAnnotation>,
    /// Makes every search on this page fail, for exercising error paths.
    #[serde(default)]
    pub fail_search: bool,
}

impl MemoryPage {
    pub fn blank() -> Self {
        Self {
            rect: Rect::from_origin_size(0.0, 0.0, BLANK_PAGE_SIZE.width, BLANK_PAGE_SIZE.height),
            rotation: Rotation::NONE,
            runs: Vec::new(),
            annotations: Vec::new(),
            fail_search: false,
        }
    }

    /// A blank page with one text run per line, laid out top to bottom in a
    /// fixed-width grid starting at (72, 72).
    pub fn with_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut page = Self::blank();
        for (i, line) in lines.iter().enumerate() {
            let text = line.as_ref();
            let y = 72.0 + i as f32 * (LINE_HEIGHT + 2.0);
            page.runs.push(TextRun {
                rect: Rect::from_origin_size(
                    72.0,
                    y,
                    text.chars().count() as f32 * CHAR_WIDTH,
                    LINE_HEIGHT,
                ),
                text: text.to_string(),
            });
        }
        page
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn text(&self) -> String {
        self.runs
            .iter()
            .map(|run| run.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn find(&self, query: &str) -> Vec<TextHit> {
        let needle: Vec<char> = query.to_lowercase().chars().collect();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits = Vec::new();
        for run in &self.runs {
            let original: Vec<char> = run.text.chars().collect();
            let haystack: Vec<char> = run.text.to_lowercase().chars().collect();
            if haystack.len() < needle.len() {
                continue;
            }
            let char_width = run.rect.width() / haystack.len().max(1) as f32;
            let mut start = 0;
            while start + needle.len() <= haystack.len() {
                if haystack[start..start + needle.len()] == needle[..] {
                    let end = start + needle.len();
                    let x0 = run.rect.x0 + start as f32 * char_width;
                    // Lowercasing can change the char count; then positions
                    // no longer line up with the original text.
                    let text = if original.len() == haystack.len() {
                        original[start..end].iter().collect()
                    } else {
                        query.to_string()
                    };
                    hits.push(TextHit {
                        rect: Rect::new(
                            x0,
                            run.rect.y0,
                            x0 + needle.len() as f32 * char_width,
                            run.rect.y1,
                        ),
                        text,
                    });
                    start = end;
                } else {
                    start += 1;
                }
            }
        }
        hits
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDocument {
    pub pages: Vec<MemoryPage>,
    #[serde(default)]
    pub next_annotation_id: u64,
    /// When false, `apply_redaction` fails like an engine without a
    /// redaction primitive.
    #[serde(default = "default_true")]
    pub redaction_supported: bool,
}

fn default_true() -> bool {
    true
}

impl MemoryDocument {
    pub fn new(pages: Vec<MemoryPage>) -> Self {
        Self {
            pages,
            next_annotation_id: 1,
            redaction_supported: true,
        }
    }

    /// `count` pages whose only text is "Page N".
    pub fn with_pages(count: usize) -> Self {
        Self::new(
            (1..=count)
                .map(|n| MemoryPage::with_lines(&[format!("Page {n}")]))
                .collect(),
        )
    }

    pub fn without_redaction(mut self) -> Self {
        self.redaction_supported = false;
        self
    }

    fn page(&self, index: usize) -> Result<&MemoryPage> {
        self.pages
            .get(index)
            .ok_or_else(|| anyhow!("page {} out of range", index))
    }

    fn page_mut(&mut self, index: usize) -> Result<&mut MemoryPage> {
        self.pages
            .get_mut(index)
            .ok_or_else(|| anyhow!("page {} out of range", index))
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        let payload = serde_json::to_string_pretty(self)?;
        fs::write(path, payload).with_context(|| format!("failed to write {:?}", path))?;
        Ok(())
    }
}

/// Opens documents registered with [`MemoryEngine::insert`] or previously
/// written to disk by a memory backend. Files on disk take precedence.
#[derive(Default)]
pub struct MemoryEngine {
    registered: Mutex<HashMap<PathBuf, MemoryDocument>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, document: MemoryDocument) {
        self.registered.lock().insert(path.into(), document);
    }
}

impl DocumentEngine for MemoryEngine {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfBackend>> {
        let document = if path.is_file() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {:?}", path))?;
            serde_json::from_str(&raw).with_context(|| format!("{:?} is not a document", path))?
        } else {
            self.registered
                .lock()
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow!("no such file: {:?}", path))?
        };
        Ok(Box::new(MemoryBackend { document }))
    }

    fn create(&self) -> Result<Box<dyn PdfBackend>> {
        Ok(Box::new(MemoryBackend {
            document: MemoryDocument::new(vec![MemoryPage::blank()]),
        }))
    }
}

pub struct MemoryBackend {
    document: MemoryDocument,
}

impl MemoryBackend {
    pub fn document(&self) -> &MemoryDocument {
        &self.document
    }
}

impl PdfBackend for MemoryBackend {
    fn page_count(&self) -> usize {
        self.document.pages.len()
    }

    fn page_rect(&self, index: usize) -> Result<Rect> {
        Ok(self.document.page(index)?.rect)
    }

    fn rotation(&self, index: usize) -> Result<Rotation> {
        Ok(self.document.page(index)?.rotation)
    }

    fn set_rotation(&mut self, index: usize, rotation: Rotation) -> Result<()> {
        self.document.page_mut(index)?.rotation = rotation;
        Ok(())
    }

    fn render_page(&self, index: usize, zoom: f32) -> Result<RenderImage> {
        let page = self.document.page(index)?;
        let mut width = (page.rect.width() * zoom).round().max(1.0) as u32;
        let mut height = (page.rect.height() * zoom).round().max(1.0) as u32;
        let quarter_turn = page.rotation.degrees() % 180 == 90;
        if quarter_turn {
            std::mem::swap(&mut width, &mut height);
        }

        let stride = width * 3;
        let mut pixels = vec![255u8; (stride * height) as usize];
        if !quarter_turn {
            let mut paint = |rect: Rect, rgb: [u8; 3]| {
                let r = rect.normalized();
                let x0 = (r.x0 * zoom).max(0.0) as u32;
                let y0 = (r.y0 * zoom).max(0.0) as u32;
                let x1 = ((r.x1 * zoom).ceil() as u32).min(width);
                let y1 = ((r.y1 * zoom).ceil() as u32).min(height);
                for y in y0..y1 {
                    for x in x0..x1 {
                        let offset = (y * stride + x * 3) as usize;
                        pixels[offset..offset + 3].copy_from_slice(&rgb);
                    }
                }
            };
            for run in &page.runs {
                paint(run.rect, [0, 0, 0]);
            }
            for annotation in &page.annotations {
                if let Some(color) = annotation.color {
                    paint(annotation.info.rect, color.to_rgb8());
                }
            }
        }

        Ok(RenderImage {
            width,
            height,
            stride,
            pixels,
        })
    }

    fn text_blocks(&self, index: usize) -> Result<Vec<Rect>> {
        Ok(self.document.page(index)?.runs.iter().map(|run| run.rect).collect())
    }

    fn page_text(&self, index: usize) -> Result<String> {
        Ok(self.document.page(index)?.text())
    }

    fn text_in_rect(&self, index: usize, rect: Rect) -> Result<String> {
        let page = self.document.page(index)?;
        Ok(page
            .runs
            .iter()
            .filter(|run| run.rect.intersects(&rect))
            .map(|run| run.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn search_page(&self, index: usize, query: &str) -> Result<Vec<TextHit>> {
        let page = self.document.page(index)?;
        if page.fail_search {
            bail!("text layer of page {} is unreadable", index);
        }
        Ok(page.find(query))
    }

    fn annotations(&self, index: usize) -> Result<Vec<AnnotationInfo>> {
        Ok(self
            .document
            .page(index)?
            .annotations
            .iter()
            .map(|annotation| annotation.info.clone())
            .collect())
    }

    fn add_annotation(&mut self, index: usize, spec: &AnnotationSpec) -> Result<AnnotationId> {
        let (rect, color, opacity, contents) = match spec {
            AnnotationSpec::Markup {
                rect,
                color,
                opacity,
                ..
            } => (*rect, Some(*color), *opacity, None),
            AnnotationSpec::Note {
                at,
                text,
                color,
                opacity,
                ..
            } => (
                Rect::from_origin_size(at.x, at.y, NOTE_ICON_SIZE, NOTE_ICON_SIZE),
                Some(*color),
                *opacity,
                Some(text.clone()),
            ),
            AnnotationSpec::FreeText {
                rect,
                text,
                background,
                ..
            } => (*rect, Some(*background), 1.0, Some(text.clone())),
            AnnotationSpec::Square {
                rect,
                stroke,
                fill,
                opacity,
            } => (*rect, fill.or(*stroke), *opacity, None),
        };
        if !rect.is_finite() {
            bail!("annotation rectangle is not finite");
        }

        let id = AnnotationId(self.document.next_annotation_id.max(1));
        self.document.next_annotation_id = id.0 + 1;
        let page = self.document.page_mut(index)?;
        page.annotations.push(MemoryAnnotation {
            info: AnnotationInfo {
                id,
                kind: spec.kind(),
                rect: rect.normalized(),
                metadata: AnnotationMetadata {
                    contents,
                    ..AnnotationMetadata::default()
                },
            },
            color,
            opacity,
        });
        Ok(id)
    }

    fn delete_annotation(&mut self, index: usize, id: AnnotationId) -> Result<()> {
        let page = self.document.page_mut(index)?;
        let position = page
            .annotations
            .iter()
            .position(|annotation| annotation.info.id == id)
            .ok_or_else(|| anyhow!("annotation {} not found on page {}", id, index))?;
        page.annotations.remove(position);
        Ok(())
    }

    fn apply_redaction(&mut self, index: usize, rect: Rect, fill: Color) -> Result<()> {
        if !self.document.redaction_supported {
            bail!("redaction is not supported by this document");
        }
        let id = AnnotationId(self.document.next_annotation_id.max(1));
        self.document.next_annotation_id = id.0 + 1;
        let page = self.document.page_mut(index)?;
        page.runs.retain(|run| !run.rect.intersects(&rect));
        page.annotations.push(MemoryAnnotation {
            info: AnnotationInfo {
                id,
                kind: AnnotationKind::Redaction,
                rect: rect.normalized(),
                metadata: AnnotationMetadata::default(),
            },
            color: Some(fill),
            opacity: 1.0,
        });
        Ok(())
    }

    fn delete_page(&mut self, index: usize) -> Result<()> {
        self.document.page(index)?;
        self.document.pages.remove(index);
        Ok(())
    }

    fn insert_page(&mut self, position: Option<usize>) -> Result<()> {
        let position = position.unwrap_or(self.document.pages.len());
        if position > self.document.pages.len() {
            bail!("insert position {} out of range", position);
        }
        self.document.pages.insert(position, MemoryPage::blank());
        Ok(())
    }

    fn save(&mut self, path: &Path, _mode: SaveMode) -> Result<()> {
        self.document.write_to(path)
    }

    fn export_pages(&self, indices: &[usize], path: &Path) -> Result<()> {
        let pages = indices
            .iter()
            .map(|&index| self.document.page(index).cloned())
            .collect::<Result<Vec<_>>>()?;
        let mut exported = MemoryDocument::new(pages);
        exported.next_annotation_id = self.document.next_annotation_id;
        exported.redaction_supported = self.document.redaction_supported;
        exported.write_to(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::backend::MarkupKind;

    fn backend(document: MemoryDocument) -> MemoryBackend {
        MemoryBackend { document }
    }

    #[test]
    fn search_is_case_insensitive_and_positions_hits() {
        let page = MemoryPage::with_lines(&["Lorem ipsum LOREM", "nothing here"]);
        let backend = backend(MemoryDocument::new(vec![page]));
        let hits = backend.search_page(0, "lorem").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].rect, Rect::new(72.0, 72.0, 102.0, 84.0));
        assert_eq!(hits[0].text, "Lorem");
        assert_eq!(hits[1].rect.x0, 72.0 + 12.0 * CHAR_WIDTH);
        assert_eq!(hits[1].text, "LOREM");
        assert!(backend.search_page(0, "absent").unwrap().is_empty());
    }

    #[test]
    fn failing_page_reports_error() {
        let page = MemoryPage::with_lines(&["text"]).failing_search();
        let backend = backend(MemoryDocument::new(vec![page]));
        assert!(backend.search_page(0, "text").is_err());
    }

    #[test]
    fn annotation_ids_are_unique_across_pages() {
        let mut backend = backend(MemoryDocument::with_pages(2));
        let spec = AnnotationSpec::Markup {
            kind: MarkupKind::Underline,
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            color: Color::BLUE,
            opacity: 1.0,
        };
        let a = backend.add_annotation(0, &spec).unwrap();
        let b = backend.add_annotation(1, &spec).unwrap();
        assert_ne!(a, b);
        backend.delete_annotation(0, a).unwrap();
        assert!(backend.delete_annotation(0, a).is_err());
        assert_eq!(backend.annotations(1).unwrap()[0].kind, AnnotationKind::Underline);
    }

    #[test]
    fn redaction_drops_text_under_rect() {
        let page = MemoryPage::with_lines(&["secret", "public"]);
        let mut backend = backend(MemoryDocument::new(vec![page]));
        backend
            .apply_redaction(0, Rect::new(70.0, 70.0, 200.0, 80.0), Color::BLACK)
            .unwrap();
        assert_eq!(backend.page_text(0).unwrap(), "public");

        let mut unsupported = super::MemoryBackend {
            document: MemoryDocument::with_pages(1).without_redaction(),
        };
        assert!(unsupported
            .apply_redaction(0, Rect::new(0.0, 0.0, 10.0, 10.0), Color::BLACK)
            .is_err());
    }

    #[test]
    fn saved_file_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        let mut backend = backend(MemoryDocument::with_pages(3));
        backend.set_rotation(1, Rotation::from_degrees(90).unwrap()).unwrap();
        backend.save(&path, SaveMode::Full).unwrap();

        let reopened = MemoryEngine::new().open(&path).unwrap();
        assert_eq!(reopened.page_count(), 3);
        assert_eq!(reopened.rotation(1).unwrap().degrees(), 90);
    }

    #[test]
    fn open_unknown_path_fails() {
        let engine = MemoryEngine::new();
        assert!(engine.open(Path::new("/definitely/not/here.pdf")).is_err());
    }
}
