use tracing::{debug, warn};

use crate::backend::{AnnotationInfo, AnnotationRef, AnnotationSpec, MarkupKind};
use crate::document::DocumentHandle;
use crate::error::{Error, Result};
use crate::geometry::{Color, Point, Rect};

/// Offset of a note icon from the bottom-right corner of the selection.
pub const NOTE_INSET: (f32, f32) = (20.0, 10.0);

pub const HIGHLIGHT_OPACITY: f32 = 0.4;

/// Default color and opacity for each markup kind.
pub fn markup_defaults(kind: MarkupKind) -> (Color, f32) {
    match kind {
        MarkupKind::Highlight => (Color::YELLOW, HIGHLIGHT_OPACITY),
        MarkupKind::Underline => (Color::BLUE, 1.0),
        MarkupKind::Strikeout => (Color::RED, 1.0),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteStyle {
    pub icon: String,
    pub color: Color,
    pub opacity: f32,
}

impl Default for NoteStyle {
    fn default() -> Self {
        Self {
            icon: "Note".to_string(),
            color: Color::NOTE_ORANGE,
            opacity: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FreeTextStyle {
    pub font_size: f32,
    pub text_color: Color,
    pub background: Color,
    /// Zero or less draws no border.
    pub border_width: f32,
}

impl Default for FreeTextStyle {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            text_color: Color::BLACK,
            background: Color::PALE_YELLOW,
            border_width: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedactionOutcome {
    /// Content under the rectangle was removed from the page.
    Redacted,
    /// The engine could not redact; an opaque box now hides the content,
    /// which is still present in the file.
    Covered,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EraseTarget {
    Point(Point),
    Rect(Rect),
}

impl DocumentHandle {
    /// Annotation operations anchored on the current page.
    pub fn annotations(&mut self) -> AnnotationManager<'_> {
        AnnotationManager { doc: self }
    }
}

/// Creates, lists and deletes annotations on the current page.
///
/// Failures never propagate: they are logged and reported as `None` or a
/// zero count, leaving the document unchanged.
pub struct AnnotationManager<'a> {
    doc: &'a mut DocumentHandle,
}

impl<'a> AnnotationManager<'a> {
    pub fn page(&self) -> usize {
        self.doc.current_page()
    }

    pub fn add_markup(
        &mut self,
        kind: MarkupKind,
        rect: Rect,
        color: Color,
        opacity: Option<f32>,
    ) -> Option<AnnotationRef> {
        let opacity = opacity.unwrap_or_else(|| markup_defaults(kind).1);
        let spec = AnnotationSpec::Markup {
            kind,
            rect: rect.normalized(),
            color,
            opacity: opacity.clamp(0.0, 1.0),
        };
        let result = self.add_on_page(self.page(), &spec);
        self.report(result)
    }

    pub fn add_highlight(&mut self, rect: Rect, color: Color, opacity: Option<f32>) -> Option<AnnotationRef> {
        self.add_markup(MarkupKind::Highlight, rect, color, opacity)
    }

    pub fn add_underline(&mut self, rect: Rect, color: Color, opacity: Option<f32>) -> Option<AnnotationRef> {
        self.add_markup(MarkupKind::Underline, rect, color, opacity)
    }

    pub fn add_strikeout(&mut self, rect: Rect, color: Color, opacity: Option<f32>) -> Option<AnnotationRef> {
        self.add_markup(MarkupKind::Strikeout, rect, color, opacity)
    }

    /// A note icon near the bottom-right corner of `rect`.
    pub fn add_note(&mut self, rect: Rect, text: &str, style: &NoteStyle) -> Option<AnnotationRef> {
        let corner = rect.normalized().bottom_right();
        let spec = AnnotationSpec::Note {
            at: Point::new(corner.x - NOTE_INSET.0, corner.y - NOTE_INSET.1),
            text: text.to_string(),
            icon: style.icon.clone(),
            color: style.color,
            opacity: style.opacity.clamp(0.0, 1.0),
        };
        let result = self.add_on_page(self.page(), &spec);
        self.report(result)
    }

    pub fn add_free_text(&mut self, rect: Rect, text: &str, style: &FreeTextStyle) -> Option<AnnotationRef> {
        let spec = AnnotationSpec::FreeText {
            rect: rect.normalized(),
            text: text.to_string(),
            font_size: style.font_size,
            text_color: style.text_color,
            background: style.background,
            border_width: style.border_width.max(0.0),
        };
        let result = self.add_on_page(self.page(), &spec);
        self.report(result)
    }

    /// Removes the content under `rect`, or covers it with an opaque `fill`
    /// box when the engine cannot redact.
    pub fn redact(&mut self, rect: Rect, fill: Color) -> Option<RedactionOutcome> {
        let page = self.page();
        let rect = rect.normalized();
        if let Err(err) = self.check_target(page, rect) {
            warn!(%err, page, "redaction rejected");
            return None;
        }
        let backend = self.doc.backend_mut()?;

        let err = match backend.apply_redaction(page, rect, fill) {
            Ok(()) => {
                debug!(page, ?rect, "content redacted");
                return Some(RedactionOutcome::Redacted);
            }
            Err(err) => err,
        };
        warn!(?err, page, "redaction unavailable, covering content instead");

        let cover = AnnotationSpec::Square {
            rect,
            stroke: Some(fill),
            fill: Some(fill),
            opacity: 1.0,
        };
        match backend.add_annotation(page, &cover) {
            Ok(_) => Some(RedactionOutcome::Covered),
            Err(err) => {
                warn!(err = %Error::annotation(format!("{err:#}")), page, "failed to cover content");
                None
            }
        }
    }

    /// Deletes every annotation whose bounds overlap `rect`.
    pub fn erase_in_rect(&mut self, rect: Rect) -> usize {
        let page = self.page();
        let targets: Vec<_> = self
            .snapshot(page)
            .into_iter()
            .filter(|info| info.rect.intersects(&rect) || rect.intersects(&info.rect))
            .collect();
        self.delete_all(page, &targets)
    }

    /// Deletes the first annotation, in page order, containing `point`.
    pub fn erase_at_point(&mut self, point: Point) -> bool {
        let page = self.page();
        let Some(target) = self
            .snapshot(page)
            .into_iter()
            .find(|info| info.rect.contains_point(point))
        else {
            return false;
        };
        self.delete_all(page, std::slice::from_ref(&target)) == 1
    }

    pub fn erase(&mut self, target: EraseTarget) -> usize {
        match target {
            EraseTarget::Point(point) => usize::from(self.erase_at_point(point)),
            EraseTarget::Rect(rect) => self.erase_in_rect(rect),
        }
    }

    pub fn list_in_rect(&self, rect: Rect) -> Vec<AnnotationInfo> {
        self.snapshot(self.page())
            .into_iter()
            .filter(|info| info.rect.intersects(&rect) || rect.intersects(&info.rect))
            .collect()
    }

    /// Every annotation on the current page.
    pub fn list(&self) -> Vec<AnnotationInfo> {
        self.snapshot(self.page())
    }

    pub fn clear_page(&mut self) -> usize {
        let page = self.page();
        let targets = self.snapshot(page);
        self.delete_all(page, &targets)
    }

    /// Deletes one annotation wherever it lives.
    pub fn remove(&mut self, reference: AnnotationRef) -> bool {
        let Some(backend) = self.doc.backend_mut() else {
            return false;
        };
        match backend.delete_annotation(reference.page, reference.id) {
            Ok(()) => true,
            Err(err) => {
                warn!(?err, page = reference.page, id = %reference.id, "failed to delete annotation");
                false
            }
        }
    }

    pub(crate) fn add_on_page(&mut self, page: usize, spec: &AnnotationSpec) -> Result<AnnotationRef> {
        let rect = match spec {
            AnnotationSpec::Note { at, .. } => Rect::new(at.x, at.y, at.x, at.y),
            AnnotationSpec::Markup { rect, .. }
            | AnnotationSpec::FreeText { rect, .. }
            | AnnotationSpec::Square { rect, .. } => *rect,
        };
        if let AnnotationSpec::Note { .. } = spec {
            if !rect.is_finite() {
                return Err(Error::annotation("note position is not finite"));
            }
            if page >= self.doc.page_count() {
                return Err(Error::range(format!("page {page} out of range")));
            }
        } else {
            self.check_target(page, rect)?;
        }

        let backend = self.doc.backend_mut().ok_or(Error::NoDocument)?;
        let id = backend
            .add_annotation(page, spec)
            .map_err(|err| Error::annotation(format!("{err:#}")))?;
        debug!(page, %id, kind = %spec.kind(), "annotation added");
        Ok(AnnotationRef { page, id })
    }

    fn check_target(&self, page: usize, rect: Rect) -> Result<()> {
        if !self.doc.is_loaded() {
            return Err(Error::NoDocument);
        }
        if page >= self.doc.page_count() {
            return Err(Error::range(format!("page {page} out of range")));
        }
        if !rect.is_finite() || rect.is_empty() {
            return Err(Error::annotation(format!("unusable rectangle {rect:?}")));
        }
        Ok(())
    }

    fn report(&self, result: Result<AnnotationRef>) -> Option<AnnotationRef> {
        match result {
            Ok(reference) => Some(reference),
            Err(err) => {
                warn!(%err, page = self.page(), "annotation not created");
                None
            }
        }
    }

    fn snapshot(&self, page: usize) -> Vec<AnnotationInfo> {
        let Some(backend) = self.doc.backend() else {
            return Vec::new();
        };
        if page >= backend.page_count() {
            return Vec::new();
        }
        backend.annotations(page).unwrap_or_else(|err| {
            warn!(?err, page, "failed to list annotations");
            Vec::new()
        })
    }

    fn delete_all(&mut self, page: usize, targets: &[AnnotationInfo]) -> usize {
        if targets.is_empty() {
            return 0;
        }
        let Some(backend) = self.doc.backend_mut() else {
            return 0;
        };
        let mut removed = 0;
        for info in targets {
            match backend.delete_annotation(page, info.id) {
                Ok(()) => removed += 1,
                Err(err) => warn!(?err, page, id = %info.id, "failed to delete annotation"),
            }
        }
        debug!(page, removed, "annotations deleted");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::Arc;

    use crate::backend::AnnotationKind;
    use crate::bookmarks::MemoryBookmarkStore;
    use crate::memory::{MemoryDocument, MemoryEngine, MemoryPage};

    fn handle(document: MemoryDocument) -> DocumentHandle {
        let engine = Arc::new(MemoryEngine::new());
        engine.insert("/docs/notes.pdf", document);
        let mut handle = DocumentHandle::new(engine, Arc::new(MemoryBookmarkStore::new()));
        handle.load(Path::new("/docs/notes.pdf")).unwrap();
        handle
    }

    const SELECTION: Rect = Rect::new(100.0, 100.0, 200.0, 150.0);
    const EVERYTHING: Rect = Rect::new(0.0, 0.0, 595.0, 842.0);

    #[test]
    fn markup_lands_on_current_page() {
        let mut doc = handle(MemoryDocument::with_pages(3));
        doc.go_to(2);
        let mut annotations = doc.annotations();
        let reference = annotations
            .add_highlight(SELECTION, Color::YELLOW, None)
            .unwrap();
        assert_eq!(reference.page, 1);
        annotations.add_underline(SELECTION, Color::BLUE, None).unwrap();
        annotations.add_strikeout(SELECTION, Color::RED, Some(0.5)).unwrap();

        let kinds: Vec<_> = annotations.list().into_iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AnnotationKind::Highlight, AnnotationKind::Underline, AnnotationKind::Strikeout]
        );
        doc.previous();
        assert!(doc.annotations().list().is_empty());
    }

    #[test]
    fn note_is_anchored_near_bottom_right() {
        let mut doc = handle(MemoryDocument::with_pages(1));
        let mut annotations = doc.annotations();
        annotations
            .add_note(Rect::new(200.0, 150.0, 100.0, 100.0), "remember", &NoteStyle::default())
            .unwrap();
        let notes = annotations.list();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, AnnotationKind::Note);
        assert_eq!((notes[0].rect.x0, notes[0].rect.y0), (180.0, 140.0));
        assert_eq!(notes[0].metadata.contents.as_deref(), Some("remember"));
    }

    #[test]
    fn free_text_keeps_its_text() {
        let mut doc = handle(MemoryDocument::with_pages(1));
        let style = FreeTextStyle {
            border_width: -3.0,
            ..FreeTextStyle::default()
        };
        let mut annotations = doc.annotations();
        annotations.add_free_text(SELECTION, "boxed", &style).unwrap();
        let listed = annotations.list_in_rect(SELECTION);
        assert_eq!(listed[0].kind, AnnotationKind::FreeText);
        assert_eq!(listed[0].metadata.contents.as_deref(), Some("boxed"));
    }

    #[test]
    fn failures_return_none() {
        let engine = Arc::new(MemoryEngine::new());
        let mut empty = DocumentHandle::new(engine, Arc::new(MemoryBookmarkStore::new()));
        assert!(empty
            .annotations()
            .add_highlight(SELECTION, Color::YELLOW, None)
            .is_none());
        assert!(empty.annotations().redact(SELECTION, Color::WHITE).is_none());
        assert_eq!(empty.annotations().clear_page(), 0);

        let mut doc = handle(MemoryDocument::with_pages(1));
        let bad = Rect::new(f32::NAN, 0.0, 10.0, 10.0);
        assert!(doc.annotations().add_highlight(bad, Color::YELLOW, None).is_none());
        let flat = Rect::new(10.0, 10.0, 10.0, 40.0);
        assert!(doc.annotations().add_underline(flat, Color::BLUE, None).is_none());
        assert!(doc.annotations().list().is_empty());
    }

    #[test]
    fn redaction_removes_text_when_supported() {
        let mut doc = handle(MemoryDocument::new(vec![MemoryPage::with_lines(&[
            "account 1234",
            "public line",
        ])]));
        let outcome = doc
            .annotations()
            .redact(Rect::new(60.0, 70.0, 300.0, 80.0), Color::WHITE);
        assert_eq!(outcome, Some(RedactionOutcome::Redacted));
        assert_eq!(doc.page_text(0), "public line");
    }

    #[test]
    fn redaction_falls_back_to_cover() {
        let mut doc = handle(MemoryDocument::with_pages(1).without_redaction());
        let outcome = doc.annotations().redact(SELECTION, Color::BLACK);
        assert_eq!(outcome, Some(RedactionOutcome::Covered));
        let listed = doc.annotations().list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].kind, AnnotationKind::Square);
        assert_eq!(listed[0].rect, SELECTION);
    }

    #[test]
    fn erase_in_rect_counts_overlaps() {
        let mut doc = handle(MemoryDocument::with_pages(1));
        let mut annotations = doc.annotations();
        annotations.add_highlight(Rect::new(0.0, 0.0, 50.0, 50.0), Color::YELLOW, None);
        annotations.add_highlight(Rect::new(40.0, 40.0, 90.0, 90.0), Color::YELLOW, None);
        annotations.add_highlight(Rect::new(300.0, 300.0, 350.0, 350.0), Color::YELLOW, None);

        assert_eq!(annotations.erase_in_rect(Rect::new(45.0, 45.0, 46.0, 46.0)), 2);
        assert_eq!(annotations.list().len(), 1);
        assert_eq!(annotations.erase(EraseTarget::Rect(EVERYTHING)), 1);
        assert_eq!(annotations.erase_in_rect(EVERYTHING), 0);
    }

    #[test]
    fn erase_at_point_removes_only_first_hit() {
        let mut doc = handle(MemoryDocument::with_pages(1));
        let mut annotations = doc.annotations();
        let first = annotations
            .add_highlight(Rect::new(0.0, 0.0, 50.0, 50.0), Color::YELLOW, None)
            .unwrap();
        annotations.add_highlight(Rect::new(10.0, 10.0, 60.0, 60.0), Color::YELLOW, None);

        assert!(annotations.erase_at_point(Point::new(20.0, 20.0)));
        let remaining = annotations.list();
        assert_eq!(remaining.len(), 1);
        assert_ne!(remaining[0].id, first.id);
        assert!(!annotations.erase_at_point(Point::new(500.0, 500.0)));
        assert_eq!(annotations.erase(EraseTarget::Point(Point::new(30.0, 30.0))), 1);
    }

    #[test]
    fn clear_page_leaves_other_pages() {
        let mut doc = handle(MemoryDocument::with_pages(2));
        for _ in 0..3 {
            doc.annotations().add_highlight(SELECTION, Color::YELLOW, None);
        }
        doc.next();
        let other = doc.annotations().add_highlight(SELECTION, Color::YELLOW, None).unwrap();
        doc.previous();

        assert_eq!(doc.annotations().clear_page(), 3);
        assert!(doc.annotations().list().is_empty());
        assert!(doc.annotations().remove(other));
        assert!(!doc.annotations().remove(other));
    }
}
