use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::annotations::{AnnotationManager, FreeTextStyle, NoteStyle};
use crate::backend::{AnnotationRef, DocumentEngine};
use crate::bookmarks::BookmarkStore;
use crate::coords;
use crate::document::DocumentHandle;
use crate::error::{Error, Result};
use crate::export::PageSelection;
use crate::geometry::{Color, Point, Rect, Size};
use crate::mode::{AnnotationMode, SelectionOutcome};
use crate::search::{SearchEngine, SearchMatch};

pub const DEFAULT_ZOOM: f32 = 1.5;
pub const ZOOM_STEP: f32 = 1.25;
pub const MIN_ZOOM: f32 = 0.2;
pub const MAX_ZOOM: f32 = 8.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NextPage,
    PrevPage,
    /// 1-based.
    GotoPage { page: usize },
    /// 0-based, as from a thumbnail strip.
    SelectPage { index: usize },
    ZoomIn,
    ZoomOut,
    ResetZoom,
    RotateCurrent { delta: i32 },
    RotateAll { delta: i32 },
    DeleteCurrentPage,
    DeletePages { indices: Vec<usize> },
    InsertPage { position: Option<usize> },
    InsertPageAfter,
    InsertPageBefore,
    Search { query: String },
    SearchNext,
    SearchPrev,
    ClearSearch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DocumentOpened(PathBuf),
    DocumentClosed,
    PageChanged(usize),
    RedrawNeeded,
    SearchUpdated { total: usize, current: Option<usize> },
}

/// The single mutable view of a document: which page, which zoom, which
/// search match is shown.
pub struct Session {
    document: DocumentHandle,
    search: SearchEngine,
    zoom: f32,
    default_zoom: f32,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Session {
    pub fn new(engine: Arc<dyn DocumentEngine>, bookmarks: Arc<dyn BookmarkStore>) -> Self {
        Self {
            document: DocumentHandle::new(engine, bookmarks),
            search: SearchEngine::new(),
            zoom: DEFAULT_ZOOM,
            default_zoom: DEFAULT_ZOOM,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Starts at `zoom` and returns to it on [`Command::ResetZoom`].
    pub fn with_default_zoom(mut self, zoom: f32) -> Self {
        let zoom = clamp_zoom(zoom);
        self.zoom = zoom;
        self.default_zoom = zoom;
        self
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn drain_events(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn document(&self) -> &DocumentHandle {
        &self.document
    }

    pub fn search(&self) -> &SearchEngine {
        &self.search
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn annotations(&mut self) -> AnnotationManager<'_> {
        self.document.annotations()
    }

    /// Opens `path`. On failure the current document and search stay as
    /// they were.
    #[instrument(skip(self))]
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let prepared = self.document.prepare(path)?;
        self.search.clear(&mut self.document);
        self.document.install(prepared);
        self.emit(SessionEvent::DocumentOpened(path.to_path_buf()));
        self.emit(SessionEvent::PageChanged(self.document.current_page()));
        Ok(())
    }

    /// Replaces the document with a new one-page document without a path.
    pub fn new_document(&mut self) -> Result<()> {
        self.search.clear(&mut self.document);
        self.document.new_blank()?;
        self.emit(SessionEvent::PageChanged(0));
        Ok(())
    }

    pub fn close(&mut self) {
        if !self.document.is_loaded() {
            return;
        }
        self.search.reset();
        self.document.close();
        self.emit(SessionEvent::DocumentClosed);
    }

    /// Runs one command; returns whether anything changed.
    #[instrument(skip(self))]
    pub fn apply(&mut self, command: Command) -> Result<bool> {
        let before = self.document.current_page();
        let changed = match command {
            Command::NextPage => self.document.next(),
            Command::PrevPage => self.document.previous(),
            Command::GotoPage { page } => self.document.go_to(page),
            Command::SelectPage { index } => self.document.set_current_page(index),
            Command::ZoomIn => self.set_zoom(self.zoom * ZOOM_STEP),
            Command::ZoomOut => self.set_zoom(self.zoom / ZOOM_STEP),
            Command::ResetZoom => self.set_zoom(self.default_zoom),
            Command::RotateCurrent { delta } => {
                self.require_document()?;
                self.document.rotate_current(delta)?;
                true
            }
            Command::RotateAll { delta } => {
                self.require_document()?;
                self.document.rotate_all(delta)?;
                true
            }
            Command::DeleteCurrentPage => {
                let current = [self.document.current_page()];
                if self.document.deletable_pages(&current).is_empty() {
                    false
                } else {
                    self.clear_search_for_restructure();
                    self.document.delete_current_page()
                }
            }
            Command::DeletePages { indices } => {
                if self.document.deletable_pages(&indices).is_empty() {
                    false
                } else {
                    self.clear_search_for_restructure();
                    self.document.delete_pages(&indices) > 0
                }
            }
            Command::InsertPage { position } => {
                if self.document.can_insert_page(position) {
                    self.clear_search_for_restructure();
                    self.document.insert_page(position)
                } else {
                    false
                }
            }
            Command::InsertPageAfter => {
                if self.document.is_loaded() {
                    self.clear_search_for_restructure();
                    self.document.insert_page_after_current()
                } else {
                    false
                }
            }
            Command::InsertPageBefore => {
                if self.document.is_loaded() {
                    self.clear_search_for_restructure();
                    self.document.insert_page_before_current()
                } else {
                    false
                }
            }
            Command::Search { query } => self.run_search(&query) > 0,
            Command::SearchNext => self.find_next().is_some(),
            Command::SearchPrev => self.find_previous().is_some(),
            Command::ClearSearch => {
                let had_results = !self.search.is_empty();
                self.search.clear(&mut self.document);
                self.emit_search_update();
                had_results
            }
        };

        let after = self.document.current_page();
        if after != before {
            self.emit(SessionEvent::PageChanged(after));
        }
        if changed {
            self.emit(SessionEvent::RedrawNeeded);
        }
        Ok(changed)
    }

    /// Sets the view zoom, clamped into `[MIN_ZOOM, MAX_ZOOM]`.
    pub fn set_zoom(&mut self, zoom: f32) -> bool {
        let zoom = clamp_zoom(zoom);
        if (self.zoom - zoom).abs() <= f32::EPSILON {
            return false;
        }
        self.zoom = zoom;
        true
    }

    fn run_search(&mut self, query: &str) -> usize {
        let total = self.search.search(&mut self.document, query);
        if total > 0 {
            self.highlight_current_match();
        }
        self.emit_search_update();
        total
    }

    /// Moves to the page of the current match and highlights it.
    pub fn highlight_current_match(&mut self) -> Option<AnnotationRef> {
        let page = self.search.current_match()?.page;
        if page != self.document.current_page() {
            self.document.set_current_page(page);
        }
        self.search.highlight_current(&mut self.document)
    }

    pub fn find_next(&mut self) -> Option<SearchMatch> {
        self.search.next(&mut self.document)?;
        self.highlight_current_match();
        self.emit_search_update();
        self.search.current_match().cloned()
    }

    pub fn find_previous(&mut self) -> Option<SearchMatch> {
        self.search.previous(&mut self.document)?;
        self.highlight_current_match();
        self.emit_search_update();
        self.search.current_match().cloned()
    }

    #[instrument(skip(self))]
    pub fn save(&mut self) -> Result<()> {
        self.with_highlights_hidden(|document| document.save())
    }

    #[instrument(skip(self))]
    pub fn save_as(&mut self, path: &Path) -> Result<PathBuf> {
        self.with_highlights_hidden(|document| document.save_as(path))
    }

    #[instrument(skip(self))]
    pub fn export(&mut self, selection: &PageSelection, path: &Path) -> Result<PathBuf> {
        self.require_document()?;
        let pages = selection.resolve(self.document.page_count(), self.document.current_page())?;
        self.with_highlights_hidden(|document| document.export_pages(&pages, path))
    }

    /// Dispatches a selection drawn on the rendered current page.
    ///
    /// `device_rect` is in pixels of an image of `device_size`. Selections
    /// under the minimum size are ignored, except in erase mode where they
    /// act as a click on a single point. `text` carries the note or
    /// free-text content the caller collected.
    #[instrument(skip(self, text))]
    pub fn apply_selection(
        &mut self,
        mode: AnnotationMode,
        device_rect: Rect,
        device_size: Size,
        text: Option<&str>,
    ) -> SelectionOutcome {
        let Some(page_size) = self.document.page_size(self.document.current_page()) else {
            return SelectionOutcome::Ignored;
        };
        let Some(rect) = coords::to_page(device_rect.normalized(), page_size, device_size) else {
            return SelectionOutcome::Ignored;
        };
        let is_selection = coords::is_selection(device_rect);
        if !is_selection && mode != AnnotationMode::Erase {
            return SelectionOutcome::Ignored;
        }

        let outcome = match mode {
            AnnotationMode::Highlight => {
                annotated(self.annotations().add_highlight(rect, Color::YELLOW, None))
            }
            AnnotationMode::Underline => {
                annotated(self.annotations().add_underline(rect, Color::BLUE, None))
            }
            AnnotationMode::Strikeout => {
                annotated(self.annotations().add_strikeout(rect, Color::RED, None))
            }
            AnnotationMode::Note => match text {
                Some(text) if !text.trim().is_empty() => {
                    annotated(self.annotations().add_note(rect, text, &NoteStyle::default()))
                }
                _ => SelectionOutcome::NeedsText,
            },
            AnnotationMode::FreeText => match text {
                Some(text) if !text.trim().is_empty() => {
                    let style = FreeTextStyle::default();
                    annotated(self.annotations().add_free_text(rect, text, &style))
                }
                _ => SelectionOutcome::NeedsText,
            },
            AnnotationMode::RemoveText => match self.annotations().redact(rect, Color::WHITE) {
                Some(outcome) => SelectionOutcome::Redacted(outcome),
                None => SelectionOutcome::Failed,
            },
            AnnotationMode::Erase => {
                let removed = if is_selection {
                    self.annotations().erase_in_rect(rect)
                } else {
                    let center = Point::new((rect.x0 + rect.x1) / 2.0, (rect.y0 + rect.y1) / 2.0);
                    usize::from(self.annotations().erase_at_point(center))
                };
                SelectionOutcome::Erased(removed)
            }
            AnnotationMode::Translate => {
                let text = self.document.text_in_rect(rect);
                if text.is_empty() {
                    SelectionOutcome::NoText
                } else {
                    SelectionOutcome::TextForTranslation(text)
                }
            }
            AnnotationMode::None => SelectionOutcome::Ignored,
        };

        let mutated = match outcome {
            SelectionOutcome::Annotated(_) | SelectionOutcome::Redacted(_) => true,
            SelectionOutcome::Erased(removed) => removed > 0,
            _ => false,
        };
        if mutated {
            self.emit(SessionEvent::RedrawNeeded);
        }
        debug!(%mode, ?outcome, "selection handled");
        outcome
    }

    fn with_highlights_hidden<T>(
        &mut self,
        write: impl FnOnce(&mut DocumentHandle) -> Result<T>,
    ) -> Result<T> {
        let restore = self.search.live_highlights() > 0;
        self.search.clear_highlights(&mut self.document);
        let result = write(&mut self.document);
        if restore {
            self.search.highlight_current(&mut self.document);
        }
        result
    }

    fn clear_search_for_restructure(&mut self) {
        if self.search.is_empty() && self.search.query().is_empty() {
            return;
        }
        self.search.clear(&mut self.document);
        self.emit_search_update();
    }

    fn require_document(&self) -> Result<()> {
        if self.document.is_loaded() {
            Ok(())
        } else {
            Err(Error::NoDocument)
        }
    }

    fn emit_search_update(&self) {
        let summary = self.search.summary();
        self.emit(SessionEvent::SearchUpdated {
            total: summary.total,
            current: summary.current,
        });
    }

    fn emit(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }
}

fn clamp_zoom(zoom: f32) -> f32 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        DEFAULT_ZOOM
    }
}

fn annotated(reference: Option<AnnotationRef>) -> SelectionOutcome {
    reference.map_or(SelectionOutcome::Failed, SelectionOutcome::Annotated)
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::tempdir;

    use crate::annotations::RedactionOutcome;
    use crate::backend::AnnotationKind;
    use crate::bookmarks::{FileBookmarkStore, MemoryBookmarkStore};
    use crate::memory::{MemoryDocument, MemoryEngine, MemoryPage};

    const DEVICE: Size = Size::new(892.5, 1263.0);

    fn needle_pages(count: usize) -> MemoryDocument {
        MemoryDocument::new(
            (1..=count)
                .map(|n| {
                    if n % 2 == 1 {
                        MemoryPage::with_lines(&[format!("Page {n}"), "a needle and a needle".into()])
                    } else {
                        MemoryPage::with_lines(&[format!("Page {n}")])
                    }
                })
                .collect(),
        )
    }

    fn session_with(document: MemoryDocument) -> (Session, Arc<MemoryEngine>) {
        let engine = Arc::new(MemoryEngine::new());
        engine.insert("/docs/a.pdf", document);
        let mut session = Session::new(engine.clone(), Arc::new(MemoryBookmarkStore::new()));
        session.load(Path::new("/docs/a.pdf")).unwrap();
        (session, engine)
    }

    fn highlight_count(session: &Session) -> usize {
        let backend = session.document().backend().unwrap();
        (0..backend.page_count())
            .flat_map(|page| backend.annotations(page).unwrap())
            .filter(|info| info.kind == AnnotationKind::Highlight)
            .count()
    }

    #[test]
    fn navigation_emits_page_changes() {
        let (mut session, _) = session_with(MemoryDocument::with_pages(10));
        session.drain_events();
        for _ in 0..9 {
            assert!(session.apply(Command::NextPage).unwrap());
        }
        assert!(!session.apply(Command::NextPage).unwrap());
        assert_eq!(session.document().current_page(), 9);

        assert!(session.apply(Command::GotoPage { page: 3 }).unwrap());
        assert!(!session.apply(Command::GotoPage { page: 11 }).unwrap());
        assert!(session.apply(Command::SelectPage { index: 0 }).unwrap());

        let pages: Vec<_> = session
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::PageChanged(page) => Some(page),
                _ => None,
            })
            .collect();
        assert_eq!(pages, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 2, 0]);
    }

    #[test]
    fn zoom_steps_and_clamps() {
        let (mut session, _) = session_with(MemoryDocument::with_pages(1));
        assert_eq!(session.zoom(), DEFAULT_ZOOM);
        session.apply(Command::ZoomIn).unwrap();
        assert!((session.zoom() - 1.875).abs() < 1e-6);
        for _ in 0..40 {
            session.apply(Command::ZoomOut).unwrap();
        }
        assert_eq!(session.zoom(), MIN_ZOOM);
        for _ in 0..40 {
            session.apply(Command::ZoomIn).unwrap();
        }
        assert_eq!(session.zoom(), MAX_ZOOM);
        assert!(!session.apply(Command::ZoomIn).unwrap());
        assert!(session.apply(Command::ResetZoom).unwrap());
        assert_eq!(session.zoom(), DEFAULT_ZOOM);
    }

    #[test]
    fn rotate_commands_require_a_document() {
        let mut session = Session::new(
            Arc::new(MemoryEngine::new()),
            Arc::new(MemoryBookmarkStore::new()),
        );
        assert!(matches!(
            session.apply(Command::RotateCurrent { delta: 90 }),
            Err(Error::NoDocument)
        ));
        let (mut session, _) = session_with(MemoryDocument::with_pages(2));
        assert!(session.apply(Command::RotateAll { delta: -90 }).unwrap());
        assert_eq!(session.document().rotation(1).degrees(), 270);
        assert!(matches!(
            session.apply(Command::RotateCurrent { delta: 15 }),
            Err(Error::Range(_))
        ));
    }

    #[test]
    fn search_jumps_to_first_match_and_highlights_it() {
        let mut document = MemoryDocument::with_pages(3);
        document.pages[2] = MemoryPage::with_lines(&["the needle"]);
        let (mut session, _) = session_with(document);

        assert!(session
            .apply(Command::Search {
                query: "needle".into()
            })
            .unwrap());
        assert_eq!(session.document().current_page(), 2);
        assert_eq!(highlight_count(&session), 1);
        assert!(session
            .drain_events()
            .contains(&SessionEvent::SearchUpdated {
                total: 1,
                current: Some(1)
            }));
    }

    #[test]
    fn find_next_moves_highlight_across_pages() {
        let (mut session, _) = session_with(needle_pages(4));
        session.apply(Command::Search { query: "needle".into() }).unwrap();
        assert_eq!(session.search().len(), 4);
        assert_eq!(session.document().current_page(), 0);

        session.apply(Command::SearchNext).unwrap();
        assert_eq!(session.document().current_page(), 0);
        let third = session.find_next().unwrap();
        assert_eq!(third.page, 2);
        assert_eq!(session.document().current_page(), 2);
        assert_eq!(highlight_count(&session), 1);

        let back = session.find_previous().unwrap();
        assert_eq!(back.page, 0);
        session.find_previous();
        assert_eq!(session.search().current_index(), Some(0));
        let wrapped = session.find_previous().unwrap();
        assert_eq!(wrapped.page, 2);
        assert_eq!(session.search().current_index(), Some(3));
        assert_eq!(session.document().current_page(), 2);
        assert_eq!(highlight_count(&session), 1);
    }

    #[test]
    fn load_clears_search_of_previous_document() {
        let (mut session, engine) = session_with(needle_pages(3));
        engine.insert("/docs/b.pdf", MemoryDocument::with_pages(2));
        session.apply(Command::Search { query: "needle".into() }).unwrap();
        assert!(!session.search().is_empty());

        assert!(session.load(Path::new("/docs/nope.pdf")).is_err());
        assert!(!session.search().is_empty());
        assert_eq!(session.document().page_count(), 3);

        session.load(Path::new("/docs/b.pdf")).unwrap();
        assert!(session.search().is_empty());
        assert_eq!(session.document().page_count(), 2);
        assert_eq!(session.document().current_page(), 0);
    }

    #[test]
    fn page_structure_changes_clear_search() {
        let (mut session, _) = session_with(needle_pages(3));
        session.apply(Command::Search { query: "needle".into() }).unwrap();
        assert!(session.apply(Command::InsertPageBefore).unwrap());
        assert!(session.search().is_empty());
        assert_eq!(highlight_count(&session), 0);

        session.apply(Command::Search { query: "needle".into() }).unwrap();
        assert!(session.apply(Command::DeletePages { indices: vec![0, 1] }).unwrap());
        assert!(session.search().is_empty());
        assert_eq!(session.document().page_count(), 2);
    }

    #[test]
    fn delete_commands_keep_at_least_one_page() {
        let (mut session, _) = session_with(MemoryDocument::with_pages(2));
        assert!(session.apply(Command::DeleteCurrentPage).unwrap());
        assert!(!session.apply(Command::DeleteCurrentPage).unwrap());
        assert!(!session.apply(Command::DeletePages { indices: vec![0] }).unwrap());
        assert_eq!(session.document().page_count(), 1);
        assert!(session.apply(Command::InsertPage { position: None }).unwrap());
        assert!(session.apply(Command::InsertPageAfter).unwrap());
        assert_eq!(session.document().page_count(), 3);
        assert_eq!(session.document().current_page(), 1);
    }

    #[test]
    fn refused_structure_change_keeps_search() {
        let (mut session, _) = session_with(needle_pages(1));
        session.apply(Command::Search { query: "needle".into() }).unwrap();
        assert_eq!(session.search().len(), 2);
        session.drain_events();

        assert!(!session.apply(Command::DeleteCurrentPage).unwrap());
        assert!(!session.apply(Command::DeletePages { indices: vec![0] }).unwrap());
        assert!(!session.apply(Command::InsertPage { position: Some(5) }).unwrap());

        assert_eq!(session.search().len(), 2);
        assert_eq!(session.search().live_highlights(), 1);
        assert_eq!(highlight_count(&session), 1);
        assert!(session.drain_events().is_empty());
    }

    #[test]
    fn erased_search_highlight_comes_back() {
        let (mut session, _) = session_with(needle_pages(1));
        session.apply(Command::Search { query: "needle".into() }).unwrap();
        assert_eq!(session.annotations().clear_page(), 1);

        assert!(session.highlight_current_match().is_some());
        assert_eq!(highlight_count(&session), 1);
        assert_eq!(session.search().live_highlights(), 1);
    }

    #[test]
    fn saving_never_writes_search_highlight() {
        let dir = tempdir().unwrap();
        let (mut session, engine) = session_with(needle_pages(1));
        session.apply(Command::Search { query: "needle".into() }).unwrap();
        assert_eq!(highlight_count(&session), 1);

        let saved = session.save_as(&dir.path().join("copy")).unwrap();
        assert_eq!(highlight_count(&session), 1);
        assert_eq!(session.search().live_highlights(), 1);

        let reopened = engine.open(&saved).unwrap();
        assert!(reopened.annotations(0).unwrap().is_empty());

        let exported = session
            .export(&PageSelection::All, &dir.path().join("all.pdf"))
            .unwrap();
        assert!(engine.open(&exported).unwrap().annotations(0).unwrap().is_empty());
    }

    #[test]
    fn export_rejects_bad_selection() {
        let dir = tempdir().unwrap();
        let (mut session, _) = session_with(MemoryDocument::with_pages(3));
        assert!(matches!(
            session.export(&PageSelection::Range { start: 3, end: 1 }, &dir.path().join("x")),
            Err(Error::Range(_))
        ));
        let written = session
            .export(&PageSelection::List("1,3".into()), &dir.path().join("x"))
            .unwrap();
        assert_eq!(written, dir.path().join("x.pdf"));
    }

    #[test]
    fn bookmark_survives_a_fresh_store() {
        let dir = tempdir().unwrap();
        let bookmarks_path = dir.path().join("bookmarks.json");
        let engine = Arc::new(MemoryEngine::new());
        engine.insert("/docs/long.pdf", MemoryDocument::with_pages(8));

        let mut session = Session::new(engine.clone(), Arc::new(FileBookmarkStore::load(&bookmarks_path)));
        session.load(Path::new("/docs/long.pdf")).unwrap();
        session.apply(Command::GotoPage { page: 5 }).unwrap();
        drop(session);

        let mut session = Session::new(engine, Arc::new(FileBookmarkStore::load(&bookmarks_path)));
        session.load(Path::new("/docs/long.pdf")).unwrap();
        assert_eq!(session.document().current_page(), 4);
    }

    #[test]
    fn selection_dispatch_by_mode() {
        let (mut session, _) = session_with(MemoryDocument::new(vec![MemoryPage::with_lines(&[
            "translate me",
        ])]));
        let drag = Rect::new(150.0, 150.0, 300.0, 200.0);
        let tiny = Rect::new(150.0, 150.0, 155.0, 153.0);

        assert_eq!(
            session.apply_selection(AnnotationMode::Highlight, tiny, DEVICE, None),
            SelectionOutcome::Ignored
        );
        assert_eq!(
            session.apply_selection(AnnotationMode::None, drag, DEVICE, None),
            SelectionOutcome::Ignored
        );
        assert!(matches!(
            session.apply_selection(AnnotationMode::Underline, drag, DEVICE, None),
            SelectionOutcome::Annotated(_)
        ));
        assert_eq!(
            session.apply_selection(AnnotationMode::Note, drag, DEVICE, Some("  ")),
            SelectionOutcome::NeedsText
        );
        assert!(matches!(
            session.apply_selection(AnnotationMode::FreeText, drag, DEVICE, Some("hi")),
            SelectionOutcome::Annotated(_)
        ));
        assert_eq!(
            session.apply_selection(AnnotationMode::Erase, tiny, DEVICE, None),
            SelectionOutcome::Erased(1)
        );
        assert_eq!(
            session.apply_selection(AnnotationMode::Erase, drag, DEVICE, None),
            SelectionOutcome::Erased(1)
        );

        // (72, 72) to (144, 84) in page space is the text line.
        let over_text = Rect::new(100.0, 100.0, 220.0, 130.0);
        assert_eq!(
            session.apply_selection(AnnotationMode::Translate, over_text, DEVICE, None),
            SelectionOutcome::TextForTranslation("translate me".into())
        );
        assert_eq!(
            session.apply_selection(AnnotationMode::RemoveText, over_text, DEVICE, None),
            SelectionOutcome::Redacted(RedactionOutcome::Redacted)
        );
        assert_eq!(
            session.apply_selection(AnnotationMode::Translate, over_text, DEVICE, None),
            SelectionOutcome::NoText
        );
    }

    #[test]
    fn closing_resets_everything() {
        let (mut session, _) = session_with(needle_pages(2));
        session.apply(Command::Search { query: "needle".into() }).unwrap();
        session.close();
        assert_eq!(session.document().page_count(), 0);
        assert!(session.search().is_empty());
        assert!(session.drain_events().contains(&SessionEvent::DocumentClosed));
        assert!(!session.apply(Command::NextPage).unwrap());

        session.new_document().unwrap();
        assert_eq!(session.document().page_count(), 1);
        assert!(matches!(session.save(), Err(Error::NoSavePath)));
    }

    #[test]
    fn random_commands_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let (mut session, _) = session_with(needle_pages(6));

        for step in 0..500 {
            let command = match rng.gen_range(0..12) {
                0 => Command::NextPage,
                1 => Command::PrevPage,
                2 => Command::GotoPage {
                    page: rng.gen_range(0..10),
                },
                3 => Command::RotateCurrent {
                    delta: 90 * rng.gen_range(-3..4),
                },
                4 => Command::DeleteCurrentPage,
                5 => Command::DeletePages {
                    indices: (0..rng.gen_range(0..4)).map(|_| rng.gen_range(0..8)).collect(),
                },
                6 => Command::InsertPage {
                    position: rng.gen_bool(0.5).then(|| rng.gen_range(0..8)),
                },
                7 => Command::InsertPageAfter,
                8 => Command::Search {
                    query: "needle".into(),
                },
                9 => Command::SearchNext,
                10 => Command::SearchPrev,
                _ => Command::ClearSearch,
            };
            session.apply(command.clone()).unwrap();

            let document = session.document();
            assert!(document.page_count() >= 1, "step {step}: {command:?}");
            assert!(
                document.current_page() < document.page_count(),
                "step {step}: {command:?}"
            );
            assert!(session.search().live_highlights() <= 1, "step {step}");
            assert_eq!(
                highlight_count(&session),
                session.search().live_highlights(),
                "step {step}: {command:?}"
            );
        }
    }
}
