use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::annotations::HIGHLIGHT_OPACITY;
use crate::backend::{AnnotationRef, AnnotationSpec, MarkupKind};
use crate::document::DocumentHandle;
use crate::error::Error;
use crate::geometry::{Color, Rect};

pub const MATCH_COLOR: Color = Color::GREEN;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub page: usize,
    pub rect: Rect,
    pub text: String,
    /// Set only while this match is the one highlighted in the document.
    pub annotation: Option<AnnotationRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    #[default]
    Idle,
    Searching,
    HasResults,
    NoResults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchSummary {
    pub query: String,
    pub total: usize,
    /// 1-based position of the current match.
    pub current: Option<usize>,
}

/// Results of the last query and the one match, if any, currently drawn into
/// the document as a highlight.
///
/// At most one match holds a live annotation at any time: every operation
/// that could show a different match removes the previous highlight first.
#[derive(Debug, Default)]
pub struct SearchEngine {
    matches: Vec<SearchMatch>,
    current: Option<usize>,
    query: String,
    state: SearchState,
}

impl SearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans every page for `query`, replacing any previous results.
    /// Returns the number of matches.
    #[instrument(skip(self, doc))]
    pub fn search(&mut self, doc: &mut DocumentHandle, query: &str) -> usize {
        self.clear(doc);
        if !doc.is_loaded() {
            return 0;
        }
        self.query = query.to_string();
        if query.trim().is_empty() {
            self.state = SearchState::NoResults;
            return 0;
        }

        self.state = SearchState::Searching;
        if let Some(backend) = doc.backend() {
            for page in 0..backend.page_count() {
                match backend.search_page(page, query) {
                    Ok(hits) => self.matches.extend(hits.into_iter().map(|hit| SearchMatch {
                        page,
                        rect: hit.rect,
                        text: hit.text,
                        annotation: None,
                    })),
                    Err(err) => {
                        let err = Error::Scan {
                            page,
                            reason: format!("{err:#}"),
                        };
                        warn!(%err, "skipping page in search");
                    }
                }
            }
        }

        if self.matches.is_empty() {
            self.state = SearchState::NoResults;
        } else {
            self.state = SearchState::HasResults;
            self.current = Some(0);
        }
        debug!(total = self.matches.len(), "search finished");
        self.matches.len()
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[SearchMatch] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_match(&self) -> Option<&SearchMatch> {
        self.matches.get(self.current?)
    }

    /// Removes the current highlight and steps forward, wrapping at the end.
    /// The new current match is not highlighted.
    pub fn next(&mut self, doc: &mut DocumentHandle) -> Option<&SearchMatch> {
        self.step(doc, true)
    }

    /// Removes the current highlight and steps back, wrapping at the start.
    pub fn previous(&mut self, doc: &mut DocumentHandle) -> Option<&SearchMatch> {
        self.step(doc, false)
    }

    fn step(&mut self, doc: &mut DocumentHandle, forward: bool) -> Option<&SearchMatch> {
        let current = self.current?;
        let total = self.matches.len();
        self.unhighlight(doc, current);
        let next = if forward {
            (current + 1) % total
        } else {
            (current + total - 1) % total
        };
        self.current = Some(next);
        self.matches.get(next)
    }

    /// Draws match `index` into the document. Every live highlight,
    /// including one this match already holds, is removed first; a match
    /// whose annotation was erased elsewhere gets a fresh one.
    pub fn highlight(&mut self, doc: &mut DocumentHandle, index: usize) -> Option<AnnotationRef> {
        let target = self.matches.get(index)?;
        let (page, rect) = (target.page, target.rect);
        self.clear_highlights(doc);

        let spec = AnnotationSpec::Markup {
            kind: MarkupKind::Highlight,
            rect,
            color: MATCH_COLOR,
            opacity: HIGHLIGHT_OPACITY,
        };
        match doc.annotations().add_on_page(page, &spec) {
            Ok(reference) => {
                self.matches[index].annotation = Some(reference);
                Some(reference)
            }
            Err(err) => {
                warn!(%err, page, index, "failed to highlight search match");
                None
            }
        }
    }

    pub fn highlight_current(&mut self, doc: &mut DocumentHandle) -> Option<AnnotationRef> {
        let current = self.current?;
        self.highlight(doc, current)
    }

    /// Removes every live highlight but keeps the results.
    pub fn clear_highlights(&mut self, doc: &mut DocumentHandle) {
        for index in 0..self.matches.len() {
            self.unhighlight(doc, index);
        }
    }

    /// Removes every live highlight and forgets the results and query.
    pub fn clear(&mut self, doc: &mut DocumentHandle) {
        self.clear_highlights(doc);
        self.matches.clear();
        self.current = None;
        self.query.clear();
        self.state = SearchState::Idle;
    }

    /// Forgets results without touching the document, for when the document
    /// the highlights lived in is already gone.
    pub(crate) fn reset(&mut self) {
        self.matches.clear();
        self.current = None;
        self.query.clear();
        self.state = SearchState::Idle;
    }

    pub fn summary(&self) -> SearchSummary {
        SearchSummary {
            query: self.query.clone(),
            total: self.matches.len(),
            current: self.current.map(|index| index + 1),
        }
    }

    pub fn live_highlights(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.annotation.is_some())
            .count()
    }

    /// The reference is dropped even when the document refuses the delete;
    /// the failure is logged by the annotation manager.
    fn unhighlight(&mut self, doc: &mut DocumentHandle, index: usize) {
        if let Some(reference) = self.matches.get_mut(index).and_then(|m| m.annotation.take()) {
            doc.annotations().remove(reference);
        }
    }
}
