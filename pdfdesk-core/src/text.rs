use tracing::warn;

use crate::document::DocumentHandle;
use crate::geometry::Rect;

impl DocumentHandle {
    /// Text under `rect` on the current page, trimmed.
    pub fn text_in_rect(&self, rect: Rect) -> String {
        let Some(backend) = self.backend() else {
            return String::new();
        };
        let page = self.current_page();
        if page >= backend.page_count() {
            return String::new();
        }
        match backend.text_in_rect(page, rect.normalized()) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                warn!(?err, page, "failed to extract text in rectangle");
                String::new()
            }
        }
    }

    /// Whole text of one page, trimmed; empty when out of range.
    pub fn page_text(&self, index: usize) -> String {
        let Some(backend) = self.backend() else {
            return String::new();
        };
        if index >= backend.page_count() {
            return String::new();
        }
        match backend.page_text(index) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                warn!(?err, page = index, "failed to extract page text");
                String::new()
            }
        }
    }

    /// Text of the given pages, each under a `--- Page N ---` header and
    /// separated by a blank line. Pages without text are left out.
    pub fn pages_text(&self, indices: &[usize]) -> String {
        indices
            .iter()
            .filter_map(|&index| {
                let text = self.page_text(index);
                (!text.is_empty()).then(|| format!("--- Page {} ---\n{}", index + 1, text))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn all_text(&self) -> String {
        let indices: Vec<usize> = (0..self.page_count()).collect();
        self.pages_text(&indices)
    }

    /// Text block rectangles and the page rectangle of the current page.
    pub fn text_regions(&self) -> (Vec<Rect>, Option<Rect>) {
        let page = self.current_page();
        let page_rect = self.page_rect(page);
        let Some(backend) = self.backend() else {
            return (Vec::new(), None);
        };
        if page_rect.is_none() {
            return (Vec::new(), None);
        }
        let blocks = backend.text_blocks(page).unwrap_or_else(|err| {
            warn!(?err, page, "failed to read text blocks");
            Vec::new()
        });
        (blocks, page_rect)
    }
}
