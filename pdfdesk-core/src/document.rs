use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::backend::{DocumentEngine, PdfBackend, RenderImage, SaveMode};
use crate::bookmarks::{bookmark_key, BookmarkStore};
use crate::error::{Error, Result};
use crate::export::ensure_pdf_extension;
use crate::geometry::{Rect, Rotation, Size};

pub const THUMBNAIL_ZOOM: f32 = 0.15;

/// A document that opened successfully but is not installed yet.
pub struct PreparedDocument {
    backend: Box<dyn PdfBackend>,
    path: PathBuf,
}

impl PreparedDocument {
    pub fn page_count(&self) -> usize {
        self.backend.page_count()
    }
}

/// The opened document, its identity on disk and the current page.
pub struct DocumentHandle {
    engine: Arc<dyn DocumentEngine>,
    bookmarks: Arc<dyn BookmarkStore>,
    backend: Option<Box<dyn PdfBackend>>,
    path: Option<PathBuf>,
    bookmark_key: Option<String>,
    current_page: usize,
    render_cache: RenderCache,
}

impl DocumentHandle {
    pub fn new(engine: Arc<dyn DocumentEngine>, bookmarks: Arc<dyn BookmarkStore>) -> Self {
        Self {
            engine,
            bookmarks,
            backend: None,
            path: None,
            bookmark_key: None,
            current_page: 0,
            render_cache: RenderCache::default(),
        }
    }

    /// Opens `path` without touching the current state; on failure the
    /// previously loaded document stays active.
    pub fn prepare(&self, path: &Path) -> Result<PreparedDocument> {
        let backend = self
            .engine
            .open(path)
            .map_err(|err| Error::open(path, err))?;
        Ok(PreparedDocument {
            backend,
            path: path.to_path_buf(),
        })
    }

    /// Makes a prepared document current and restores its bookmarked page.
    pub fn install(&mut self, prepared: PreparedDocument) {
        let PreparedDocument { backend, path } = prepared;
        let key = bookmark_key(&path);
        let page_count = backend.page_count();
        let bookmarked = self.bookmarks.get(&key).unwrap_or(0);
        self.current_page = clamp_page(bookmarked, page_count);
        debug!(
            path = %path.display(),
            page_count,
            bookmarked,
            current_page = self.current_page,
            "document installed"
        );
        self.backend = Some(backend);
        self.path = Some(path);
        self.bookmark_key = Some(key);
        self.render_cache.clear();
    }

    #[instrument(skip(self))]
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let prepared = self.prepare(path)?;
        self.install(prepared);
        Ok(())
    }

    /// Replaces the current document with a new one-page document that has
    /// no file path yet.
    pub fn new_blank(&mut self) -> Result<()> {
        let backend = self
            .engine
            .create()
            .map_err(|err| Error::open("<new document>", err))?;
        self.backend = Some(backend);
        self.path = None;
        self.bookmark_key = None;
        self.current_page = 0;
        self.render_cache.clear();
        Ok(())
    }

    pub fn close(&mut self) {
        self.backend = None;
        self.path = None;
        self.bookmark_key = None;
        self.current_page = 0;
        self.render_cache.clear();
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn page_count(&self) -> usize {
        self.backend.as_ref().map_or(0, |backend| backend.page_count())
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_rect(&self, index: usize) -> Option<Rect> {
        let backend = self.backend.as_ref()?;
        if index >= backend.page_count() {
            return None;
        }
        match backend.page_rect(index) {
            Ok(rect) => Some(rect),
            Err(err) => {
                warn!(?err, page = index, "failed to read page rectangle");
                None
            }
        }
    }

    pub fn page_size(&self, index: usize) -> Option<Size> {
        self.page_rect(index).map(|rect| rect.size())
    }

    pub(crate) fn backend(&self) -> Option<&dyn PdfBackend> {
        self.backend.as_deref()
    }

    /// Mutable access to the engine. Any rendered page may be stale after
    /// this, so the render cache is dropped.
    pub(crate) fn backend_mut(&mut self) -> Option<&mut (dyn PdfBackend + 'static)> {
        self.render_cache.clear();
        self.backend.as_deref_mut()
    }

    // Rendering

    pub fn render_page(&self, index: usize, zoom: f32) -> Option<RenderImage> {
        if !zoom.is_finite() || zoom <= 0.0 {
            return None;
        }
        let backend = self.backend.as_ref()?;
        if index >= backend.page_count() {
            return None;
        }

        let key = CacheKey::new(index, zoom);
        if let Some(image) = self.render_cache.get(&key) {
            return Some(image);
        }
        match backend.render_page(index, zoom) {
            Ok(image) => {
                self.render_cache.store(key, &image, self.current_page);
                Some(image)
            }
            Err(err) => {
                warn!(?err, page = index, zoom, "failed to render page");
                None
            }
        }
    }

    pub fn render_current(&self, zoom: f32) -> Option<RenderImage> {
        self.render_page(self.current_page, zoom)
    }

    pub fn render_thumbnail(&self, index: usize) -> Option<RenderImage> {
        self.render_page(index, THUMBNAIL_ZOOM)
    }

    // Navigation

    /// Moves to a 1-based page number.
    pub fn go_to(&mut self, page_number: usize) -> bool {
        if page_number == 0 || page_number > self.page_count() {
            return false;
        }
        self.move_to(page_number - 1);
        true
    }

    /// Moves to a 0-based page index.
    pub fn set_current_page(&mut self, index: usize) -> bool {
        if index >= self.page_count() {
            return false;
        }
        self.move_to(index);
        true
    }

    pub fn next(&mut self) -> bool {
        let count = self.page_count();
        if count == 0 || self.current_page + 1 >= count {
            return false;
        }
        self.move_to(self.current_page + 1);
        true
    }

    pub fn previous(&mut self) -> bool {
        if !self.is_loaded() || self.current_page == 0 {
            return false;
        }
        self.move_to(self.current_page - 1);
        true
    }

    fn move_to(&mut self, index: usize) {
        self.current_page = index;
        self.persist_bookmark();
    }

    fn persist_bookmark(&self) {
        let Some(key) = self.bookmark_key.as_deref() else {
            return;
        };
        if let Err(err) = self.bookmarks.set(key, self.current_page) {
            warn!(?err, key, page = self.current_page, "failed to save bookmark");
        }
    }

    // Rotation

    pub fn rotation(&self, index: usize) -> Rotation {
        let Some(backend) = self.backend.as_ref() else {
            return Rotation::NONE;
        };
        if index >= backend.page_count() {
            return Rotation::NONE;
        }
        backend.rotation(index).unwrap_or_else(|err| {
            warn!(?err, page = index, "failed to read rotation");
            Rotation::NONE
        })
    }

    /// Adds `delta` degrees to the page rotation and returns the new absolute
    /// rotation.
    pub fn rotate(&mut self, index: usize, delta: i32) -> Result<Rotation> {
        let backend = self.backend.as_ref().ok_or(Error::NoDocument)?;
        if index >= backend.page_count() {
            return Err(Error::range(format!(
                "page index {} out of range (page count {})",
                index,
                backend.page_count()
            )));
        }
        let current = backend
            .rotation(index)
            .map_err(|err| Error::range(format!("failed to read rotation: {err:#}")))?;
        let next = current
            .rotated_by(delta)
            .ok_or_else(|| Error::range(format!("rotation must be a multiple of 90, got {delta}")))?;

        let backend = self.backend_mut().ok_or(Error::NoDocument)?;
        backend
            .set_rotation(index, next)
            .map_err(|err| Error::range(format!("failed to rotate page {index}: {err:#}")))?;
        debug!(page = index, from = %current, to = %next, "page rotated");
        Ok(next)
    }

    pub fn rotate_current(&mut self, delta: i32) -> Result<Rotation> {
        self.rotate(self.current_page, delta)
    }

    pub fn rotate_all(&mut self, delta: i32) -> Result<()> {
        if Rotation::NONE.rotated_by(delta).is_none() {
            return Err(Error::range(format!(
                "rotation must be a multiple of 90, got {delta}"
            )));
        }
        for index in 0..self.page_count() {
            self.rotate(index, delta)?;
        }
        Ok(())
    }

    // Page structure

    /// Deletes one page. The last remaining page is never deleted.
    pub fn delete_page(&mut self, index: usize) -> bool {
        let count = self.page_count();
        if count <= 1 || index >= count {
            return false;
        }
        let Some(backend) = self.backend_mut() else {
            return false;
        };
        if let Err(err) = backend.delete_page(index) {
            warn!(?err, page = index, "failed to delete page");
            return false;
        }
        self.clamp_current_page();
        true
    }

    pub fn delete_current_page(&mut self) -> bool {
        self.delete_page(self.current_page)
    }

    /// The pages `delete_pages` would remove for `indices`: in range,
    /// deduplicated and ascending. Empty when nothing is in range or when
    /// removing them would leave the document without pages.
    pub fn deletable_pages(&self, indices: &[usize]) -> Vec<usize> {
        let count = self.page_count();
        let mut targets: Vec<usize> = indices.iter().copied().filter(|&i| i < count).collect();
        targets.sort_unstable();
        targets.dedup();
        if targets.len() >= count {
            return Vec::new();
        }
        targets
    }

    /// Whether `insert_page(position)` would be accepted.
    pub fn can_insert_page(&self, position: Option<usize>) -> bool {
        self.is_loaded() && position.map_or(true, |position| position <= self.page_count())
    }

    /// Deletes several pages, highest index first so earlier deletions do not
    /// shift the pages still to be removed. Out-of-range indices are skipped.
    /// Returns how many pages were removed.
    pub fn delete_pages(&mut self, indices: &[usize]) -> usize {
        let targets = self.deletable_pages(indices);
        if targets.is_empty() {
            if !indices.is_empty() {
                warn!(count = self.page_count(), ?indices, "no deletable pages in selection");
            }
            return 0;
        }

        let Some(backend) = self.backend_mut() else {
            return 0;
        };
        let mut removed = 0;
        for &index in targets.iter().rev() {
            match backend.delete_page(index) {
                Ok(()) => removed += 1,
                Err(err) => warn!(?err, page = index, "failed to delete page"),
            }
        }
        self.clamp_current_page();
        removed
    }

    /// Inserts a blank page at a 0-based position, or appends when `None`.
    /// Inserting at or before the current page keeps the same content in view.
    pub fn insert_page(&mut self, position: Option<usize>) -> bool {
        if !self.can_insert_page(position) {
            return false;
        }
        let count = self.page_count();
        let Some(backend) = self.backend_mut() else {
            return false;
        };
        if let Err(err) = backend.insert_page(position) {
            warn!(?err, ?position, "failed to insert page");
            return false;
        }
        if let Some(position) = position {
            if position <= self.current_page && count > 0 {
                self.current_page += 1;
                self.persist_bookmark();
            }
        }
        true
    }

    /// Inserts a blank page after the current one and moves onto it.
    pub fn insert_page_after_current(&mut self) -> bool {
        let position = self.current_page + 1;
        let Some(backend) = self.backend_mut() else {
            return false;
        };
        if let Err(err) = backend.insert_page(Some(position)) {
            warn!(?err, position, "failed to insert page");
            return false;
        }
        self.move_to(position);
        true
    }

    /// Inserts a blank page before the current one and moves onto it.
    pub fn insert_page_before_current(&mut self) -> bool {
        let position = self.current_page;
        let Some(backend) = self.backend_mut() else {
            return false;
        };
        if let Err(err) = backend.insert_page(Some(position)) {
            warn!(?err, position, "failed to insert page");
            return false;
        }
        self.move_to(position);
        true
    }

    fn clamp_current_page(&mut self) {
        self.current_page = clamp_page(self.current_page, self.page_count());
    }

    // Persistence

    /// Incrementally rewrites the document's own file.
    #[instrument(skip(self))]
    pub fn save(&mut self) -> Result<()> {
        if !self.is_loaded() {
            return Err(Error::NoDocument);
        }
        let path = self.path.clone().ok_or(Error::NoSavePath)?;
        let backend = self.backend_mut().ok_or(Error::NoDocument)?;
        backend
            .save(&path, SaveMode::Incremental)
            .map_err(|err| Error::save(&path, err))?;
        debug!(path = %path.display(), "document saved");
        Ok(())
    }

    /// Writes a rebuilt copy to `path` (appending `.pdf` when missing) and
    /// adopts it as the document's identity.
    #[instrument(skip(self))]
    pub fn save_as(&mut self, path: &Path) -> Result<PathBuf> {
        let path = ensure_pdf_extension(path);
        let backend = self.backend_mut().ok_or(Error::NoDocument)?;
        backend
            .save(&path, SaveMode::Full)
            .map_err(|err| Error::save(&path, err))?;
        self.bookmark_key = Some(bookmark_key(&path));
        self.path = Some(path.clone());
        self.persist_bookmark();
        debug!(path = %path.display(), "document saved as");
        Ok(path)
    }

    /// Copies the given pages (deduplicated, ascending, out-of-range skipped)
    /// into a new file.
    #[instrument(skip(self, indices))]
    pub fn export_pages(&self, indices: &[usize], path: &Path) -> Result<PathBuf> {
        let backend = self.backend.as_ref().ok_or(Error::NoDocument)?;
        let count = backend.page_count();
        let mut pages: Vec<usize> = indices.iter().copied().filter(|&i| i < count).collect();
        pages.sort_unstable();
        pages.dedup();

        let path = ensure_pdf_extension(path);
        if pages.is_empty() {
            return Err(Error::Save {
                path,
                reason: "no valid pages to export".to_string(),
            });
        }
        backend
            .export_pages(&pages, &path)
            .map_err(|err| Error::save(&path, err))?;
        debug!(path = %path.display(), pages = pages.len(), "pages exported");
        Ok(path)
    }
}

pub(crate) fn clamp_page(index: usize, page_count: usize) -> usize {
    index.min(page_count.saturating_sub(1))
}

const CACHE_CAPACITY: usize = 10;

#[derive(Default)]
struct RenderCache {
    entries: Mutex<HashMap<CacheKey, RenderImage>>,
}

impl RenderCache {
    fn get(&self, key: &CacheKey) -> Option<RenderImage> {
        self.entries.lock().get(key).cloned()
    }

    /// Keeps the entries closest to `reference_page` once over capacity.
    fn store(&self, key: CacheKey, image: &RenderImage, reference_page: usize) {
        let mut cache = self.entries.lock();
        cache.insert(key, image.clone());

        if cache.len() > CACHE_CAPACITY {
            let mut keys: Vec<_> = cache.keys().cloned().collect();
            keys.sort_by_key(|k| k.distance(reference_page));
            for stale in keys.into_iter().skip(CACHE_CAPACITY) {
                cache.remove(&stale);
            }
        }
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
struct CacheKey {
    page_index: usize,
    zoom_milli: u32,
}

impl CacheKey {
    fn new(page_index: usize, zoom: f32) -> Self {
        Self {
            page_index,
            zoom_milli: quantize_zoom(zoom),
        }
    }

    fn distance(&self, reference_page: usize) -> usize {
        self.page_index.abs_diff(reference_page)
    }
}

fn quantize_zoom(zoom: f32) -> u32 {
    let scaled = (zoom * 1000.0).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        1
    } else if scaled > u32::MAX as f32 {
        u32::MAX
    } else {
        scaled as u32
    }
}
