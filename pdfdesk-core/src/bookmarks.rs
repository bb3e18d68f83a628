use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Last-viewed page per document path.
pub trait BookmarkStore: Send + Sync {
    fn get(&self, key: &str) -> Option<usize>;
    fn set(&self, key: &str, page: usize) -> Result<()>;
}

/// Bookmarks are keyed by the absolute path of the document. Relative paths
/// are resolved against the working directory; a path that cannot be resolved
/// is used as given.
pub fn bookmark_key(path: &Path) -> String {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    resolved.to_string_lossy().into_owned()
}

/// JSON sidecar holding the whole mapping. It is read once on construction
/// and rewritten in full on every update.
pub struct FileBookmarkStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, usize>>,
}

impl FileBookmarkStore {
    /// Missing or unreadable files yield an empty mapping.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(Some(entries)) => entries,
            Ok(None) => BTreeMap::new(),
            Err(err) => {
                warn!(?err, path = %path.display(), "ignoring unreadable bookmark file");
                BTreeMap::new()
            }
        };
        debug!(count = entries.len(), path = %path.display(), "loaded bookmarks");
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> BTreeMap<String, usize> {
        self.entries.lock().clone()
    }

    fn write(&self, entries: &BTreeMap<String, usize>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create bookmark directory at {:?}", parent)
                })?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(entries)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp bookmark file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace bookmark file {:?}", self.path))?;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<Option<BTreeMap<String, usize>>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read bookmark file {:?}", path))?;
    let entries = serde_json::from_str(&raw)
        .with_context(|| format!("failed to decode bookmark file {:?}", path))?;
    Ok(Some(entries))
}

impl BookmarkStore for FileBookmarkStore {
    fn get(&self, key: &str) -> Option<usize> {
        self.entries.lock().get(key).copied()
    }

    fn set(&self, key: &str, page: usize) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_owned(), page);
        self.write(&entries)
    }
}

#[derive(Default)]
pub struct MemoryBookmarkStore {
    inner: Mutex<BTreeMap<String, usize>>,
}

impl MemoryBookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BookmarkStore for MemoryBookmarkStore {
    fn get(&self, key: &str) -> Option<usize> {
        self.inner.lock().get(key).copied()
    }

    fn set(&self, key: &str, page: usize) -> Result<()> {
        self.inner.lock().insert(key.to_owned(), page);
        Ok(())
    }
}
