use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The file is missing, unreadable, or not a document the engine accepts.
    #[error("failed to open {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("no document is loaded")]
    NoDocument,

    /// The document has never been written to disk; callers fall back to save-as.
    #[error("document has no file path; use save-as")]
    NoSavePath,

    #[error("failed to save {path:?}: {reason}")]
    Save { path: PathBuf, reason: String },

    #[error("annotation failed: {reason}")]
    Annotation { reason: String },

    #[error("{0}")]
    Range(String),

    #[error("search failed on page {page}: {reason}")]
    Scan { page: usize, reason: String },
}

impl Error {
    pub(crate) fn open(path: impl Into<PathBuf>, err: anyhow::Error) -> Self {
        Error::Open {
            path: path.into(),
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn save(path: impl Into<PathBuf>, err: anyhow::Error) -> Self {
        Error::Save {
            path: path.into(),
            reason: format!("{err:#}"),
        }
    }

    pub(crate) fn annotation(err: impl std::fmt::Display) -> Self {
        Error::Annotation {
            reason: err.to_string(),
        }
    }

    pub(crate) fn range(message: impl Into<String>) -> Self {
        Error::Range(message.into())
    }
}
