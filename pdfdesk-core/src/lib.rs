pub mod annotations;
pub mod backend;
pub mod bookmarks;
pub mod coords;
pub mod document;
pub mod error;
pub mod export;
pub mod geometry;
pub mod memory;
pub mod mode;
pub mod search;
pub mod session;
mod text;

pub use annotations::{
    markup_defaults, AnnotationManager, EraseTarget, FreeTextStyle, NoteStyle, RedactionOutcome,
};
pub use backend::{
    AnnotationId, AnnotationInfo, AnnotationKind, AnnotationMetadata, AnnotationRef,
    AnnotationSpec, DocumentEngine, MarkupKind, PdfBackend, RenderImage, SaveMode, TextHit,
    BLANK_PAGE_SIZE,
};
pub use bookmarks::{bookmark_key, BookmarkStore, FileBookmarkStore, MemoryBookmarkStore};
pub use document::{DocumentHandle, PreparedDocument, THUMBNAIL_ZOOM};
pub use error::{Error, Result};
pub use export::{ensure_pdf_extension, parse_page_list, PageSelection};
pub use geometry::{Color, Point, Rect, Rotation, Size};
pub use mode::{AnnotationMode, SelectionOutcome, UnknownMode};
pub use search::{SearchEngine, SearchMatch, SearchState, SearchSummary};
pub use session::{Command, Session, SessionEvent};
