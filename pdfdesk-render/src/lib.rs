//! Pdfium implementation of the `pdfdesk-core` document engine.

#[cfg(feature = "pdf")]
mod engine;

#[cfg(feature = "pdf")]
pub use engine::{PdfiumDocument, PdfiumEngine};
