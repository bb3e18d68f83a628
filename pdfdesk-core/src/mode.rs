use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotations::RedactionOutcome;
use crate::backend::AnnotationRef;

/// What a drawn selection on the page does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationMode {
    Highlight,
    Underline,
    Strikeout,
    Note,
    FreeText,
    RemoveText,
    Erase,
    Translate,
    #[default]
    None,
}

impl AnnotationMode {
    pub const ALL: [AnnotationMode; 9] = [
        AnnotationMode::Highlight,
        AnnotationMode::Underline,
        AnnotationMode::Strikeout,
        AnnotationMode::Note,
        AnnotationMode::FreeText,
        AnnotationMode::RemoveText,
        AnnotationMode::Erase,
        AnnotationMode::Translate,
        AnnotationMode::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationMode::Highlight => "highlight",
            AnnotationMode::Underline => "underline",
            AnnotationMode::Strikeout => "strikeout",
            AnnotationMode::Note => "note",
            AnnotationMode::FreeText => "free-text",
            AnnotationMode::RemoveText => "remove-text",
            AnnotationMode::Erase => "erase",
            AnnotationMode::Translate => "translate",
            AnnotationMode::None => "none",
        }
    }

    /// Modes that need text from the user before the selection is committed.
    pub fn needs_text(&self) -> bool {
        matches!(self, AnnotationMode::Note | AnnotationMode::FreeText)
    }
}

impl fmt::Display for AnnotationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown annotation mode '{0}'")]
pub struct UnknownMode(pub String);

impl FromStr for AnnotationMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        AnnotationMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

/// Result of dispatching one selection.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Annotated(AnnotationRef),
    Redacted(RedactionOutcome),
    Erased(usize),
    /// Text under the selection, for the caller to hand to a translator.
    TextForTranslation(String),
    /// Note and free-text modes were invoked without their text.
    NeedsText,
    /// Translate mode found no text under the selection.
    NoText,
    /// The document refused the operation; the reason was logged.
    Failed,
    /// Too small to be a selection, no mode active, or nothing loaded.
    Ignored,
}
