use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pdfdesk_core::{AnnotationMode, Point, Rect};
use pdfdesk_services::SummaryType;

#[derive(Debug, Parser)]
#[command(name = "pdfdesk", version, about = "View, annotate and edit PDF documents")]
pub struct Cli {
    /// Configuration file (default: config.toml in the platform config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Bookmark file overriding the configured one
    #[arg(long, global = true, value_name = "FILE")]
    pub bookmarks: Option<PathBuf>,

    /// Document engine
    #[arg(long, global = true, value_enum, default_value_t = EngineKind::Pdfium)]
    pub engine: EngineKind,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    Pdfium,
    /// JSON documents handled in memory, for scripting and tests
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Highlight,
    Underline,
    Strikeout,
    Note,
    FreeText,
    RemoveText,
    Erase,
}

impl From<Mode> for AnnotationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Highlight => AnnotationMode::Highlight,
            Mode::Underline => AnnotationMode::Underline,
            Mode::Strikeout => AnnotationMode::Strikeout,
            Mode::Note => AnnotationMode::Note,
            Mode::FreeText => AnnotationMode::FreeText,
            Mode::RemoveText => AnnotationMode::RemoveText,
            Mode::Erase => AnnotationMode::Erase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummaryKind {
    Brief,
    Detailed,
    Bullet,
    KeyPoints,
}

impl From<SummaryKind> for SummaryType {
    fn from(kind: SummaryKind) -> Self {
        match kind {
            SummaryKind::Brief => SummaryType::Brief,
            SummaryKind::Detailed => SummaryType::Detailed,
            SummaryKind::Bullet => SummaryType::Bullet,
            SummaryKind::KeyPoints => SummaryType::KeyPoints,
        }
    }
}

/// Where a changed document is written.
#[derive(Debug, Args)]
pub struct Output {
    /// Write to this file instead of updating the input in place
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print page count, bookmark and per-page details
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Render a page to PNG
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Page number (1-based). Default: the bookmarked page
        #[arg(short, long)]
        page: Option<usize>,

        #[arg(short, long)]
        zoom: Option<f32>,

        /// Render at thumbnail scale
        #[arg(long, conflicts_with = "zoom")]
        thumbnail: bool,

        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Extract text
    Text {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Page list (e.g. '1,3-5'). Default: all pages
        #[arg(long, conflicts_with = "rect")]
        pages: Option<String>,

        /// Only text inside x0,y0,x1,y1 (points) on --page
        #[arg(long, value_parser = parse_rect, requires = "page")]
        rect: Option<Rect>,

        #[arg(short, long)]
        page: Option<usize>,
    },

    /// Find every occurrence of a phrase
    Search {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        query: String,

        #[arg(long)]
        json: bool,
    },

    /// List annotations
    Annotations {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Page number (1-based). Default: all pages
        #[arg(short, long)]
        page: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Apply an annotation tool to a rectangle on a page
    Annotate {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long, value_enum)]
        mode: Mode,

        /// x0,y0,x1,y1 in points from the top-left corner
        #[arg(long, value_parser = parse_rect)]
        rect: Rect,

        #[arg(short, long, default_value_t = 1)]
        page: usize,

        /// Content of a note or free-text box
        #[arg(long)]
        text: Option<String>,

        #[command(flatten)]
        output: Output,
    },

    /// Remove annotations at a point, inside a rectangle, or on a whole page
    Erase {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(short, long, default_value_t = 1)]
        page: usize,

        #[arg(long, value_parser = parse_point, conflicts_with_all = ["rect", "all"])]
        point: Option<Point>,

        #[arg(long, value_parser = parse_rect, conflicts_with = "all")]
        rect: Option<Rect>,

        #[arg(long)]
        all: bool,

        #[command(flatten)]
        output: Output,
    },

    /// Rotate one page or every page
    Rotate {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Clockwise degrees, a multiple of 90
        #[arg(short, long, allow_hyphen_values = true, default_value_t = 90)]
        degrees: i32,

        #[arg(short, long, conflicts_with = "all")]
        page: Option<usize>,

        #[arg(long)]
        all: bool,

        #[command(flatten)]
        output: Output,
    },

    /// Delete pages
    Delete {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Page list (e.g. '2,4-6')
        #[arg(long)]
        pages: String,

        #[command(flatten)]
        output: Output,
    },

    /// Insert a blank page
    Insert {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Position the new page takes (1-based). Default: append
        #[arg(long)]
        at: Option<usize>,

        #[command(flatten)]
        output: Output,
    },

    /// Copy selected pages into a new document
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// all, current, a range like 2-5, or a list like 1,3,5-7
        #[arg(long, default_value = "all")]
        select: String,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Translate text, or the text inside a rectangle of a document
    Translate {
        /// Text to translate; omitted when --file is given
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        text: Option<String>,

        #[arg(long, value_name = "FILE", requires = "rect")]
        file: Option<PathBuf>,

        #[arg(long, value_parser = parse_rect)]
        rect: Option<Rect>,

        #[arg(short, long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value = "en")]
        from: String,

        #[arg(long, default_value = "vi")]
        to: String,
    },

    /// Summarize document text
    Summarize {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Page list (e.g. '1,3-5'). Default: all pages
        #[arg(long)]
        pages: Option<String>,

        #[arg(long = "type", value_enum, default_value_t = SummaryKind::Brief)]
        kind: SummaryKind,

        #[arg(long, default_value = "en")]
        language: String,

        /// Gemini API key; overrides the config and GEMINI_API_KEY
        #[arg(long)]
        api_key: Option<String>,
    },
}

fn parse_numbers<const N: usize>(input: &str) -> Result<[f32; N], String> {
    let values: Vec<f32> = input
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|err| format!("invalid number in {input:?}: {err}"))?;
    let values: [f32; N] = values
        .try_into()
        .map_err(|_| format!("expected {N} comma separated numbers, got {input:?}"))?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err(format!("{input:?} contains a non-finite value"));
    }
    Ok(values)
}

pub fn parse_rect(input: &str) -> Result<Rect, String> {
    let [x0, y0, x1, y1] = parse_numbers::<4>(input)?;
    Ok(Rect::new(x0, y0, x1, y1).normalized())
}

pub fn parse_point(input: &str) -> Result<Point, String> {
    let [x, y] = parse_numbers::<2>(input)?;
    Ok(Point::new(x, y))
}
