use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which pages an export writes. Page numbers are 1-based, as typed by users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSelection {
    Current,
    All,
    Range { start: usize, end: usize },
    /// Comma separated pages and ranges, e.g. `"1,3,5-7"`.
    List(String),
}

impl PageSelection {
    /// Resolves to ascending, distinct 0-based indices.
    pub fn resolve(&self, page_count: usize, current_page: usize) -> Result<Vec<usize>> {
        if page_count == 0 {
            return Err(Error::NoDocument);
        }
        let pages = match self {
            PageSelection::Current => vec![current_page.min(page_count - 1)],
            PageSelection::All => (0..page_count).collect(),
            PageSelection::Range { start, end } => {
                if *start == 0 || *end == 0 {
                    return Err(Error::range("page numbers start at 1"));
                }
                if start > end {
                    return Err(Error::range(format!(
                        "range start {start} is after range end {end}"
                    )));
                }
                if *start > page_count {
                    return Err(Error::range(format!(
                        "page {start} exceeds document page count ({page_count})"
                    )));
                }
                (start - 1..(*end).min(page_count)).collect()
            }
            PageSelection::List(input) => parse_page_list(input, page_count)?,
        };
        Ok(pages)
    }
}

/// Parses `"1,3,5-7"` into sorted, deduplicated 0-based indices. Entries past
/// the last page are dropped; malformed entries are an error, as is a list
/// that selects nothing.
pub fn parse_page_list(input: &str, page_count: usize) -> Result<Vec<usize>> {
    let mut pages = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start_str, end_str)) = part.split_once('-') {
            let start = parse_page_number(start_str)?;
            let end = parse_page_number(end_str)?;
            if start > end {
                return Err(Error::range(format!("invalid page range: '{part}'")));
            }
            pages.extend((start..=end.min(page_count)).map(|p| p - 1));
        } else {
            let page = parse_page_number(part)?;
            if page <= page_count {
                pages.push(page - 1);
            }
        }
    }

    pages.sort_unstable();
    pages.dedup();
    if pages.is_empty() {
        return Err(Error::range(format!("no valid pages in '{}'", input.trim())));
    }
    Ok(pages)
}

fn parse_page_number(raw: &str) -> Result<usize> {
    let raw = raw.trim();
    let page: usize = raw
        .parse()
        .map_err(|_| Error::range(format!("invalid page number: '{raw}'")))?;
    if page == 0 {
        return Err(Error::range("page 0 is invalid (pages start at 1)"));
    }
    Ok(page)
}

/// Appends `.pdf` unless the path already ends with it (any case).
pub fn ensure_pdf_extension(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => path.to_path_buf(),
        _ => {
            let mut raw = path.as_os_str().to_owned();
            raw.push(".pdf");
            PathBuf::from(raw)
        }
    }
}
