use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use image::{ImageFormat, RgbImage};
use pdfdesk_core::coords::SELECTION_MIN_PX;
use pdfdesk_core::{
    parse_page_list, AnnotationInfo, AnnotationMode, Command, EraseTarget, PageSelection,
    RedactionOutcome, RenderImage, SelectionOutcome, Session,
};
use pdfdesk_services::{
    spawn_summarize, spawn_translate, GeminiSummarizer, MyMemoryTranslator, SummarizeRequest,
    TranslateRequest,
};
use serde_json::json;
use tracing::info;

use crate::cli::Commands;
use crate::config::AppConfig;

pub async fn run(command: Commands, mut session: Session, config: &AppConfig) -> Result<()> {
    let session = &mut session;
    match command {
        Commands::Info { file, json } => {
            open(session, &file)?;
            print_info(session, json)
        }
        Commands::Render {
            file,
            page,
            zoom,
            thumbnail,
            output,
        } => {
            open(session, &file)?;
            if let Some(page) = page {
                go_to(session, page)?;
            }
            if let Some(zoom) = zoom {
                session.set_zoom(zoom);
            }
            render(session, &file, thumbnail, output)
        }
        Commands::Text { file, pages, rect, page } => {
            open(session, &file)?;
            match (rect, page) {
                (Some(rect), Some(page)) => {
                    go_to(session, page)?;
                    println!("{}", session.document().text_in_rect(rect));
                }
                _ => {
                    let indices = page_indices(session, pages.as_deref())?;
                    println!("{}", session.document().pages_text(&indices));
                }
            }
            Ok(())
        }
        Commands::Search { file, query, json } => {
            open(session, &file)?;
            search(session, query, json)
        }
        Commands::Annotations { file, page, json } => {
            open(session, &file)?;
            list_annotations(session, page, json)
        }
        Commands::Annotate {
            file,
            mode,
            rect,
            page,
            text,
            output,
        } => {
            open(session, &file)?;
            go_to(session, page)?;
            let index = session.document().current_page();
            let page_size = session
                .document()
                .page_size(index)
                .ok_or_else(|| anyhow!("page {page} has no size"))?;
            let mode = AnnotationMode::from(mode);
            // Page points are passed as a device selection at scale 1.
            let outcome = session.apply_selection(mode, rect, page_size, text.as_deref());
            report_selection(mode, outcome)?;
            persist(session, output.output)
        }
        Commands::Erase {
            file,
            page,
            point,
            rect,
            all,
            output,
        } => {
            open(session, &file)?;
            go_to(session, page)?;
            let removed = match (point, rect) {
                _ if all => session.annotations().clear_page(),
                (Some(point), _) => session.annotations().erase(EraseTarget::Point(point)),
                (None, Some(rect)) => session.annotations().erase(EraseTarget::Rect(rect)),
                (None, None) => bail!("choose --point, --rect or --all"),
            };
            println!("removed {removed} annotation(s) from page {page}");
            if removed > 0 {
                persist(session, output.output)?;
            }
            Ok(())
        }
        Commands::Rotate {
            file,
            degrees,
            page,
            all,
            output,
        } => {
            open(session, &file)?;
            if all {
                session.apply(Command::RotateAll { delta: degrees })?;
            } else {
                if let Some(page) = page {
                    go_to(session, page)?;
                }
                session.apply(Command::RotateCurrent { delta: degrees })?;
            }
            let current = session.document().current_page();
            println!(
                "page {} is now rotated {}",
                current + 1,
                session.document().rotation(current)
            );
            persist(session, output.output)
        }
        Commands::Delete {
            file,
            pages,
            output,
        } => {
            open(session, &file)?;
            let before = session.document().page_count();
            let indices = parse_page_list(&pages, before)?;
            if indices.len() >= before {
                bail!("refusing to delete every page of the document");
            }
            session.apply(Command::DeletePages { indices })?;
            let after = session.document().page_count();
            println!("deleted {} page(s), {} remaining", before - after, after);
            persist(session, output.output)
        }
        Commands::Insert { file, at, output } => {
            open(session, &file)?;
            let count = session.document().page_count();
            let position = match at {
                Some(at) if at == 0 || at > count + 1 => {
                    bail!("position {at} is out of range (1..={})", count + 1)
                }
                Some(at) => Some(at - 1),
                None => None,
            };
            if !session.apply(Command::InsertPage { position })? {
                bail!("failed to insert a page");
            }
            println!(
                "inserted a blank page at {}, {} pages",
                position.map_or(count + 1, |p| p + 1),
                session.document().page_count()
            );
            persist(session, output.output)
        }
        Commands::Export {
            file,
            select,
            output,
        } => {
            open(session, &file)?;
            let selection = parse_selection(&select)?;
            let written = session.export(&selection, &output)?;
            println!("exported to {}", written.display());
            Ok(())
        }
        Commands::Translate {
            text,
            file,
            rect,
            page,
            from,
            to,
        } => {
            let text = match (text, file, rect) {
                (Some(text), _, _) => text,
                (None, Some(file), Some(rect)) => {
                    open(session, &file)?;
                    go_to(session, page)?;
                    selected_text(session, rect)?
                }
                _ => bail!("give text to translate, or --file with --rect"),
            };
            let request = TranslateRequest::new(&text, from, to)?;
            let translator = Arc::new(MyMemoryTranslator::from_config(&config.translation)?);
            let translated = spawn_translate(translator, request).await??;
            println!("{translated}");
            Ok(())
        }
        Commands::Summarize {
            file,
            pages,
            kind,
            language,
            api_key,
        } => {
            open(session, &file)?;
            let indices = page_indices(session, pages.as_deref())?;
            let text = session.document().pages_text(&indices);
            let request = SummarizeRequest::new(&text, kind.into(), language)?;

            let mut summarization = config.summarization.clone();
            if api_key.is_some() {
                summarization.api_key = api_key;
            }
            let summarizer = Arc::new(GeminiSummarizer::from_config(&summarization)?);
            let summary = spawn_summarize(summarizer, request).await??;
            println!("{summary}");
            Ok(())
        }
    }
}

fn open(session: &mut Session, file: &Path) -> Result<()> {
    session.load(file)?;
    info!(
        path = %file.display(),
        pages = session.document().page_count(),
        "document opened"
    );
    Ok(())
}

fn go_to(session: &mut Session, page: usize) -> Result<()> {
    let count = session.document().page_count();
    if page == 0 || page > count {
        bail!("page {page} is out of range (document has {count} pages)");
    }
    session.apply(Command::GotoPage { page })?;
    Ok(())
}

fn page_indices(session: &Session, pages: Option<&str>) -> Result<Vec<usize>> {
    let count = session.document().page_count();
    match pages {
        Some(list) => Ok(parse_page_list(list, count)?),
        None => Ok((0..count).collect()),
    }
}

/// Writes the document back to its file, or to `output` when given.
fn persist(session: &mut Session, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            let written = session.save_as(&path)?;
            println!("saved {}", written.display());
        }
        None => session.save()?,
    }
    Ok(())
}

fn print_info(session: &Session, json: bool) -> Result<()> {
    let document = session.document();
    let count = document.page_count();
    let pages: Vec<_> = (0..count)
        .map(|index| {
            let size = document.page_size(index).unwrap_or_default();
            (index + 1, size, document.rotation(index))
        })
        .collect();

    if json {
        let value = json!({
            "path": document.path().map(|p| p.display().to_string()),
            "pages": count,
            "current_page": document.current_page() + 1,
            "page_details": pages
                .iter()
                .map(|(number, size, rotation)| json!({
                    "page": number,
                    "width": size.width,
                    "height": size.height,
                    "rotation": rotation.degrees(),
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!(
        "{}: {count} page(s), open at page {}",
        document
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        document.current_page() + 1
    );
    for (number, size, rotation) in pages {
        println!(
            "  page {number}: {:.0} x {:.0} pt, rotated {rotation}",
            size.width, size.height
        );
    }
    Ok(())
}

fn render(
    session: &Session,
    file: &Path,
    thumbnail: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let document = session.document();
    let index = document.current_page();
    let image = if thumbnail {
        document.render_thumbnail(index)
    } else {
        document.render_page(index, session.zoom())
    }
    .ok_or_else(|| anyhow!("failed to render page {}", index + 1))?;

    let output = output.unwrap_or_else(|| default_png_path(file, index));
    to_rgb_image(&image)?
        .save_with_format(&output, ImageFormat::Png)
        .with_context(|| format!("failed to write {:?}", output))?;
    println!("{}", output.display());
    Ok(())
}

fn default_png_path(file: &Path, index: usize) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "page".to_string());
    file.with_file_name(format!("{stem}-p{}.png", index + 1))
}

fn to_rgb_image(render: &RenderImage) -> Result<RgbImage> {
    let row = render.width as usize * 3;
    if render.stride == 0 || (render.stride as usize) < row {
        bail!("render buffer has an invalid stride of {}", render.stride);
    }
    let mut pixels = Vec::with_capacity(row * render.height as usize);
    for line in render
        .pixels
        .chunks(render.stride as usize)
        .take(render.height as usize)
    {
        let line = line
            .get(..row)
            .ok_or_else(|| anyhow!("render buffer ends mid-row"))?;
        pixels.extend_from_slice(line);
    }
    RgbImage::from_raw(render.width, render.height, pixels)
        .ok_or_else(|| anyhow!("render buffer does not match its dimensions"))
}

fn search(session: &mut Session, query: String, json: bool) -> Result<()> {
    session.apply(Command::Search { query })?;
    let matches = session.search().matches();
    if json {
        let value: Vec<_> = matches
            .iter()
            .map(|m| {
                json!({
                    "page": m.page + 1,
                    "rect": m.rect,
                    "text": m.text,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    for m in matches {
        println!(
            "page {}: ({:.1}, {:.1})-({:.1}, {:.1}) {}",
            m.page + 1,
            m.rect.x0,
            m.rect.y0,
            m.rect.x1,
            m.rect.y1,
            m.text
        );
    }
    println!("{} match(es)", matches.len());
    Ok(())
}

fn list_annotations(session: &mut Session, page: Option<usize>, json: bool) -> Result<()> {
    let count = session.document().page_count();
    let original = session.document().current_page();
    let pages: Vec<usize> = match page {
        Some(page) => {
            go_to(session, page)?;
            vec![page - 1]
        }
        None => (0..count).collect(),
    };

    let mut found: Vec<(usize, AnnotationInfo)> = Vec::new();
    for index in pages {
        session.apply(Command::SelectPage { index })?;
        found.extend(session.annotations().list().into_iter().map(|a| (index, a)));
    }
    if page.is_none() {
        session.apply(Command::SelectPage { index: original })?;
    }

    if json {
        let value: Vec<_> = found
            .iter()
            .map(|(index, annotation)| json!({ "page": index + 1, "annotation": annotation }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    for (index, annotation) in &found {
        let contents = annotation.metadata.contents.as_deref().unwrap_or("");
        println!(
            "page {} {} {}: ({:.1}, {:.1})-({:.1}, {:.1}) {}",
            index + 1,
            annotation.id,
            annotation.kind,
            annotation.rect.x0,
            annotation.rect.y0,
            annotation.rect.x1,
            annotation.rect.y1,
            contents
        );
    }
    println!("{} annotation(s)", found.len());
    Ok(())
}

fn report_selection(mode: AnnotationMode, outcome: SelectionOutcome) -> Result<()> {
    match outcome {
        SelectionOutcome::Annotated(reference) => {
            println!("added {mode} annotation {} on page {}", reference.id, reference.page + 1);
        }
        SelectionOutcome::Redacted(RedactionOutcome::Redacted) => {
            println!("removed content under the selection");
        }
        SelectionOutcome::Redacted(RedactionOutcome::Covered) => {
            println!("the engine cannot remove content; the area was covered instead");
        }
        SelectionOutcome::Erased(removed) => println!("removed {removed} annotation(s)"),
        SelectionOutcome::NeedsText => bail!("--text is required for {mode} annotations"),
        SelectionOutcome::Ignored => bail!(
            "selection must be at least {SELECTION_MIN_PX} points on each side and on the page"
        ),
        SelectionOutcome::Failed => bail!("{mode} failed; see the log for details"),
        SelectionOutcome::NoText | SelectionOutcome::TextForTranslation(_) => {
            bail!("{mode} does not produce text")
        }
    }
    Ok(())
}

fn selected_text(session: &mut Session, rect: pdfdesk_core::Rect) -> Result<String> {
    let index = session.document().current_page();
    let page_size = session
        .document()
        .page_size(index)
        .ok_or_else(|| anyhow!("page {} has no size", index + 1))?;
    match session.apply_selection(AnnotationMode::Translate, rect, page_size, None) {
        SelectionOutcome::TextForTranslation(text) => Ok(text),
        SelectionOutcome::NoText => bail!("No text found in the selection!"),
        _ => bail!("selection must be at least {SELECTION_MIN_PX} points on each side"),
    }
}

/// `all`, `current`, `N-M`, or a page list.
fn parse_selection(input: &str) -> Result<PageSelection> {
    let trimmed = input.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "all" => return Ok(PageSelection::All),
        "current" => return Ok(PageSelection::Current),
        _ => {}
    }
    if let Some((start, end)) = trimmed.split_once('-') {
        if let (Ok(start), Ok(end)) = (start.trim().parse(), end.trim().parse()) {
            if !trimmed.contains(',') {
                return Ok(PageSelection::Range { start, end });
            }
        }
    }
    Ok(PageSelection::List(trimmed.to_string()))
}
