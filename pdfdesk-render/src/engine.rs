use std::fs;
use std::mem;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use pdfdesk_core::{
    AnnotationId, AnnotationInfo, AnnotationKind, AnnotationMetadata, AnnotationSpec, Color,
    DocumentEngine, MarkupKind, PdfBackend, Rect, RenderImage, Rotation, SaveMode, TextHit,
};
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

const NOTE_ICON_SIZE: f32 = 20.0;

pub struct PdfiumEngine {
    pdfium: Arc<Pdfium>,
}

impl PdfiumEngine {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_build_hint() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

impl DocumentEngine for PdfiumEngine {
    #[instrument(skip(self))]
    fn open(&self, path: &Path) -> Result<Box<dyn PdfBackend>> {
        let document = self
            .pdfium
            .load_pdf_from_file(path, None)
            .with_context(|| format!("failed to open {:?}", path))?;
        Ok(Box::new(PdfiumDocument::new(
            detach(document),
            Arc::clone(&self.pdfium),
        )))
    }

    fn create(&self) -> Result<Box<dyn PdfBackend>> {
        let mut document = self
            .pdfium
            .create_new_pdf()
            .context("failed to create an empty document")?;
        document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .context("failed to add a blank page")?;
        Ok(Box::new(PdfiumDocument::new(
            detach(document),
            Arc::clone(&self.pdfium),
        )))
    }
}

// SAFETY: a PdfDocument borrows the Pdfium bindings it was loaded with. Each
// PdfiumDocument stores its document next to a clone of the Arc<Pdfium> that
// produced it, declared after the document so it is dropped later; the
// bindings therefore outlive every document that references them.
fn detach(document: PdfDocument<'_>) -> PdfDocument<'static> {
    unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) }
}

/// One opened document.
///
/// Pdfium identifies annotations only by their position on the page, so
/// stable ids are kept in a per-page list parallel to Pdfium's order.
pub struct PdfiumDocument {
    document: PdfDocument<'static>,
    annotation_ids: Vec<Vec<AnnotationId>>,
    next_id: u64,
    pdfium: Arc<Pdfium>,
}

impl PdfiumDocument {
    fn new(document: PdfDocument<'static>, pdfium: Arc<Pdfium>) -> Self {
        let mut this = Self {
            document,
            annotation_ids: Vec::new(),
            next_id: 1,
            pdfium,
        };
        let counts: Vec<usize> = this
            .document
            .pages()
            .iter()
            .map(|page| page.annotations().len())
            .collect();
        for (index, count) in counts.into_iter().enumerate() {
            this.annotation_ids.push(Vec::new());
            this.assign_ids(index, count);
        }
        this
    }

    fn page(&self, index: usize) -> Result<PdfPage<'static>> {
        self.document
            .pages()
            .get(page_index(index)?)
            .with_context(|| format!("page {} out of range", index))
    }

    /// Gives every annotation past the known ones on `index` a fresh id.
    fn assign_ids(&mut self, index: usize, count: usize) {
        let Some(ids) = self.annotation_ids.get_mut(index) else {
            return;
        };
        ids.truncate(count);
        while ids.len() < count {
            ids.push(AnnotationId(self.next_id));
            self.next_id += 1;
        }
    }

    fn create_annotation(&self, page: &mut PdfPage<'static>, spec: &AnnotationSpec) -> Result<()> {
        let height = page.height().value;
        let annotations = page.annotations_mut();
        match spec {
            AnnotationSpec::Markup {
                kind,
                rect,
                color,
                opacity,
            } => {
                let bounds = to_pdf_rect(*rect, height);
                let color = pdf_color(*color, *opacity);
                let quad = PdfQuadPoints::from_rect(&bounds);
                match kind {
                    MarkupKind::Highlight => {
                        let mut annotation = annotations.create_highlight_annotation()?;
                        annotation
                            .attachment_points_mut()
                            .create_attachment_point_at_end(quad)?;
                        decorate(&mut annotation, bounds, Some(color), Some(color), None)?;
                    }
                    MarkupKind::Underline => {
                        let mut annotation = annotations.create_underline_annotation()?;
                        annotation
                            .attachment_points_mut()
                            .create_attachment_point_at_end(quad)?;
                        decorate(&mut annotation, bounds, Some(color), None, None)?;
                    }
                    MarkupKind::Strikeout => {
                        let mut annotation = annotations.create_strikeout_annotation()?;
                        annotation
                            .attachment_points_mut()
                            .create_attachment_point_at_end(quad)?;
                        decorate(&mut annotation, bounds, Some(color), None, None)?;
                    }
                }
            }
            AnnotationSpec::Note {
                at,
                text,
                color,
                opacity,
                ..
            } => {
                let bounds = to_pdf_rect(
                    Rect::from_origin_size(at.x, at.y, NOTE_ICON_SIZE, NOTE_ICON_SIZE),
                    height,
                );
                let mut annotation = annotations.create_text_annotation(text)?;
                decorate(
                    &mut annotation,
                    bounds,
                    None,
                    Some(pdf_color(*color, *opacity)),
                    Some(text),
                )?;
            }
            AnnotationSpec::FreeText {
                rect,
                text,
                text_color,
                background,
                border_width,
                ..
            } => {
                let bounds = to_pdf_rect(*rect, height);
                let stroke = (*border_width > 0.0).then(|| pdf_color(*text_color, 1.0));
                let mut annotation = annotations.create_free_text_annotation(text)?;
                decorate(
                    &mut annotation,
                    bounds,
                    stroke,
                    Some(pdf_color(*background, 1.0)),
                    Some(text),
                )?;
            }
            AnnotationSpec::Square {
                rect,
                stroke,
                fill,
                opacity,
            } => {
                let bounds = to_pdf_rect(*rect, height);
                let mut annotation = annotations.create_square_annotation()?;
                decorate(
                    &mut annotation,
                    bounds,
                    stroke.map(|c| pdf_color(c, *opacity)),
                    fill.map(|c| pdf_color(c, *opacity)),
                    None,
                )?;
            }
        }
        Ok(())
    }
}

impl PdfBackend for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_rect(&self, index: usize) -> Result<Rect> {
        let page = self.page(index)?;
        Ok(Rect::new(0.0, 0.0, page.width().value, page.height().value))
    }

    fn rotation(&self, index: usize) -> Result<Rotation> {
        let page = self.page(index)?;
        let rotation = page
            .rotation()
            .with_context(|| format!("failed to read rotation of page {}", index))?;
        Ok(rotation_from_pdfium(rotation))
    }

    fn set_rotation(&mut self, index: usize, rotation: Rotation) -> Result<()> {
        let mut page = self.page(index)?;
        page.set_rotation(rotation_to_pdfium(rotation));
        Ok(())
    }

    #[instrument(skip(self))]
    fn render_page(&self, index: usize, zoom: f32) -> Result<RenderImage> {
        let page = self.page(index)?;
        let config = PdfRenderConfig::new().scale_page_by_factor(zoom.max(0.01));
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", index))?;
        let image = bitmap.as_image().to_rgb8();
        let (width, height) = (image.width(), image.height());
        Ok(RenderImage {
            width,
            height,
            stride: width * 3,
            pixels: image.into_raw(),
        })
    }

    fn text_blocks(&self, index: usize) -> Result<Vec<Rect>> {
        let page = self.page(index)?;
        let height = page.height().value;
        let text = page
            .text()
            .with_context(|| format!("failed to extract text for page {}", index))?;
        let blocks = text
            .segments()
            .iter()
            .map(|segment| from_pdf_rect(&segment.bounds(), height))
            .collect();
        Ok(blocks)
    }

    fn page_text(&self, index: usize) -> Result<String> {
        let page = self.page(index)?;
        let text = page
            .text()
            .with_context(|| format!("failed to extract text for page {}", index))?;
        Ok(text.all())
    }

    fn text_in_rect(&self, index: usize, rect: Rect) -> Result<String> {
        let page = self.page(index)?;
        let height = page.height().value;
        let text = page
            .text()
            .with_context(|| format!("failed to extract text for page {}", index))?;
        Ok(text.inside_rect(to_pdf_rect(rect, height)))
    }

    fn search_page(&self, index: usize, query: &str) -> Result<Vec<TextHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let page = self.page(index)?;
        let height = page.height().value;
        let text = page
            .text()
            .with_context(|| format!("failed to extract text for page {}", index))?;
        let search = text
            .search(query, &PdfSearchOptions::new())
            .with_context(|| format!("failed to perform search on page {}", index))?;

        let mut hits = Vec::new();
        while let Some(segments) = search.find_next() {
            let bounds = segments
                .iter()
                .map(|segment| from_pdf_rect(&segment.bounds(), height))
                .reduce(union);
            if let Some(rect) = bounds {
                let text: String = segments.iter().map(|segment| segment.text()).collect();
                hits.push(TextHit { rect, text });
            }
        }
        Ok(hits)
    }

    fn annotations(&self, index: usize) -> Result<Vec<AnnotationInfo>> {
        let page = self.page(index)?;
        let height = page.height().value;
        let ids = self
            .annotation_ids
            .get(index)
            .ok_or_else(|| anyhow!("page {} out of range", index))?;

        let mut infos = Vec::new();
        for (annotation, id) in page.annotations().iter().zip(ids) {
            let rect = match annotation.bounds() {
                Ok(bounds) => from_pdf_rect(&bounds, height),
                Err(err) => {
                    warn!(?err, page = index, %id, "annotation without bounds");
                    continue;
                }
            };
            infos.push(AnnotationInfo {
                id: *id,
                kind: kind_from_pdfium(annotation.annotation_type()),
                rect,
                metadata: AnnotationMetadata {
                    contents: annotation.contents().filter(|s| !s.is_empty()),
                    author: annotation.creator().filter(|s| !s.is_empty()),
                    modified: annotation.modification_date().map(|d| d.to_string()),
                },
            });
        }
        Ok(infos)
    }

    fn add_annotation(&mut self, index: usize, spec: &AnnotationSpec) -> Result<AnnotationId> {
        let mut page = self.page(index)?;
        let before = page.annotations().len();
        let created = self.create_annotation(&mut page, spec);
        // Pdfium may have appended the annotation (and a popup) before failing.
        let after = page.annotations().len();
        self.assign_ids(index, after);
        created.with_context(|| format!("failed to add {} annotation", spec.kind()))?;

        self.annotation_ids
            .get(index)
            .and_then(|ids| ids.get(before))
            .copied()
            .ok_or_else(|| anyhow!("annotation was not added to page {}", index))
    }

    fn delete_annotation(&mut self, index: usize, id: AnnotationId) -> Result<()> {
        let position = self
            .annotation_ids
            .get(index)
            .and_then(|ids| ids.iter().position(|known| *known == id))
            .ok_or_else(|| anyhow!("annotation {} not found on page {}", id, index))?;
        let mut page = self.page(index)?;
        let annotation = page
            .annotations()
            .get(position)
            .with_context(|| format!("annotation {} vanished from page {}", id, index))?;
        page.annotations_mut()
            .delete_annotation(annotation)
            .with_context(|| format!("failed to delete annotation {}", id))?;
        self.annotation_ids[index].remove(position);
        Ok(())
    }

    fn apply_redaction(&mut self, _index: usize, _rect: Rect, _fill: Color) -> Result<()> {
        bail!("Pdfium cannot remove page content under a rectangle")
    }

    fn delete_page(&mut self, index: usize) -> Result<()> {
        self.page(index)?
            .delete()
            .with_context(|| format!("failed to delete page {}", index))?;
        self.annotation_ids.remove(index);
        Ok(())
    }

    fn insert_page(&mut self, position: Option<usize>) -> Result<()> {
        let count = self.page_count();
        let position = position.unwrap_or(count);
        if position > count {
            bail!("insert position {} out of range", position);
        }
        let destination = page_index(position)?;
        self.document
            .pages_mut()
            .create_page_at_index(PdfPagePaperSize::a4(), destination)
            .with_context(|| format!("failed to insert page at {}", position))?;
        self.annotation_ids.insert(position, Vec::new());
        Ok(())
    }

    /// Pdfium writes the whole file either way; it is staged next to the
    /// target and renamed so a failed write never truncates the original.
    #[instrument(skip(self))]
    fn save(&mut self, path: &Path, mode: SaveMode) -> Result<()> {
        let staging = path.with_extension("pdf.partial");
        self.document
            .save_to_file(&staging)
            .with_context(|| format!("failed to write {:?}", staging))?;
        fs::rename(&staging, path)
            .with_context(|| format!("failed to replace {:?}", path))?;
        debug!(path = %path.display(), ?mode, "document written");
        Ok(())
    }

    fn export_pages(&self, indices: &[usize], path: &Path) -> Result<()> {
        let mut exported = self
            .pdfium
            .create_new_pdf()
            .context("failed to create export document")?;
        for (destination, &source) in indices.iter().enumerate() {
            exported
                .pages_mut()
                .copy_page_from_document(
                    &self.document,
                    page_index(source)?,
                    page_index(destination)?,
                )
                .with_context(|| format!("failed to copy page {}", source))?;
        }
        exported
            .save_to_file(path)
            .with_context(|| format!("failed to write {:?}", path))?;
        Ok(())
    }
}

fn decorate<A: PdfPageAnnotationCommon>(
    annotation: &mut A,
    bounds: PdfRect,
    stroke: Option<PdfColor>,
    fill: Option<PdfColor>,
    contents: Option<&str>,
) -> Result<()> {
    annotation.set_bounds(bounds)?;
    if let Some(stroke) = stroke {
        annotation.set_stroke_color(stroke)?;
    }
    if let Some(fill) = fill {
        annotation.set_fill_color(fill)?;
    }
    if let Some(contents) = contents {
        annotation.set_contents(contents)?;
    }
    Ok(())
}

fn page_index(index: usize) -> Result<PdfPageIndex> {
    PdfPageIndex::try_from(index).map_err(|_| anyhow!("page {} is out of supported range", index))
}

/// Page space has its origin at the top-left corner; PDF user space at the
/// bottom-left.
fn to_pdf_rect(rect: Rect, page_height: f32) -> PdfRect {
    let r = rect.normalized();
    PdfRect::new_from_values(page_height - r.y1, r.x0, page_height - r.y0, r.x1)
}

fn from_pdf_rect(rect: &PdfRect, page_height: f32) -> Rect {
    Rect::new(
        rect.left().value,
        page_height - rect.top().value,
        rect.right().value,
        page_height - rect.bottom().value,
    )
    .normalized()
}

fn union(a: Rect, b: Rect) -> Rect {
    Rect::new(a.x0.min(b.x0), a.y0.min(b.y0), a.x1.max(b.x1), a.y1.max(b.y1))
}

fn pdf_color(color: Color, opacity: f32) -> PdfColor {
    let [r, g, b] = color.to_rgb8();
    let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    PdfColor::new(r, g, b, alpha)
}

fn rotation_from_pdfium(rotation: PdfPageRenderRotation) -> Rotation {
    let degrees = match rotation {
        PdfPageRenderRotation::None => 0,
        PdfPageRenderRotation::Degrees90 => 90,
        PdfPageRenderRotation::Degrees180 => 180,
        PdfPageRenderRotation::Degrees270 => 270,
    };
    Rotation::from_degrees(degrees).unwrap_or_default()
}

fn rotation_to_pdfium(rotation: Rotation) -> PdfPageRenderRotation {
    match rotation.degrees() {
        90 => PdfPageRenderRotation::Degrees90,
        180 => PdfPageRenderRotation::Degrees180,
        270 => PdfPageRenderRotation::Degrees270,
        _ => PdfPageRenderRotation::None,
    }
}

fn kind_from_pdfium(kind: PdfPageAnnotationType) -> AnnotationKind {
    match kind {
        PdfPageAnnotationType::Highlight => AnnotationKind::Highlight,
        PdfPageAnnotationType::Underline => AnnotationKind::Underline,
        PdfPageAnnotationType::Strikeout => AnnotationKind::Strikeout,
        PdfPageAnnotationType::Text => AnnotationKind::Note,
        PdfPageAnnotationType::FreeText => AnnotationKind::FreeText,
        PdfPageAnnotationType::Redacted => AnnotationKind::Redaction,
        PdfPageAnnotationType::Square => AnnotationKind::Square,
        _ => AnnotationKind::Other,
    }
}

fn bind_pdfium_from_build_hint() -> Option<Pdfium> {
    match option_env!("PDFDESK_PDFIUM_LIBRARY_PATH") {
        Some(path) if !path.is_empty() => match Pdfium::bind_to_library(path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!(%path, %err, "failed to load Pdfium from build-provided path");
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    let local_err = match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => err,
    };

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => Err(anyhow!(
            "failed to bind to a Pdfium library; ensure it is installed ({}: {}, system: {})",
            cwd_path.display(),
            local_err,
            err
        )),
    }
}
