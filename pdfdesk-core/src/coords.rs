//! Conversion between page space (PDF points) and device space (pixels of a
//! rendered page).
//!
//! Every rectangle handed to the annotation manager or the search engine is
//! in page space; anything that comes from a pointer must pass through
//! [`to_page`] first. Scaling is applied independently per axis.

use crate::geometry::{Point, Rect, Size};

/// Device-space selections smaller than this on either axis are treated as
/// accidental clicks rather than selections.
pub const SELECTION_MIN_PX: f32 = 10.0;

pub fn to_device(page_rect: Rect, page_size: Size, device_size: Size) -> Option<Rect> {
    let (sx, sy) = scale(page_size, device_size)?;
    Some(Rect::new(
        page_rect.x0 * sx,
        page_rect.y0 * sy,
        page_rect.x1 * sx,
        page_rect.y1 * sy,
    ))
}

pub fn to_page(device_rect: Rect, page_size: Size, device_size: Size) -> Option<Rect> {
    let (sx, sy) = scale(device_size, page_size)?;
    Some(Rect::new(
        device_rect.x0 * sx,
        device_rect.y0 * sy,
        device_rect.x1 * sx,
        device_rect.y1 * sy,
    ))
}

pub fn point_to_device(point: Point, page_size: Size, device_size: Size) -> Option<Point> {
    let (sx, sy) = scale(page_size, device_size)?;
    Some(Point::new(point.x * sx, point.y * sy))
}

pub fn point_to_page(point: Point, page_size: Size, device_size: Size) -> Option<Point> {
    let (sx, sy) = scale(device_size, page_size)?;
    Some(Point::new(point.x * sx, point.y * sy))
}

pub fn is_selection(device_rect: Rect) -> bool {
    let rect = device_rect.normalized();
    rect.width() >= SELECTION_MIN_PX && rect.height() >= SELECTION_MIN_PX
}

fn scale(from: Size, to: Size) -> Option<(f32, f32)> {
    if from.is_degenerate() || to.is_degenerate() {
        return None;
    }
    Some((to.width / from.width, to.height / from.height))
}
