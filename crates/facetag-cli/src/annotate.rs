//! Preview rendering: scale the picked image to the display, then frame and
//! label each face.

use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use facetag_core::FaceRegion;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use serde::{Deserialize, Serialize};

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const PEN_WIDTH: u32 = 2;
/// Frames stay this far inside the preview edge.
const BORDER: i32 = 2;

const LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");
const LABEL_PX: f32 = 20.0;
/// Gap between the label and the frame's left and bottom strokes.
const LABEL_GAP: i32 = 2;

/// Screen area available to the preview. Fixed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayGeometry {
    pub width: u32,
    pub height: u32,
    /// Vertical space taken by everything other than the preview.
    pub reserved_height: u32,
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            reserved_height: 80,
        }
    }
}

/// Integer rectangle in preview pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn intersect(&self, other: &PixelRect) -> Option<PixelRect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x as i64 || bottom <= y as i64 {
            return None;
        }
        Some(PixelRect {
            x,
            y,
            width: (right - x as i64) as u32,
            height: (bottom - y as i64) as u32,
        })
    }
}

/// Scale factor that fits an image into half the display width and the
/// display height left over after `reserved_height`.
pub fn preview_ratio(image_width: u32, image_height: u32, display: &DisplayGeometry) -> f32 {
    let by_width = display.width as f32 / 2.0 / image_width.max(1) as f32;
    let usable = display.height.saturating_sub(display.reserved_height);
    let by_height = usable as f32 / image_height.max(1) as f32;
    by_width.min(by_height)
}

pub fn scale_preview(image: &RgbImage, ratio: f32) -> RgbImage {
    let width = ((image.width() as f32 * ratio).round() as u32).max(1);
    let height = ((image.height() as f32 * ratio).round() as u32).max(1);
    tracing::debug!(
        from = ?image.dimensions(),
        to = ?(width, height),
        "scaling preview"
    );
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Map a detected face into preview coordinates.
pub fn face_rect(face: &FaceRegion, ratio: f32) -> PixelRect {
    PixelRect {
        x: (face.x * ratio).round() as i32,
        y: (face.y * ratio).round() as i32,
        width: (face.width * ratio).round().max(0.0) as u32,
        height: (face.height * ratio).round().max(0.0) as u32,
    }
}

/// Draw a frame around `rect` with `label` in its bottom-left corner,
/// clipped to the preview minus its border.
///
/// Green for a known face, red otherwise. Returns the rectangle actually
/// drawn, or `None` when it falls entirely outside the preview.
pub fn draw_face_frame(
    preview: &mut RgbImage,
    rect: PixelRect,
    label: &str,
    known: bool,
) -> Option<PixelRect> {
    let inner = PixelRect {
        x: BORDER,
        y: BORDER,
        width: preview.width().saturating_sub(2 * BORDER as u32),
        height: preview.height().saturating_sub(2 * BORDER as u32),
    };
    let target = inner.intersect(&rect)?;
    let color = if known { KNOWN_COLOR } else { UNKNOWN_COLOR };

    let (x0, y0) = (target.x as u32, target.y as u32);
    let (x1, y1) = (x0 + target.width - 1, y0 + target.height - 1);
    for t in 0..PEN_WIDTH.min(target.width).min(target.height) {
        for x in x0..=x1 {
            preview.put_pixel(x, y0 + t, color);
            preview.put_pixel(x, y1 - t, color);
        }
        for y in y0..=y1 {
            preview.put_pixel(x0 + t, y, color);
            preview.put_pixel(x1 - t, y, color);
        }
    }

    draw_label(preview, target, label, color);
    Some(target)
}

/// Write `label` with its baseline just above the bottom stroke of `frame`,
/// never starting above the top stroke.
fn draw_label(preview: &mut RgbImage, frame: PixelRect, label: &str, color: Rgb<u8>) {
    if label.is_empty() {
        return;
    }
    let font = match FontRef::try_from_slice(LABEL_FONT) {
        Ok(font) => font,
        Err(e) => {
            tracing::warn!(error = %e, "label font unusable, drawing frame only");
            return;
        }
    };

    let scale = PxScale::from(LABEL_PX);
    let ascent = font.as_scaled(scale).ascent().round() as i32;
    let pen = PEN_WIDTH as i32;
    let baseline = frame.y + frame.height as i32 - pen - LABEL_GAP;
    let x = frame.x + pen + LABEL_GAP;
    let y = (baseline - ascent).max(frame.y + pen);
    draw_text_mut(preview, color, x, y, scale, &font, label);
}
