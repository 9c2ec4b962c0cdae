//! Low-opacity text watermark stamped onto captures before they are stored.
//!
//! Glyphs come from a built-in 5x7 bitmap font scaled by an integer factor,
//! so no font files are needed at runtime. Characters outside the font render
//! as blanks.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, ImageResult, RgbImage};
use serde::{Deserialize, Serialize};

use crate::store::ArtifactFormat;
use crate::utils::{WATERMARK_OPACITY, WATERMARK_TEXT};

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
/// Blank columns between glyphs, before scaling
const GLYPH_SPACING: u32 = 1;
const WATERMARK_GREY: f32 = 128.0;
/// Offset of the label's top-left corner from the anchoring corner
const CORNER_OFFSET_X: u32 = 200;
const CORNER_OFFSET_Y: u32 = 40;
const EDGE_MARGIN: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    #[default]
    BottomRight,
    Bottom,
    BottomLeft,
    TopRight,
    Top,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSpec {
    pub text: String,
    /// Alpha of the grey label, 0-255
    pub opacity: u8,
    pub position: WatermarkPosition,
    /// Integer pixel scale applied to the 5x7 font
    pub scale: u32,
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        Self {
            text: WATERMARK_TEXT.to_string(),
            opacity: WATERMARK_OPACITY,
            position: WatermarkPosition::BottomRight,
            scale: 4,
        }
    }
}

impl WatermarkSpec {
    fn text_size(&self) -> (u32, u32) {
        let scale = self.scale.max(1);
        let chars = self.text.chars().count() as u32;
        let width = if chars == 0 {
            0
        } else {
            (chars * (GLYPH_WIDTH + GLYPH_SPACING) - GLYPH_SPACING) * scale
        };
        (width, GLYPH_HEIGHT * scale)
    }

    fn origin(&self, image_width: u32, image_height: u32) -> (u32, u32) {
        let (text_width, _) = self.text_size();
        let centered = image_width.saturating_sub(text_width) / 2;
        match self.position {
            WatermarkPosition::BottomRight => (
                image_width.saturating_sub(CORNER_OFFSET_X),
                image_height.saturating_sub(CORNER_OFFSET_Y),
            ),
            WatermarkPosition::Bottom => (centered, image_height.saturating_sub(CORNER_OFFSET_Y)),
            WatermarkPosition::BottomLeft => {
                (EDGE_MARGIN, image_height.saturating_sub(CORNER_OFFSET_Y))
            }
            WatermarkPosition::TopRight => (image_width.saturating_sub(CORNER_OFFSET_X), EDGE_MARGIN),
            WatermarkPosition::Top => (centered, EDGE_MARGIN),
        }
    }
}

/// Decode `raw`, stamp the watermark, and re-encode in `format`.
///
/// Any decode or encode failure is returned to the caller, which keeps the
/// raw capture instead.
pub fn apply_watermark(
    raw: &[u8],
    spec: &WatermarkSpec,
    format: ArtifactFormat,
    jpeg_quality: u8,
) -> ImageResult<Vec<u8>> {
    let mut canvas = image::load_from_memory(raw)?.to_rgb8();
    draw_label(&mut canvas, spec);
    encode(&canvas, format, jpeg_quality)
}

fn draw_label(canvas: &mut RgbImage, spec: &WatermarkSpec) {
    let alpha = f32::from(spec.opacity) / 255.0;
    if alpha <= 0.0 {
        return;
    }

    let scale = spec.scale.max(1);
    let (width, height) = canvas.dimensions();
    let (origin_x, origin_y) = spec.origin(width, height);

    for (index, ch) in spec.text.chars().enumerate() {
        let glyph_x = origin_x + index as u32 * (GLYPH_WIDTH + GLYPH_SPACING) * scale;
        let rows = glyph(ch);

        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let x0 = glyph_x + col * scale;
                let y0 = origin_y + row as u32 * scale;
                for y in y0..(y0 + scale).min(height) {
                    for x in x0..(x0 + scale).min(width) {
                        let pixel = canvas.get_pixel_mut(x, y);
                        for channel in pixel.0.iter_mut() {
                            let blended =
                                f32::from(*channel) * (1.0 - alpha) + WATERMARK_GREY * alpha;
                            *channel = blended.round().clamp(0.0, 255.0) as u8;
                        }
                    }
                }
            }
        }
    }
}

fn encode(canvas: &RgbImage, format: ArtifactFormat, jpeg_quality: u8) -> ImageResult<Vec<u8>> {
    let mut out = Vec::new();
    let (width, height) = canvas.dimensions();

    match format {
        ArtifactFormat::Jpeg => JpegEncoder::new_with_quality(&mut out, jpeg_quality)
            .write_image(canvas.as_raw(), width, height, ExtendedColorType::Rgb8)?,
        ArtifactFormat::Png => {
            PngEncoder::new_with_quality(&mut out, CompressionType::Fast, FilterType::Adaptive)
                .write_image(canvas.as_raw(), width, height, ExtendedColorType::Rgb8)?
        }
    }
    Ok(out)
}

/// Rows of a 5x7 glyph, top to bottom; bit 4 is the leftmost column
fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        _ => [0; 7],
    }
}
