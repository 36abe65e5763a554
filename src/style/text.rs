//! Text watermarks.
//!
//! Text is rasterized with `ab_glyph` from a caller-supplied TrueType/OpenType
//! font, then stamped onto the first surface like an image mark.
//!
//! Colors are `#RGB` or `#RRGGBB`. The strategy alpha is applied when the
//! rendered text is drawn, so the glyph image itself is always opaque.

use super::{stamp, Anchor, Placement, Size};
use crate::constants::{DEFAULT_FONT_SIZE, DEFAULT_TEXT_COLOR};
use crate::error::{WatermarkError, WatermarkResult};
use crate::pipeline::{Composed, DrawStrategy};
use crate::surface::{blend_pixels, Surface};
use ab_glyph::{Font as _, FontArc, GlyphId, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use std::path::Path;
use std::str::FromStr;

/// A loaded font. Cheap to clone.
#[derive(Clone)]
pub struct Font {
    inner: FontArc,
}

impl std::fmt::Debug for Font {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Font")
            .field("glyphs", &self.inner.glyph_count())
            .finish()
    }
}

impl Font {
    pub fn from_bytes(data: Vec<u8>) -> WatermarkResult<Self> {
        let inner = FontArc::try_from_vec(data)
            .map_err(|e| WatermarkError::config(format!("Invalid font data: {e}")))?;
        Ok(Self { inner })
    }

    pub fn from_file(path: impl AsRef<Path>) -> WatermarkResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            WatermarkError::config(format!("Failed to read font {}: {e}", path.display()))
        })?;
        Self::from_bytes(data)
    }
}

/// RGB text color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const BLACK: Color = Color::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn with_alpha(self, alpha: u8) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, alpha])
    }
}

impl FromStr for Color {
    type Err = WatermarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_color(s)
    }
}

/// Parse `#RGB` or `#RRGGBB`.
pub fn parse_hex_color(hex: &str) -> WatermarkResult<Color> {
    let digits = hex
        .trim()
        .strip_prefix('#')
        .ok_or_else(|| WatermarkError::config(format!("Color must start with '#': {hex}")))?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WatermarkError::config(format!("Invalid hex color: {hex}")));
    }

    let channel = |s: &str| u8::from_str_radix(s, 16).unwrap_or_default();
    match digits.len() {
        // #RGB doubles each digit: F -> FF
        3 => Ok(Color::new(
            channel(&digits[0..1]) * 17,
            channel(&digits[1..2]) * 17,
            channel(&digits[2..3]) * 17,
        )),
        6 => Ok(Color::new(
            channel(&digits[0..2]),
            channel(&digits[2..4]),
            channel(&digits[4..6]),
        )),
        n => Err(WatermarkError::config(format!(
            "Color must be #RGB or #RRGGBB, got {n} digits"
        ))),
    }
}

/// How text is drawn.
#[derive(Debug, Clone)]
pub struct TextStyle {
    pub font: Font,
    /// Pixel height of the font.
    pub size: f32,
    pub color: Color,
    /// Clockwise rotation in degrees.
    pub rotation: Option<f32>,
}

impl TextStyle {
    pub fn new(font: Font) -> Self {
        Self {
            font,
            size: DEFAULT_FONT_SIZE,
            color: parse_hex_color(DEFAULT_TEXT_COLOR).unwrap_or(Color::WHITE),
            rotation: None,
        }
    }

    pub fn with_size(mut self, size: f32) -> Self {
        self.size = size;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation = Some(degrees);
        self
    }
}

struct Layout {
    glyphs: Vec<(GlyphId, f32)>,
    width: f32,
}

fn layout(text: &str, style: &TextStyle) -> Layout {
    let scaled = style.font.inner.as_scaled(PxScale::from(style.size));
    let mut glyphs = Vec::with_capacity(text.len());
    let mut caret = 0.0f32;
    let mut previous: Option<GlyphId> = None;

    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        glyphs.push((id, caret));
        caret += scaled.h_advance(id);
        previous = Some(id);
    }

    Layout {
        glyphs,
        width: caret,
    }
}

/// Unrotated pixel size of `text`, including a one pixel border.
pub fn measure_text(text: &str, style: &TextStyle) -> (u32, u32) {
    let scaled = style.font.inner.as_scaled(PxScale::from(style.size));
    let width = layout(text, style).width;
    (width.ceil() as u32 + 2, scaled.height().ceil() as u32 + 2)
}

/// Rasterize `text` onto a transparent image.
pub fn render_text(text: &str, style: &TextStyle) -> WatermarkResult<RgbaImage> {
    if text.is_empty() {
        return Err(WatermarkError::draw("Cannot render empty text"));
    }
    if !style.size.is_finite() || style.size <= 0.0 {
        return Err(WatermarkError::draw(format!(
            "Font size must be positive, got {}",
            style.size
        )));
    }

    let scale = PxScale::from(style.size);
    let scaled = style.font.inner.as_scaled(scale);
    let (width, height) = measure_text(text, style);
    let mut image = RgbaImage::new(width.max(1), height.max(1));
    let baseline = 1.0 + scaled.ascent();

    for (id, x) in layout(text, style).glyphs {
        let glyph = id.with_scale_and_position(scale, ab_glyph::point(1.0 + x, baseline));
        let Some(outlined) = style.font.inner.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|gx, gy, coverage| {
            let px = gx as i32 + bounds.min.x as i32;
            let py = gy as i32 + bounds.min.y as i32;
            if px < 0 || py < 0 || px >= image.width() as i32 || py >= image.height() as i32 {
                return;
            }
            let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
            let existing = *image.get_pixel(px as u32, py as u32);
            image.put_pixel(
                px as u32,
                py as u32,
                blend_pixels(existing, style.color.with_alpha(alpha), 1.0),
            );
        });
    }

    Ok(match style.rotation {
        Some(degrees) if degrees % 360.0 != 0.0 => rotate(&image, degrees),
        _ => image,
    })
}

/// Rotate clockwise by `degrees` around the center, growing the canvas to
/// fit. Bilinear sampling; uncovered pixels stay transparent.
fn rotate(image: &RgbaImage, degrees: f32) -> RgbaImage {
    let radians = degrees.to_radians();
    let (sin, cos) = radians.sin_cos();
    let (src_w, src_h) = (image.width() as f32, image.height() as f32);

    // Trim float noise so a quarter turn of 10x4 is 4x10, not 5x11.
    let fit = |v: f32| (v - 1e-3).ceil().max(1.0) as u32;
    let dst_w = fit(src_w * cos.abs() + src_h * sin.abs());
    let dst_h = fit(src_w * sin.abs() + src_h * cos.abs());
    let mut rotated = RgbaImage::new(dst_w, dst_h);

    let (src_cx, src_cy) = (src_w / 2.0, src_h / 2.0);
    let (dst_cx, dst_cy) = (dst_w as f32 / 2.0, dst_h as f32 / 2.0);

    let sample = |x: i64, y: i64| -> [f32; 4] {
        if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
            return [0.0; 4];
        }
        let p = image.get_pixel(x as u32, y as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    };

    for (dx, dy, out) in rotated.enumerate_pixels_mut() {
        // Map the destination pixel center back into the source.
        let rx = dx as f32 + 0.5 - dst_cx;
        let ry = dy as f32 + 0.5 - dst_cy;
        let sx = rx * cos + ry * sin + src_cx - 0.5;
        let sy = -rx * sin + ry * cos + src_cy - 0.5;

        let (x0, y0) = (sx.floor(), sy.floor());
        let (fx, fy) = (sx - x0, sy - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);

        let p00 = sample(x0, y0);
        let p10 = sample(x0 + 1, y0);
        let p01 = sample(x0, y0 + 1);
        let p11 = sample(x0 + 1, y0 + 1);

        let mut channels = [0u8; 4];
        for (c, value) in channels.iter_mut().enumerate() {
            let v = p00[c] * (1.0 - fx) * (1.0 - fy)
                + p10[c] * fx * (1.0 - fy)
                + p01[c] * (1.0 - fx) * fy
                + p11[c] * fx * fy;
            *value = v.round().clamp(0.0, 255.0) as u8;
        }
        *out = Rgba(channels);
    }

    rotated
}

/// Renders a string and stamps it onto the first surface.
#[derive(Debug, Clone)]
pub struct TextMark {
    text: String,
    style: TextStyle,
    anchor: Anchor,
    alpha: f32,
}

impl TextMark {
    pub fn new(
        text: impl Into<String>,
        style: TextStyle,
        anchor: impl Into<Anchor>,
        alpha: f32,
    ) -> Self {
        Self {
            text: text.into(),
            style,
            anchor: anchor.into(),
            alpha: alpha.clamp(0.0, 1.0),
        }
    }
}

impl DrawStrategy for TextMark {
    fn draw(&self, surfaces: &mut [Surface]) -> WatermarkResult<Composed> {
        let target = surfaces
            .first_mut()
            .ok_or_else(|| WatermarkError::draw("Text watermark needs a target surface"))?;
        let rendered = render_text(&self.text, &self.style)?;
        stamp(target, &rendered, &self.anchor, self.alpha);
        Ok(Composed::Source(0))
    }
}

pub fn upper_left(text: impl Into<String>, style: TextStyle, alpha: f32) -> TextMark {
    TextMark::new(text, style, Placement::TopLeft, alpha)
}

pub fn upper_right(text: impl Into<String>, style: TextStyle, alpha: f32) -> TextMark {
    TextMark::new(text, style, Placement::TopRight, alpha)
}

pub fn lower_left(text: impl Into<String>, style: TextStyle, alpha: f32) -> TextMark {
    TextMark::new(text, style, Placement::BottomLeft, alpha)
}

pub fn lower_right(text: impl Into<String>, style: TextStyle, alpha: f32) -> TextMark {
    TextMark::new(text, style, Placement::BottomRight, alpha)
}

pub fn center(text: impl Into<String>, style: TextStyle, alpha: f32) -> TextMark {
    TextMark::new(text, style, Placement::Center, alpha)
}

pub fn at(placement: Placement, text: impl Into<String>, style: TextStyle, alpha: f32) -> TextMark {
    TextMark::new(text, style, placement, alpha)
}

/// Place the text at offsets computed from (target size, text size).
pub fn at_pos<X, Y>(
    x: X,
    y: Y,
    text: impl Into<String>,
    style: TextStyle,
    alpha: f32,
) -> TextMark
where
    X: Fn(Size, Size) -> i32 + Send + Sync + 'static,
    Y: Fn(Size, Size) -> i32 + Send + Sync + 'static,
{
    TextMark::new(text, style, Anchor::custom(x, y), alpha)
}
