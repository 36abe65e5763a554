//! Drawing surfaces.
//!
//! A [`Surface`] is a mutable rectangular RGBA target with the handful of
//! drawing operations the composition pipeline and the positioning helpers
//! need: clearing, destructive resizing, and alpha-blended image drawing.
//!
//! Surfaces are normally checked out of a [`SurfacePool`] and returned to it
//! once their content has been consumed.

pub mod pool;

pub use pool::{destroy, SurfacePool, SurfacePoolOpts, SurfacePoolStats};

use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// A reusable drawing target backed by a straight-alpha RGBA buffer.
pub struct Surface {
    id: u64,
    pixels: RgbaImage,
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("dimensions", &(self.width(), self.height()))
            .finish()
    }
}

impl Clone for Surface {
    /// Clones get a fresh identity; only pixel content is copied.
    fn clone(&self) -> Self {
        Self::from_image(self.pixels.clone())
    }
}

impl Surface {
    /// Allocate a transparent surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_image(RgbaImage::new(width, height))
    }

    /// Wrap an existing RGBA buffer.
    pub fn from_image(pixels: RgbaImage) -> Self {
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            pixels,
        }
    }

    /// Stable identity of this surface across pool round trips.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Erase all content. The size is unchanged.
    pub fn clear(&mut self) {
        for px in self.pixels.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    /// Resize the surface, discarding any prior content.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.pixels = RgbaImage::new(width, height);
    }

    /// True when every pixel is fully transparent black.
    pub fn is_blank(&self) -> bool {
        self.pixels.pixels().all(|p| p.0 == [0, 0, 0, 0])
    }

    /// Read a pixel. Panics when out of bounds, like [`RgbaImage::get_pixel`].
    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    /// Overwrite a single pixel without blending. Out-of-bounds writes are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        if x < self.width() && y < self.height() {
            self.pixels.put_pixel(x, y, color);
        }
    }

    /// Borrow the underlying pixel buffer.
    pub fn as_image(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Consume the surface and return its pixel buffer.
    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// Copy `image` into this surface with its top-left corner at `(x, y)`,
    /// replacing destination pixels instead of blending.
    pub fn copy_image(&mut self, image: &RgbaImage, x: i32, y: i32) {
        let Some(region) = self.clip(x, y, image.width(), image.height()) else {
            return;
        };
        for ty in region.y_start..region.y_end {
            for tx in region.x_start..region.x_end {
                let src = image.get_pixel((tx - x) as u32, (ty - y) as u32);
                self.pixels.put_pixel(tx as u32, ty as u32, *src);
            }
        }
    }

    /// Draw `image` with its top-left corner at `(x, y)` using source-over
    /// blending, scaling the image's own alpha by `alpha` (global alpha).
    ///
    /// Parts of the image that fall outside the surface are clipped.
    pub fn draw_image(&mut self, image: &RgbaImage, x: i32, y: i32, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let Some(region) = self.clip(x, y, image.width(), image.height()) else {
            return;
        };

        for ty in region.y_start..region.y_end {
            for tx in region.x_start..region.x_end {
                let fg = *image.get_pixel((tx - x) as u32, (ty - y) as u32);
                let bg = *self.pixels.get_pixel(tx as u32, ty as u32);
                self.pixels
                    .put_pixel(tx as u32, ty as u32, blend_pixels(bg, fg, alpha));
            }
        }
    }

    /// Draw another surface onto this one. See [`Surface::draw_image`].
    pub fn draw_surface(&mut self, other: &Surface, x: i32, y: i32, alpha: f32) {
        self.draw_image(&other.pixels, x, y, alpha);
    }

    /// Fill a rectangle with `color` using source-over blending.
    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Rgba<u8>) {
        let Some(region) = self.clip(x, y, width, height) else {
            return;
        };
        for ty in region.y_start..region.y_end {
            for tx in region.x_start..region.x_end {
                let bg = *self.pixels.get_pixel(tx as u32, ty as u32);
                self.pixels
                    .put_pixel(tx as u32, ty as u32, blend_pixels(bg, color, 1.0));
            }
        }
    }

    fn clip(&self, x: i32, y: i32, width: u32, height: u32) -> Option<ClipRegion> {
        let target_w = self.width() as i64;
        let target_h = self.height() as i64;

        let x_start = (x as i64).max(0);
        let y_start = (y as i64).max(0);
        let x_end = (x as i64 + width as i64).min(target_w);
        let y_end = (y as i64 + height as i64).min(target_h);

        if x_start >= x_end || y_start >= y_end {
            return None;
        }
        Some(ClipRegion {
            x_start: x_start as i32,
            y_start: y_start as i32,
            x_end: x_end as i32,
            y_end: y_end as i32,
        })
    }
}

/// Visible part of a drawing operation, in target coordinates.
struct ClipRegion {
    x_start: i32,
    y_start: i32,
    x_end: i32,
    y_end: i32,
}

/// Blend two pixels with the Porter-Duff "over" operator, applying an
/// additional opacity to the foreground.
pub(crate) fn blend_pixels(background: Rgba<u8>, foreground: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    let fg_alpha = (foreground[3] as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    if fg_alpha <= 0.0 {
        return background;
    }
    if fg_alpha >= 1.0 {
        return foreground;
    }

    let bg_alpha = background[3] as f32 / 255.0;
    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);

    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend_channel = |fg: u8, bg: u8| -> u8 {
        let fg_f = fg as f32 / 255.0;
        let bg_f = bg as f32 / 255.0;
        let result = (fg_f * fg_alpha + bg_f * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        (result * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend_channel(foreground[0], background[0]),
        blend_channel(foreground[1], background[1]),
        blend_channel(foreground[2], background[2]),
        (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
