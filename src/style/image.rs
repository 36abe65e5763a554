//! Image watermarks.
//!
//! Each strategy draws the mark surface (the second resource by default) onto
//! the target surface (the first resource) and selects the target as the
//! composed result.
//!
//! ```ignore
//! let url = Pipeline::create(vec![photo, logo], PipelineOpts::default())
//!     .data_url(style::image::lower_right(0.5))
//!     .await?;
//! ```

use super::{stamp, Anchor, Placement, Size};
use crate::error::{WatermarkError, WatermarkResult};
use crate::pipeline::{Composed, DrawStrategy};
use crate::surface::Surface;

/// Stamps one resource onto the first.
#[derive(Debug, Clone)]
pub struct ImageMark {
    anchor: Anchor,
    alpha: f32,
    mark: usize,
}

impl ImageMark {
    pub fn new(anchor: impl Into<Anchor>, alpha: f32) -> Self {
        Self {
            anchor: anchor.into(),
            alpha: alpha.clamp(0.0, 1.0),
            mark: 1,
        }
    }

    /// Use the surface at `index` as the mark instead of the second one.
    pub fn with_mark(mut self, index: usize) -> Self {
        self.mark = index;
        self
    }
}

impl DrawStrategy for ImageMark {
    fn draw(&self, surfaces: &mut [Surface]) -> WatermarkResult<Composed> {
        if self.mark == 0 || self.mark >= surfaces.len() {
            return Err(WatermarkError::draw(format!(
                "Image watermark needs a target and a mark at index {}, got {} surface(s)",
                self.mark,
                surfaces.len()
            )));
        }

        let (target, rest) = surfaces.split_at_mut(1);
        stamp(
            &mut target[0],
            rest[self.mark - 1].as_image(),
            &self.anchor,
            self.alpha,
        );
        Ok(Composed::Source(0))
    }
}

pub fn upper_left(alpha: f32) -> ImageMark {
    ImageMark::new(Placement::TopLeft, alpha)
}

pub fn upper_right(alpha: f32) -> ImageMark {
    ImageMark::new(Placement::TopRight, alpha)
}

pub fn lower_left(alpha: f32) -> ImageMark {
    ImageMark::new(Placement::BottomLeft, alpha)
}

pub fn lower_right(alpha: f32) -> ImageMark {
    ImageMark::new(Placement::BottomRight, alpha)
}

pub fn center(alpha: f32) -> ImageMark {
    ImageMark::new(Placement::Center, alpha)
}

/// Any of the nine anchored placements, or a repeating one with the default spacing.
pub fn at(placement: Placement, alpha: f32) -> ImageMark {
    ImageMark::new(placement, alpha)
}

/// Repeat the mark across the target with `spacing` pixels between copies.
pub fn tiled(spacing: u32, alpha: f32) -> ImageMark {
    ImageMark::new(
        Anchor::Placement {
            placement: Placement::Tiled,
            spacing,
        },
        alpha,
    )
}

/// Place the mark at offsets computed from (target size, mark size).
pub fn at_pos<X, Y>(x: X, y: Y, alpha: f32) -> ImageMark
where
    X: Fn(Size, Size) -> i32 + Send + Sync + 'static,
    Y: Fn(Size, Size) -> i32 + Send + Sync + 'static,
{
    ImageMark::new(Anchor::custom(x, y), alpha)
}
