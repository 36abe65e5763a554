//! Ready-made draw strategies.
//!
//! [`image`] stamps one loaded resource onto another; [`text`] renders a
//! string and stamps it onto the first resource. Both place marks with the
//! helpers in [`position`].

pub mod image;
pub mod position;
pub mod text;

pub use position::{Placement, Point, Size};

use crate::constants::{DEFAULT_MARGIN, DEFAULT_TILE_SPACING};
use crate::surface::Surface;
use ::image::RgbaImage;
use std::sync::Arc;

/// Computes one coordinate of a mark from the target size and the mark size.
pub type Coordinate = Arc<dyn Fn(Size, Size) -> i32 + Send + Sync>;

/// How a strategy positions its mark.
#[derive(Clone)]
pub enum Anchor {
    /// One of the anchored or repeating placements.
    Placement { placement: Placement, spacing: u32 },
    /// Caller-computed offsets.
    Custom { x: Coordinate, y: Coordinate },
}

impl std::fmt::Debug for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Anchor::Placement { placement, spacing } => f
                .debug_struct("Placement")
                .field("placement", placement)
                .field("spacing", spacing)
                .finish(),
            Anchor::Custom { .. } => f.write_str("Custom"),
        }
    }
}

impl From<Placement> for Anchor {
    fn from(placement: Placement) -> Self {
        Anchor::Placement {
            placement,
            spacing: DEFAULT_TILE_SPACING,
        }
    }
}

impl Anchor {
    pub fn custom<X, Y>(x: X, y: Y) -> Self
    where
        X: Fn(Size, Size) -> i32 + Send + Sync + 'static,
        Y: Fn(Size, Size) -> i32 + Send + Sync + 'static,
    {
        Anchor::Custom {
            x: Arc::new(x),
            y: Arc::new(y),
        }
    }

    /// Top-left corners for `mark` on `target`.
    pub fn points(&self, target: Size, mark: Size) -> Vec<Point> {
        match self {
            Anchor::Placement { placement, spacing } => {
                position::positions(*placement, target, mark, DEFAULT_MARGIN, *spacing)
            }
            Anchor::Custom { x, y } => vec![Point::new(x(target, mark), y(target, mark))],
        }
    }
}

/// Draw `mark` onto `target` at every point of `anchor` with global `alpha`.
pub(crate) fn stamp(target: &mut Surface, mark: &RgbaImage, anchor: &Anchor, alpha: f32) {
    let target_size = Size::new(target.width(), target.height());
    let mark_size = Size::new(mark.width(), mark.height());

    let points = anchor.points(target_size, mark_size);
    tracing::trace!(marks = points.len(), ?anchor, "Stamping watermark");
    for point in points {
        target.draw_image(mark, point.x, point.y, alpha);
    }
}
