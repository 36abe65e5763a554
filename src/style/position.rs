//! Placement math for watermarks.
//!
//! Pure coordinate helpers: where a mark of a given size lands on a target
//! of a given size. Nine anchored placements plus two repeating patterns:
//!
//! ```text
//! top-left     top-center     top-right
//! center-left  center         center-right
//! bottom-left  bottom-center  bottom-right
//! ```
//!
//! Coordinates may be negative when the mark is larger than the target;
//! surfaces clip whatever falls outside.

use serde::Deserialize;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Top-left corner of a placed mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Where a watermark goes on its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Placement {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    #[default]
    BottomRight,
    /// Repeat across the whole target.
    Tiled,
    /// Repeat along the top-left to bottom-right diagonal.
    DiagonalBand,
}

impl Placement {
    /// True for the patterns that place more than one copy.
    pub fn is_repeating(&self) -> bool {
        matches!(self, Placement::Tiled | Placement::DiagonalBand)
    }
}

/// Position of a single mark for an anchored placement.
///
/// Repeating placements fall back to the center; use [`tiled`] or
/// [`diagonal`] for those.
pub fn anchor(placement: Placement, target: Size, mark: Size, margin: u32) -> Point {
    let tw = target.width as i32;
    let th = target.height as i32;
    let mw = mark.width as i32;
    let mh = mark.height as i32;
    let m = margin as i32;

    let left = m;
    let center_x = (tw - mw) / 2;
    let right = tw - mw - m;
    let top = m;
    let center_y = (th - mh) / 2;
    let bottom = th - mh - m;

    match placement {
        Placement::TopLeft => Point::new(left, top),
        Placement::TopCenter => Point::new(center_x, top),
        Placement::TopRight => Point::new(right, top),
        Placement::CenterLeft => Point::new(left, center_y),
        Placement::Center | Placement::Tiled | Placement::DiagonalBand => {
            Point::new(center_x, center_y)
        }
        Placement::CenterRight => Point::new(right, center_y),
        Placement::BottomLeft => Point::new(left, bottom),
        Placement::BottomCenter => Point::new(center_x, bottom),
        Placement::BottomRight => Point::new(right, bottom),
    }
}

/// Grid of positions covering the target, starting at the origin, with
/// `spacing` pixels between neighbouring marks.
pub fn tiled(target: Size, mark: Size, spacing: u32) -> Vec<Point> {
    let step_x = mark.width.saturating_add(spacing).max(1) as usize;
    let step_y = mark.height.saturating_add(spacing).max(1) as usize;

    (0..target.height as i32)
        .step_by(step_y)
        .flat_map(|y| {
            (0..target.width as i32)
                .step_by(step_x)
                .map(move |x| Point::new(x, y))
        })
        .collect()
}

/// Positions along the main diagonal, centered on the line, keeping only
/// marks that are at least partially visible.
pub fn diagonal(target: Size, mark: Size, spacing: u32) -> Vec<Point> {
    let step = spacing.saturating_add(mark.width.max(mark.height)).max(1) as usize;
    let length = (target.width as f64).hypot(target.height as f64) as i32;
    if length == 0 {
        return Vec::new();
    }

    (0..length)
        .step_by(step)
        .map(|offset| {
            let ratio = offset as f64 / length as f64;
            Point::new(
                (ratio * target.width as f64) as i32 - mark.width as i32 / 2,
                (ratio * target.height as f64) as i32 - mark.height as i32 / 2,
            )
        })
        .filter(|point| is_visible(*point, target, mark))
        .collect()
}

/// All positions for `placement`: one for anchored placements, many for
/// repeating ones.
pub fn positions(
    placement: Placement,
    target: Size,
    mark: Size,
    margin: u32,
    spacing: u32,
) -> Vec<Point> {
    match placement {
        Placement::Tiled => tiled(target, mark, spacing),
        Placement::DiagonalBand => diagonal(target, mark, spacing),
        anchored => vec![anchor(anchored, target, mark, margin)],
    }
}

/// True when any part of a mark at `point` lands on the target.
pub fn is_visible(point: Point, target: Size, mark: Size) -> bool {
    point.x < target.width as i32
        && point.y < target.height as i32
        && point.x + mark.width as i32 > 0
        && point.y + mark.height as i32 > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: Size = Size {
        width: 800,
        height: 600,
    };
    const MARK: Size = Size {
        width: 100,
        height: 50,
    };

    #[test]
    fn test_anchor_corners() {
        assert_eq!(anchor(Placement::TopLeft, TARGET, MARK, 10), Point::new(10, 10));
        assert_eq!(anchor(Placement::TopRight, TARGET, MARK, 10), Point::new(690, 10));
        assert_eq!(anchor(Placement::BottomLeft, TARGET, MARK, 10), Point::new(10, 540));
        assert_eq!(anchor(Placement::BottomRight, TARGET, MARK, 10), Point::new(690, 540));
    }

    #[test]
    fn test_anchor_centers() {
        assert_eq!(anchor(Placement::Center, TARGET, MARK, 10), Point::new(350, 275));
        assert_eq!(anchor(Placement::TopCenter, TARGET, MARK, 10), Point::new(350, 10));
        assert_eq!(anchor(Placement::CenterLeft, TARGET, MARK, 10), Point::new(10, 275));
        assert_eq!(anchor(Placement::CenterRight, TARGET, MARK, 10), Point::new(690, 275));
        assert_eq!(anchor(Placement::BottomCenter, TARGET, MARK, 10), Point::new(350, 540));
    }

    #[test]
    fn test_anchor_mark_larger_than_target_goes_negative() {
        let point = anchor(Placement::Center, Size::new(50, 50), Size::new(100, 80), 0);
        assert_eq!(point, Point::new(-25, -15));
    }

    #[test]
    fn test_zero_margin() {
        assert_eq!(anchor(Placement::BottomRight, TARGET, MARK, 0), Point::new(700, 550));
    }

    #[test]
    fn test_tiled_covers_target() {
        let points = tiled(Size::new(300, 200), Size::new(100, 50), 0);
        // 3 columns x 4 rows
        assert_eq!(points.len(), 12);
        assert_eq!(points[0], Point::new(0, 0));
        assert_eq!(points[1], Point::new(100, 0));
        assert_eq!(points[3], Point::new(0, 50));
    }

    #[test]
    fn test_tiled_spacing() {
        let points = tiled(Size::new(300, 100), Size::new(50, 50), 50);
        assert_eq!(points, vec![Point::new(0, 0), Point::new(100, 0), Point::new(200, 0)]);
    }

    #[test]
    fn test_tiled_zero_sized_mark_does_not_loop_forever() {
        let points = tiled(Size::new(3, 2), Size::new(0, 0), 0);
        assert_eq!(points.len(), 6);
    }

    #[test]
    fn test_diagonal_runs_top_left_to_bottom_right() {
        let points = diagonal(TARGET, MARK, 50);
        assert!(points.len() > 1);
        for pair in points.windows(2) {
            assert!(pair[1].x > pair[0].x);
            assert!(pair[1].y > pair[0].y);
        }
        assert!(points.iter().all(|p| is_visible(*p, TARGET, MARK)));
    }

    #[test]
    fn test_huge_spacing_places_single_mark() {
        assert_eq!(tiled(TARGET, MARK, u32::MAX), vec![Point::new(0, 0)]);
        assert_eq!(diagonal(TARGET, MARK, u32::MAX).len(), 1);
    }

    #[test]
    fn test_diagonal_empty_target() {
        assert!(diagonal(Size::new(0, 0), MARK, 10).is_empty());
    }

    #[test]
    fn test_positions_dispatch() {
        assert_eq!(positions(Placement::TopLeft, TARGET, MARK, 5, 0), vec![Point::new(5, 5)]);
        assert!(positions(Placement::Tiled, TARGET, MARK, 5, 0).len() > 1);
        assert!(Placement::DiagonalBand.is_repeating());
        assert!(!Placement::Center.is_repeating());
    }

    #[test]
    fn test_is_visible() {
        assert!(is_visible(Point::new(-99, 0), TARGET, MARK));
        assert!(!is_visible(Point::new(-100, 0), TARGET, MARK));
        assert!(!is_visible(Point::new(800, 0), TARGET, MARK));
    }

    #[test]
    fn test_placement_deserialize() {
        let placement: Placement = serde_yaml::from_str("bottom-center").unwrap();
        assert_eq!(placement, Placement::BottomCenter);
        let placement: Placement = serde_yaml::from_str("diagonal-band").unwrap();
        assert_eq!(placement, Placement::DiagonalBand);
    }
}
