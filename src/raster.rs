//! Decoded image to pooled surface.

use crate::loader::DecodedImage;
use crate::surface::{Surface, SurfacePool};

/// Check out a surface from `pool`, resize it to the image's natural size and
/// paint the image at the origin.
///
/// The resize is destructive: whatever the surface held before is discarded.
pub fn to_surface(image: &DecodedImage, pool: &SurfacePool) -> Surface {
    let mut surface = pool.pop();
    surface.resize(image.width(), image.height());
    surface.copy_image(image.pixels(), 0, 0);
    surface
}

/// Rasterize every image in order.
pub fn to_surfaces(images: &[DecodedImage], pool: &SurfacePool) -> Vec<Surface> {
    images.iter().map(|image| to_surface(image, pool)).collect()
}
