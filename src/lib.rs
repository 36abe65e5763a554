// Watermark composition library
//
// Resources are loaded concurrently, rasterized onto pooled surfaces, drawn
// by a strategy and serialized to a data URL, blob or decoded image.

pub mod config;
pub mod constants;
pub mod encode;
pub mod error;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod raster;
pub mod style;
pub mod surface;

pub use encode::{Blob, OutputFormat};
pub use error::{WatermarkError, WatermarkResult};
pub use loader::{DecodedImage, LocalHandle, RemoteRequest, Resource, ResourceFetcher};
pub use pipeline::{Composed, DrawStrategy, Pipeline, PipelineOpts, Sequence};
pub use surface::{destroy, Surface, SurfacePool, SurfacePoolOpts};
