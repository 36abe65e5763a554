// Constants module - centralized default values
//
// Defaults shared by the pipeline, the positioning helpers and the CLI.

// =============================================================================
// Placement defaults
// =============================================================================

/// Default margin between a watermark and the edge of the target, in pixels
pub const DEFAULT_MARGIN: u32 = 10;

/// Default watermark opacity used by the job configuration
pub const DEFAULT_OPACITY: f32 = 0.5;

/// Default spacing between tiles for tiled placement, in pixels
pub const DEFAULT_TILE_SPACING: u32 = 50;

// =============================================================================
// Text defaults
// =============================================================================

/// Default font size in pixels
pub const DEFAULT_FONT_SIZE: f32 = 24.0;

/// Default text color
pub const DEFAULT_TEXT_COLOR: &str = "#FFFFFF";

// =============================================================================
// Encoding defaults
// =============================================================================

/// Default lossy encoder quality (1-100)
pub const DEFAULT_QUALITY: u8 = 92;

// =============================================================================
// Loader defaults
// =============================================================================

/// Default timeout for remote resource requests in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum accepted resource size (64 MB)
pub const MAX_RESOURCE_BYTES: usize = 64 * 1024 * 1024;
