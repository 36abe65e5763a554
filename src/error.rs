// Error types module

/// Result alias used throughout the crate.
pub type WatermarkResult<T> = Result<T, WatermarkError>;

/// Centralized error type for the watermark pipeline
///
/// Errors are `Clone` because a pipeline result is shared by every
/// pipeline derived from it: each derived pipeline holds the first failure
/// permanently and hands out copies of it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WatermarkError {
    /// A resource descriptor matched none of the recognized variants
    /// (e.g. a locator with an unknown scheme).
    #[error("Unsupported resource: {0}")]
    UnsupportedResource(String),

    /// Reading or decoding a single resource failed.
    #[error("Failed to load resource #{index} ({locator}): {reason}")]
    Load {
        index: usize,
        locator: String,
        reason: String,
    },

    /// An aggregate load failed; carries the first constituent failure.
    #[error("Failed to load {total} resource(s): {first}")]
    AggregateLoad {
        total: usize,
        #[source]
        first: Box<WatermarkError>,
    },

    /// Surface to data URL, data URL to blob, or blob to image conversion failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The draw strategy failed or returned an invalid surface.
    #[error("Draw error: {0}")]
    Draw(String),

    /// Invalid configuration (job file, options, font, color).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected runtime failures (task join errors and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WatermarkError {
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn draw(msg: impl Into<String>) -> Self {
        Self::Draw(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Build a per-resource load failure.
    pub fn load(index: usize, locator: impl Into<String>, reason: impl ToString) -> Self {
        Self::Load {
            index,
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }

    /// The first underlying failure when this is an aggregate load error.
    pub fn first_failure(&self) -> Option<&WatermarkError> {
        match self {
            Self::AggregateLoad { first, .. } => Some(first.as_ref()),
            _ => None,
        }
    }
}
