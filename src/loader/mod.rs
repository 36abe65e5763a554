//! Concurrent resource loading.
//!
//! A [`Resource`] is an explicitly tagged input: a remote locator, a local
//! handle, or an image that is already decoded. [`load_all`] resolves an
//! ordered list of resources to decoded images. Every load is started at
//! once and the result keeps the input order no matter which load finishes
//! first. The first failure fails the whole batch and the remaining loads are
//! dropped.

pub mod fetcher;

pub use fetcher::{FetchError, HttpFetcher, HttpFetcherConfig, Locator, ResourceFetcher};

use crate::error::{WatermarkError, WatermarkResult};
use crate::metrics::PipelineMetrics;
use bytes::Bytes;
use futures::stream::{FuturesUnordered, TryStreamExt};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A fully decoded, ready-to-draw bitmap.
///
/// Cheap to clone: the pixel buffer is shared.
#[derive(Clone, PartialEq)]
pub struct DecodedImage {
    pixels: Arc<RgbaImage>,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl DecodedImage {
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    /// Natural width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Natural height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Decode encoded image bytes (PNG, JPEG, WebP or GIF).
    ///
    /// `name` is only used to guess the format when the magic bytes are not
    /// recognized.
    pub fn decode(data: &[u8], name: &str) -> Result<Self, String> {
        let format = detect_image_format(data, name)?;
        let image = image::load(Cursor::new(data), format)
            .map_err(|e| format!("Failed to decode image: {e}"))?;
        Ok(Self::from_rgba(image.to_rgba8()))
    }
}

impl From<RgbaImage> for DecodedImage {
    fn from(pixels: RgbaImage) -> Self {
        Self::from_rgba(pixels)
    }
}

/// Detect image format from magic bytes, falling back to the name's extension.
fn detect_image_format(data: &[u8], name: &str) -> Result<ImageFormat, String> {
    if let Ok(format) = image::guess_format(data) {
        return Ok(format);
    }

    let ext = name
        .rsplit('.')
        .next()
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => Ok(ImageFormat::Png),
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "gif" => Ok(ImageFormat::Gif),
        "webp" => Ok(ImageFormat::WebP),
        _ => Err(format!("Unsupported image format: {ext}")),
    }
}

#[derive(Clone)]
enum LocalSource {
    Path(PathBuf),
    Bytes(Bytes),
}

/// A file-like input whose bytes are read asynchronously.
#[derive(Clone)]
pub struct LocalHandle {
    name: String,
    source: LocalSource,
}

impl std::fmt::Debug for LocalHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("LocalHandle");
        s.field("name", &self.name);
        match &self.source {
            LocalSource::Path(path) => s.field("path", path),
            LocalSource::Bytes(bytes) => s.field("len", &bytes.len()),
        };
        s.finish()
    }
}

impl LocalHandle {
    /// Handle for a file on disk. The file is read when the resource loads.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            source: LocalSource::Path(path),
        }
    }

    /// Handle for bytes already in memory (an upload, an embedded asset).
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            source: LocalSource::Bytes(bytes.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            LocalSource::Path(path) => Some(path),
            LocalSource::Bytes(_) => None,
        }
    }

    /// Read the handle's bytes.
    pub async fn read(&self) -> std::io::Result<Bytes> {
        match &self.source {
            LocalSource::Path(path) => tokio::fs::read(path).await.map(Bytes::from),
            LocalSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// One pipeline input.
#[derive(Debug, Clone)]
pub enum Resource {
    /// Locator resolved by the pipeline's [`ResourceFetcher`].
    Remote(String),
    /// File-like handle read directly.
    Local(LocalHandle),
    /// Already decoded; passes through unchanged.
    Decoded(DecodedImage),
}

impl Resource {
    pub fn remote(locator: impl Into<String>) -> Self {
        Resource::Remote(locator.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Resource::Local(LocalHandle::from_path(path))
    }

    /// Metrics label for this resource's variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::Remote(_) => "remote",
            Resource::Local(_) => "local",
            Resource::Decoded(_) => "decoded",
        }
    }

    /// Human-readable name used in errors and logs.
    pub fn describe(&self) -> String {
        match self {
            Resource::Remote(locator) => locator.clone(),
            Resource::Local(handle) => handle.name().to_string(),
            Resource::Decoded(image) => format!("<decoded {}x{}>", image.width(), image.height()),
        }
    }
}

impl From<DecodedImage> for Resource {
    fn from(image: DecodedImage) -> Self {
        Resource::Decoded(image)
    }
}

impl From<LocalHandle> for Resource {
    fn from(handle: LocalHandle) -> Self {
        Resource::Local(handle)
    }
}

/// A remote load about to start. The initializer may adjust it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    pub locator: String,
    /// Extra request headers, sent in insertion order.
    pub headers: Vec<(String, String)>,
    /// Per-request timeout overriding the fetcher's default.
    pub timeout: Option<Duration>,
}

impl RemoteRequest {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Callback run on every remote request before its fetch begins.
///
/// Local and decoded resources never see it.
pub type Initializer = Arc<dyn Fn(&mut RemoteRequest) + Send + Sync>;

/// An initializer that leaves requests untouched.
pub fn noop_initializer() -> Initializer {
    Arc::new(|_: &mut RemoteRequest| {})
}

/// Resolve `resources` to decoded images, preserving input order.
///
/// All loads run concurrently. On the first failure the remaining loads are
/// dropped and an `AggregateLoad` error carrying that failure is returned.
pub async fn load_all(
    resources: &[Resource],
    initializer: &Initializer,
    fetcher: &dyn ResourceFetcher,
) -> WatermarkResult<Vec<DecodedImage>> {
    tracing::debug!(count = resources.len(), "Loading resources");

    let aggregate = |first: WatermarkError| WatermarkError::AggregateLoad {
        total: resources.len(),
        first: Box::new(first),
    };

    // Results land in completion order; slots restore input order.
    let mut loads: FuturesUnordered<_> = resources
        .iter()
        .enumerate()
        .map(|(index, resource)| async move {
            load_one(index, resource, initializer, fetcher)
                .await
                .map(|image| (index, image))
        })
        .collect();

    let mut slots: Vec<Option<DecodedImage>> = vec![None; resources.len()];
    while let Some((index, image)) = loads.try_next().await.map_err(aggregate)? {
        slots[index] = Some(image);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| {
                aggregate(WatermarkError::internal(format!(
                    "Resource #{index} finished without a result"
                )))
            })
        })
        .collect()
}

async fn load_one(
    index: usize,
    resource: &Resource,
    initializer: &Initializer,
    fetcher: &dyn ResourceFetcher,
) -> WatermarkResult<DecodedImage> {
    let result = match resource {
        Resource::Remote(locator) => {
            let mut request = RemoteRequest::new(locator.clone());
            initializer(&mut request);
            match fetcher.fetch(&request).await {
                Ok(bytes) => DecodedImage::decode(&bytes, locator)
                    .map_err(|e| WatermarkError::load(index, locator.as_str(), e)),
                Err(FetchError::Unsupported(reason)) => {
                    Err(WatermarkError::UnsupportedResource(reason))
                }
                Err(e) => Err(WatermarkError::load(index, locator.as_str(), e)),
            }
        }
        Resource::Local(handle) => match handle.read().await {
            Ok(bytes) => DecodedImage::decode(&bytes, handle.name())
                .map_err(|e| WatermarkError::load(index, handle.name(), e)),
            Err(e) => Err(WatermarkError::load(index, handle.name(), e)),
        },
        Resource::Decoded(image) => Ok(image.clone()),
    };

    let metrics = PipelineMetrics::global();
    match &result {
        Ok(image) => {
            metrics
                .resources_loaded
                .with_label_values(&[resource.kind()])
                .inc();
            tracing::trace!(
                index,
                kind = resource.kind(),
                width = image.width(),
                height = image.height(),
                "Resource loaded"
            );
        }
        Err(e) => {
            metrics
                .resources_failed
                .with_label_values(&[resource.kind()])
                .inc();
            tracing::warn!(index, kind = resource.kind(), error = %e, "Resource load failed");
        }
    }
    result
}
