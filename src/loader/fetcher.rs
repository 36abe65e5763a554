//! Byte fetching for remote resource locators.
//!
//! A locator string is resolved by a [`ResourceFetcher`]. The default
//! [`HttpFetcher`] understands:
//!
//! - `https://...` and `http://...` - fetched with `reqwest`
//! - `data:<mime>;base64,...` - decoded inline
//! - `file:///path` and bare paths - read from disk, relative paths are
//!   resolved against the configured base directory
//!
//! Any other scheme is rejected as unsupported.

use super::RemoteRequest;
use crate::constants::{DEFAULT_REQUEST_TIMEOUT_SECS, MAX_RESOURCE_BYTES};
use crate::encode::parse_data_url;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors produced while fetching the bytes behind a locator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// The locator uses a scheme no fetcher understands.
    #[error("Unsupported locator: {0}")]
    Unsupported(String),

    /// Network-level failure.
    #[error("HTTP fetch failed: {0}")]
    Http(String),

    /// The server answered with a non-success status.
    #[error("HTTP request failed with status: {0}")]
    Status(u16),

    /// Reading a file failed.
    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    /// A `data:` URL could not be decoded.
    #[error("Invalid data URL: {0}")]
    DataUrl(String),

    /// The resource is larger than the configured limit.
    #[error("Resource exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Resolves a remote resource request to raw bytes.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch the bytes referenced by `request.locator`.
    async fn fetch(&self, request: &RemoteRequest) -> Result<Bytes, FetchError>;
}

/// Parsed form of a locator string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// `http://` or `https://` URL.
    Http(String),
    /// Inline `data:` URL.
    Data(String),
    /// Filesystem path (from `file://` or a bare path).
    File(PathBuf),
}

impl Locator {
    /// Parse a locator string.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Unsupported` for empty locators and unknown schemes.
    pub fn parse(locator: &str) -> Result<Self, FetchError> {
        let trimmed = locator.trim();
        if trimmed.is_empty() {
            return Err(FetchError::Unsupported("empty locator".to_string()));
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("https://") || lower.starts_with("http://") {
            Ok(Locator::Http(trimmed.to_string()))
        } else if lower.starts_with("data:") {
            Ok(Locator::Data(trimmed.to_string()))
        } else if lower.starts_with("file://") {
            Ok(Locator::File(PathBuf::from(&trimmed["file://".len()..])))
        } else if let Some((scheme, _)) = trimmed.split_once("://") {
            Err(FetchError::Unsupported(format!(
                "scheme '{scheme}' in {trimmed}. Use http(s)://, data:, file:// or a path"
            )))
        } else {
            Ok(Locator::File(PathBuf::from(trimmed)))
        }
    }
}

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Directory that relative paths are resolved against.
    pub base_dir: Option<PathBuf>,
    /// Timeout for HTTP requests that do not set their own.
    pub timeout: Duration,
    /// Maximum accepted resource size in bytes.
    pub max_bytes: usize,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_bytes: MAX_RESOURCE_BYTES,
        }
    }
}

/// Default fetcher: HTTP(S) via `reqwest`, inline data URLs, and local files.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: HttpFetcherConfig,
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("config", &self.config)
            .finish()
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
            config: HttpFetcherConfig::default(),
        }
    }
}

impl HttpFetcher {
    /// Create a fetcher with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    /// (e.g., TLS configuration issues).
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Fetcher resolving relative paths against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let mut fetcher = Self::default();
        fetcher.config.base_dir = Some(base_dir.into());
        fetcher
    }

    pub fn config(&self) -> &HttpFetcherConfig {
        &self.config
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.config.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    async fn fetch_http(&self, url: &str, request: &RemoteRequest) -> Result<Bytes, FetchError> {
        let mut builder = self
            .client
            .get(url)
            .timeout(request.timeout.unwrap_or(self.config.timeout));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        if let Some(len) = response.content_length() {
            if len > self.config.max_bytes as u64 {
                return Err(FetchError::TooLarge {
                    limit: self.config.max_bytes,
                });
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Http(format!("Failed to read HTTP body: {e}")))?;
        self.check_size(bytes)
    }

    async fn fetch_file(&self, path: &Path) -> Result<Bytes, FetchError> {
        let resolved = self.resolve_path(path);
        let data = tokio::fs::read(&resolved)
            .await
            .map_err(|e| FetchError::Io {
                path: resolved.display().to_string(),
                reason: e.to_string(),
            })?;
        self.check_size(Bytes::from(data))
    }

    fn check_size(&self, bytes: Bytes) -> Result<Bytes, FetchError> {
        if bytes.len() > self.config.max_bytes {
            return Err(FetchError::TooLarge {
                limit: self.config.max_bytes,
            });
        }
        Ok(bytes)
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, request: &RemoteRequest) -> Result<Bytes, FetchError> {
        match Locator::parse(&request.locator)? {
            Locator::Http(url) => self.fetch_http(&url, request).await,
            Locator::Data(url) => {
                let (_, data) =
                    parse_data_url(&url).map_err(|e| FetchError::DataUrl(e.to_string()))?;
                self.check_size(Bytes::from(data))
            }
            Locator::File(path) => self.fetch_file(&path).await,
        }
    }
}
