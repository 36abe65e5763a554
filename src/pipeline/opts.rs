//! Pipeline options.

use crate::constants::DEFAULT_QUALITY;
use crate::encode::OutputFormat;
use crate::loader::{noop_initializer, HttpFetcher, Initializer, RemoteRequest, ResourceFetcher};
use crate::surface::{SurfacePool, SurfacePoolOpts};
use std::sync::Arc;

/// Options carried by a pipeline and every pipeline derived from it.
#[derive(Clone)]
pub struct PipelineOpts {
    /// Runs on each remote request before it is fetched.
    pub initializer: Initializer,
    /// Pool to draw surfaces from. Defaults to the process-wide shared pool.
    pub pool: Option<SurfacePool>,
    /// Create a dedicated pool retaining at most this many idle surfaces.
    /// Ignored when `pool` is set.
    pub pool_size: Option<usize>,
    /// Encoded output format.
    pub output: OutputFormat,
    /// Lossy encoder quality (1-100).
    pub quality: u8,
    /// Resolves remote locators to bytes.
    pub fetcher: Arc<dyn ResourceFetcher>,
}

impl std::fmt::Debug for PipelineOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOpts")
            .field("pool", &self.pool)
            .field("pool_size", &self.pool_size)
            .field("output", &self.output)
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            initializer: noop_initializer(),
            pool: None,
            pool_size: None,
            output: OutputFormat::default(),
            quality: DEFAULT_QUALITY,
            fetcher: Arc::new(HttpFetcher::default()),
        }
    }
}

impl PipelineOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initializer<F>(mut self, initializer: F) -> Self
    where
        F: Fn(&mut RemoteRequest) + Send + Sync + 'static,
    {
        self.initializer = Arc::new(initializer);
        self
    }

    pub fn with_pool(mut self, pool: SurfacePool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    pub fn with_output(mut self, output: OutputFormat) -> Self {
        self.output = output;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn with_fetcher(mut self, fetcher: impl ResourceFetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    /// Pick the pool this pipeline uses: the explicit pool, else a dedicated
    /// bounded pool when `pool_size` is set, else the shared pool.
    ///
    /// Called once when a pipeline is created; the result is pinned into
    /// `pool` so derived pipelines keep using the same pool.
    pub(crate) fn resolve_pool(&mut self) -> SurfacePool {
        let pool = match (&self.pool, self.pool_size) {
            (Some(pool), _) => pool.clone(),
            (None, Some(size)) => SurfacePool::with_opts(SurfacePoolOpts::bounded(size)),
            (None, None) => SurfacePool::shared(),
        };
        self.pool = Some(pool.clone());
        pool
    }
}
