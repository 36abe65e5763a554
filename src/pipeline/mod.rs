//! Chainable composition pipeline.
//!
//! A [`Pipeline`] is an immutable value wrapping a shared future. Every chain
//! operation returns a new pipeline whose future is built on top of the
//! previous one; the original is never mutated and can be reused.
//!
//! ```text
//! create(resources) ──► Pipeline<Vec<DecodedImage>>
//!        │ load / render          ──► Pipeline<Vec<DecodedImage>>
//!        │ data_url(draw)         ──► Pipeline<String>
//!        │ blob(draw)             ──► Pipeline<Blob>
//!        └ image(draw)            ──► Pipeline<DecodedImage>
//! ```
//!
//! When a tokio runtime is available the work of each step is spawned right
//! away, so loading starts as soon as the pipeline is created. Without a
//! runtime the work runs on first poll.
//!
//! A failure anywhere upstream is held by every derived pipeline: later steps
//! return the first error without doing any further work.

mod draw;
mod opts;

pub use draw::{Composed, DrawStrategy, Sequence};
pub use opts::PipelineOpts;

use crate::encode::{self, Blob};
use crate::error::{WatermarkError, WatermarkResult};
use crate::loader::{load_all, DecodedImage, Initializer, Resource};
use crate::metrics::PipelineMetrics;
use crate::raster;
use crate::surface::SurfacePool;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::any::Any;
use std::future::{Future, IntoFuture};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

type SharedResult<T> = Shared<BoxFuture<'static, WatermarkResult<T>>>;

/// Start `work`, eagerly on the current tokio runtime if there is one.
fn start<T, F>(work: F) -> SharedResult<T>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = WatermarkResult<T>> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let task = handle.spawn(work);
            async move {
                match task.await {
                    Ok(result) => result,
                    Err(e) => Err(WatermarkError::internal(format!(
                        "Pipeline task failed: {e}"
                    ))),
                }
            }
            .boxed()
            .shared()
        }
        Err(_) => work.boxed().shared(),
    }
}

/// A lazily evaluated, chainable composition.
///
/// `T` is what the pipeline resolves to; a freshly created pipeline resolves
/// to the decoded images. Await the pipeline (or call [`Pipeline::resolve`])
/// to get the result.
pub struct Pipeline<T = Vec<DecodedImage>> {
    resources: Arc<Vec<Resource>>,
    opts: PipelineOpts,
    pool: SurfacePool,
    images: SharedResult<Vec<DecodedImage>>,
    pending: SharedResult<T>,
}

impl<T> Clone for Pipeline<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        Self {
            resources: Arc::clone(&self.resources),
            opts: self.opts.clone(),
            pool: self.pool.clone(),
            images: self.images.clone(),
            pending: self.pending.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("resources", &self.resources.len())
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Start loading `resources` with `opts`.
    pub fn create(resources: Vec<Resource>, opts: PipelineOpts) -> Self {
        let resources = Arc::new(resources);
        let initializer = opts.initializer.clone();
        let fetcher = Arc::clone(&opts.fetcher);
        let to_load = Arc::clone(&resources);

        Self::create_with(
            resources,
            opts,
            async move { load_all(&to_load, &initializer, fetcher.as_ref()).await },
        )
    }

    /// Build a pipeline around an already pending image list instead of
    /// loading `resources`. The resources are still carried forward for
    /// [`Pipeline::render`] and [`Pipeline::load`].
    pub fn create_with<F>(
        resources: impl Into<Arc<Vec<Resource>>>,
        mut opts: PipelineOpts,
        pending: F,
    ) -> Self
    where
        F: Future<Output = WatermarkResult<Vec<DecodedImage>>> + Send + 'static,
    {
        let resources = resources.into();
        let pool = opts.resolve_pool();
        tracing::debug!(
            resources = resources.len(),
            pool_len = pool.len(),
            "Pipeline created"
        );

        let images = start(pending);
        Self {
            resources,
            opts,
            pool,
            images: images.clone(),
            pending: images,
        }
    }
}

impl<T> Pipeline<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Resources this pipeline was built from, in order.
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn opts(&self) -> &PipelineOpts {
        &self.opts
    }

    /// The surface pool compositions draw from.
    pub fn pool(&self) -> &SurfacePool {
        &self.pool
    }

    /// Wait for the result. Can be called any number of times.
    pub async fn resolve(&self) -> WatermarkResult<T> {
        self.pending.clone().await
    }

    fn derive<U, F>(&self, work: F) -> Pipeline<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Future<Output = WatermarkResult<U>> + Send + 'static,
    {
        Pipeline {
            resources: Arc::clone(&self.resources),
            opts: self.opts.clone(),
            pool: self.pool.clone(),
            images: self.images.clone(),
            pending: start(work),
        }
    }

    fn with_images<F>(&self, resources: Vec<Resource>, work: F) -> Pipeline
    where
        F: Future<Output = WatermarkResult<Vec<DecodedImage>>> + Send + 'static,
    {
        let images = start(work);
        Pipeline {
            resources: Arc::new(resources),
            opts: self.opts.clone(),
            pool: self.pool.clone(),
            images: images.clone(),
            pending: images,
        }
    }

    /// Continue with an async step once this pipeline resolves successfully.
    pub fn then<U, F, Fut>(&self, f: F) -> Pipeline<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = WatermarkResult<U>> + Send + 'static,
    {
        let pending = self.pending.clone();
        self.derive(async move { f(pending.await?).await })
    }

    /// Transform the result once this pipeline resolves successfully.
    pub fn map<U, F>(&self, f: F) -> Pipeline<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let pending = self.pending.clone();
        self.derive(async move { pending.await.map(f) })
    }

    /// Compose the loaded images with `draw` and serialize the result to a
    /// data URL in the configured output format.
    ///
    /// Every surface handed to `draw` goes back to the pool afterwards,
    /// whether drawing and encoding succeeded or not.
    pub fn data_url(&self, draw: impl DrawStrategy + 'static) -> Pipeline<String> {
        let pending = self.pending.clone();
        let images = self.images.clone();
        let pool = self.pool.clone();
        let output = self.opts.output;
        let quality = self.opts.quality;

        self.derive(async move {
            pending.await?;
            let images = images.await?;
            compose(&images, &draw, &pool, output, quality)
        })
    }

    /// Like [`Pipeline::data_url`], decoded into a MIME-tagged blob.
    pub fn blob(&self, draw: impl DrawStrategy + 'static) -> Pipeline<Blob> {
        self.data_url(draw)
            .then(|url| async move { Blob::from_data_url(&url) })
    }

    /// Like [`Pipeline::data_url`], decoded back into an image.
    pub fn image(&self, draw: impl DrawStrategy + 'static) -> Pipeline<DecodedImage> {
        self.data_url(draw)
            .then(|url| async move { encode::image_from_data_url(&url) })
    }

    /// Append `more` resources, loaded with the pipeline's initializer.
    ///
    /// The result holds the existing images followed by the new ones.
    pub fn load(&self, more: Vec<Resource>) -> Pipeline {
        self.load_with(more, self.opts.initializer.clone())
    }

    /// Append `more` resources, loading remote ones with `initializer`.
    pub fn load_with(&self, more: Vec<Resource>, initializer: Initializer) -> Pipeline {
        let mut resources = self.resources.as_ref().clone();
        resources.extend(more.iter().cloned());

        let pending = self.pending.clone();
        let images = self.images.clone();
        let fetcher = Arc::clone(&self.opts.fetcher);

        self.with_images(resources, async move {
            let existing = async move {
                pending.await?;
                images.await
            };
            let added = async { load_all(&more, &initializer, fetcher.as_ref()).await };

            let (mut all, added) = futures::future::try_join(existing, added).await?;
            all.extend(added);
            Ok::<_, WatermarkError>(all)
        })
    }

    /// Reload the current resource list from scratch.
    pub fn render(&self) -> Pipeline {
        let resources = Arc::clone(&self.resources);
        let pending = self.pending.clone();
        let initializer = self.opts.initializer.clone();
        let fetcher = Arc::clone(&self.opts.fetcher);

        self.with_images(self.resources.as_ref().clone(), async move {
            pending.await?;
            load_all(&resources, &initializer, fetcher.as_ref()).await
        })
    }
}

impl<T> IntoFuture for Pipeline<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = WatermarkResult<T>;
    type IntoFuture = SharedResult<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.pending
    }
}

/// Rasterize, draw and serialize. All rasterized surfaces are released, even
/// when the strategy fails or panics.
fn compose(
    images: &[DecodedImage],
    draw: &dyn DrawStrategy,
    pool: &SurfacePool,
    output: encode::OutputFormat,
    quality: u8,
) -> WatermarkResult<String> {
    let timer = PipelineMetrics::global().compose_duration.start_timer();
    let mut surfaces = raster::to_surfaces(images, pool);

    let drawn = panic::catch_unwind(AssertUnwindSafe(|| draw.draw(&mut surfaces)))
        .unwrap_or_else(|payload| {
            Err(WatermarkError::draw(format!(
                "Draw strategy panicked: {}",
                panic_message(payload.as_ref())
            )))
        });

    let result = match drawn {
        Ok(Composed::Source(index)) => match surfaces.get(index) {
            Some(surface) => encode::image_to_data_url(surface.as_image(), output, quality),
            None => Err(WatermarkError::draw(format!(
                "Draw strategy selected surface {index} but only {} exist",
                surfaces.len()
            ))),
        },
        Ok(Composed::Drawn(surface)) => {
            let encoded = encode::image_to_data_url(surface.as_image(), output, quality);
            pool.release(surface);
            encoded
        }
        Err(e) => Err(e),
    };

    let released = surfaces.len();
    for surface in surfaces {
        pool.release(surface);
    }
    timer.observe_duration();

    tracing::debug!(
        surfaces = released,
        pool_len = pool.len(),
        ok = result.is_ok(),
        "Composition finished"
    );
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
