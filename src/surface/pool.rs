//! Pool of reusable drawing surfaces.
//!
//! The pool hands out surfaces on demand and takes them back once their
//! content has been consumed. Checkout moves a [`Surface`] out of the pool and
//! release consumes it, so a surface can never be handed to two callers at
//! once and can never be released twice.
//!
//! Growth is lazy: `pop` allocates a new surface whenever none is available.
//! By default the pool retains every released surface; `max_retained` bounds
//! how many idle surfaces are kept.

use super::Surface;
use crate::metrics::PipelineMetrics;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

/// Process-wide shared pool used when a pipeline is not given one.
static SHARED_POOL: OnceLock<SurfacePool> = OnceLock::new();

/// Pool configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurfacePoolOpts {
    /// Maximum number of idle surfaces kept for reuse. `None` means unbounded.
    pub max_retained: Option<usize>,
}

impl SurfacePoolOpts {
    /// Options for a pool retaining at most `max` idle surfaces.
    pub fn bounded(max: usize) -> Self {
        Self {
            max_retained: Some(max),
        }
    }
}

/// Lifetime counters for a pool.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SurfacePoolStats {
    /// Surfaces created because none was available.
    pub allocated: u64,
    /// Checkouts served from the available set.
    pub reused: u64,
    /// Surfaces returned and kept for reuse.
    pub released: u64,
    /// Surfaces returned but dropped because the pool was full.
    pub dropped_on_release: u64,
}

struct PoolInner {
    opts: SurfacePoolOpts,
    stats: SurfacePoolStats,
    available: Vec<Surface>,
}

/// Shared handle to a pool of surfaces.
///
/// Cloning the handle shares the pool. `pop` and `release` are guarded by a
/// mutex so concurrent pipelines on a multi-threaded runtime keep the
/// available count consistent.
#[derive(Clone)]
pub struct SurfacePool {
    inner: Arc<Mutex<PoolInner>>,
}

impl std::fmt::Debug for SurfacePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SurfacePool")
            .field("available", &inner.available.len())
            .field("opts", &inner.opts)
            .field("stats", &inner.stats)
            .finish()
    }
}

impl Default for SurfacePool {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfacePool {
    /// Create an empty, unbounded pool.
    pub fn new() -> Self {
        Self::with_opts(SurfacePoolOpts::default())
    }

    /// Create an empty pool with the given options.
    pub fn with_opts(opts: SurfacePoolOpts) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                opts,
                stats: SurfacePoolStats::default(),
                available: Vec::new(),
            })),
        }
    }

    /// The process-wide shared pool, created on first use.
    pub fn shared() -> SurfacePool {
        SHARED_POOL.get_or_init(SurfacePool::new).clone()
    }

    /// Check out a surface, allocating a new empty one when none is available.
    pub fn pop(&self) -> Surface {
        let mut inner = self.inner.lock();
        if let Some(surface) = inner.available.pop() {
            inner.stats.reused = inner.stats.reused.saturating_add(1);
            return surface;
        }

        inner.stats.allocated = inner.stats.allocated.saturating_add(1);
        PipelineMetrics::global().surfaces_allocated.inc();
        tracing::trace!(allocated = inner.stats.allocated, "Allocated new surface");
        Surface::new(0, 0)
    }

    /// Clear a surface and return it to the available set.
    ///
    /// When the pool already retains `max_retained` surfaces the surface is
    /// dropped instead.
    pub fn release(&self, mut surface: Surface) {
        surface.clear();

        let mut inner = self.inner.lock();
        if let Some(max) = inner.opts.max_retained {
            if inner.available.len() >= max {
                inner.stats.dropped_on_release = inner.stats.dropped_on_release.saturating_add(1);
                PipelineMetrics::global().surfaces_dropped.inc();
                return;
            }
        }

        inner.available.push(surface);
        inner.stats.released = inner.stats.released.saturating_add(1);
        PipelineMetrics::global().surfaces_released.inc();
    }

    /// Number of surfaces currently available for checkout.
    pub fn len(&self) -> usize {
        self.inner.lock().available.len()
    }

    /// True when no surface is available for checkout.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every available surface. Checked-out surfaces are unaffected.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.available.len();
        inner.available.clear();
        tracing::debug!(dropped, "Surface pool cleared");
    }

    /// Snapshot of the available surfaces, in pool order.
    ///
    /// The returned surfaces are copies; mutating them does not affect the pool.
    pub fn elements(&self) -> Vec<Surface> {
        self.inner.lock().available.clone()
    }

    /// Identities of the available surfaces, in pool order.
    pub fn element_ids(&self) -> Vec<u64> {
        self.inner.lock().available.iter().map(Surface::id).collect()
    }

    /// Lifetime counters for this pool.
    pub fn stats(&self) -> SurfacePoolStats {
        self.inner.lock().stats.clone()
    }

    /// True when both handles refer to the same pool.
    pub fn same_pool(&self, other: &SurfacePool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Empty the process-wide shared pool.
///
/// Intended for explicit reclamation at shutdown or between tests.
pub fn destroy() {
    SurfacePool::shared().clear();
}
