// Pipeline Prometheus metrics
//
// Provides process-wide counters for:
// - Resource loads by kind (remote, local, decoded) and their failures
// - Surface pool traffic (allocations, releases, drops)
// - Composition latency

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Global metrics for the composition pipeline
pub struct PipelineMetrics {
    /// Resources loaded successfully, labeled by kind
    pub resources_loaded: IntCounterVec,

    /// Resource loads that failed, labeled by kind
    pub resources_failed: IntCounterVec,

    /// Surfaces created because the pool was empty
    pub surfaces_allocated: IntCounter,

    /// Surfaces returned to a pool
    pub surfaces_released: IntCounter,

    /// Surfaces dropped on release because the pool was full
    pub surfaces_dropped: IntCounter,

    /// Time spent rasterizing, drawing and serializing one composition (seconds)
    pub compose_duration: Histogram,
}

/// Global singleton instance of metrics
static METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

impl PipelineMetrics {
    /// Initialize and return the global metrics instance
    ///
    /// Subsequent calls return the same instance.
    pub fn global() -> &'static Self {
        METRICS.get_or_init(|| {
            let resources_loaded = register_int_counter_vec!(
                "watermark_resources_loaded_total",
                "Total number of resources loaded by kind",
                &["kind"] // remote, local, decoded
            )
            .expect("Failed to register resources_loaded_total metric");

            let resources_failed = register_int_counter_vec!(
                "watermark_resources_failed_total",
                "Total number of resource loads that failed by kind",
                &["kind"]
            )
            .expect("Failed to register resources_failed_total metric");

            let surfaces_allocated = register_int_counter!(
                "watermark_surfaces_allocated_total",
                "Total number of surfaces allocated by surface pools"
            )
            .expect("Failed to register surfaces_allocated_total metric");

            let surfaces_released = register_int_counter!(
                "watermark_surfaces_released_total",
                "Total number of surfaces returned to surface pools"
            )
            .expect("Failed to register surfaces_released_total metric");

            let surfaces_dropped = register_int_counter!(
                "watermark_surfaces_dropped_total",
                "Total number of surfaces dropped because a pool was full"
            )
            .expect("Failed to register surfaces_dropped_total metric");

            let compose_duration = register_histogram!(
                "watermark_compose_duration_seconds",
                "Duration of a composition (rasterize, draw, serialize) in seconds",
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
            )
            .expect("Failed to register compose_duration_seconds metric");

            PipelineMetrics {
                resources_loaded,
                resources_failed,
                surfaces_allocated,
                surfaces_released,
                surfaces_dropped,
                compose_duration,
            }
        })
    }

    /// Export every registered metric in Prometheus text format
    pub fn export() -> String {
        // Touch the singleton so the pipeline metrics are always present.
        let _ = Self::global();

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
