//! Prometheus metrics for the depth pipeline and node pool.
//!
//! This module provides metrics for:
//! - Update processing latency
//! - Applied, buffered and discarded updates
//! - Resyncs by reason and pre-sync buffer overflows
//! - Node pool allocation, reuse and purge counts

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Update processing latency metric name.
pub const METRIC_PROCESS_LATENCY: &str = "depth_process_latency_ms";
/// Updates applied counter metric name.
pub const METRIC_UPDATES_APPLIED: &str = "depth_updates_applied_total";
/// Updates buffered counter metric name.
pub const METRIC_UPDATES_BUFFERED: &str = "depth_updates_buffered_total";
/// Updates discarded counter metric name.
pub const METRIC_UPDATES_DISCARDED: &str = "depth_updates_discarded_total";
/// Snapshots loaded counter metric name.
pub const METRIC_SNAPSHOTS_LOADED: &str = "depth_snapshots_loaded_total";
/// Resyncs counter metric name.
pub const METRIC_RESYNCS: &str = "depth_resyncs_total";
/// Buffer overflows counter metric name.
pub const METRIC_BUFFER_OVERFLOWS: &str = "depth_buffer_overflows_total";
/// Node allocations counter metric name.
pub const METRIC_POOL_ALLOCATIONS: &str = "node_pool_allocations_total";
/// Node reuses counter metric name.
pub const METRIC_POOL_REUSES: &str = "node_pool_reuses_total";
/// Node purges counter metric name.
pub const METRIC_POOL_PURGED: &str = "node_pool_purged_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_PROCESS_LATENCY,
        "Depth update processing latency in milliseconds"
    );

    describe_counter!(METRIC_UPDATES_APPLIED, "Total number of depth updates applied");
    describe_counter!(
        METRIC_UPDATES_BUFFERED,
        "Total number of depth updates buffered before a snapshot"
    );
    describe_counter!(
        METRIC_UPDATES_DISCARDED,
        "Total number of depth updates discarded as stale or during resync"
    );
    describe_counter!(METRIC_SNAPSHOTS_LOADED, "Total number of snapshots loaded");
    describe_counter!(METRIC_RESYNCS, "Total number of resyncs triggered");
    describe_counter!(
        METRIC_BUFFER_OVERFLOWS,
        "Total number of pre-sync buffer overflows"
    );
    describe_counter!(METRIC_POOL_ALLOCATIONS, "Total number of ladder nodes allocated");
    describe_counter!(METRIC_POOL_REUSES, "Total number of ladder nodes reused");
    describe_counter!(METRIC_POOL_PURGED, "Total number of expired ladder nodes purged");

    debug!("Metrics initialized");
}

/// Increment updates applied counter.
pub fn inc_updates_applied() {
    counter!(METRIC_UPDATES_APPLIED).increment(1);
}

/// Increment updates buffered counter.
pub fn inc_updates_buffered() {
    counter!(METRIC_UPDATES_BUFFERED).increment(1);
}

/// Increment updates discarded counter.
pub fn inc_updates_discarded(count: u64) {
    counter!(METRIC_UPDATES_DISCARDED).increment(count);
}

/// Increment snapshots loaded counter.
pub fn inc_snapshots_loaded() {
    counter!(METRIC_SNAPSHOTS_LOADED).increment(1);
}

/// Increment resyncs counter for a reason.
pub fn inc_resyncs(reason: &'static str) {
    counter!(METRIC_RESYNCS, "reason" => reason).increment(1);
}

/// Increment buffer overflows counter.
pub fn inc_buffer_overflows() {
    counter!(METRIC_BUFFER_OVERFLOWS).increment(1);
}

/// Increment node allocations counter.
pub fn inc_pool_allocations() {
    counter!(METRIC_POOL_ALLOCATIONS).increment(1);
}

/// Increment node reuses counter.
pub fn inc_pool_reuses() {
    counter!(METRIC_POOL_REUSES).increment(1);
}

/// Increment node purges counter.
pub fn inc_pool_purged(count: u64) {
    counter!(METRIC_POOL_PURGED).increment(count);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(self.elapsed_ms());
    }
}

/// Create a latency timer for depth update processing.
pub fn timer_process() -> LatencyTimer {
    LatencyTimer::new(METRIC_PROCESS_LATENCY)
}
