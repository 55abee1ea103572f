//! Telemetry metric name constants.
//!
//! Centralised metric names for mimir operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimir_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `key`: model key the artifact belongs to
//! - `status`: outcome: "ok" or "error"

/// Total artifact generations started by the dispatcher.
///
/// Labels: `key`, `status` ("ok" | "error").
pub const GENERATIONS_TOTAL: &str = "mimir_generations_total";

/// Generation duration in seconds, produce + persist.
///
/// Labels: `key`.
pub const GENERATION_DURATION_SECONDS: &str = "mimir_generation_duration_seconds";

/// Total `write` calls that joined an already running generation.
///
/// Labels: `key`.
pub const INFLIGHT_JOINS_TOTAL: &str = "mimir_inflight_joins_total";

/// Total `read` calls answered from a fresh artifact on disk.
///
/// Labels: `key`.
pub const CACHE_HITS_TOTAL: &str = "mimir_cache_hits_total";

/// Total `read` calls that fell through to generation.
///
/// Labels: `key`.
pub const CACHE_MISSES_TOTAL: &str = "mimir_cache_misses_total";

/// Total background refresh cycles.
///
/// Labels: `key`, `status` ("ok" | "error").
pub const REFRESH_CYCLES_TOTAL: &str = "mimir_refresh_cycles_total";

/// Total obsolete cache files removed by the sweeper.
///
/// Labels: `key`.
pub const SWEEP_REMOVED_TOTAL: &str = "mimir_sweep_removed_total";

/// Total obsolete cache files the sweeper failed to remove.
///
/// Labels: `key`.
pub const SWEEP_FAILURES_TOTAL: &str = "mimir_sweep_failures_total";
