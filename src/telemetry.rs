//! Telemetry metric name constants.
//!
//! Consumers install their own `metrics` recorder (e.g. prometheus, statsd);
//! without a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `cardcrafter_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `operation`: which cache was consulted, "remote" or "wp_query"
//! - `status`: outcome, "ok" or "error"

/// Total cache hits.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "cardcrafter_cache_hits_total";

/// Total cache misses.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "cardcrafter_cache_misses_total";

/// Total outbound fetches actually sent over the network.
///
/// Labels: `status` ("ok" | "error").
pub const FETCHES_TOTAL: &str = "cardcrafter_fetches_total";

/// Total fetches refused by the private-network guard.
pub const BLOCKED_TARGETS_TOTAL: &str = "cardcrafter_blocked_targets_total";

/// Total requests rejected by the rate limiter.
pub const RATE_LIMITED_TOTAL: &str = "cardcrafter_rate_limited_total";

/// Total cache keys evicted by content mutation events.
///
/// Labels: `content_type`.
pub const INVALIDATIONS_TOTAL: &str = "cardcrafter_invalidations_total";

/// Total tracked URLs processed by the background refresh.
///
/// Labels: `status` ("ok" | "error").
pub const REFRESHES_TOTAL: &str = "cardcrafter_refreshes_total";
