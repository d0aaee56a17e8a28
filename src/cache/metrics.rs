//! Metric names emitted by the fragment cache.

pub const METRIC_FRAGMENT_HIT: &str = "tessera_fragment_cache_hit_total";
pub const METRIC_FRAGMENT_MISS: &str = "tessera_fragment_cache_miss_total";
pub const METRIC_FRAGMENT_READ_ERROR: &str = "tessera_fragment_cache_read_error_total";
pub const METRIC_FRAGMENT_WRITE_ERROR: &str = "tessera_fragment_cache_write_error_total";
pub const METRIC_FRAGMENT_MARK_ERROR: &str = "tessera_fragment_cache_mark_error_total";
pub const METRIC_SINGLE_FLIGHT_WAIT: &str = "tessera_fragment_single_flight_wait_total";
pub const METRIC_FRAGMENT_RENDER_MS: &str = "tessera_fragment_render_ms";
