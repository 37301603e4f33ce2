//! Configuration surface (specification §6).
//!
//! `Config` is owned by the `Reader` for its lifetime. The per-extraction
//! knobs (`workers`, `smart_ordering`, the per-page deadline) are instead
//! taken by `orchestrator::ExtractorBuilder`, since they can legitimately
//! differ between two `extract()` calls against the same open document.

use std::time::Duration;

/// Default cap applied to a decoded hex string (specification §4.1).
pub const DEFAULT_MAX_HEX_STRING_BYTES: usize = 100 * 1024 * 1024;

/// Default cap applied to a decoded stream (specification §4.3).
pub const DEFAULT_MAX_STREAM_BYTES: usize = 200 * 1024 * 1024;

/// Default number of token/resolve iterations between cancellation polls
/// (specification §4.1, §9).
pub const DEFAULT_CHECK_INTERVAL: usize = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Deadline per page; `None` = unlimited.
    pub max_parse_time: Option<Duration>,
    pub max_hex_string_bytes: usize,
    pub max_stream_bytes: usize,
    pub check_interval: usize,
    /// Parallelism for multi-page extraction; `None` defers to the logical
    /// CPU count capped at the number of pending pages (specification §5).
    pub workers: Option<usize>,
    /// If true, `layout` runs; otherwise extraction falls back to naive
    /// top-down / left-right order.
    pub smart_ordering: bool,
    /// LRU bound on the object cache. `None` defers to
    /// `min(10 * page_count, 5000)` once the page count is known.
    pub cache_capacity: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_parse_time: None,
            max_hex_string_bytes: DEFAULT_MAX_HEX_STRING_BYTES,
            max_stream_bytes: DEFAULT_MAX_STREAM_BYTES,
            check_interval: DEFAULT_CHECK_INTERVAL,
            workers: None,
            smart_ordering: true,
            cache_capacity: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the effective object-cache capacity now that the page count
    /// is known (specification §4.3: `min(10 * page_count, 5000)`).
    pub fn effective_cache_capacity(&self, page_count: usize) -> usize {
        self.cache_capacity
            .unwrap_or_else(|| (10 * page_count).min(5000).max(1))
    }

    /// Resolve the effective worker count now that the pending page count
    /// is known (specification §5).
    pub fn effective_workers(&self, pending_pages: usize) -> usize {
        let cpu = self.workers.unwrap_or_else(num_cpus_fallback);
        cpu.max(1).min(pending_pages.max(1))
    }
}

/// `victor` and the rest of the corpus pull in a logical-CPU-count crate
/// for this; we keep the dependency surface minimal and query the
/// platform's hint directly, matching `std::thread::available_parallelism`
/// (stable since Rust 1.59) rather than adding a dependency for one call.
fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_capacity_defaults_to_ten_times_page_count_capped_at_5000() {
        let config = Config::default();
        assert_eq!(config.effective_cache_capacity(10), 100);
        assert_eq!(config.effective_cache_capacity(10_000), 5000);
    }

    #[test]
    fn explicit_cache_capacity_overrides_the_default() {
        let mut config = Config::default();
        config.cache_capacity = Some(42);
        assert_eq!(config.effective_cache_capacity(10_000), 42);
    }

    #[test]
    fn worker_count_never_exceeds_pending_pages() {
        let mut config = Config::default();
        config.workers = Some(16);
        assert_eq!(config.effective_workers(3), 3);
        assert_eq!(config.effective_workers(0), 1);
    }
}
