// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total range fetches served by the store.
pub const STORE_FETCHES_TOTAL: &str = "offhours_store_fetches_total";

/// Counter: total window-schedule queries answered by the engine.
pub const WINDOW_QUERIES_TOTAL: &str = "offhours_window_queries_total";

/// Counter: total slot toggles that reached the store.
pub const TOGGLES_TOTAL: &str = "offhours_toggles_total";

/// Histogram: toggle latency in seconds, fetch through committed write.
pub const TOGGLE_DURATION_SECONDS: &str = "offhours_toggle_duration_seconds";

/// Counter: mutations rejected by the conflict guard before any write.
pub const CONFLICT_REJECTS_TOTAL: &str = "offhours_conflict_rejects_total";

/// Counter: creates rejected because an overlapping block already exists.
pub const STORE_OVERLAP_REJECTS_TOTAL: &str = "offhours_store_overlap_rejects_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: blocks durably created.
pub const BLOCKS_CREATED_TOTAL: &str = "offhours_blocks_created_total";

/// Counter: blocks durably deleted.
pub const BLOCKS_DELETED_TOTAL: &str = "offhours_blocks_deleted_total";

/// Counter: calendar windows served from cache.
pub const CACHE_HITS_TOTAL: &str = "offhours_cache_hits_total";

/// Counter: calendar windows that had to be fetched.
pub const CACHE_MISSES_TOTAL: &str = "offhours_cache_misses_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "offhours_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "offhours_journal_flush_batch_size";
