//! Guard-rail constants. Violations surface as `LimitExceeded` errors,
//! never as panics.

/// Widest inclusive date range a single ranged fetch may cover.
/// Two month-grid pages plus slack.
pub const MAX_QUERY_DAYS: i64 = 93;

/// Upper bound on blocks stored per (space, date). With the finest slot
/// granularity a day has 288 slots.
pub const MAX_BLOCKS_PER_DAY: usize = 288;

/// Free-text annotation cap for block reasons.
pub const MAX_REASON_LEN: usize = 500;

/// Dates outside this year range are rejected as nonsense input.
pub const MIN_BLOCK_YEAR: i32 = 2000;
pub const MAX_BLOCK_YEAR: i32 = 2100;

/// Finest configurable slot width.
pub const MIN_SLOT_MINUTES: u16 = 5;

/// Widest calendar window a controller may render (a six-week month grid).
pub const MAX_VISIBLE_DAYS: u32 = 42;

/// Cached windows per range cache before pruning kicks in.
pub const MAX_CACHED_WINDOWS: usize = 64;

/// Journal records larger than this are treated as a corrupt tail on replay.
pub const MAX_JOURNAL_RECORD_BYTES: usize = 64 * 1024;

/// Journal appends between compactions before the maintenance task rewrites
/// the log.
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 10_000;
