use std::time::{Duration, Instant};

use chrono::NaiveDate;
use dashmap::DashMap;
use tracing::debug;

use crate::engine::DaySchedule;
use crate::limits::MAX_CACHED_WINDOWS;
use crate::model::SpaceId;

use super::window::DateWindow;

struct CachedWindow {
    days: Vec<DaySchedule>,
    fetched_at: Instant,
}

/// Resolved window schedules, reused until the TTL elapses or a write
/// invalidates them. Staleness here is a performance lever only; writes
/// always invalidate the affected pages immediately.
pub struct RangeCache {
    entries: DashMap<(SpaceId, DateWindow), CachedWindow>,
    ttl: Duration,
}

impl RangeCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    /// Cached days for `window` if still inside the TTL. Stale entries are
    /// dropped on access so they cannot sit at capacity forever.
    pub fn get_fresh(&self, space: SpaceId, window: DateWindow) -> Option<Vec<DaySchedule>> {
        let key = (space, window);
        let fresh = self
            .entries
            .get(&key)
            .and_then(|entry| (entry.fetched_at.elapsed() <= self.ttl).then(|| entry.days.clone()));
        if let Some(days) = fresh {
            metrics::counter!(crate::observability::CACHE_HITS_TOTAL).increment(1);
            return Some(days);
        }
        self.entries.remove(&key);
        metrics::counter!(crate::observability::CACHE_MISSES_TOTAL).increment(1);
        None
    }

    pub fn insert(&self, space: SpaceId, window: DateWindow, days: Vec<DaySchedule>) {
        if self.entries.len() >= MAX_CACHED_WINDOWS {
            self.evict_oldest();
        }
        self.entries
            .insert((space, window), CachedWindow { days, fetched_at: Instant::now() });
    }

    /// Drop every cached window of `space` that shows `date`, plus the pages
    /// adjacent to the one showing it. Returns how many entries went.
    pub fn invalidate(&self, space: SpaceId, date: NaiveDate) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(s, w), _| {
            *s != space
                || !(w.contains(date) || w.next().contains(date) || w.prev().contains(date))
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(space = %space, %date, removed, "cache invalidated");
        }
        removed
    }

    /// Drop every entry, all spaces. For callers that know pages went stale
    /// but not which ones.
    pub fn clear(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        if dropped > 0 {
            debug!(dropped, "cache flushed");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().fetched_at)
            .map(|e| *e.key());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}
