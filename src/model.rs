use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes since local midnight, the only time-of-day type.
/// Span ends may be `DAY_END` (24:00) to close out a day.
pub type Minute = u16;

/// Exclusive upper bound of a day: 24h in minutes.
pub const DAY_END: Minute = 24 * 60;

/// Minute-of-day for a wall-clock time, truncating seconds.
pub fn minute_of(t: NaiveTime) -> Minute {
    (t.hour() * 60 + t.minute()) as Minute
}

/// `"09:00"`-style label for a minute-of-day. 1440 renders as `"24:00"`.
pub fn hhmm(m: Minute) -> String {
    format!("{:02}:{:02}", m / 60, m % 60)
}

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Ulid);

        impl $name {
            pub fn generate() -> Self {
                Self(Ulid::new())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// A rentable space. Owned by the wider marketplace, referenced here.
    SpaceId
);
id_type!(
    /// A blocked interval row.
    BlockId
);
id_type!(
    /// A booking row in the sibling subsystem.
    BookingId
);

/// Half-open minute range `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: Minute,
    pub end: Minute,
}

impl TimeSpan {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "TimeSpan start must be before end");
        debug_assert!(end <= DAY_END, "TimeSpan must stay within the day");
        Self { start, end }
    }

    pub fn duration_min(&self) -> Minute {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_minute(&self, m: Minute) -> bool {
        self.start <= m && m < self.end
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", hhmm(self.start), hhmm(self.end))
    }
}

/// An owner-declared unavailable range for one space on one date.
/// Maps 1:1 onto the hosted `blocked_hours` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedInterval {
    pub id: BlockId,
    pub space_id: SpaceId,
    pub date: NaiveDate,
    pub span: TimeSpan,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create payload; the store assigns id and audit stamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlock {
    pub space_id: SpaceId,
    pub date: NaiveDate,
    pub span: TimeSpan,
    pub reason: Option<String>,
}

/// Booking lifecycle as the sibling subsystem defines it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Only confirmed/completed bookings occupy slots.
    pub fn occupies(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Completed)
    }
}

/// A booking row, consumed read-only. Multi-day bookings repeat the same
/// daily time span on every date in `[start_date, end_date]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub space_id: SpaceId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub span: TimeSpan,
    pub status: BookingStatus,
}

impl Booking {
    /// The span this booking occupies on `date`, if any.
    pub fn span_on(&self, date: NaiveDate) -> Option<TimeSpan> {
        (self.start_date <= date && date <= self.end_date).then_some(self.span)
    }
}

/// Derived per-slot state, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Blocked,
    Booked,
    Pending,
}

/// All blocked intervals of one space, keyed by date.
/// Each day's vec stays sorted by `span.start`.
#[derive(Debug, Clone, Default)]
pub struct SpaceDays {
    pub days: BTreeMap<NaiveDate, Vec<BlockedInterval>>,
}

impl SpaceDays {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert maintaining per-day sort order by span start.
    pub fn insert(&mut self, block: BlockedInterval) {
        let day = self.days.entry(block.date).or_default();
        let pos = day
            .binary_search_by_key(&block.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        day.insert(pos, block);
    }

    /// Remove by id; drops the day entry when it empties.
    pub fn remove(&mut self, date: NaiveDate, id: BlockId) -> Option<BlockedInterval> {
        let day = self.days.get_mut(&date)?;
        let pos = day.iter().position(|b| b.id == id)?;
        let removed = day.remove(pos);
        if day.is_empty() {
            self.days.remove(&date);
        }
        Some(removed)
    }

    pub fn day(&self, date: NaiveDate) -> &[BlockedInterval] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Blocks on `date` whose span overlaps `query`.
    /// Uses binary search to skip blocks starting at or after `query.end`.
    pub fn overlapping(&self, date: NaiveDate, query: TimeSpan) -> impl Iterator<Item = &BlockedInterval> {
        let day = self.day(date);
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = day.partition_point(|b| b.span.start < query.end);
        day[..right_bound].iter().filter(move |b| b.span.end > query.start)
    }

    /// All blocks with `start <= date <= end`, in `(date, span.start)` order.
    pub fn in_range(&self, start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = &BlockedInterval> {
        self.days.range(start..=end).flat_map(|(_, day)| day.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn len(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }
}

/// One block mutation, as persisted to the journal and fanned out on the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockEvent {
    Created {
        id: BlockId,
        space_id: SpaceId,
        date: NaiveDate,
        span: TimeSpan,
        reason: Option<String>,
        created_at: DateTime<Utc>,
    },
    Deleted {
        id: BlockId,
        space_id: SpaceId,
        date: NaiveDate,
    },
}

impl BlockEvent {
    pub fn space_id(&self) -> SpaceId {
        match self {
            BlockEvent::Created { space_id, .. } | BlockEvent::Deleted { space_id, .. } => *space_id,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            BlockEvent::Created { date, .. } | BlockEvent::Deleted { date, .. } => *date,
        }
    }
}

/// Where "now" comes from. `Fixed` pins the clock for deterministic gating.
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    System,
    Fixed(NaiveDateTime),
}

impl Clock {
    /// Wall-clock now in the space's timezone.
    pub fn local_now(&self, tz: FixedOffset) -> NaiveDateTime {
        match self {
            Clock::System => Utc::now().with_timezone(&tz).naive_local(),
            Clock::Fixed(dt) => *dt,
        }
    }
}
