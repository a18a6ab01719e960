use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::{
    BlockedInterval, Booking, BookingStatus, DAY_END, Minute, SlotStatus, TimeSpan,
};

// ── Slot grid ─────────────────────────────────────────────

/// Fixed-width subdivision of a day. One hour by default; any width that
/// divides 24h works, as long as callers stay on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotGrid {
    slot_minutes: Minute,
}

impl SlotGrid {
    /// Width is validated by config before an engine is built.
    pub(crate) fn new(slot_minutes: Minute) -> Self {
        debug_assert!(slot_minutes > 0 && DAY_END % slot_minutes == 0);
        Self { slot_minutes }
    }

    pub fn slot_minutes(&self) -> Minute {
        self.slot_minutes
    }

    pub fn slots_per_day(&self) -> usize {
        (DAY_END / self.slot_minutes) as usize
    }

    /// All slot starts of a day, ascending.
    pub fn starts(&self) -> impl Iterator<Item = Minute> {
        let width = self.slot_minutes;
        (0..self.slots_per_day() as Minute).map(move |i| i * width)
    }

    /// The span `[start, start + width)` if `start` sits on the grid.
    pub fn slot_at(&self, start: Minute) -> Option<TimeSpan> {
        if start >= DAY_END || start % self.slot_minutes != 0 {
            return None;
        }
        Some(TimeSpan::new(start, start + self.slot_minutes))
    }
}

// ── Status overlay ────────────────────────────────────────

/// Status of a single slot on `date`, overlaying bookings and blocks.
///
/// Booked beats blocked: the two should never coexist on one slot, but a
/// confirmed booking is committed revenue, so it wins if they do. Pending
/// bookings only tag otherwise-free slots.
pub fn slot_status(
    date: NaiveDate,
    slot: TimeSpan,
    blocks: &[BlockedInterval],
    bookings: &[Booking],
) -> SlotStatus {
    let mut pending = false;
    for b in bookings {
        if let Some(span) = b.span_on(date)
            && span.overlaps(&slot)
        {
            if b.status.occupies() {
                return SlotStatus::Booked;
            }
            if b.status == BookingStatus::Pending {
                pending = true;
            }
        }
    }
    if blocks.iter().any(|bl| bl.date == date && bl.span.overlaps(&slot)) {
        return SlotStatus::Blocked;
    }
    if pending {
        return SlotStatus::Pending;
    }
    SlotStatus::Available
}

/// Per-slot statuses for one date across the whole grid.
/// `blocks` and `bookings` may span more dates; only `date` is read.
pub fn slot_statuses(
    grid: SlotGrid,
    date: NaiveDate,
    blocks: &[BlockedInterval],
    bookings: &[Booking],
) -> BTreeMap<Minute, SlotStatus> {
    let mut out = BTreeMap::new();
    for start in grid.starts() {
        let slot = TimeSpan::new(start, start + grid.slot_minutes());
        out.insert(start, slot_status(date, slot, blocks, bookings));
    }
    out
}
