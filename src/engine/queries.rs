use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::limits::MAX_QUERY_DAYS;
use crate::model::{Minute, SlotStatus, SpaceId};

use super::status::slot_statuses;
use super::{Engine, EngineError};

/// One calendar day resolved to per-slot statuses, keyed by slot start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub slots: BTreeMap<Minute, SlotStatus>,
}

impl DaySchedule {
    pub fn status(&self, start: Minute) -> Option<SlotStatus> {
        self.slots.get(&start).copied()
    }

    pub fn blocked_count(&self) -> usize {
        self.slots
            .values()
            .filter(|s| **s == SlotStatus::Blocked)
            .count()
    }
}

impl Engine {
    /// Per-slot statuses for every day in `[start, end]`, one schedule per
    /// day in order. A space with no blocks and no bookings comes back fully
    /// available.
    pub async fn window_schedule(
        &self,
        space_id: SpaceId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DaySchedule>, EngineError> {
        if (end - start).num_days() + 1 > MAX_QUERY_DAYS {
            return Err(EngineError::LimitExceeded("window too wide"));
        }
        metrics::counter!(crate::observability::WINDOW_QUERIES_TOTAL).increment(1);

        let (blocks, bookings) = self.fetch_window(space_id, start, end).await?;

        let days = start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|date| {
                let day_blocks: Vec<_> = blocks.iter().filter(|b| b.date == date).cloned().collect();
                DaySchedule {
                    date,
                    slots: slot_statuses(self.grid, date, &day_blocks, &bookings),
                }
            })
            .collect();
        Ok(days)
    }

    pub async fn day_schedule(
        &self,
        space_id: SpaceId,
        date: NaiveDate,
    ) -> Result<DaySchedule, EngineError> {
        let mut days = self.window_schedule(space_id, date, date).await?;
        Ok(days.pop().expect("single-day window"))
    }
}
