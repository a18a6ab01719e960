use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::model::{BlockId, BlockedInterval, Minute, NewBlock, SpaceId, TimeSpan};

use super::conflict::{assert_not_past, occupying_booking, validate_span};
use super::error::{EngineError, LockReason, Obstacle};
use super::Engine;

/// What a toggle did to the calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleAction {
    /// The slot was free and is now covered by a fresh one-slot block.
    Blocked(BlockedInterval),
    /// Every block touching the slot was removed.
    Unblocked { removed: Vec<BlockId> },
}

impl Engine {
    /// Flip one slot between available and blocked.
    ///
    /// `now` is the wall clock in the space's timezone; the slot is rejected
    /// outright if its start has already been reached. A slot occupied by a
    /// confirmed booking can never be blocked, and unblocking removes every
    /// block that touches the slot, however the blocks were originally laid
    /// out.
    pub async fn toggle_slot(
        &self,
        space_id: SpaceId,
        date: NaiveDate,
        slot_start: Minute,
        now: NaiveDateTime,
    ) -> Result<ToggleAction, EngineError> {
        let slot = self
            .grid
            .slot_at(slot_start)
            .ok_or(EngineError::BadSlot(slot_start))?;
        assert_not_past(date, slot_start, now)?;

        let started = Instant::now();
        let (blocks, bookings) = self.fetch_day(space_id, date).await?;

        let covering: Vec<BlockId> = blocks
            .iter()
            .filter(|b| b.span.overlaps(&slot))
            .map(|b| b.id)
            .collect();

        if let Some(booking) = occupying_booking(date, slot, &bookings) {
            metrics::counter!(crate::observability::CONFLICT_REJECTS_TOTAL).increment(1);
            return if covering.is_empty() {
                Err(EngineError::ConflictOnCreate(Obstacle::Booking(booking.id)))
            } else {
                // A blocked slot that later got booked stays locked either way.
                Err(EngineError::NotModifiable(LockReason::Booked))
            };
        }

        let action = if covering.is_empty() {
            let block = self
                .bounded(self.store.create(NewBlock {
                    space_id,
                    date,
                    span: slot,
                    reason: None,
                }))
                .await?;
            ToggleAction::Blocked(block)
        } else {
            for id in &covering {
                self.bounded(self.store.delete(*id)).await?;
            }
            ToggleAction::Unblocked { removed: covering }
        };

        metrics::counter!(crate::observability::TOGGLES_TOTAL).increment(1);
        metrics::histogram!(crate::observability::TOGGLE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        debug!(space = %space_id, %date, slot = %slot, "slot toggled");
        Ok(action)
    }

    /// Checkout-time guard: reject `span` on `date` if it collides with a
    /// block or an occupying booking. Pending holds never conflict.
    pub async fn check_booking(
        &self,
        space_id: SpaceId,
        date: NaiveDate,
        span: TimeSpan,
    ) -> Result<(), EngineError> {
        validate_span(span)?;
        let (blocks, bookings) = self.fetch_day(space_id, date).await?;

        if let Some(booking) = occupying_booking(date, span, &bookings) {
            metrics::counter!(crate::observability::CONFLICT_REJECTS_TOTAL).increment(1);
            return Err(EngineError::ConflictOnCreate(Obstacle::Booking(booking.id)));
        }
        if let Some(block) = blocks.iter().find(|b| b.span.overlaps(&span)) {
            metrics::counter!(crate::observability::CONFLICT_REJECTS_TOTAL).increment(1);
            return Err(EngineError::ConflictOnCreate(Obstacle::Block(block.id)));
        }
        Ok(())
    }
}
