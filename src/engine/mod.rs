mod conflict;
mod error;
mod mutations;
mod queries;
mod status;

pub use error::{EngineError, LockReason, Obstacle};
pub use mutations::ToggleAction;
pub use queries::DaySchedule;
pub use status::{SlotGrid, slot_status, slot_statuses};

pub(crate) use conflict::slot_is_past;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::future::try_join;

use crate::config::{ConfigError, EngineConfig};
use crate::model::{BlockedInterval, Booking, SpaceId};
use crate::store::{BlockedHourStore, BookingSource, StoreError};

/// Slot-level availability and mutation rules on top of a [`BlockedHourStore`].
///
/// The engine owns no calendar state of its own: every call reads through to
/// the store and booking source, so concurrent sessions always see committed
/// writes. Mutations re-check conflicts against a fresh read before touching
/// the store.
pub struct Engine {
    store: Arc<dyn BlockedHourStore>,
    bookings: Arc<dyn BookingSource>,
    grid: SlotGrid,
    op_timeout: Duration,
}

impl Engine {
    pub fn new(
        store: Arc<dyn BlockedHourStore>,
        bookings: Arc<dyn BookingSource>,
        config: &EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            bookings,
            grid: SlotGrid::new(config.slot_minutes),
            op_timeout: config.op_timeout,
        })
    }

    pub fn grid(&self) -> SlotGrid {
        self.grid
    }

    /// Bound a backend call so an unresponsive store surfaces as
    /// [`StoreError::Timeout`] instead of hanging the caller.
    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn fetch_day(
        &self,
        space_id: SpaceId,
        date: NaiveDate,
    ) -> Result<(Vec<BlockedInterval>, Vec<Booking>), EngineError> {
        self.fetch_window(space_id, date, date).await
    }

    /// Blocks and bookings for `[start, end]`, fetched concurrently.
    async fn fetch_window(
        &self,
        space_id: SpaceId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(Vec<BlockedInterval>, Vec<Booking>), EngineError> {
        let (blocks, bookings) = try_join(
            self.bounded(self.store.fetch_by_range(space_id, start, end)),
            self.bounded(self.bookings.fetch_by_range(space_id, start, end)),
        )
        .await?;
        Ok((blocks, bookings))
    }
}
