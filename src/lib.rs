//! Blocked-hours availability core for hourly space rentals.
//!
//! Owners mark hours of a day as unavailable; renters hold or confirm
//! bookings against the same hours. This crate keeps both views consistent:
//!
//! - [`store`]: durable CRUD over blocked intervals. [`store::WalStore`] is
//!   the journal-backed reference implementation; [`store::BookingSource`]
//!   is the read-only seam to the sibling bookings subsystem.
//! - [`engine`]: slot arithmetic over blocks and bookings. Resolves per-slot
//!   statuses, applies the toggle mutation, and guards booking creation
//!   against blocked time before anything is written.
//! - [`calendar`]: per-session presentation controller. Date windows, the
//!   fetch lifecycle, a TTL range cache with fan-out invalidation, and
//!   serializable view snapshots for an embedding UI.
//!
//! All ids are ULIDs, all times are minutes-of-day over naive local dates,
//! and every span is half-open: a block ending at 15:00 leaves 15:00 free.

pub mod calendar;
pub mod config;
pub mod engine;
pub mod feed;
mod journal;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod observability;
pub mod store;

pub use calendar::{CalendarController, CalendarView, RangeCache, ToggleOutcome};
pub use config::{CalendarConfig, EngineConfig};
pub use engine::{Engine, EngineError, ToggleAction};
pub use model::{BlockedInterval, Booking, SlotStatus, SpaceId};
pub use store::{BlockedHourStore, BookingSource, StoreError, WalStore};
