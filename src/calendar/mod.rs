//! Calendar presentation layer: one controller per UI session.
//!
//! The controller owns the visible date window, the selected day, and the
//! fetch lifecycle (idle, loading, ready, error). Resolved windows are kept
//! in a shared [`RangeCache`] so that flipping between adjacent pages does
//! not refetch, and mutations invalidate exactly the pages they could have
//! changed. Results that land after the user has navigated away are
//! discarded, never spliced into the wrong window.

mod cache;
mod view;
mod window;

pub use cache::RangeCache;
pub use view::{CalendarView, DayCell, Notice, SlotCell, ViewState};
pub use window::DateWindow;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{CalendarConfig, ConfigError};
use crate::engine::{DaySchedule, Engine, ToggleAction, slot_is_past};
use crate::limits::MAX_VISIBLE_DAYS;
use crate::model::{BlockEvent, Clock, Minute, SlotStatus, SpaceId, hhmm};

/// What became of a toggle request, as seen by the session that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The mutation committed and the visible window was refreshed.
    Applied(ToggleAction),
    /// The same slot already has a mutation running; this request was dropped.
    InFlight,
    /// The user navigated away mid-flight; the result was thrown away.
    Discarded,
    /// The engine refused. A [`Notice`] explaining why was posted to the view.
    Rejected,
}

enum Phase {
    Idle,
    Loading,
    Ready { days: Vec<DaySchedule> },
    Error { message: String },
}

struct ControllerState {
    window: DateWindow,
    selected: Option<NaiveDate>,
    phase: Phase,
    /// Slots with a toggle currently running. Guards against double-submit.
    in_flight: HashSet<(NaiveDate, Minute)>,
    notice: Option<Notice>,
    /// Bumped on every navigation. A fetch or toggle holds the epoch it was
    /// started under and writes back only if it still matches.
    epoch: u64,
}

/// Drives one space's calendar for one viewer.
///
/// All methods take `&self`; the mutable session state sits behind a single
/// async mutex which is never held across an engine call, so a slow backend
/// stalls only the operation that hit it, not `view()`.
pub struct CalendarController {
    engine: Arc<Engine>,
    cache: Arc<RangeCache>,
    config: CalendarConfig,
    clock: Clock,
    tz: FixedOffset,
    space: SpaceId,
    state: Mutex<ControllerState>,
}

impl CalendarController {
    pub fn new(
        engine: Arc<Engine>,
        cache: Arc<RangeCache>,
        config: CalendarConfig,
        clock: Clock,
        tz: FixedOffset,
        space: SpaceId,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let today = clock.local_now(tz).date();
        let window = DateWindow::anchored(today, config.visible_days, config.week_starts_on);
        Ok(Self {
            engine,
            cache,
            config,
            clock,
            tz,
            space,
            state: Mutex::new(ControllerState {
                window,
                selected: None,
                phase: Phase::Idle,
                in_flight: HashSet::new(),
                notice: None,
                epoch: 0,
            }),
        })
    }

    pub fn space(&self) -> SpaceId {
        self.space
    }

    /// Jump to the window containing `anchor`, select it, and load.
    pub async fn open(&self, anchor: NaiveDate) {
        let window =
            DateWindow::anchored(anchor, self.config.visible_days, self.config.week_starts_on);
        self.navigate(window, Some(anchor)).await;
    }

    /// Page forward by one full window.
    pub async fn next_window(&self) {
        let window = self.state.lock().await.window.next();
        self.navigate(window, None).await;
    }

    /// Page back by one full window.
    pub async fn prev_window(&self) {
        let window = self.state.lock().await.window.prev();
        self.navigate(window, None).await;
    }

    /// Widget range callback: show exactly `[start, end]`. An inverted or
    /// oversized range becomes an error state rather than a panic or a fetch.
    pub async fn on_range_change(&self, start: NaiveDate, end: NaiveDate) {
        let days = (end - start).num_days() + 1;
        if days < 1 || days > MAX_VISIBLE_DAYS as i64 {
            let mut st = self.state.lock().await;
            st.epoch += 1;
            st.in_flight.clear();
            st.phase = Phase::Error { message: format!("unusable range: {start} to {end}") };
            return;
        }
        self.navigate(DateWindow::new(start, days as u32), None).await;
    }

    /// Selecting a date inside the window is instant; outside it navigates.
    pub async fn on_date_select(&self, date: NaiveDate) {
        {
            let mut st = self.state.lock().await;
            if st.window.contains(date) {
                st.selected = Some(date);
                return;
            }
        }
        let window =
            DateWindow::anchored(date, self.config.visible_days, self.config.week_starts_on);
        self.navigate(window, Some(date)).await;
    }

    /// Re-run a failed fetch. Retries are user-initiated only; no-op unless
    /// the window is in the error state.
    pub async fn retry(&self) {
        let (window, epoch) = {
            let mut st = self.state.lock().await;
            if !matches!(st.phase, Phase::Error { .. }) {
                return;
            }
            st.phase = Phase::Loading;
            (st.window, st.epoch)
        };
        self.fetch_into(window, epoch).await;
    }

    /// Flip one slot between available and blocked.
    ///
    /// At most one mutation per slot may run at a time; a second request for
    /// the same slot returns [`ToggleOutcome::InFlight`] without touching the
    /// engine. Distinct slots toggle concurrently.
    pub async fn toggle(&self, date: NaiveDate, slot_start: Minute) -> ToggleOutcome {
        let epoch = {
            let mut st = self.state.lock().await;
            if !st.in_flight.insert((date, slot_start)) {
                debug!(space = %self.space, %date, slot = %hhmm(slot_start), "toggle already in flight");
                return ToggleOutcome::InFlight;
            }
            st.epoch
        };

        let now = self.clock.local_now(self.tz);
        let result = self.engine.toggle_slot(self.space, date, slot_start, now).await;

        let action = {
            let mut st = self.state.lock().await;
            st.in_flight.remove(&(date, slot_start));
            let navigated = st.epoch != epoch;
            match result {
                Ok(_) if navigated => {
                    drop(st);
                    // The write committed even though the viewer moved on, so
                    // any cached page showing that date is now stale.
                    self.cache.invalidate(self.space, date);
                    return ToggleOutcome::Discarded;
                }
                Err(_) if navigated => return ToggleOutcome::Discarded,
                Err(e) => {
                    st.notice = Some(Notice {
                        action: "toggle",
                        date,
                        slot: hhmm(slot_start),
                        message: e.to_string(),
                    });
                    return ToggleOutcome::Rejected;
                }
                Ok(action) => action,
            }
        };

        self.cache.invalidate(self.space, date);
        let (window, epoch) = {
            let st = self.state.lock().await;
            (st.window, st.epoch)
        };
        self.fetch_into(window, epoch).await;
        ToggleOutcome::Applied(action)
    }

    /// Snapshot of everything the UI needs to render this session.
    pub async fn view(&self) -> CalendarView {
        let st = self.state.lock().await;
        let now = self.clock.local_now(self.tz);
        let today = now.date();

        let (state, error, ready_days) = match &st.phase {
            Phase::Idle => (ViewState::Idle, None, None),
            Phase::Loading => (ViewState::Loading, None, None),
            Phase::Ready { days } => (ViewState::Ready, None, Some(days)),
            Phase::Error { message } => (ViewState::Error, Some(message.clone()), None),
        };

        let days = st
            .window
            .dates()
            .map(|date| DayCell {
                date,
                blocked_count: ready_days
                    .and_then(|ds| ds.iter().find(|d| d.date == date))
                    .map(|d| d.blocked_count())
                    .unwrap_or(0),
                is_today: date == today,
                is_past: date < today,
                is_selected: st.selected == Some(date),
            })
            .collect();

        let slots = match (ready_days, st.selected) {
            (Some(ds), Some(sel)) => ds
                .iter()
                .find(|d| d.date == sel)
                .map(|day| {
                    let grid = self.engine.grid();
                    day.slots
                        .iter()
                        .map(|(start, status)| SlotCell {
                            start: hhmm(*start),
                            end: hhmm(*start + grid.slot_minutes()),
                            status: *status,
                            toggleable: *status != SlotStatus::Booked
                                && !slot_is_past(sel, *start, now),
                            in_flight: st.in_flight.contains(&(sel, *start)),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        CalendarView {
            range_start: st.window.start(),
            range_end: st.window.end(),
            selected_date: st.selected,
            locale: self.config.locale.to_string(),
            state,
            error,
            notice: st.notice.clone(),
            days,
            slots,
        }
    }

    /// Switch window, dropping anything in flight for the old one.
    async fn navigate(&self, window: DateWindow, select: Option<NaiveDate>) {
        let epoch = {
            let mut st = self.state.lock().await;
            st.epoch += 1;
            st.window = window;
            st.in_flight.clear();
            st.notice = None;
            st.selected = select
                .or(st.selected.filter(|d| window.contains(*d)))
                .or(Some(window.start()));
            if let Some(days) = self.cache.get_fresh(self.space, window) {
                st.phase = Phase::Ready { days };
                return;
            }
            st.phase = Phase::Loading;
            st.epoch
        };
        self.fetch_into(window, epoch).await;
    }

    /// Resolve `window` and publish the result, unless the session has
    /// navigated on since `epoch` was captured.
    async fn fetch_into(&self, window: DateWindow, epoch: u64) {
        match self.engine.window_schedule(self.space, window.start(), window.end()).await {
            Ok(days) => {
                self.cache.insert(self.space, window, days.clone());
                let mut st = self.state.lock().await;
                if st.epoch == epoch {
                    st.phase = Phase::Ready { days };
                }
            }
            Err(e) => {
                warn!(space = %self.space, start = %window.start(), error = %e, "window fetch failed");
                let mut st = self.state.lock().await;
                if st.epoch == epoch {
                    st.phase = Phase::Error { message: e.to_string() };
                }
            }
        }
    }
}

/// Pump change-feed events into cache invalidation.
///
/// Other sessions editing the same space announce their writes on the feed;
/// this task drops the cached pages those writes touched so the next render
/// here refetches instead of showing a stale grid. Runs until the feed's
/// sender side is dropped.
pub fn spawn_feed_invalidator(
    cache: Arc<RangeCache>,
    mut receiver: broadcast::Receiver<BlockEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    cache.invalidate(event.space_id(), event.date());
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The skipped events could have touched any page, so the
                    // whole cache goes rather than waiting out the TTL.
                    warn!(skipped, "change feed lagged; cache flushed");
                    cache.clear();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
