use chrono::NaiveDate;
use serde::Serialize;

use crate::model::SlotStatus;

/// Serializable snapshot handed to the embedding UI. Field and status names
/// are part of the embedding contract; tests pin them.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarView {
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub selected_date: Option<NaiveDate>,
    pub locale: String,
    pub state: ViewState,
    pub error: Option<String>,
    pub notice: Option<Notice>,
    pub days: Vec<DayCell>,
    /// Slot rows for the selected date; empty outside `Ready`.
    pub slots: Vec<SlotCell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewState {
    Idle,
    Loading,
    Ready,
    Error,
}

/// One day in the visible range.
#[derive(Debug, Clone, Serialize)]
pub struct DayCell {
    pub date: NaiveDate,
    pub blocked_count: usize,
    pub is_today: bool,
    pub is_past: bool,
    pub is_selected: bool,
}

/// One slot row for the selected date.
#[derive(Debug, Clone, Serialize)]
pub struct SlotCell {
    pub start: String,
    pub end: String,
    pub status: SlotStatus,
    pub toggleable: bool,
    pub in_flight: bool,
}

/// Transient banner for a rejected mutation; cleared on the next navigation.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub action: &'static str,
    pub date: NaiveDate,
    pub slot: String,
    pub message: String,
}
