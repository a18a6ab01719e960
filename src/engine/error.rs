use crate::model::{BlockId, BookingId, Minute, hhmm};
use crate::store::StoreError;

/// Why a slot refuses its toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    /// The slot start has already elapsed in the space's timezone.
    Past,
    /// A confirmed or completed booking covers the slot.
    Booked,
}

/// What a would-be reservation or block ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Obstacle {
    Booking(BookingId),
    Block(BlockId),
}

#[derive(Debug)]
pub enum EngineError {
    /// Not a slot start on the configured grid.
    BadSlot(Minute),
    /// Toggle refused at the gate, with the user-facing reason.
    NotModifiable(LockReason),
    /// Create refused before any store write: something already holds the time.
    ConflictOnCreate(Obstacle),
    LimitExceeded(&'static str),
    Store(StoreError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::BadSlot(start) => write!(f, "not a slot start: {}", hhmm(*start)),
            EngineError::NotModifiable(LockReason::Past) => {
                write!(f, "slot is in the past and cannot be changed")
            }
            EngineError::NotModifiable(LockReason::Booked) => {
                write!(f, "slot carries a booking and cannot be changed here")
            }
            EngineError::ConflictOnCreate(Obstacle::Booking(id)) => {
                write!(f, "time is already booked: {id}")
            }
            EngineError::ConflictOnCreate(Obstacle::Block(id)) => {
                write!(f, "time is blocked by the owner: {id}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Store(e) => write!(f, "store: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}

impl EngineError {
    /// Transient failures earn a retry affordance; rejections don't.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Store(e) if e.is_transient())
    }
}
