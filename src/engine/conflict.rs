use chrono::{NaiveDate, NaiveDateTime};

use crate::model::{Booking, DAY_END, Minute, TimeSpan, minute_of};

use super::error::{EngineError, LockReason};

/// Past-slot rule, relative to `now` in the space's timezone: dates before
/// today are entirely locked, today locks every slot whose start has been
/// reached, future dates are never past.
pub(crate) fn slot_is_past(date: NaiveDate, slot_start: Minute, now: NaiveDateTime) -> bool {
    let today = now.date();
    if date < today {
        return true;
    }
    if date > today {
        return false;
    }
    slot_start <= minute_of(now.time())
}

pub(crate) fn assert_not_past(
    date: NaiveDate,
    slot_start: Minute,
    now: NaiveDateTime,
) -> Result<(), EngineError> {
    if slot_is_past(date, slot_start, now) {
        return Err(EngineError::NotModifiable(LockReason::Past));
    }
    Ok(())
}

pub(crate) fn validate_span(span: TimeSpan) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::LimitExceeded("span start must precede end"));
    }
    if span.end > DAY_END {
        return Err(EngineError::LimitExceeded("span runs past the end of the day"));
    }
    Ok(())
}

/// First confirmed/completed booking whose span intersects `span` on `date`.
pub(crate) fn occupying_booking<'a>(
    date: NaiveDate,
    span: TimeSpan,
    bookings: &'a [Booking],
) -> Option<&'a Booking> {
    bookings.iter().find(|b| {
        b.status.occupies() && b.span_on(date).is_some_and(|s| s.overlaps(&span))
    })
}
