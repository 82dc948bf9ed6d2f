//! Busy/free bitmap over one calendar day. One character per slot, `'0'`
//! free and `'2'` busy, matching the availability-view format the deployed
//! assistant prompts already understand.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

/// A calendar event as the calendar adapters report it. Timestamps are UTC;
/// the bitmap computation converts into the tenant timezone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
}

/// The tenant's booking window and slot width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusinessHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub slot_minutes: u32,
}

impl BusinessHours {
    pub fn slot_count(&self) -> usize {
        let window = (self.end - self.start).num_minutes();
        if window <= 0 || self.slot_minutes == 0 {
            return 0;
        }
        (window / i64::from(self.slot_minutes)) as usize
    }
}

/// Computes the bitmap for `date` in `timezone`. Each event marks every slot
/// it overlaps (half-open slot intervals), clipped to the window. Events with
/// zero or negative duration mark nothing; events entirely outside the window
/// mark nothing.
pub fn availability_bitmap(
    events: &[CalendarEvent],
    hours: &BusinessHours,
    date: NaiveDate,
    timezone: Tz,
) -> String {
    let slots = hours.slot_count();
    let mut bitmap = vec![b'0'; slots];
    if slots == 0 {
        return String::new();
    }

    let anchor = date.and_time(hours.start);
    let interval = i64::from(hours.slot_minutes);
    let window_minutes = interval * slots as i64;

    for event in events {
        let start_offset =
            (event.start.with_timezone(&timezone).naive_local() - anchor).num_minutes();
        let end_offset = (event.end.with_timezone(&timezone).naive_local() - anchor).num_minutes();

        if end_offset <= start_offset {
            continue;
        }
        if end_offset <= 0 || start_offset >= window_minutes {
            continue;
        }

        let first = (start_offset.max(0) / interval) as usize;
        let last = (((end_offset - 1).min(window_minutes - 1)) / interval) as usize;
        for slot in bitmap.iter_mut().take(last + 1).skip(first) {
            *slot = b'2';
        }
    }

    String::from_utf8(bitmap).unwrap_or_default()
}

/// A date is fully unavailable when every slot is busy.
pub fn fully_booked(bitmap: &str) -> bool {
    !bitmap.is_empty() && bitmap.bytes().all(|slot| slot == b'2')
}
