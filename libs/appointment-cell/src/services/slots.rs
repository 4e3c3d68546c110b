// libs/appointment-cell/src/services/slots.rs
use std::sync::LazyLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::models::{AvailableSlot, ConsecutiveSlots};

static CLOCK_TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").expect("valid clock time regex")
});

/// Bounds of a practice calendar day as `[from, to)` in UTC.
///
/// For today the lower bound is `now`, so slots that already started are excluded.
/// Returns `None` when the whole day lies in the past.
pub fn day_window(
    date: NaiveDate,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let midnight = offset
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()?
        .with_timezone(&Utc);
    let end = midnight + Duration::days(1);
    let from = midnight.max(now);

    if from >= end {
        None
    } else {
        Some((from, end))
    }
}

/// Every window of `count` strictly adjacent slots in an ascending slot list.
///
/// `group` is the first window found; `valid_start_slots` holds the first slot of each window.
pub fn consecutive_windows(slots: &[AvailableSlot], count: usize) -> Option<ConsecutiveSlots> {
    if count == 0 || slots.len() < count {
        return None;
    }

    let starts: Vec<usize> = slots
        .windows(count)
        .enumerate()
        .filter(|(_, window)| window.windows(2).all(|pair| pair[0].is_followed_by(&pair[1])))
        .map(|(index, _)| index)
        .collect();

    let first = *starts.first()?;

    Some(ConsecutiveSlots {
        group: slots[first..first + count].to_vec(),
        valid_start_slots: starts.iter().map(|&i| slots[i].clone()).collect(),
    })
}

/// The adjacent run of `count` slots beginning at `start_slot_id`, if there is one.
pub fn run_starting_at(
    slots: &[AvailableSlot],
    start_slot_id: Uuid,
    count: usize,
) -> Option<Vec<AvailableSlot>> {
    let start = slots.iter().position(|slot| slot.id == start_slot_id)?;
    let run = slots.get(start..start + count)?;

    if count > 0 && run.windows(2).all(|pair| pair[0].is_followed_by(&pair[1])) {
        Some(run.to_vec())
    } else {
        None
    }
}

/// Parses the first "3pm", "3:30 PM", "11am" style time in free text into 24-hour form.
pub fn parse_clock_time(text: &str) -> Option<NaiveTime> {
    let captures = CLOCK_TIME_PATTERN.captures(text)?;

    let hour: u32 = captures[1].parse().ok()?;
    let minute: u32 = match captures.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    if !(1..=12).contains(&hour) {
        return None;
    }

    let is_pm = captures[3].eq_ignore_ascii_case("pm");
    let hour = match (hour, is_pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// The requested clock time on `date` in the practice offset, as a UTC instant.
pub fn local_instant(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn exact_slot(slots: &[AvailableSlot], target: DateTime<Utc>) -> Option<&AvailableSlot> {
    slots.iter().find(|slot| slot.start_time == target)
}

/// Slot whose start is closest to `target`. Ties go to the earlier slot in `slots`.
pub fn nearest_slot(slots: &[AvailableSlot], target: DateTime<Utc>) -> Option<&AvailableSlot> {
    slots
        .iter()
        .min_by_key(|slot| (slot.start_time - target).num_seconds().abs())
}
