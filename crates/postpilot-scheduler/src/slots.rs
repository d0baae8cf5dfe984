//! Time-slot assignment for a batch of posts.
//!
//! Posts cycle through the account's preferred times of day, one post per
//! calendar day. A slot that would land in the past pushes the cursor a day
//! forward, and that shift carries into every later slot.

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Used when every preferred time fails to parse.
pub const FALLBACK_SLOT_TIMES: [&str; 2] = ["10:00", "19:00"];

/// Parse a `HH:MM` time of day.
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Assign `count` publish instants starting from `start`'s calendar day.
///
/// Slot `i` uses time-of-day `times[i % times.len()]`. Every slot gets its
/// own day; a slot at or before `now` rolls the day cursor forward before
/// the instant is taken.
pub fn assign_slots(
    count: usize,
    best_times: &[String],
    start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let mut times: Vec<NaiveTime> = best_times
        .iter()
        .filter_map(|s| parse_time_of_day(s))
        .collect();
    if times.is_empty() {
        times = FALLBACK_SLOT_TIMES
            .iter()
            .filter_map(|s| parse_time_of_day(s))
            .collect();
    }

    let mut date = start.date_naive();
    let mut slots = Vec::with_capacity(count);
    for i in 0..count {
        let time = times[i % times.len()];
        let mut when = date.and_time(time).and_utc();
        if when <= now {
            date += Duration::days(1);
            when = date.and_time(time).and_utc();
        }
        slots.push(when);
        date += Duration::days(1);
    }
    slots
}
