//! Trading-day window arithmetic.
//!
//! Exchange holidays are not modelled. A holiday inside the window simply
//! returns an empty roster and is reported as a skipped day.

use time::{Date, Duration, Weekday};

const SECONDS_PER_DAY: i64 = 86_400;

pub fn is_business_day(date: Date) -> bool {
    !matches!(date.weekday(), Weekday::Saturday | Weekday::Sunday)
}

/// The last `days` business days in `[end - (days + extra_lookback), end]`,
/// ascending. Fewer are returned when the range holds fewer. A range
/// reaching past [`Date::MIN`] starts there.
pub fn trailing_business_days(end: Date, days: usize, extra_lookback: usize) -> Vec<Date> {
    if days == 0 {
        return Vec::new();
    }

    let start = i64::try_from(days.saturating_add(extra_lookback))
        .ok()
        .and_then(|span| span.checked_mul(SECONDS_PER_DAY))
        .and_then(|seconds| end.checked_sub(Duration::seconds(seconds)))
        .unwrap_or(Date::MIN);

    let mut window = Vec::new();
    let mut cursor = Some(end);
    while let Some(date) = cursor.filter(|date| *date >= start && window.len() < days) {
        if is_business_day(date) {
            window.push(date);
        }
        cursor = date.previous_day();
    }

    window.reverse();
    window
}
