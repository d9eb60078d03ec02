//! Date arithmetic helpers for the forecast facade.
//!
//! Rata Die day-numbering gives O(1) day differences without going through
//! `jiff::Span`'s normalization machinery, which matters in a hot loop.

use jiff::civil::Date;

/// Convert a civil date to a Rata Die day number (days since 0001-01-01),
/// using the proleptic Gregorian algorithm from Baum (2017).
#[inline]
fn rata_die(d: Date) -> i32 {
    let y = d.year() as i32;
    let m = d.month() as i32;
    let day = d.day() as i32;

    let a = (14 - m) / 12;
    let y2 = y - a;
    let m2 = m + 12 * a - 3;

    day + (153 * m2 + 2) / 5 + 365 * y2 + y2 / 4 - y2 / 100 + y2 / 400 - 306
}

/// Calendar days between two dates (`d2 - d1`), positive when `d2 > d1`.
#[inline]
pub fn days_between(d1: Date, d2: Date) -> i32 {
    rata_die(d2) - rata_die(d1)
}

/// Calendar weeks between two dates, as a fraction.
pub fn weeks_between(d1: Date, d2: Date) -> f64 {
    days_between(d1, d2) as f64 / 7.0
}

/// Business weeks between two dates: counts weekdays (Mon-Fri) and divides
/// by 5, so a full 7-calendar-day span always yields exactly 1.0 regardless
/// of which weekday it starts on.
pub fn business_weeks_between(d1: Date, d2: Date) -> f64 {
    let total_days = days_between(d1, d2);
    if total_days <= 0 {
        return 0.0;
    }
    let full_weeks = total_days / 7;
    let remainder_days = total_days % 7;

    let mut weekday_count = full_weeks * 5;
    let start_weekday = d1.weekday().to_monday_zero_offset() as i32; // 0=Mon..6=Sun
    for i in 0..remainder_days {
        let wd = (start_weekday + i) % 7;
        if wd < 5 {
            weekday_count += 1;
        }
    }
    weekday_count as f64 / 5.0
}
