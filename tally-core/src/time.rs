//! Time utilities: timezone-aware day boundaries and bucket keys.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Parse an IANA timezone name like "America/Chicago".
pub fn parse_timezone(tz: &str) -> Result<Tz> {
    tz.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid timezone: {tz}"))
}

/// Calendar day of `date` as seen in `tz`. Time-of-day is discarded.
pub fn local_day(date: DateTime<Utc>, tz: Tz) -> NaiveDate {
    date.with_timezone(&tz).date_naive()
}

/// First instant of `day` in `tz`, returned as UTC.
///
/// Zones that skip local midnight for DST start the day at the first local
/// time that exists.
pub fn start_of_day(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    first_existing(midnight, tz)
}

/// Last instant (nanosecond precision) of `day` in `tz`, returned as UTC.
pub fn end_of_day(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let next = day.succ_opt().unwrap_or(NaiveDate::MAX);
    start_of_day(next, tz) - Duration::nanoseconds(1)
}

fn first_existing(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    // DST gaps are at most a couple of hours; step forward in 30 minute steps.
    for step in 0..=6 {
        let candidate = local + Duration::minutes(30 * step);
        if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
            return dt.with_timezone(&Utc);
        }
    }
    Utc.from_utc_datetime(&local)
}

/// `YYYY-MM-DD`, zero padded, so string order equals chronological order.
pub fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// `YYYY-MM`, zero padded.
pub fn month_key(day: NaiveDate) -> String {
    day.format("%Y-%m").to_string()
}
