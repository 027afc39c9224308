use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Resolves a wall-clock time in `tz` to UTC. Times skipped by a DST jump
/// resolve to `None`; repeated times take the earlier instant.
pub fn local_to_utc(naive: NaiveDateTime, tz: &Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn utc_start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

pub fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value.trim(), "%H:%M:%S"))
        .ok()
}

/// Every date from `start` to `end`, both inclusive.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if start > end {
        return vec![];
    }

    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        days.push(current);
        match current.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }

    days
}

/// Offset of `tz` from UTC at `at`, in hours.
pub fn utc_offset_hours(tz: &Tz, at: DateTime<Utc>) -> f64 {
    use chrono::Offset;

    let offset = at.with_timezone(tz).offset().fix();
    offset.local_minus_utc() as f64 / 3600.0
}
