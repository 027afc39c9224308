use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::availability::TimeSlot;
use super::error::CalendarError;
use crate::messaging::tone::Tone;
use crate::shared::utils::date::{local_to_utc, parse_clock_time};
use crate::shared::utils::path::contract_tilde;

pub const REQUIRED_KEYS: [&str; 5] = ["user_id", "timezone", "working_hours", "preferences", "events"];

const LOCAL_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantCalendar {
    pub user_id: String,
    pub timezone: String,
    pub working_hours: WorkingHours,
    pub preferences: Preferences,
    pub events: Vec<CalendarEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: String,
    pub end: String,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: "09:00".to_string(),
            end: "17:00".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_flexibility")]
    pub flexibility_score: f64,
    #[serde(default)]
    pub priorities: Vec<String>,
    #[serde(default)]
    pub tone: Tone,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            flexibility_score: default_flexibility(),
            priorities: vec![],
            tone: Tone::default(),
        }
    }
}

fn default_flexibility() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    #[serde(default, alias = "summary")]
    pub title: Option<String>,
    pub start: String,
    pub end: String,
}

pub fn load_calendar(path: &Path) -> Result<ParticipantCalendar, CalendarError> {
    let content =
        fs::read_to_string(path).map_err(|e| CalendarError::Io(contract_tilde(path), e))?;
    parse_calendar(&content)
}

pub fn parse_calendar(content: &str) -> Result<ParticipantCalendar, CalendarError> {
    let value: Value = serde_json::from_str(content)?;
    let object = value.as_object().ok_or(CalendarError::NotAnObject)?;

    for key in REQUIRED_KEYS {
        if !object.contains_key(key) {
            return Err(CalendarError::MissingKey(key.to_string()));
        }
    }

    let calendar: ParticipantCalendar = serde_json::from_value(value)?;
    calendar.validate()?;
    Ok(calendar)
}

/// Converts an ISO-8601 date-time to UTC. Values without an offset are
/// read as wall-clock time in `tz`.
pub fn to_utc(value: &str, tz: &Tz) -> Result<DateTime<Utc>, CalendarError> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .and_then(|naive| local_to_utc(naive, tz))
        .ok_or_else(|| CalendarError::InvalidDateTime(value.to_string()))
}

impl ParticipantCalendar {
    pub fn tz(&self) -> Result<Tz, CalendarError> {
        self.timezone
            .parse()
            .map_err(|_| CalendarError::InvalidTimezone(self.timezone.clone()))
    }

    pub fn flexibility(&self) -> f64 {
        self.preferences.flexibility_score.clamp(0.0, 1.0)
    }

    /// Working hours on the local date `date`, in UTC. An end at or before
    /// the start means the shift runs past midnight.
    pub fn working_window(&self, date: NaiveDate) -> Result<TimeSlot, CalendarError> {
        let tz = self.tz()?;
        let start_time = parse_clock_time(&self.working_hours.start)
            .ok_or_else(|| CalendarError::InvalidTime(self.working_hours.start.clone()))?;
        let end_time = parse_clock_time(&self.working_hours.end)
            .ok_or_else(|| CalendarError::InvalidTime(self.working_hours.end.clone()))?;

        let start_local = date.and_time(start_time);
        let mut end_local = date.and_time(end_time);
        if end_local <= start_local {
            end_local += Duration::days(1);
        }

        let start = local_to_utc(start_local, &tz)
            .ok_or_else(|| CalendarError::InvalidDateTime(start_local.to_string()))?;
        let end = local_to_utc(end_local, &tz)
            .ok_or_else(|| CalendarError::InvalidDateTime(end_local.to_string()))?;

        Ok(TimeSlot::new(start, end))
    }

    pub fn working_windows(&self, days: &[NaiveDate]) -> Result<Vec<TimeSlot>, CalendarError> {
        days.iter().map(|day| self.working_window(*day)).collect()
    }

    /// Busy intervals in UTC, sorted by start.
    pub fn busy_slots(&self) -> Result<Vec<TimeSlot>, CalendarError> {
        let tz = self.tz()?;
        let mut busy = self
            .events
            .iter()
            .map(|event| {
                Ok(TimeSlot::new(
                    to_utc(&event.start, &tz)?,
                    to_utc(&event.end, &tz)?,
                ))
            })
            .collect::<Result<Vec<_>, CalendarError>>()?;
        busy.sort();
        Ok(busy)
    }

    pub fn is_busy(&self, slot: &TimeSlot) -> Result<bool, CalendarError> {
        Ok(self.busy_slots()?.iter().any(|busy| busy.overlaps(slot)))
    }

    fn validate(&self) -> Result<(), CalendarError> {
        self.tz()?;
        for value in [&self.working_hours.start, &self.working_hours.end] {
            if parse_clock_time(value).is_none() {
                return Err(CalendarError::InvalidTime(value.clone()));
            }
        }
        self.busy_slots()?;
        Ok(())
    }
}
