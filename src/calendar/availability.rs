use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::error::CalendarError;
use super::model::ParticipantCalendar;
use crate::shared::utils::date::{days_between, utc_offset_hours, utc_start_of_day};

/// Confidence lost by a slot that falls outside someone's working hours.
const OUTSIDE_HOURS_PENALTY: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

impl TimeSlot {
    pub fn new(start_utc: DateTime<Utc>, end_utc: DateTime<Utc>) -> Self {
        Self { start_utc, end_utc }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_utc - self.start_utc).num_minutes()
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start_utc < other.end_utc && other.start_utc < self.end_utc
    }

    pub fn contains(&self, other: &TimeSlot) -> bool {
        self.start_utc <= other.start_utc && other.end_utc <= self.end_utc
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConstraints {
    pub within_working_hours: bool,
    pub duration_ok: bool,
    /// Participants for whom the slot falls outside working hours.
    pub conflicts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotScores {
    pub disruption: f64,
    pub timezone_fairness: f64,
    pub confidence: f64,
}

impl SlotScores {
    pub fn new(disruption: f64, timezone_fairness: f64, within_working_hours: bool) -> Self {
        let mut confidence = (timezone_fairness + (1.0 - disruption)) / 2.0;
        if !within_working_hours {
            confidence -= OUTSIDE_HOURS_PENALTY;
        }

        Self {
            disruption,
            timezone_fairness,
            confidence: round2(confidence.clamp(0.0, 1.0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub slot_id: usize,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub participants: Vec<String>,
    pub constraints: SlotConstraints,
    pub scores: SlotScores,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSearch {
    pub since: NaiveDate,
    pub until: NaiveDate,
    pub duration_minutes: i64,
    pub max_slots: usize,
    pub respect_working_hours: bool,
}

/// Gaps inside `[work_start, work_end)` not covered by `busy`.
pub fn compute_free_slots(
    busy: &[TimeSlot],
    work_start: DateTime<Utc>,
    work_end: DateTime<Utc>,
) -> Vec<TimeSlot> {
    let window = TimeSlot::new(work_start, work_end);
    let mut events: Vec<TimeSlot> = busy.iter().filter(|b| b.overlaps(&window)).copied().collect();
    events.sort();

    let mut free_slots = Vec::new();
    let mut current_time = work_start;

    for event in events {
        if current_time < event.start_utc {
            free_slots.push(TimeSlot::new(current_time, event.start_utc));
        }
        current_time = current_time.max(event.end_utc);
    }

    if current_time < work_end {
        free_slots.push(TimeSlot::new(current_time, work_end));
    }

    free_slots
}

/// Both inputs must be sorted and internally non-overlapping.
pub fn intersect_two(slots_a: &[TimeSlot], slots_b: &[TimeSlot]) -> Vec<TimeSlot> {
    let mut intersections = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < slots_a.len() && j < slots_b.len() {
        let start = slots_a[i].start_utc.max(slots_b[j].start_utc);
        let end = slots_a[i].end_utc.min(slots_b[j].end_utc);

        if start < end {
            intersections.push(TimeSlot::new(start, end));
        }

        if slots_a[i].end_utc < slots_b[j].end_utc {
            i += 1;
        } else {
            j += 1;
        }
    }

    intersections
}

pub fn intersect_all(lists: &[Vec<TimeSlot>]) -> Vec<TimeSlot> {
    let mut iter = lists.iter();
    let Some(first) = iter.next() else {
        return vec![];
    };

    iter.fold(first.clone(), |acc, next| intersect_two(&acc, next))
}

pub fn slot_duration_minutes(slot: &TimeSlot) -> i64 {
    slot.duration_minutes()
}

pub fn duration_ok(slot: &TimeSlot, required_minutes: i64) -> bool {
    slot_duration_minutes(slot) >= required_minutes
}

pub fn tag_constraints(
    slot: &TimeSlot,
    working_windows: &BTreeMap<String, Vec<TimeSlot>>,
    required_minutes: i64,
) -> SlotConstraints {
    let conflicts: Vec<String> = working_windows
        .iter()
        .filter(|(_, windows)| !windows.iter().any(|w| w.contains(slot)))
        .map(|(user, _)| user.clone())
        .collect();

    SlotConstraints {
        within_working_hours: conflicts.is_empty(),
        duration_ok: duration_ok(slot, required_minutes),
        conflicts,
    }
}

/// `1 - mean(flexibility)`; 0 when nobody is involved.
pub fn disruption_score(flexibilities: &[f64]) -> f64 {
    if flexibilities.is_empty() {
        return 0.0;
    }
    let avg_flex = flexibilities.iter().sum::<f64>() / flexibilities.len() as f64;
    round2(1.0 - avg_flex)
}

/// `1 / (1 + spread)` where spread is the widest gap between UTC offsets, in hours.
pub fn timezone_fairness_score(offset_hours: &[f64]) -> f64 {
    let max = offset_hours.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = offset_hours.iter().copied().fold(f64::INFINITY, f64::min);
    if !max.is_finite() || !min.is_finite() {
        return 1.0;
    }
    round2(1.0 / (1.0 + (max - min)))
}

pub fn enrich_slot(
    slot: TimeSlot,
    slot_id: usize,
    participants: Vec<String>,
    constraints: SlotConstraints,
    scores: SlotScores,
) -> CandidateSlot {
    CandidateSlot {
        slot_id,
        start_utc: slot.start_utc,
        end_utc: slot.end_utc,
        participants,
        constraints,
        scores,
    }
}

/// Ranks common free time across `calendars` inside the search range.
///
/// Each participant's free time is computed over the range padded by a day
/// on both sides, so working days that straddle UTC midnight are not lost.
/// Common windows are clipped to the range, split at UTC midnight, and each
/// yields one candidate at its start. Candidates are ordered by confidence,
/// then by start time.
/// Upper bound on a single meeting: one week.
pub const MAX_DURATION_MINUTES: i64 = 7 * 24 * 60;

fn checked_length(minutes: i64) -> Result<Duration, CalendarError> {
    if !(1..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(CalendarError::InvalidDuration(minutes));
    }
    Duration::try_minutes(minutes).ok_or(CalendarError::InvalidDuration(minutes))
}

pub fn find_candidate_slots(
    calendars: &[ParticipantCalendar],
    search: &SlotSearch,
) -> Result<Vec<CandidateSlot>, CalendarError> {
    if calendars.is_empty() {
        return Err(CalendarError::NoParticipants);
    }

    let range_start = utc_start_of_day(search.since);
    let range_end = utc_start_of_day(search.until) + Duration::days(1);
    let padded_days = days_between(
        search.since.pred_opt().unwrap_or(search.since),
        search.until.succ_opt().unwrap_or(search.until),
    );

    let mut free_lists = Vec::with_capacity(calendars.len());
    let mut working_windows = BTreeMap::new();
    let mut zones: Vec<Tz> = Vec::with_capacity(calendars.len());

    for calendar in calendars {
        let busy = calendar.busy_slots()?;
        let windows = calendar.working_windows(&padded_days)?;

        let mut free = Vec::new();
        if search.respect_working_hours {
            for window in &windows {
                free.extend(compute_free_slots(&busy, window.start_utc, window.end_utc));
            }
            free.sort();
        } else {
            free = compute_free_slots(&busy, range_start, range_end);
        }

        free_lists.push(free);
        working_windows.insert(calendar.user_id.clone(), windows);
        zones.push(calendar.tz()?);
    }

    let participants: Vec<String> = calendars.iter().map(|c| c.user_id.clone()).collect();
    let flexibilities: Vec<f64> = calendars.iter().map(|c| c.flexibility()).collect();
    let disruption = disruption_score(&flexibilities);
    let meeting_length = checked_length(search.duration_minutes)?;

    let mut ranked: Vec<(TimeSlot, SlotConstraints, SlotScores)> = Vec::new();
    for common in intersect_all(&free_lists) {
        let clipped = TimeSlot::new(
            common.start_utc.max(range_start),
            common.end_utc.min(range_end),
        );
        for window in split_at_utc_midnight(clipped) {
            if !duration_ok(&window, search.duration_minutes) {
                continue;
            }

            let slot = TimeSlot::new(window.start_utc, window.start_utc + meeting_length);
            let constraints = tag_constraints(&slot, &working_windows, search.duration_minutes);
            let offsets: Vec<f64> = zones
                .iter()
                .map(|tz| utc_offset_hours(tz, slot.start_utc))
                .collect();
            let scores = SlotScores::new(
                disruption,
                timezone_fairness_score(&offsets),
                constraints.within_working_hours,
            );

            ranked.push((slot, constraints, scores));
        }
    }

    ranked.sort_by(|a, b| {
        b.2.confidence
            .total_cmp(&a.2.confidence)
            .then(a.0.start_utc.cmp(&b.0.start_utc))
    });
    ranked.truncate(search.max_slots);

    Ok(ranked
        .into_iter()
        .enumerate()
        .map(|(slot_id, (slot, constraints, scores))| {
            enrich_slot(slot, slot_id, participants.clone(), constraints, scores)
        })
        .collect())
}

fn split_at_utc_midnight(slot: TimeSlot) -> Vec<TimeSlot> {
    let mut parts = Vec::new();
    let mut current = slot.start_utc;

    while current < slot.end_utc {
        let next_midnight = utc_start_of_day(current.date_naive()) + Duration::days(1);
        let end = next_midnight.min(slot.end_utc);
        parts.push(TimeSlot::new(current, end));
        current = end;
    }

    parts
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
