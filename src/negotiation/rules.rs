use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use super::agent::{
    AlternativeSlot, Decision, MeetingRequest, ParticipantAgent, ParticipantResponse, Priority,
    ProposedSlot, RoundContext, SchedulerAction, SchedulerAgent, SchedulerDecision,
};
use crate::calendar::availability::{find_candidate_slots, CandidateSlot, SlotSearch};
use crate::calendar::model::ParticipantCalendar;
use crate::shared::utils::date::days_between;

/// Flexibility at or above which a participant joins outside working hours.
const STRETCH_FLEXIBILITY: f64 = 0.7;
const MAX_ALTERNATIVES: usize = 3;

/// Offline scheduler: the most confident candidate everyone can attend
/// during working hours. High-priority meetings may use any candidate.
#[derive(Debug, Default, Clone)]
pub struct RuleBasedScheduler;

#[async_trait]
impl SchedulerAgent for RuleBasedScheduler {
    async fn choose_slot(
        &self,
        request: &MeetingRequest,
        candidates: &[CandidateSlot],
    ) -> anyhow::Result<SchedulerDecision> {
        let best = candidates
            .iter()
            .filter(|c| c.constraints.duration_ok)
            .filter(|c| c.constraints.within_working_hours || request.priority == Priority::High)
            .max_by(|a, b| {
                a.scores
                    .confidence
                    .total_cmp(&b.scores.confidence)
                    .then(b.slot_id.cmp(&a.slot_id))
            });

        let decision = match best {
            Some(slot) => SchedulerDecision {
                decision: SchedulerAction::ConfirmTime,
                selected_slot_id: Some(slot.slot_id),
                reasoning: if slot.constraints.within_working_hours {
                    format!(
                        "Slot {} is inside everyone's working hours with confidence {:.2}",
                        slot.slot_id, slot.scores.confidence
                    )
                } else {
                    format!(
                        "High priority meeting; slot {} is outside working hours for {}",
                        slot.slot_id,
                        slot.constraints.conflicts.join(", ")
                    )
                },
                confidence: slot.scores.confidence,
            },
            None => SchedulerDecision {
                decision: SchedulerAction::NegotiateOrReschedule,
                selected_slot_id: None,
                reasoning: "No candidate slot fits every participant's working hours".to_string(),
                confidence: 0.0,
            },
        };

        debug!(target: "agents", "Rule-based scheduler: {}", decision.reasoning);
        Ok(decision)
    }
}

/// Offline participant that answers from its own calendar.
#[derive(Debug, Clone)]
pub struct RuleBasedParticipant {
    calendar: ParticipantCalendar,
    since: NaiveDate,
    until: NaiveDate,
}

impl RuleBasedParticipant {
    pub fn new(calendar: ParticipantCalendar, since: NaiveDate, until: NaiveDate) -> Self {
        Self {
            calendar,
            since,
            until,
        }
    }

    pub fn calendar(&self) -> &ParticipantCalendar {
        &self.calendar
    }

    /// Up to three of this participant's own free windows, during working
    /// hours, long enough for the meeting.
    pub fn free_alternatives(&self, duration_minutes: i64) -> anyhow::Result<Vec<AlternativeSlot>> {
        let search = SlotSearch {
            since: self.since,
            until: self.until,
            duration_minutes,
            max_slots: MAX_ALTERNATIVES,
            respect_working_hours: true,
        };
        let slots = find_candidate_slots(std::slice::from_ref(&self.calendar), &search)?;

        Ok(slots
            .into_iter()
            .map(|slot| AlternativeSlot {
                start_utc: slot.start_utc,
                end_utc: slot.end_utc,
                reason: Some("Free during my working hours".to_string()),
                proposed_by: Some(self.calendar.user_id.clone()),
            })
            .collect())
    }

    fn within_working_hours(&self, proposed: &ProposedSlot) -> anyhow::Result<bool> {
        let tz = self.calendar.tz()?;
        let local_day = proposed.start_utc.with_timezone(&tz).date_naive();
        let days = days_between(
            local_day.pred_opt().unwrap_or(local_day),
            local_day.succ_opt().unwrap_or(local_day),
        );
        let slot = proposed.time_slot();

        Ok(self
            .calendar
            .working_windows(&days)?
            .iter()
            .any(|window| window.contains(&slot)))
    }

    fn respond(
        &self,
        decision: Decision,
        reasoning: impl Into<String>,
        alternative_slots: Vec<AlternativeSlot>,
    ) -> ParticipantResponse {
        let priority_concerns = match decision {
            Decision::Accept => vec![],
            _ => self.calendar.preferences.priorities.clone(),
        };
        ParticipantResponse {
            decision,
            reasoning: reasoning.into(),
            alternative_slots,
            flexibility: self.calendar.flexibility(),
            priority_concerns,
        }
    }

    fn counter_or_decline(
        &self,
        request: &MeetingRequest,
        reasoning: &str,
    ) -> anyhow::Result<ParticipantResponse> {
        let alternatives = self.free_alternatives(request.duration_minutes)?;
        if alternatives.is_empty() {
            Ok(self.respond(
                Decision::Decline,
                format!("{} and I have no free time in the search window", reasoning),
                vec![],
            ))
        } else {
            Ok(self.respond(Decision::CounterPropose, reasoning, alternatives))
        }
    }
}

#[async_trait]
impl ParticipantAgent for RuleBasedParticipant {
    async fn respond_to_proposal(
        &self,
        request: &MeetingRequest,
        proposed: &ProposedSlot,
        _context: &RoundContext,
    ) -> anyhow::Result<ParticipantResponse> {
        let response = if self.calendar.is_busy(&proposed.time_slot())? {
            self.counter_or_decline(request, "The proposed time conflicts with an existing event")?
        } else if self.within_working_hours(proposed)? {
            self.respond(Decision::Accept, "The proposed time works for me", vec![])
        } else if self.calendar.flexibility() >= STRETCH_FLEXIBILITY {
            self.respond(
                Decision::Accept,
                "Outside my working hours, but I can make an exception",
                vec![],
            )
        } else {
            self.counter_or_decline(request, "The proposed time is outside my working hours")?
        };

        debug!(
            target: "agents",
            "{} answered {}: {}", self.calendar.user_id, response.decision, response.reasoning
        );
        Ok(response)
    }

    async fn propose_alternatives(
        &self,
        request: &MeetingRequest,
        reason: &str,
    ) -> anyhow::Result<Vec<AlternativeSlot>> {
        let alternatives = self.free_alternatives(request.duration_minutes)?;
        debug!(
            target: "agents",
            "{} suggests {} alternatives ({})", self.calendar.user_id, alternatives.len(), reason
        );
        Ok(alternatives)
    }
}
