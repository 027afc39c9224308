use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

use super::tone::Tone;
use crate::core::template::{RenderedMessage, TemplateError, TemplateKind, TemplateSet, Values};
use crate::negotiation::agent::{
    AlternativeSlot, Decision, MeetingRequest, NegotiationOutcome, NegotiationStatus,
    ParticipantResponse, ProposedSlot,
};

pub const ORGANIZER: &str = "Meeting Organizer";
pub const DEFAULT_LOCATION: &str = "To be announced";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%I:%M %p";
const MAX_LISTED_ALTERNATIVES: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeMessages {
    /// One message per participant, keyed by name.
    pub messages: BTreeMap<String, RenderedMessage>,
    /// Summary for the organizer; present once the negotiation has history.
    pub summary: Option<RenderedMessage>,
}

pub struct MessageGenerator {
    templates: TemplateSet,
    tz: Tz,
    default_location: String,
    tones: BTreeMap<String, Tone>,
}

impl MessageGenerator {
    pub fn new(templates: TemplateSet, tz: Tz) -> Self {
        Self {
            templates,
            tz,
            default_location: DEFAULT_LOCATION.to_string(),
            tones: BTreeMap::new(),
        }
    }

    /// Per-recipient tone; recipients not listed get the default.
    pub fn with_tones(mut self, tones: BTreeMap<String, Tone>) -> Self {
        self.tones = tones;
        self
    }

    pub fn with_default_location<T: Into<String>>(mut self, location: T) -> Self {
        self.default_location = location.into();
        self
    }

    pub fn compose_outcome_messages(
        &self,
        outcome: &NegotiationOutcome,
        request: &MeetingRequest,
    ) -> Result<OutcomeMessages, TemplateError> {
        let mut messages = BTreeMap::new();

        for recipient in &request.participants {
            let (kind, values) = match (outcome.status, &outcome.final_slot) {
                (NegotiationStatus::Success, Some(slot)) => (
                    TemplateKind::Confirmation,
                    self.confirmation_values(request, recipient, slot),
                ),
                (NegotiationStatus::Aborted, _) => (
                    TemplateKind::RescheduleRequest,
                    self.reschedule_values(outcome, request, recipient),
                ),
                (NegotiationStatus::AlternativesSuggested, _) => (
                    TemplateKind::CounterProposal,
                    self.alternatives_values(outcome, request, recipient),
                ),
                _ => (
                    TemplateKind::ApologyAlternative,
                    self.apology_values(outcome, request, recipient),
                ),
            };

            let tone = self.tones.get(recipient).copied().unwrap_or_default();
            debug!(target: "negotiations", "Composing {} for {} ({})", kind, recipient, tone);
            let mut message = self.templates.render(kind, &values)?;
            message.body = tone.restyle(&message.body);
            messages.insert(recipient.clone(), message);
        }

        let summary = if outcome.history.is_empty() {
            None
        } else {
            Some(self.templates.render(
                TemplateKind::NegotiationSummary,
                &self.summary_values(outcome, request),
            )?)
        };

        Ok(OutcomeMessages { messages, summary })
    }

    /// Message from a participant to the organizer about one proposal.
    pub fn compose_response_message(
        &self,
        response: &ParticipantResponse,
        request: &MeetingRequest,
        proposed: &ProposedSlot,
    ) -> Result<RenderedMessage, TemplateError> {
        let (kind, values) = match response.decision {
            Decision::CounterPropose => {
                let mut values = base_values(request, ORGANIZER);
                values.insert(
                    "original_time".to_string(),
                    self.format_range(proposed.start_utc, proposed.end_utc),
                );
                values.insert(
                    "constraint_explanation".to_string(),
                    response.reasoning.clone(),
                );
                values.insert(
                    "counter_proposals".to_string(),
                    self.list_alternatives(&response.alternative_slots, "Any other time this week works for me."),
                );
                (TemplateKind::CounterProposal, values)
            }
            Decision::Decline => {
                let mut values = base_values(request, ORGANIZER);
                values.insert("reason".to_string(), response.reasoning.clone());
                let suggestion = if response.alternative_slots.is_empty() {
                    "I'd be glad to join if the meeting moves to another time.".to_string()
                } else {
                    format!(
                        "These times would work for me instead:\n{}",
                        self.list_alternatives(&response.alternative_slots, "")
                    )
                };
                values.insert("alternatives_suggestion".to_string(), suggestion);
                (TemplateKind::Decline, values)
            }
            Decision::Accept => (
                TemplateKind::Confirmation,
                self.confirmation_values(request, ORGANIZER, proposed),
            ),
        };

        self.templates.render(kind, &values)
    }

    /// `2026-01-16 03:00 PM UTC`, in the configured zone.
    pub fn format_time(&self, at: DateTime<Utc>) -> String {
        let local = at.with_timezone(&self.tz);
        format!(
            "{} {} {}",
            local.format(DATE_FORMAT),
            local.format(TIME_FORMAT),
            self.tz.name()
        )
    }

    pub fn format_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        let local_start = start.with_timezone(&self.tz);
        let local_end = end.with_timezone(&self.tz);
        if local_start.date_naive() == local_end.date_naive() {
            format!(
                "{} {} - {} {}",
                local_start.format(DATE_FORMAT),
                local_start.format(TIME_FORMAT),
                local_end.format(TIME_FORMAT),
                self.tz.name()
            )
        } else {
            format!("{} - {}", self.format_time(start), self.format_time(end))
        }
    }

    fn confirmation_values(
        &self,
        request: &MeetingRequest,
        recipient: &str,
        slot: &ProposedSlot,
    ) -> Values {
        let local_start = slot.start_utc.with_timezone(&self.tz);
        let local_end = slot.end_utc.with_timezone(&self.tz);

        let mut values = base_values(request, recipient);
        values.insert("date".to_string(), local_start.format(DATE_FORMAT).to_string());
        values.insert(
            "meeting_time".to_string(),
            format!(
                "{} - {} {}",
                local_start.format(TIME_FORMAT),
                local_end.format(TIME_FORMAT),
                self.tz.name()
            ),
        );
        values.insert("duration".to_string(), request.duration_minutes.to_string());
        values.insert("participants".to_string(), request.participants.join(", "));
        values.insert(
            "location".to_string(),
            request
                .location
                .clone()
                .unwrap_or_else(|| self.default_location.clone()),
        );
        values
    }

    fn reschedule_values(
        &self,
        outcome: &NegotiationOutcome,
        request: &MeetingRequest,
        recipient: &str,
    ) -> Values {
        let mut values = base_values(request, recipient);
        values.insert(
            "original_time".to_string(),
            match &outcome.last_proposal {
                Some(slot) => self.format_range(slot.start_utc, slot.end_utc),
                None => "the proposed time".to_string(),
            },
        );
        values.insert("reason".to_string(), failure_text(outcome));
        let counters: Vec<AlternativeSlot> =
            outcome.counter_proposals().into_iter().cloned().collect();
        values.insert(
            "alternative_times".to_string(),
            self.list_alternatives(&counters, "Please reply with a few times that work for you."),
        );
        values
    }

    fn apology_values(
        &self,
        outcome: &NegotiationOutcome,
        request: &MeetingRequest,
        recipient: &str,
    ) -> Values {
        let mut values = base_values(request, recipient);
        values.insert("explanation".to_string(), failure_text(outcome));
        let counters: Vec<AlternativeSlot> =
            outcome.counter_proposals().into_iter().cloned().collect();
        values.insert(
            "alternatives".to_string(),
            self.list_alternatives(
                &counters,
                "Please suggest alternative times or meeting formats.",
            ),
        );
        values
    }

    fn alternatives_values(
        &self,
        outcome: &NegotiationOutcome,
        request: &MeetingRequest,
        recipient: &str,
    ) -> Values {
        let mut values = base_values(request, recipient);
        values.insert(
            "original_time".to_string(),
            "the originally requested time".to_string(),
        );
        values.insert(
            "constraint_explanation".to_string(),
            "No common time fit everyone's calendar, so participants suggested these options. \
             Please review and confirm your preferred option."
                .to_string(),
        );
        values.insert(
            "counter_proposals".to_string(),
            self.list_alternatives(&outcome.alternatives, ""),
        );
        values
    }

    fn summary_values(&self, outcome: &NegotiationOutcome, request: &MeetingRequest) -> Values {
        let final_time = match (&outcome.final_slot, &outcome.selected_alternative) {
            (Some(slot), _) => self.format_range(slot.start_utc, slot.end_utc),
            (None, Some(alternative)) => format!(
                "{} (suggested, awaiting confirmation)",
                self.format_range(alternative.start_utc, alternative.end_utc)
            ),
            (None, None) => format!("Not scheduled ({})", outcome.status),
        };

        let mut values = Values::new();
        values.insert("meeting_title".to_string(), request.title.clone());
        values.insert("final_time".to_string(), final_time);
        values.insert("duration".to_string(), request.duration_minutes.to_string());
        values.insert(
            "all_participants".to_string(),
            request.participants.join(", "),
        );
        values.insert("rounds".to_string(), outcome.rounds_completed.to_string());
        values
    }

    /// Numbered list of up to three alternatives, or `empty` when there
    /// are none.
    fn list_alternatives(&self, alternatives: &[AlternativeSlot], empty: &str) -> String {
        if alternatives.is_empty() {
            return empty.to_string();
        }

        alternatives
            .iter()
            .take(MAX_LISTED_ALTERNATIVES)
            .enumerate()
            .map(|(i, slot)| {
                let mut line = format!("{}. {}", i + 1, self.format_range(slot.start_utc, slot.end_utc));
                match (&slot.proposed_by, &slot.reason) {
                    (Some(who), Some(reason)) => line.push_str(&format!(" ({}: {})", who, reason)),
                    (Some(who), None) => line.push_str(&format!(" (suggested by {})", who)),
                    (None, Some(reason)) => line.push_str(&format!(" ({})", reason)),
                    (None, None) => {}
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn base_values(request: &MeetingRequest, recipient: &str) -> Values {
    let mut values = Values::new();
    values.insert("meeting_title".to_string(), request.title.clone());
    values.insert("recipient_name".to_string(), recipient.to_string());
    values
}

fn failure_text(outcome: &NegotiationOutcome) -> String {
    match outcome.reason {
        Some(reason) => reason.to_string(),
        None => "Scheduling conflicts prevented us from agreeing on a time.".to_string(),
    }
}
