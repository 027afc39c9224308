use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::calendar::availability::{CandidateSlot, TimeSlot};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{}'; expected high, medium or low", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingRequest {
    pub title: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub priority: Priority,
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedSlot {
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub confidence_score: f64,
    pub reasoning: String,
    pub rank: usize,
}

impl ProposedSlot {
    pub fn from_candidate(candidate: &CandidateSlot, reasoning: impl Into<String>) -> Self {
        Self {
            start_utc: candidate.start_utc,
            end_utc: candidate.end_utc,
            confidence_score: candidate.scores.confidence,
            reasoning: reasoning.into(),
            rank: candidate.slot_id + 1,
        }
    }

    pub fn time_slot(&self) -> TimeSlot {
        TimeSlot::new(self.start_utc, self.end_utc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    CounterPropose,
    Decline,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::Accept => "accept",
            Decision::CounterPropose => "counter_propose",
            Decision::Decline => "decline",
        };
        f.write_str(s)
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(Decision::Accept),
            "counter_propose" | "counter-propose" | "counter" => Ok(Decision::CounterPropose),
            "decline" => Ok(Decision::Decline),
            other => Err(format!("unknown decision '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeSlot {
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantResponse {
    pub decision: Decision,
    pub reasoning: String,
    #[serde(default)]
    pub alternative_slots: Vec<AlternativeSlot>,
    pub flexibility: f64,
    #[serde(default)]
    pub priority_concerns: Vec<String>,
}

/// Responses keyed by participant, kept in the order participants joined the
/// negotiation. Serializes as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantResponses(Vec<(String, ParticipantResponse)>);

impl ParticipantResponses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces an earlier response from the same participant in place.
    pub fn insert(&mut self, name: impl Into<String>, response: ParticipantResponse) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = response,
            None => self.0.push((name, response)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParticipantResponse)> {
        self.0.iter().map(|(name, response)| (name.as_str(), response))
    }

    pub fn values(&self) -> impl Iterator<Item = &ParticipantResponse> {
        self.0.iter().map(|(_, response)| response)
    }
}

impl FromIterator<(String, ParticipantResponse)> for ParticipantResponses {
    fn from_iter<I: IntoIterator<Item = (String, ParticipantResponse)>>(iter: I) -> Self {
        let mut responses = Self::new();
        for (name, response) in iter {
            responses.insert(name, response);
        }
        responses
    }
}

impl Serialize for ParticipantResponses {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, response)| (name, response)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerAction {
    ConfirmTime,
    ProposeNewTime,
    NegotiateOrReschedule,
}

impl FromStr for SchedulerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "confirm_time" | "confirm" => Ok(SchedulerAction::ConfirmTime),
            "propose_new_time" | "propose" => Ok(SchedulerAction::ProposeNewTime),
            "negotiate_or_reschedule" | "reschedule" => Ok(SchedulerAction::NegotiateOrReschedule),
            other => Err(format!("unknown scheduler decision '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerDecision {
    pub decision: SchedulerAction,
    pub selected_slot_id: Option<usize>,
    pub reasoning: String,
    pub confidence: f64,
}

/// What the scheduler does between rounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Adaptation {
    Abort { reasoning: String },
    Adopt { new_slot: ProposedSlot, reasoning: String },
    Continue { reasoning: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HistoryEvent {
    InitialProposal { decision: SchedulerDecision },
    Respond { response: ParticipantResponse },
    SuggestAlternatives { alternatives: Vec<AlternativeSlot> },
    Adapt { adaptation: Adaptation },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub round: u32,
    pub agent: String,
    #[serde(flatten)]
    pub event: HistoryEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundContext {
    pub round: u32,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    Success,
    Failed,
    Aborted,
    AlternativesSuggested,
}

impl fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NegotiationStatus::Success => "success",
            NegotiationStatus::Failed => "failed",
            NegotiationStatus::Aborted => "aborted",
            NegotiationStatus::AlternativesSuggested => "alternatives_suggested",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MaxRoundsExceeded,
    NoAlternativesSuggested,
    TooManyDeclines,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::MaxRoundsExceeded => {
                "No time was accepted by everyone within the allowed negotiation rounds."
            }
            FailureReason::NoAlternativesSuggested => {
                "No participant could suggest an alternative time."
            }
            FailureReason::TooManyDeclines => "Too many participants declined the proposed time.",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NegotiationOutcome {
    pub status: NegotiationStatus,
    pub final_slot: Option<ProposedSlot>,
    /// The slot on the table when the negotiation ended.
    pub last_proposal: Option<ProposedSlot>,
    pub reason: Option<FailureReason>,
    pub rounds_completed: u32,
    pub confidence_score: f64,
    pub consensus_reached: bool,
    pub participant_responses: ParticipantResponses,
    pub selected_alternative: Option<AlternativeSlot>,
    pub alternatives: Vec<AlternativeSlot>,
    pub history: Vec<HistoryEntry>,
}

impl NegotiationOutcome {
    /// Alternatives from the final round's responses, in participant order.
    pub fn counter_proposals(&self) -> Vec<&AlternativeSlot> {
        self.participant_responses
            .values()
            .flat_map(|response| response.alternative_slots.iter())
            .collect()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchedulerAgent: Send + Sync {
    async fn choose_slot(
        &self,
        request: &MeetingRequest,
        candidates: &[CandidateSlot],
    ) -> anyhow::Result<SchedulerDecision>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParticipantAgent: Send + Sync {
    async fn respond_to_proposal(
        &self,
        request: &MeetingRequest,
        proposed: &ProposedSlot,
        context: &RoundContext,
    ) -> anyhow::Result<ParticipantResponse>;

    async fn propose_alternatives(
        &self,
        request: &MeetingRequest,
        reason: &str,
    ) -> anyhow::Result<Vec<AlternativeSlot>>;
}
