use async_trait::async_trait;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::agent::{
    AlternativeSlot, Decision, MeetingRequest, ParticipantAgent, ParticipantResponse,
    ProposedSlot, RoundContext, SchedulerAction, SchedulerAgent, SchedulerDecision,
};
use super::rules::RuleBasedParticipant;
use crate::calendar::availability::{CandidateSlot, TimeSlot};
use crate::calendar::model::{to_utc, ParticipantCalendar, WorkingHours};
use crate::config::templates::prompt;
use crate::core::template::generate;
use crate::gemini::client::GeminiClient;

const SCHEDULER_TEMPERATURE: f32 = 0.0;
const PARTICIPANT_TEMPERATURE: f32 = 0.3;
/// Above this flexibility an unreadable reply is treated as a counter-proposal.
const FALLBACK_COUNTER_FLEXIBILITY: f64 = 0.7;

/// Strips a ```json (or bare ```) fence around a model reply. An unclosed
/// fence leaves the text as it is.
pub fn extract_json_block(text: &str) -> &str {
    for fence in ["```json", "```"] {
        if let Some(start) = text.find(fence) {
            let body = &text[start + fence.len()..];
            return match body.find("```") {
                Some(end) => body[..end].trim(),
                None => text.trim(),
            };
        }
    }
    text.trim()
}

pub struct GeminiScheduler {
    client: GeminiClient,
}

impl GeminiScheduler {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SchedulerAgent for GeminiScheduler {
    async fn choose_slot(
        &self,
        request: &MeetingRequest,
        candidates: &[CandidateSlot],
    ) -> anyhow::Result<SchedulerDecision> {
        let input = json!({
            "meeting_request": request,
            "candidate_slots": candidates,
        });
        let prompt = generate(
            "scheduler",
            prompt::SCHEDULER,
            json!({ "input": serde_json::to_string_pretty(&input)? }),
        )?;

        let reply = self.client.generate(&prompt, SCHEDULER_TEMPERATURE).await?;
        debug!(target: "agents", "Scheduler ({}) replied: {}", self.client.model(), reply);

        Ok(parse_scheduler_reply(&reply))
    }
}

#[derive(Deserialize)]
struct SchedulerReply {
    decision: String,
    #[serde(default)]
    selected_slot_id: Value,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence: Option<f64>,
}

pub fn parse_scheduler_reply(text: &str) -> SchedulerDecision {
    let parsed = serde_json::from_str::<SchedulerReply>(extract_json_block(text))
        .map_err(|e| e.to_string())
        .and_then(|reply| Ok((reply.decision.parse::<SchedulerAction>()?, reply)));
    match parsed {
        Ok((decision, reply)) => SchedulerDecision {
            decision,
            selected_slot_id: slot_id(&reply.selected_slot_id),
            reasoning: reply.reasoning,
            confidence: reply.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        },
        Err(e) => {
            warn!(target: "agents", "Unreadable scheduler reply ({}); proposing the top candidate", e);
            SchedulerDecision {
                decision: SchedulerAction::ProposeNewTime,
                selected_slot_id: None,
                reasoning: "Unable to parse scheduler reply".to_string(),
                confidence: 0.0,
            }
        }
    }
}

fn slot_id(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Participant backed by Gemini. Its own calendar supplies the profile in
/// the prompt and the alternatives when the model gives none.
pub struct GeminiParticipant {
    client: GeminiClient,
    fallback: RuleBasedParticipant,
}

#[derive(Serialize)]
struct PromptContext<'a> {
    name: &'a str,
    flexibility: f64,
    working_hours: &'a WorkingHours,
    timezone: &'a str,
    priorities: &'a [String],
    busy: Vec<TimeSlot>,
    meeting_request: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    proposed_slot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

impl GeminiParticipant {
    pub fn new(client: GeminiClient, fallback: RuleBasedParticipant) -> Self {
        Self { client, fallback }
    }

    fn calendar(&self) -> &ParticipantCalendar {
        self.fallback.calendar()
    }

    fn prompt_context<'a>(&'a self, request: &MeetingRequest) -> anyhow::Result<PromptContext<'a>> {
        let calendar = self.calendar();
        Ok(PromptContext {
            name: &calendar.user_id,
            flexibility: calendar.flexibility(),
            working_hours: &calendar.working_hours,
            timezone: &calendar.timezone,
            priorities: &calendar.preferences.priorities,
            busy: calendar.busy_slots()?,
            meeting_request: serde_json::to_string_pretty(request)?,
            proposed_slot: None,
            context: None,
            reason: None,
        })
    }

    fn response_prompt(
        &self,
        request: &MeetingRequest,
        proposed: &ProposedSlot,
        context: &RoundContext,
    ) -> anyhow::Result<String> {
        let mut ctx = self.prompt_context(request)?;
        ctx.proposed_slot = Some(serde_json::to_string_pretty(proposed)?);
        ctx.context = Some(serde_json::to_string_pretty(context)?);
        generate("participant_response", prompt::PARTICIPANT_RESPONSE, ctx)
    }

    fn alternatives_prompt(&self, request: &MeetingRequest, reason: &str) -> anyhow::Result<String> {
        let mut ctx = self.prompt_context(request)?;
        ctx.reason = Some(reason);
        generate("participant_alternatives", prompt::PARTICIPANT_ALTERNATIVES, ctx)
    }
}

#[async_trait]
impl ParticipantAgent for GeminiParticipant {
    async fn respond_to_proposal(
        &self,
        request: &MeetingRequest,
        proposed: &ProposedSlot,
        context: &RoundContext,
    ) -> anyhow::Result<ParticipantResponse> {
        let prompt = self.response_prompt(request, proposed, context)?;
        let reply = self.client.generate(&prompt, PARTICIPANT_TEMPERATURE).await?;
        debug!(target: "agents", "{} replied: {}", self.calendar().user_id, reply);

        Ok(parse_participant_reply(&reply, self.calendar()))
    }

    async fn propose_alternatives(
        &self,
        request: &MeetingRequest,
        reason: &str,
    ) -> anyhow::Result<Vec<AlternativeSlot>> {
        let prompt = self.alternatives_prompt(request, reason)?;
        let reply = self.client.generate(&prompt, PARTICIPANT_TEMPERATURE).await?;
        debug!(target: "agents", "{} suggested: {}", self.calendar().user_id, reply);

        match parse_alternatives_reply(&reply, self.calendar()) {
            Some(alternatives) if !alternatives.is_empty() => Ok(alternatives),
            _ => {
                warn!(
                    target: "agents",
                    "No usable alternatives from {}; using free calendar time",
                    self.calendar().user_id
                );
                self.fallback.free_alternatives(request.duration_minutes)
            }
        }
    }
}

#[derive(Deserialize)]
struct ParticipantReply {
    decision: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    alternative_slots: Vec<RawSlot>,
    #[serde(default)]
    flexibility: Option<f64>,
    #[serde(default)]
    priority_concerns: Vec<String>,
}

#[derive(Deserialize)]
struct AlternativesReply {
    #[serde(default)]
    alternative_slots: Vec<RawSlot>,
}

#[derive(Deserialize)]
struct RawSlot {
    start: String,
    end: String,
    #[serde(default)]
    reason: Option<String>,
}

pub fn parse_participant_reply(text: &str, calendar: &ParticipantCalendar) -> ParticipantResponse {
    let parsed = serde_json::from_str::<ParticipantReply>(extract_json_block(text))
        .map_err(|e| e.to_string())
        .and_then(|reply| Ok((reply.decision.parse::<Decision>()?, reply)));

    match parsed {
        Ok((decision, reply)) => ParticipantResponse {
            decision,
            reasoning: reply.reasoning,
            alternative_slots: convert_slots(reply.alternative_slots, calendar),
            flexibility: reply
                .flexibility
                .unwrap_or_else(|| calendar.flexibility())
                .clamp(0.0, 1.0),
            priority_concerns: reply.priority_concerns,
        },
        Err(e) => {
            warn!(target: "agents", "Unreadable reply from {} ({})", calendar.user_id, e);
            let flexibility = calendar.flexibility();
            ParticipantResponse {
                decision: if flexibility > FALLBACK_COUNTER_FLEXIBILITY {
                    Decision::CounterPropose
                } else {
                    Decision::Accept
                },
                reasoning: "Unable to parse detailed response, using fallback based on flexibility"
                    .to_string(),
                alternative_slots: vec![],
                flexibility,
                priority_concerns: vec![],
            }
        }
    }
}

pub fn parse_alternatives_reply(
    text: &str,
    calendar: &ParticipantCalendar,
) -> Option<Vec<AlternativeSlot>> {
    let reply = serde_json::from_str::<AlternativesReply>(extract_json_block(text)).ok()?;
    Some(convert_slots(reply.alternative_slots, calendar))
}

/// Times without an offset are read in the participant's zone. Slots that
/// do not parse, or end before they start, are dropped.
fn convert_slots(raw: Vec<RawSlot>, calendar: &ParticipantCalendar) -> Vec<AlternativeSlot> {
    let tz = calendar.tz().unwrap_or(Tz::UTC);
    raw.into_iter()
        .filter_map(|slot| {
            let start = to_utc(&slot.start, &tz);
            let end = to_utc(&slot.end, &tz);
            match (start, end) {
                (Ok(start_utc), Ok(end_utc)) if end_utc > start_utc => Some(AlternativeSlot {
                    start_utc,
                    end_utc,
                    reason: slot.reason,
                    proposed_by: Some(calendar.user_id.clone()),
                }),
                _ => {
                    warn!(
                        target: "agents",
                        "Dropping alternative {} - {} from {}", slot.start, slot.end, calendar.user_id
                    );
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::fixtures::{ALICE, BOB};
    use crate::calendar::model::parse_calendar;
    use crate::negotiation::agent::Priority;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn request() -> MeetingRequest {
        MeetingRequest {
            title: "Design review".to_string(),
            duration_minutes: 60,
            priority: Priority::High,
            participants: vec!["alice".to_string()],
            description: Some("Quarterly roadmap".to_string()),
            location: None,
        }
    }

    #[test]
    fn test_extract_json_block() {
        assert_eq!(extract_json_block("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(
            extract_json_block("Sure!\n```json\n{\"a\": 1}\n```\nDone."),
            "{\"a\": 1}"
        );
        assert_eq!(extract_json_block("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json_block("```json\n{\"a\": 1}"), "```json\n{\"a\": 1}");
    }

    #[test]
    fn test_parse_scheduler_reply() {
        let decision = parse_scheduler_reply(
            "```json\n{\"decision\": \"confirm_time\", \"selected_slot_id\": \"2\", \"reasoning\": \"fair\", \"confidence\": 1.4}\n```",
        );

        assert_eq!(decision.decision, SchedulerAction::ConfirmTime);
        assert_eq!(decision.selected_slot_id, Some(2));
        assert_eq!(decision.reasoning, "fair");
        assert_eq!(decision.confidence, 1.0);

        let decision = parse_scheduler_reply(
            r#"{"decision": "negotiate_or_reschedule", "selected_slot_id": null}"#,
        );
        assert_eq!(decision.decision, SchedulerAction::NegotiateOrReschedule);
        assert_eq!(decision.selected_slot_id, None);
    }

    #[test]
    fn test_parse_scheduler_reply_decision_spelling() {
        for spelling in ["CONFIRM_TIME", "confirm-time", " Confirm Time "] {
            let decision = parse_scheduler_reply(&format!(
                r#"{{"decision": "{}", "selected_slot_id": 1}}"#,
                spelling
            ));
            assert_eq!(decision.decision, SchedulerAction::ConfirmTime, "{}", spelling);
            assert_eq!(decision.selected_slot_id, Some(1));
        }

        let decision = parse_scheduler_reply(r#"{"decision": "Negotiate-Or-Reschedule"}"#);
        assert_eq!(decision.decision, SchedulerAction::NegotiateOrReschedule);

        let decision = parse_scheduler_reply(r#"{"decision": "book_it", "selected_slot_id": 1}"#);
        assert_eq!(decision.decision, SchedulerAction::ProposeNewTime);
        assert_eq!(decision.selected_slot_id, None);
    }

    #[test]
    fn test_parse_scheduler_reply_fallback() {
        let decision = parse_scheduler_reply("I think the second slot is best.");

        assert_eq!(decision.decision, SchedulerAction::ProposeNewTime);
        assert_eq!(decision.selected_slot_id, None);
    }

    #[test]
    fn test_parse_participant_reply_converts_local_times() -> anyhow::Result<()> {
        let bob = parse_calendar(BOB)?;
        let reply = r#"{
            "decision": "counter_propose",
            "reasoning": "Too early for me",
            "alternative_slots": [
                { "start": "2026-01-16T11:00:00", "end": "2026-01-16T12:00:00", "reason": "late morning" },
                { "start": "not a time", "end": "2026-01-16T12:00:00" }
            ],
            "priority_concerns": ["deep_work"]
        }"#;

        let response = parse_participant_reply(reply, &bob);

        assert_eq!(response.decision, Decision::CounterPropose);
        assert_eq!(response.flexibility, 0.4);
        assert_eq!(response.alternative_slots.len(), 1);
        let slot = &response.alternative_slots[0];
        assert_eq!(slot.start_utc, Utc.with_ymd_and_hms(2026, 1, 16, 16, 0, 0).unwrap());
        assert_eq!(slot.proposed_by.as_deref(), Some("bob"));
        assert_eq!(slot.reason.as_deref(), Some("late morning"));
        Ok(())
    }

    #[test]
    fn test_parse_participant_reply_fallback_follows_flexibility() -> anyhow::Result<()> {
        let alice = parse_calendar(ALICE)?;
        let bob = parse_calendar(BOB)?;

        let flexible = parse_participant_reply("Happy to help!", &alice);
        assert_eq!(flexible.decision, Decision::CounterPropose);
        assert!(flexible.alternative_slots.is_empty());

        let rigid = parse_participant_reply(r#"{"decision": "maybe"}"#, &bob);
        assert_eq!(rigid.decision, Decision::Accept);
        assert_eq!(rigid.flexibility, 0.4);
        Ok(())
    }

    #[test]
    fn test_parse_participant_reply_decision_spelling() -> anyhow::Result<()> {
        let bob = parse_calendar(BOB)?;

        let response = parse_participant_reply(r#"{"decision": "Decline", "reasoning": "Offsite"}"#, &bob);

        assert_eq!(response.decision, Decision::Decline);
        assert_eq!(response.reasoning, "Offsite");
        Ok(())
    }

    #[test]
    fn test_parse_alternatives_reply() -> anyhow::Result<()> {
        let alice = parse_calendar(ALICE)?;

        let alternatives = parse_alternatives_reply(
            r#"{"alternative_slots": [{"start": "2026-01-16T10:00:00Z", "end": "2026-01-16T11:00:00Z"}], "preference_explanation": "mornings"}"#,
            &alice,
        )
        .unwrap();
        assert_eq!(alternatives.len(), 1);
        assert_eq!(
            alternatives[0].end_utc - alternatives[0].start_utc,
            Duration::hours(1)
        );

        assert!(parse_alternatives_reply("no idea", &alice).is_none());
        Ok(())
    }

    #[test]
    fn test_prompts_carry_profile() -> anyhow::Result<()> {
        let day = NaiveDate::from_ymd_opt(2026, 1, 16).unwrap();
        let participant = GeminiParticipant::new(
            GeminiClient::new("test-key", "gemini-2.0-flash"),
            RuleBasedParticipant::new(parse_calendar(ALICE)?, day, day),
        );
        let proposed = ProposedSlot {
            start_utc: Utc.with_ymd_and_hms(2026, 1, 16, 15, 0, 0).unwrap(),
            end_utc: Utc.with_ymd_and_hms(2026, 1, 16, 16, 0, 0).unwrap(),
            confidence_score: 0.3,
            reasoning: "best overlap".to_string(),
            rank: 1,
        };
        let context = RoundContext {
            round: 2,
            history: vec![],
        };

        let prompt = participant.response_prompt(&request(), &proposed, &context)?;
        assert!(prompt.starts_with("You are alice,"));
        assert!(prompt.contains("Working Hours: 09:00 - 17:00"));
        assert!(prompt.contains("Priorities: client_meetings"));
        assert!(prompt.contains("Quarterly roadmap"));
        assert!(prompt.contains("\"round\": 2"));

        let prompt = participant.alternatives_prompt(&request(), "no_initial_slots")?;
        assert!(prompt.contains("didn't work (no_initial_slots)"));
        assert!(prompt.contains("Timezone: Europe/London"));
        Ok(())
    }
}
