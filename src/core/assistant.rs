use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::calendar::availability::{find_candidate_slots, CandidateSlot, SlotSearch};
use crate::calendar::model::ParticipantCalendar;
use crate::config::templates::report;
use crate::config::{self, AgentKind, Config};
use crate::core::template::{
    generate, RenderedMessage, TemplateError, TemplateInfo, TemplateKind, TemplateSet, Values,
};
use crate::core::window::{RealClock, SearchWindow, SearchWindowCalculator};
use crate::gemini::client::GeminiClient;
use crate::mcp::handler::McpHandler;
use crate::mcp::stdio::StdioTransport;
use crate::messaging::generator::{MessageGenerator, OutcomeMessages, ORGANIZER};
use crate::messaging::tone::Tone;
use crate::negotiation::agent::{
    Adaptation, Decision, HistoryEntry, HistoryEvent, MeetingRequest, NegotiationOutcome,
    SchedulerAction,
};
use crate::negotiation::llm::{GeminiParticipant, GeminiScheduler};
use crate::negotiation::orchestrator::NegotiationOrchestrator;
use crate::negotiation::rules::{RuleBasedParticipant, RuleBasedScheduler};

const REPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Per-call overrides of the configured negotiation settings.
#[derive(Debug, Clone, Default)]
pub struct NegotiateOptions {
    pub agent: Option<AgentKind>,
    pub max_rounds: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NegotiationReport {
    pub request: MeetingRequest,
    pub candidates: Vec<CandidateSlot>,
    pub outcome: NegotiationOutcome,
    pub messages: OutcomeMessages,
    /// What each participant who did not accept sends back to the organizer.
    pub replies: BTreeMap<String, RenderedMessage>,
}

pub struct ScheduleAssistant {
    config: Config,
    templates: TemplateSet,
    tz: Tz,
}

impl ScheduleAssistant {
    pub fn new() -> anyhow::Result<Self> {
        Self::from_config(config::init()?)
    }

    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let tz = config.tz()?;
        let templates = config
            .template_set()
            .context("failed to apply template overrides")?;

        Ok(Self {
            config,
            templates,
            tz,
        })
    }

    pub fn list_templates(&self) -> Result<Vec<TemplateInfo>, TemplateError> {
        self.templates.describe()
    }

    pub fn render(
        &self,
        kind: TemplateKind,
        values: &Values,
        tone: Tone,
    ) -> Result<RenderedMessage, TemplateError> {
        let mut rendered = self.templates.render(kind, values)?;
        rendered.body = tone.restyle(&rendered.body);
        Ok(rendered)
    }

    pub fn search_window(&self, window: SearchWindow) -> (NaiveDate, NaiveDate) {
        SearchWindowCalculator::new(RealClock).get_window(&self.tz, window)
    }

    /// Search parameters with the configured defaults filled in.
    pub fn slot_search(
        &self,
        since: NaiveDate,
        until: NaiveDate,
        duration_minutes: i64,
        max_slots: Option<usize>,
        ignore_working_hours: bool,
    ) -> SlotSearch {
        SlotSearch {
            since,
            until,
            duration_minutes,
            max_slots: max_slots.unwrap_or(self.config.negotiation.max_slots),
            respect_working_hours: self.config.negotiation.respect_working_hours
                && !ignore_working_hours,
        }
    }

    pub fn find_slots(
        &self,
        calendars: &[ParticipantCalendar],
        search: &SlotSearch,
    ) -> anyhow::Result<Vec<CandidateSlot>> {
        if search.since > search.until {
            anyhow::bail!(
                "Search window starts after it ends ({} > {}).",
                search.since,
                search.until
            );
        }

        let slots = find_candidate_slots(calendars, search)?;
        debug!(target: "agents", "Found {} candidate slots", slots.len());
        Ok(slots)
    }

    pub async fn negotiate(
        &self,
        calendars: Vec<ParticipantCalendar>,
        mut request: MeetingRequest,
        search: &SlotSearch,
        options: &NegotiateOptions,
    ) -> anyhow::Result<NegotiationReport> {
        if request.participants.is_empty() {
            request.participants = calendars.iter().map(|c| c.user_id.clone()).collect();
        }

        let candidates = self.find_slots(&calendars, search)?;
        let tones: BTreeMap<String, Tone> = calendars
            .iter()
            .map(|c| (c.user_id.clone(), c.preferences.tone))
            .collect();
        let mut orchestrator = self.build_orchestrator(calendars, search, options)?;
        let outcome = orchestrator.run(&request, &candidates).await?;
        info!(
            target: "negotiations",
            "Negotiation for '{}' finished with status {}",
            request.title,
            outcome.status
        );

        let generator = self.message_generator().with_tones(tones);
        let messages = generator.compose_outcome_messages(&outcome, &request)?;

        let mut replies = BTreeMap::new();
        if let Some(proposed) = outcome.last_proposal.as_ref() {
            for (name, response) in outcome.participant_responses.iter() {
                if response.decision == Decision::Accept {
                    continue;
                }
                let reply = generator.compose_response_message(response, &request, proposed)?;
                replies.insert(name.to_string(), reply);
            }
        }

        Ok(NegotiationReport {
            request,
            candidates,
            outcome,
            messages,
            replies,
        })
    }

    pub fn slots_report(&self, search: &SlotSearch, slots: &[CandidateSlot]) -> anyhow::Result<String> {
        let slots: Vec<_> = slots
            .iter()
            .map(|slot| {
                json!({
                    "slot_id": slot.slot_id,
                    "start": self.local(slot.start_utc),
                    "end": self.local(slot.end_utc),
                    "confidence": format!("{:.2}", slot.scores.confidence),
                    "within_working_hours": slot.constraints.within_working_hours,
                    "conflicts": slot.constraints.conflicts,
                })
            })
            .collect();

        generate(
            "slots",
            report::SLOTS,
            json!({
                "duration_minutes": search.duration_minutes,
                "since": search.since.to_string(),
                "until": search.until.to_string(),
                "tz": self.tz.name(),
                "slots": slots,
            }),
        )
    }

    pub fn negotiation_report(&self, report: &NegotiationReport) -> anyhow::Result<String> {
        let generator = self.message_generator();
        let outcome = &report.outcome;

        let history: Vec<_> = outcome
            .history
            .iter()
            .map(|entry| {
                json!({
                    "round": entry.round,
                    "agent": entry.agent,
                    "action": describe(entry, &generator),
                })
            })
            .collect();

        let mut messages: BTreeMap<String, &RenderedMessage> = report
            .messages
            .messages
            .iter()
            .map(|(recipient, message)| (recipient.clone(), message))
            .collect();
        if let Some(summary) = &report.messages.summary {
            messages.insert(ORGANIZER.to_string(), summary);
        }
        for (name, reply) in &report.replies {
            messages.insert(format!("{} to {}", name, ORGANIZER), reply);
        }

        generate(
            "negotiation",
            report::NEGOTIATION,
            json!({
                "title": report.request.title,
                "status": outcome.status.to_string(),
                "final_slot": outcome
                    .final_slot
                    .as_ref()
                    .map(|slot| generator.format_range(slot.start_utc, slot.end_utc)),
                "reason": outcome.reason.map(|reason| reason.to_string()),
                "rounds": outcome.rounds_completed,
                "confidence": format!("{:.2}", outcome.confidence_score),
                "history": history,
                "messages": messages,
            }),
        )
    }

    pub async fn launch_mcp(&self) -> anyhow::Result<()> {
        let (transport, _sender) = StdioTransport::new();
        McpHandler::new(self).launch_mcp(&transport).await
    }

    fn message_generator(&self) -> MessageGenerator {
        MessageGenerator::new(self.templates.clone(), self.tz)
            .with_default_location(self.config.messaging.default_location.clone())
    }

    fn gemini_client(&self) -> anyhow::Result<GeminiClient> {
        let settings = &self.config.gemini;
        let api_key = settings.resolve_api_key()?;
        Ok(GeminiClient::new(api_key, settings.model.clone()).with_base_url(settings.base_url.clone()))
    }

    fn build_orchestrator(
        &self,
        calendars: Vec<ParticipantCalendar>,
        search: &SlotSearch,
        options: &NegotiateOptions,
    ) -> anyhow::Result<NegotiationOrchestrator> {
        let agent = options.agent.unwrap_or(self.config.negotiation.agent);
        let max_rounds = options
            .max_rounds
            .unwrap_or(self.config.negotiation.max_rounds);
        info!(target: "agents", "Using {} agents, up to {} rounds", agent, max_rounds);

        let orchestrator = match agent {
            AgentKind::Rules => {
                let mut orchestrator =
                    NegotiationOrchestrator::new(Box::new(RuleBasedScheduler)).with_max_rounds(max_rounds);
                for calendar in calendars {
                    let name = calendar.user_id.clone();
                    let participant = RuleBasedParticipant::new(calendar, search.since, search.until);
                    orchestrator.add_participant(name, Box::new(participant));
                }
                orchestrator
            }
            AgentKind::Gemini => {
                let client = self.gemini_client()?;
                let mut orchestrator =
                    NegotiationOrchestrator::new(Box::new(GeminiScheduler::new(client.clone())))
                        .with_max_rounds(max_rounds);
                for calendar in calendars {
                    let name = calendar.user_id.clone();
                    let fallback = RuleBasedParticipant::new(calendar, search.since, search.until);
                    orchestrator.add_participant(
                        name,
                        Box::new(GeminiParticipant::new(client.clone(), fallback)),
                    );
                }
                orchestrator
            }
        };
        debug!(
            target: "agents",
            "Participants: {}",
            orchestrator.participant_names().join(", ")
        );

        Ok(orchestrator)
    }

    fn local(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz)
            .format(REPORT_TIME_FORMAT)
            .to_string()
    }
}

fn describe(entry: &HistoryEntry, generator: &MessageGenerator) -> String {
    match &entry.event {
        HistoryEvent::InitialProposal { decision } => match (decision.decision, decision.selected_slot_id) {
            (SchedulerAction::ConfirmTime, Some(id)) => format!("proposed slot {}", id + 1),
            (SchedulerAction::NegotiateOrReschedule, _) => "asked participants for alternatives".to_string(),
            _ => "proposed a new time".to_string(),
        },
        HistoryEvent::Respond { response } => {
            format!("{} ({})", response.decision, response.reasoning)
        }
        HistoryEvent::SuggestAlternatives { alternatives } => {
            format!("suggested {} alternative(s)", alternatives.len())
        }
        HistoryEvent::Adapt { adaptation } => match adaptation {
            Adaptation::Abort { reasoning } => format!("aborted ({})", reasoning),
            Adaptation::Adopt { new_slot, .. } => format!(
                "moved to {}",
                generator.format_range(new_slot.start_utc, new_slot.end_utc)
            ),
            Adaptation::Continue { .. } => "kept the current proposal".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::fixtures::{ALICE, BOB};
    use crate::calendar::model::parse_calendar;
    use crate::negotiation::agent::{NegotiationStatus, Priority};

    fn assistant() -> ScheduleAssistant {
        ScheduleAssistant::from_config(Config::default()).unwrap()
    }

    fn calendars() -> Vec<ParticipantCalendar> {
        vec![parse_calendar(ALICE).unwrap(), parse_calendar(BOB).unwrap()]
    }

    fn friday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 16).unwrap()
    }

    fn request() -> MeetingRequest {
        MeetingRequest {
            title: "Design sync".to_string(),
            duration_minutes: 30,
            priority: Priority::Medium,
            participants: vec![],
            description: None,
            location: Some("Room 2".to_string()),
        }
    }

    #[test]
    fn test_from_config_rejects_bad_timezone() {
        let mut config = Config::default();
        config.settings.tz = "Mars/Olympus".to_string();

        assert!(ScheduleAssistant::from_config(config).is_err());
    }

    #[test]
    fn test_list_templates_covers_every_kind() -> anyhow::Result<()> {
        let infos = assistant().list_templates()?;

        let ids: Vec<&str> = infos.iter().map(|info| info.id).collect();
        assert_eq!(
            ids,
            vec![
                "confirmation",
                "reschedule_request",
                "apology_alternative",
                "counter_proposal",
                "decline",
                "negotiation_summary"
            ]
        );
        Ok(())
    }

    #[test]
    fn test_slot_search_applies_defaults() {
        let assistant = assistant();

        let search = assistant.slot_search(friday(), friday(), 30, None, false);
        assert_eq!(search.max_slots, 5);
        assert!(search.respect_working_hours);

        let search = assistant.slot_search(friday(), friday(), 30, Some(2), true);
        assert_eq!(search.max_slots, 2);
        assert!(!search.respect_working_hours);
    }

    #[test]
    fn test_find_slots_returns_shared_working_time() -> anyhow::Result<()> {
        let assistant = assistant();
        let search = assistant.slot_search(friday(), friday(), 30, None, false);

        let slots = assistant.find_slots(&calendars(), &search)?;

        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].start_utc.to_rfc3339(), "2026-01-16T15:00:00+00:00");
        assert_eq!(slots[0].end_utc.to_rfc3339(), "2026-01-16T15:30:00+00:00");

        let text = assistant.slots_report(&search, &slots)?;
        assert!(text.contains("1. 2026-01-16 15:00 - 2026-01-16 15:30"));
        assert!(text.contains("Within working hours: yes"));
        Ok(())
    }

    #[test]
    fn test_find_slots_rejects_inverted_window() {
        let assistant = assistant();
        let search = assistant.slot_search(friday(), friday().pred_opt().unwrap(), 30, None, false);

        let err = assistant.find_slots(&calendars(), &search).unwrap_err();
        assert!(err.to_string().contains("starts after it ends"));
    }

    #[tokio::test]
    async fn test_negotiate_with_rules_reaches_consensus() -> anyhow::Result<()> {
        let assistant = assistant();
        let search = assistant.slot_search(friday(), friday(), 30, None, false);

        let report = assistant
            .negotiate(calendars(), request(), &search, &NegotiateOptions::default())
            .await?;

        assert_eq!(report.outcome.status, NegotiationStatus::Success);
        assert_eq!(report.request.participants, vec!["alice", "bob"]);
        assert_eq!(report.messages.messages.len(), 2);
        let to_bob = &report.messages.messages["bob"];
        assert_eq!(to_bob.kind, TemplateKind::Confirmation);
        assert!(to_bob.body.contains("Room 2"));
        assert!(report.messages.summary.is_some());
        assert!(report.replies.is_empty());

        let text = assistant.negotiation_report(&report)?;
        assert!(text.starts_with("Negotiation for \"Design sync\": success"));
        assert!(text.contains("Final time: 2026-01-16 03:00 PM"));
        assert!(text.contains("scheduler: proposed slot 1"));
        assert!(text.contains("=== Meeting Organizer (negotiation_summary) ==="));
        Ok(())
    }

    #[tokio::test]
    async fn test_negotiate_without_common_time_asks_for_alternatives() -> anyhow::Result<()> {
        let assistant = assistant();
        let search = assistant.slot_search(friday(), friday(), 240, None, false);

        let report = assistant
            .negotiate(calendars(), request(), &search, &NegotiateOptions::default())
            .await?;

        assert!(report.candidates.is_empty());
        assert_eq!(report.outcome.status, NegotiationStatus::AlternativesSuggested);
        assert_eq!(report.outcome.reason, None);
        assert_eq!(report.outcome.rounds_completed, 0);
        assert!(report.outcome.last_proposal.is_none());

        let proposers: Vec<Option<&str>> = report
            .outcome
            .alternatives
            .iter()
            .map(|alternative| alternative.proposed_by.as_deref())
            .collect();
        assert_eq!(proposers, vec![Some("alice"), Some("bob")]);
        let selected = report.outcome.selected_alternative.as_ref().unwrap();
        assert_eq!(selected.start_utc.to_rfc3339(), "2026-01-16T09:15:00+00:00");
        assert_eq!(selected.end_utc.to_rfc3339(), "2026-01-16T13:15:00+00:00");

        assert_eq!(report.messages.messages["alice"].kind, TemplateKind::CounterProposal);
        assert_eq!(report.messages.messages["bob"].kind, TemplateKind::CounterProposal);
        assert!(report.replies.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_negotiate_uses_calendar_tone() -> anyhow::Result<()> {
        let casual_bob = BOB.replace(
            r#""flexibility_score": 0.4,"#,
            r#""flexibility_score": 0.4, "tone": "casual","#,
        );
        let calendars = vec![parse_calendar(ALICE)?, parse_calendar(&casual_bob)?];
        let assistant = assistant();
        let search = assistant.slot_search(friday(), friday(), 30, None, false);

        let report = assistant
            .negotiate(calendars, request(), &search, &NegotiateOptions::default())
            .await?;

        assert!(report.messages.messages["bob"].body.starts_with("Hey bob,"));
        assert!(report.messages.messages["bob"].body.contains("\nCheers,\n"));
        assert!(report.messages.messages["alice"].body.starts_with("Hi alice,"));
        Ok(())
    }

    #[tokio::test]
    async fn test_negotiate_drafts_replies_for_objections() -> anyhow::Result<()> {
        let carol = parse_calendar(
            r#"{
                "user_id": "carol",
                "timezone": "UTC",
                "working_hours": { "start": "09:00", "end": "17:00" },
                "preferences": { "flexibility_score": 0.2 },
                "events": [
                    { "title": "Offsite", "start": "2026-01-16T09:00:00", "end": "2026-01-16T17:00:00" }
                ]
            }"#,
        )?;
        let mut calendars = calendars();
        calendars.push(carol);

        let assistant = assistant();
        let search = assistant.slot_search(friday(), friday(), 150, None, true);
        let mut request = request();
        request.priority = Priority::High;
        let options = NegotiateOptions {
            agent: Some(AgentKind::Rules),
            max_rounds: Some(1),
        };

        let report = assistant.negotiate(calendars, request, &search, &options).await?;

        assert_eq!(report.outcome.status, NegotiationStatus::Failed);
        assert_eq!(
            report.outcome.last_proposal.as_ref().unwrap().start_utc.to_rfc3339(),
            "2026-01-16T00:00:00+00:00"
        );
        let decisions: Vec<(&str, Decision)> = report
            .outcome
            .participant_responses
            .iter()
            .map(|(name, response)| (name, response.decision))
            .collect();
        assert_eq!(
            decisions,
            vec![
                ("alice", Decision::Accept),
                ("bob", Decision::CounterPropose),
                ("carol", Decision::Decline)
            ]
        );

        let names: Vec<&str> = report.replies.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["bob", "carol"]);

        let from_bob = &report.replies["bob"];
        assert_eq!(from_bob.kind, TemplateKind::CounterProposal);
        assert!(from_bob.body.starts_with(&format!("Hi {},", ORGANIZER)));
        assert!(from_bob.body.contains("outside my working hours"));

        let from_carol = &report.replies["carol"];
        assert_eq!(from_carol.kind, TemplateKind::Decline);
        assert_eq!(from_carol.subject, "Unable to attend: Design sync");
        assert!(from_carol.body.contains("no free time in the search window"));
        Ok(())
    }
}
