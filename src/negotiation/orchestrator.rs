use anyhow::Context;
use futures::future::join_all;
use tracing::{info, instrument, warn};

use super::agent::{
    Adaptation, AlternativeSlot, Decision, FailureReason, HistoryEntry, HistoryEvent,
    MeetingRequest, NegotiationOutcome, NegotiationStatus, ParticipantAgent, ParticipantResponses,
    ProposedSlot, RoundContext, SchedulerAction, SchedulerAgent,
};
use crate::calendar::availability::CandidateSlot;

pub const DEFAULT_MAX_ROUNDS: u32 = 3;
const CONTEXT_HISTORY_LEN: usize = 3;
const COUNTER_PROPOSAL_CONFIDENCE: f64 = 0.8;
const ALTERNATIVE_CONFIDENCE: f64 = 0.5;
const SCHEDULER: &str = "scheduler";

pub struct NegotiationOrchestrator {
    scheduler: Box<dyn SchedulerAgent>,
    participants: Vec<(String, Box<dyn ParticipantAgent>)>,
    history: Vec<HistoryEntry>,
    max_rounds: u32,
}

impl NegotiationOrchestrator {
    pub fn new(scheduler: Box<dyn SchedulerAgent>) -> Self {
        Self {
            scheduler,
            participants: Vec::new(),
            history: Vec::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn add_participant(&mut self, name: impl Into<String>, agent: Box<dyn ParticipantAgent>) {
        self.participants.push((name.into(), agent));
    }

    pub fn participant_names(&self) -> Vec<String> {
        self.participants.iter().map(|(name, _)| name.clone()).collect()
    }

    #[instrument(skip_all, fields(title = %request.title))]
    pub async fn run(
        &mut self,
        request: &MeetingRequest,
        candidates: &[CandidateSlot],
    ) -> anyhow::Result<NegotiationOutcome> {
        self.history.clear();
        info!(
            target: "negotiations",
            "Starting negotiation with {} participants and {} candidate slots",
            self.participants.len(),
            candidates.len()
        );

        let decision = self
            .scheduler
            .choose_slot(request, candidates)
            .await
            .context("scheduler failed to choose a slot")?;
        info!(
            target: "negotiations",
            "Scheduler decided {:?}: {}", decision.decision, decision.reasoning
        );
        self.record(0, SCHEDULER, HistoryEvent::InitialProposal {
            decision: decision.clone(),
        });

        if decision.decision == SchedulerAction::NegotiateOrReschedule {
            return self.gather_alternatives(request).await;
        }

        let selected = decision
            .selected_slot_id
            .and_then(|id| candidates.iter().find(|c| c.slot_id == id))
            .or_else(|| candidates.first());
        let Some(selected) = selected else {
            return self.gather_alternatives(request).await;
        };

        let reasoning = if decision.reasoning.is_empty() {
            "Best available slot based on participant availability".to_string()
        } else {
            decision.reasoning.clone()
        };
        let mut current = ProposedSlot::from_candidate(selected, reasoning);

        for round in 1..=self.max_rounds {
            info!(
                target: "negotiations",
                "Round {}: proposing {} - {}", round, current.start_utc, current.end_utc
            );

            let responses = self.collect_responses(round, request, &current).await?;

            if responses.values().all(|r| r.decision == Decision::Accept) {
                info!(target: "negotiations", "Consensus reached in round {}", round);
                let confidence = current.confidence_score;
                return Ok(self.outcome(OutcomeParts {
                    status: NegotiationStatus::Success,
                    final_slot: Some(current.clone()),
                    last_proposal: Some(current),
                    reason: None,
                    rounds_completed: round,
                    confidence_score: confidence,
                    participant_responses: responses,
                    ..OutcomeParts::default()
                }));
            }

            if round >= self.max_rounds {
                break;
            }

            let adaptation = adapt(&current, &responses);
            self.record(round, SCHEDULER, HistoryEvent::Adapt {
                adaptation: adaptation.clone(),
            });

            match adaptation {
                Adaptation::Abort { reasoning } => {
                    warn!(target: "negotiations", "Aborting negotiation: {}", reasoning);
                    return Ok(self.outcome(OutcomeParts {
                        status: NegotiationStatus::Aborted,
                        last_proposal: Some(current.clone()),
                        reason: Some(FailureReason::TooManyDeclines),
                        rounds_completed: round,
                        participant_responses: responses,
                        ..OutcomeParts::default()
                    }));
                }
                Adaptation::Adopt { new_slot, .. } => current = new_slot,
                Adaptation::Continue { .. } => {}
            }
        }

        warn!(
            target: "negotiations",
            "No consensus after {} rounds", self.max_rounds
        );
        let responses = self.latest_responses();
        Ok(self.outcome(OutcomeParts {
            status: NegotiationStatus::Failed,
            last_proposal: Some(current),
            reason: Some(FailureReason::MaxRoundsExceeded),
            rounds_completed: self.max_rounds,
            participant_responses: responses,
            ..OutcomeParts::default()
        }))
    }

    async fn collect_responses(
        &mut self,
        round: u32,
        request: &MeetingRequest,
        proposed: &ProposedSlot,
    ) -> anyhow::Result<ParticipantResponses> {
        let context = RoundContext {
            round,
            history: self.recent_history(),
        };
        let context = &context;

        let pending = self.participants.iter().map(|(name, agent)| async move {
            let response = agent.respond_to_proposal(request, proposed, context).await;
            (name.clone(), response)
        });
        let results = join_all(pending).await;

        let mut responses = ParticipantResponses::new();
        for (name, result) in results {
            let mut response =
                result.with_context(|| format!("participant '{}' failed to respond", name))?;
            for alternative in &mut response.alternative_slots {
                alternative.proposed_by.get_or_insert_with(|| name.clone());
            }
            info!(
                target: "negotiations",
                "{} responded {}: {}", name, response.decision, response.reasoning
            );
            self.record(round, &name, HistoryEvent::Respond {
                response: response.clone(),
            });
            responses.insert(name, response);
        }
        Ok(responses)
    }

    async fn gather_alternatives(
        &mut self,
        request: &MeetingRequest,
    ) -> anyhow::Result<NegotiationOutcome> {
        info!(
            target: "negotiations",
            "No ideal slot available; asking participants for alternatives"
        );

        let pending = self.participants.iter().map(|(name, agent)| async move {
            let alternatives = agent
                .propose_alternatives(request, "no_initial_slots")
                .await;
            (name.clone(), alternatives)
        });
        let results = join_all(pending).await;

        let mut all_alternatives = Vec::new();
        for (name, result) in results {
            let mut alternatives = result
                .with_context(|| format!("participant '{}' failed to suggest alternatives", name))?;
            for alternative in &mut alternatives {
                alternative.proposed_by.get_or_insert_with(|| name.clone());
            }
            self.record(0, &name, HistoryEvent::SuggestAlternatives {
                alternatives: alternatives.clone(),
            });
            all_alternatives.extend(alternatives);
        }

        let Some(first) = all_alternatives.first().cloned() else {
            warn!(target: "negotiations", "No participant suggested an alternative");
            return Ok(self.outcome(OutcomeParts {
                status: NegotiationStatus::Failed,
                reason: Some(FailureReason::NoAlternativesSuggested),
                ..OutcomeParts::default()
            }));
        };

        info!(
            target: "negotiations",
            "Collected {} alternatives", all_alternatives.len()
        );
        Ok(self.outcome(OutcomeParts {
            status: NegotiationStatus::AlternativesSuggested,
            confidence_score: ALTERNATIVE_CONFIDENCE,
            selected_alternative: Some(first),
            alternatives: all_alternatives,
            ..OutcomeParts::default()
        }))
    }

    fn record(&mut self, round: u32, agent: &str, event: HistoryEvent) {
        self.history.push(HistoryEntry {
            round,
            agent: agent.to_string(),
            event,
        });
    }

    fn recent_history(&self) -> Vec<HistoryEntry> {
        let skip = self.history.len().saturating_sub(CONTEXT_HISTORY_LEN);
        self.history[skip..].to_vec()
    }

    /// Responses from the last round that was played.
    fn latest_responses(&self) -> ParticipantResponses {
        let last_round = self.history.iter().map(|e| e.round).max().unwrap_or(0);
        self.history
            .iter()
            .filter(|entry| entry.round == last_round)
            .filter_map(|entry| match &entry.event {
                HistoryEvent::Respond { response } => {
                    Some((entry.agent.clone(), response.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn outcome(&self, parts: OutcomeParts) -> NegotiationOutcome {
        NegotiationOutcome {
            status: parts.status,
            consensus_reached: parts.status == NegotiationStatus::Success,
            final_slot: parts.final_slot,
            last_proposal: parts.last_proposal,
            reason: parts.reason,
            rounds_completed: parts.rounds_completed,
            confidence_score: parts.confidence_score,
            participant_responses: parts.participant_responses,
            selected_alternative: parts.selected_alternative,
            alternatives: parts.alternatives,
            history: self.history.clone(),
        }
    }
}

struct OutcomeParts {
    status: NegotiationStatus,
    final_slot: Option<ProposedSlot>,
    last_proposal: Option<ProposedSlot>,
    reason: Option<FailureReason>,
    rounds_completed: u32,
    confidence_score: f64,
    participant_responses: ParticipantResponses,
    selected_alternative: Option<AlternativeSlot>,
    alternatives: Vec<AlternativeSlot>,
}

impl Default for OutcomeParts {
    fn default() -> Self {
        Self {
            status: NegotiationStatus::Failed,
            final_slot: None,
            last_proposal: None,
            reason: None,
            rounds_completed: 0,
            confidence_score: 0.0,
            participant_responses: ParticipantResponses::new(),
            selected_alternative: None,
            alternatives: Vec::new(),
        }
    }
}

/// Declines from more than half the participants abort; otherwise the first
/// counter-proposal, in participant order, replaces the current slot.
fn adapt(current: &ProposedSlot, responses: &ParticipantResponses) -> Adaptation {
    let total = responses.values().count();
    let declines = responses
        .values()
        .filter(|r| r.decision == Decision::Decline)
        .count();
    if declines > total / 2 {
        return Adaptation::Abort {
            reasoning: format!("{} of {} participants declined", declines, total),
        };
    }

    let counter = responses
        .values()
        .filter(|r| r.decision == Decision::CounterPropose)
        .flat_map(|r| r.alternative_slots.iter())
        .next();

    match counter {
        Some(alternative) => {
            let reasoning = format!(
                "Adopting counter-proposal from {}: {}",
                alternative.proposed_by.as_deref().unwrap_or("a participant"),
                alternative.reason.as_deref().unwrap_or("suggested alternative")
            );
            Adaptation::Adopt {
                new_slot: ProposedSlot {
                    start_utc: alternative.start_utc,
                    end_utc: alternative.end_utc,
                    confidence_score: COUNTER_PROPOSAL_CONFIDENCE,
                    reasoning: reasoning.clone(),
                    rank: current.rank,
                },
                reasoning,
            }
        }
        None => Adaptation::Continue {
            reasoning: "Re-proposing the current slot".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::availability::{SlotConstraints, SlotScores};
    use crate::negotiation::agent::{
        MockParticipantAgent, MockSchedulerAgent, ParticipantResponse, Priority, SchedulerDecision,
    };
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 16, hour, 0, 0).unwrap()
    }

    fn request() -> MeetingRequest {
        MeetingRequest {
            title: "Design review".to_string(),
            duration_minutes: 60,
            priority: Priority::Medium,
            participants: vec!["alice".to_string(), "bob".to_string()],
            description: None,
            location: None,
        }
    }

    fn candidate(slot_id: usize, hour: u32, confidence: f64) -> CandidateSlot {
        CandidateSlot {
            slot_id,
            start_utc: at(hour),
            end_utc: at(hour) + Duration::hours(1),
            participants: vec!["alice".to_string(), "bob".to_string()],
            constraints: SlotConstraints {
                within_working_hours: true,
                duration_ok: true,
                conflicts: vec![],
            },
            scores: SlotScores {
                disruption: 0.4,
                timezone_fairness: 0.17,
                confidence,
            },
        }
    }

    fn confirm(slot_id: Option<usize>) -> MockSchedulerAgent {
        let mut scheduler = MockSchedulerAgent::new();
        scheduler.expect_choose_slot().times(1).returning(move |_, _| {
            Ok(SchedulerDecision {
                decision: SchedulerAction::ConfirmTime,
                selected_slot_id: slot_id,
                reasoning: "best overlap".to_string(),
                confidence: 0.7,
            })
        });
        scheduler
    }

    fn reply(decision: Decision, alternatives: Vec<AlternativeSlot>) -> ParticipantResponse {
        ParticipantResponse {
            decision,
            reasoning: format!("{}", decision),
            alternative_slots: alternatives,
            flexibility: 0.5,
            priority_concerns: vec![],
        }
    }

    fn always(decision: Decision) -> Box<MockParticipantAgent> {
        let mut participant = MockParticipantAgent::new();
        participant
            .expect_respond_to_proposal()
            .returning(move |_, _, _| Ok(reply(decision, vec![])));
        Box::new(participant)
    }

    fn alternative(hour: u32) -> AlternativeSlot {
        AlternativeSlot {
            start_utc: at(hour),
            end_utc: at(hour) + Duration::hours(1),
            reason: Some("free then".to_string()),
            proposed_by: None,
        }
    }

    #[tokio::test]
    async fn test_consensus_in_first_round() -> anyhow::Result<()> {
        let mut orchestrator = NegotiationOrchestrator::new(Box::new(confirm(Some(1))));
        orchestrator.add_participant("alice", always(Decision::Accept));
        orchestrator.add_participant("bob", always(Decision::Accept));

        let candidates = vec![candidate(0, 15, 0.3), candidate(1, 16, 0.3)];
        let outcome = orchestrator.run(&request(), &candidates).await?;

        assert_eq!(outcome.status, NegotiationStatus::Success);
        assert!(outcome.consensus_reached);
        assert_eq!(outcome.rounds_completed, 1);
        let final_slot = outcome.final_slot.unwrap();
        assert_eq!(final_slot.start_utc, at(16));
        assert_eq!(final_slot.rank, 2);
        assert_eq!(outcome.participant_responses.values().count(), 2);
        // initial proposal plus two responses
        assert_eq!(outcome.history.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_selection_falls_back_to_first_candidate() -> anyhow::Result<()> {
        let mut orchestrator = NegotiationOrchestrator::new(Box::new(confirm(Some(42))));
        orchestrator.add_participant("alice", always(Decision::Accept));

        let outcome = orchestrator
            .run(&request(), &[candidate(0, 15, 0.3)])
            .await?;

        assert_eq!(outcome.final_slot.unwrap().start_utc, at(15));
        Ok(())
    }

    #[tokio::test]
    async fn test_counter_proposal_is_adopted() -> anyhow::Result<()> {
        let mut orchestrator = NegotiationOrchestrator::new(Box::new(confirm(Some(0))));
        orchestrator.add_participant("alice", always(Decision::Accept));

        let mut bob = MockParticipantAgent::new();
        bob.expect_respond_to_proposal()
            .times(2)
            .returning(|_, proposed, _| {
                if proposed.start_utc == at(15) {
                    Ok(reply(Decision::CounterPropose, vec![alternative(17)]))
                } else {
                    Ok(reply(Decision::Accept, vec![]))
                }
            });
        orchestrator.add_participant("bob", Box::new(bob));

        let outcome = orchestrator
            .run(&request(), &[candidate(0, 15, 0.3)])
            .await?;

        assert_eq!(outcome.status, NegotiationStatus::Success);
        assert_eq!(outcome.rounds_completed, 2);
        let final_slot = outcome.final_slot.unwrap();
        assert_eq!(final_slot.start_utc, at(17));
        assert_eq!(final_slot.confidence_score, COUNTER_PROPOSAL_CONFIDENCE);
        assert_eq!(outcome.confidence_score, COUNTER_PROPOSAL_CONFIDENCE);

        let adaptation = outcome
            .history
            .iter()
            .find_map(|entry| match &entry.event {
                HistoryEvent::Adapt { adaptation } => Some(adaptation.clone()),
                _ => None,
            })
            .unwrap();
        assert!(matches!(adaptation, Adaptation::Adopt { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_counter_proposals_are_tagged_with_participant() -> anyhow::Result<()> {
        let mut orchestrator =
            NegotiationOrchestrator::new(Box::new(confirm(Some(0)))).with_max_rounds(1);
        let mut bob = MockParticipantAgent::new();
        bob.expect_respond_to_proposal()
            .returning(|_, _, _| Ok(reply(Decision::CounterPropose, vec![alternative(17)])));
        orchestrator.add_participant("bob", Box::new(bob));

        let outcome = orchestrator
            .run(&request(), &[candidate(0, 15, 0.3)])
            .await?;

        assert_eq!(outcome.status, NegotiationStatus::Failed);
        assert_eq!(outcome.reason, Some(FailureReason::MaxRoundsExceeded));
        let proposals = outcome.counter_proposals();
        assert_eq!(proposals[0].proposed_by.as_deref(), Some("bob"));
        Ok(())
    }

    #[tokio::test]
    async fn test_first_participant_counter_proposal_wins() -> anyhow::Result<()> {
        let mut orchestrator =
            NegotiationOrchestrator::new(Box::new(confirm(Some(0)))).with_max_rounds(2);

        let mut zed = MockParticipantAgent::new();
        zed.expect_respond_to_proposal().returning(|_, proposed, _| {
            if proposed.start_utc == at(17) {
                Ok(reply(Decision::Accept, vec![]))
            } else {
                Ok(reply(Decision::CounterPropose, vec![alternative(17)]))
            }
        });
        let mut amy = MockParticipantAgent::new();
        amy.expect_respond_to_proposal().returning(|_, proposed, _| {
            if proposed.start_utc == at(17) {
                Ok(reply(Decision::Accept, vec![]))
            } else {
                Ok(reply(Decision::CounterPropose, vec![alternative(18)]))
            }
        });
        orchestrator.add_participant("zed", Box::new(zed));
        orchestrator.add_participant("amy", Box::new(amy));

        let outcome = orchestrator
            .run(&request(), &[candidate(0, 15, 0.3)])
            .await?;

        assert_eq!(outcome.status, NegotiationStatus::Success);
        assert_eq!(outcome.final_slot.unwrap().start_utc, at(17));
        let names: Vec<&str> = outcome.participant_responses.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["zed", "amy"]);

        let round_one: Vec<&str> = outcome
            .history
            .iter()
            .filter(|entry| entry.round == 1)
            .map(|entry| entry.agent.as_str())
            .collect();
        assert_eq!(round_one, vec!["zed", "amy", SCHEDULER]);
        Ok(())
    }

    #[tokio::test]
    async fn test_counter_proposals_follow_participant_order() -> anyhow::Result<()> {
        let mut orchestrator =
            NegotiationOrchestrator::new(Box::new(confirm(Some(0)))).with_max_rounds(1);
        let mut zed = MockParticipantAgent::new();
        zed.expect_respond_to_proposal()
            .returning(|_, _, _| Ok(reply(Decision::CounterPropose, vec![alternative(17)])));
        let mut amy = MockParticipantAgent::new();
        amy.expect_respond_to_proposal()
            .returning(|_, _, _| Ok(reply(Decision::CounterPropose, vec![alternative(18)])));
        orchestrator.add_participant("zed", Box::new(zed));
        orchestrator.add_participant("amy", Box::new(amy));

        let outcome = orchestrator
            .run(&request(), &[candidate(0, 15, 0.3)])
            .await?;

        let proposers: Vec<Option<&str>> = outcome
            .counter_proposals()
            .iter()
            .map(|alternative| alternative.proposed_by.as_deref())
            .collect();
        assert_eq!(proposers, vec![Some("zed"), Some("amy")]);
        assert_eq!(outcome.counter_proposals()[0].start_utc, at(17));
        Ok(())
    }

    #[tokio::test]
    async fn test_majority_decline_aborts() -> anyhow::Result<()> {
        let mut orchestrator = NegotiationOrchestrator::new(Box::new(confirm(Some(0))));
        orchestrator.add_participant("alice", always(Decision::Decline));
        orchestrator.add_participant("bob", always(Decision::Decline));
        orchestrator.add_participant("carol", always(Decision::Accept));

        let outcome = orchestrator
            .run(&request(), &[candidate(0, 15, 0.3)])
            .await?;

        assert_eq!(outcome.status, NegotiationStatus::Aborted);
        assert_eq!(outcome.reason, Some(FailureReason::TooManyDeclines));
        assert_eq!(outcome.rounds_completed, 1);
        assert!(!outcome.consensus_reached);
        assert!(outcome.final_slot.is_none());
        assert_eq!(outcome.last_proposal.unwrap().start_utc, at(15));
        Ok(())
    }

    #[tokio::test]
    async fn test_half_decline_keeps_negotiating_until_max_rounds() -> anyhow::Result<()> {
        let mut orchestrator = NegotiationOrchestrator::new(Box::new(confirm(Some(0))));
        orchestrator.add_participant("alice", always(Decision::Decline));
        orchestrator.add_participant("bob", always(Decision::Accept));

        let outcome = orchestrator
            .run(&request(), &[candidate(0, 15, 0.3)])
            .await?;

        assert_eq!(outcome.status, NegotiationStatus::Failed);
        assert_eq!(outcome.reason, Some(FailureReason::MaxRoundsExceeded));
        assert_eq!(outcome.rounds_completed, DEFAULT_MAX_ROUNDS);
        assert_eq!(outcome.participant_responses.values().count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_context_carries_recent_history() -> anyhow::Result<()> {
        let mut orchestrator =
            NegotiationOrchestrator::new(Box::new(confirm(Some(0)))).with_max_rounds(2);
        let mut alice = MockParticipantAgent::new();
        alice
            .expect_respond_to_proposal()
            .withf(|_, _, context| context.history.len() <= CONTEXT_HISTORY_LEN)
            .returning(|_, _, context| {
                let decision = if context.round == 1 {
                    Decision::Decline
                } else {
                    Decision::Accept
                };
                Ok(reply(decision, vec![]))
            });
        orchestrator.add_participant("alice", Box::new(alice));
        orchestrator.add_participant("bob", always(Decision::Accept));

        let outcome = orchestrator
            .run(&request(), &[candidate(0, 15, 0.3)])
            .await?;

        assert_eq!(outcome.status, NegotiationStatus::Success);
        assert_eq!(outcome.rounds_completed, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_reschedule_collects_alternatives() -> anyhow::Result<()> {
        let mut scheduler = MockSchedulerAgent::new();
        scheduler.expect_choose_slot().returning(|_, _| {
            Ok(SchedulerDecision {
                decision: SchedulerAction::NegotiateOrReschedule,
                selected_slot_id: None,
                reasoning: "nothing fits".to_string(),
                confidence: 0.0,
            })
        });
        let mut orchestrator = NegotiationOrchestrator::new(Box::new(scheduler));

        let mut alice = MockParticipantAgent::new();
        alice
            .expect_propose_alternatives()
            .withf(|_, reason| reason.eq_ignore_ascii_case("no_initial_slots"))
            .returning(|_, _| Ok(vec![alternative(10), alternative(11)]));
        alice.expect_respond_to_proposal().never();
        orchestrator.add_participant("alice", Box::new(alice));

        let mut bob = MockParticipantAgent::new();
        bob.expect_propose_alternatives()
            .returning(|_, _| Ok(vec![]));
        orchestrator.add_participant("bob", Box::new(bob));

        let outcome = orchestrator.run(&request(), &[]).await?;

        assert_eq!(outcome.status, NegotiationStatus::AlternativesSuggested);
        assert_eq!(outcome.confidence_score, ALTERNATIVE_CONFIDENCE);
        assert_eq!(outcome.alternatives.len(), 2);
        let selected = outcome.selected_alternative.unwrap();
        assert_eq!(selected.start_utc, at(10));
        assert_eq!(selected.proposed_by.as_deref(), Some("alice"));
        Ok(())
    }

    #[tokio::test]
    async fn test_no_candidates_and_no_alternatives_fails() -> anyhow::Result<()> {
        let mut orchestrator = NegotiationOrchestrator::new(Box::new(confirm(None)));
        let mut alice = MockParticipantAgent::new();
        alice
            .expect_propose_alternatives()
            .returning(|_, _| Ok(vec![]));
        orchestrator.add_participant("alice", Box::new(alice));

        let outcome = orchestrator.run(&request(), &[]).await?;

        assert_eq!(outcome.status, NegotiationStatus::Failed);
        assert_eq!(outcome.reason, Some(FailureReason::NoAlternativesSuggested));
        assert_eq!(outcome.rounds_completed, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_participant_error_propagates() {
        let mut orchestrator = NegotiationOrchestrator::new(Box::new(confirm(Some(0))));
        let mut alice = MockParticipantAgent::new();
        alice
            .expect_respond_to_proposal()
            .returning(|_, _, _| Err(anyhow::anyhow!("quota exceeded")));
        orchestrator.add_participant("alice", Box::new(alice));

        let err = orchestrator
            .run(&request(), &[candidate(0, 15, 0.3)])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("alice"));
    }
}
