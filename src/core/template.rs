use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use minijinja::{Environment, UndefinedBehavior};
use serde::{Deserialize, Serialize};

use crate::config::templates::email;

/// Placeholder name to substituted value.
pub type Values = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Confirmation,
    RescheduleRequest,
    ApologyAlternative,
    CounterProposal,
    Decline,
    NegotiationSummary,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 6] = [
        TemplateKind::Confirmation,
        TemplateKind::RescheduleRequest,
        TemplateKind::ApologyAlternative,
        TemplateKind::CounterProposal,
        TemplateKind::Decline,
        TemplateKind::NegotiationSummary,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            TemplateKind::Confirmation => "confirmation",
            TemplateKind::RescheduleRequest => "reschedule_request",
            TemplateKind::ApologyAlternative => "apology_alternative",
            TemplateKind::CounterProposal => "counter_proposal",
            TemplateKind::Decline => "decline",
            TemplateKind::NegotiationSummary => "negotiation_summary",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            TemplateKind::Confirmation => "Confirmation",
            TemplateKind::RescheduleRequest => "Reschedule Request",
            TemplateKind::ApologyAlternative => "Apology + Alternative",
            TemplateKind::CounterProposal => "Counter-Proposal",
            TemplateKind::Decline => "Decline",
            TemplateKind::NegotiationSummary => "Negotiation Summary",
        }
    }

    /// Every name a template of this kind may refer to. The built-in
    /// templates refer to all of them.
    pub fn placeholders(&self) -> &'static [&'static str] {
        match self {
            TemplateKind::Confirmation => &[
                "meeting_title",
                "date",
                "recipient_name",
                "meeting_time",
                "duration",
                "participants",
                "location",
            ],
            TemplateKind::RescheduleRequest => &[
                "meeting_title",
                "recipient_name",
                "original_time",
                "reason",
                "alternative_times",
            ],
            TemplateKind::ApologyAlternative => &[
                "meeting_title",
                "recipient_name",
                "explanation",
                "alternatives",
            ],
            TemplateKind::CounterProposal => &[
                "meeting_title",
                "recipient_name",
                "original_time",
                "constraint_explanation",
                "counter_proposals",
            ],
            TemplateKind::Decline => &[
                "meeting_title",
                "recipient_name",
                "reason",
                "alternatives_suggestion",
            ],
            TemplateKind::NegotiationSummary => &[
                "meeting_title",
                "final_time",
                "duration",
                "all_participants",
                "rounds",
            ],
        }
    }

    fn builtin(&self) -> MessageTemplate {
        let (subject, body) = match self {
            TemplateKind::Confirmation => (email::CONFIRMATION_SUBJECT, email::CONFIRMATION_BODY),
            TemplateKind::RescheduleRequest => (
                email::RESCHEDULE_REQUEST_SUBJECT,
                email::RESCHEDULE_REQUEST_BODY,
            ),
            TemplateKind::ApologyAlternative => (
                email::APOLOGY_ALTERNATIVE_SUBJECT,
                email::APOLOGY_ALTERNATIVE_BODY,
            ),
            TemplateKind::CounterProposal => (
                email::COUNTER_PROPOSAL_SUBJECT,
                email::COUNTER_PROPOSAL_BODY,
            ),
            TemplateKind::Decline => (email::DECLINE_SUBJECT, email::DECLINE_BODY),
            TemplateKind::NegotiationSummary => (
                email::NEGOTIATION_SUMMARY_SUBJECT,
                email::NEGOTIATION_SUMMARY_BODY,
            ),
        };

        MessageTemplate {
            kind: *self,
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for TemplateKind {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "confirmation" => Ok(TemplateKind::Confirmation),
            "reschedule_request" | "reschedule" => Ok(TemplateKind::RescheduleRequest),
            "apology_alternative" | "apology" => Ok(TemplateKind::ApologyAlternative),
            "counter_proposal" => Ok(TemplateKind::CounterProposal),
            "decline" => Ok(TemplateKind::Decline),
            "negotiation_summary" | "summary" => Ok(TemplateKind::NegotiationSummary),
            _ => Err(TemplateError::UnknownTemplate(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Unknown template '{0}'; expected one of: confirmation, reschedule_request, apology_alternative, counter_proposal, decline, negotiation_summary.")]
    UnknownTemplate(String),

    #[error("Template '{template}' is missing values for: {}.", .missing.join(", "))]
    MissingPlaceholders {
        template: TemplateKind,
        missing: Vec<String>,
    },

    #[error("Template '{template}' refers to unknown placeholders: {}.", .unknown.join(", "))]
    UnknownPlaceholders {
        template: TemplateKind,
        unknown: Vec<String>,
    },

    #[error("Template engine error: {0}")]
    Engine(#[from] minijinja::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    pub kind: TemplateKind,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub kind: TemplateKind,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateInfo {
    pub id: &'static str,
    pub title: &'static str,
    pub placeholders: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: BTreeMap<TemplateKind, MessageTemplate>,
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateSet {
    pub fn builtin() -> Self {
        let templates = TemplateKind::ALL
            .iter()
            .map(|kind| (*kind, kind.builtin()))
            .collect();

        Self { templates }
    }

    pub fn with_override(
        mut self,
        kind: TemplateKind,
        subject: Option<String>,
        body: Option<String>,
    ) -> Result<Self, TemplateError> {
        let mut template = self.get(kind).clone();
        if let Some(subject) = subject {
            template.subject = subject;
        }
        if let Some(body) = body {
            template.body = body;
        }

        let allowed: BTreeSet<&str> = kind.placeholders().iter().copied().collect();
        let unknown: Vec<String> = referenced_names(&template)?
            .into_iter()
            .filter(|name| !allowed.contains(name.as_str()))
            .collect();
        if !unknown.is_empty() {
            return Err(TemplateError::UnknownPlaceholders {
                template: kind,
                unknown,
            });
        }

        self.templates.insert(kind, template);
        Ok(self)
    }

    pub fn get(&self, kind: TemplateKind) -> &MessageTemplate {
        &self.templates[&kind]
    }

    /// Names referenced by the subject and body of `kind`, sorted.
    pub fn required_placeholders(&self, kind: TemplateKind) -> Result<Vec<String>, TemplateError> {
        Ok(referenced_names(self.get(kind))?.into_iter().collect())
    }

    pub fn render(&self, kind: TemplateKind, values: &Values) -> Result<RenderedMessage, TemplateError> {
        let missing: Vec<String> = self
            .required_placeholders(kind)?
            .into_iter()
            .filter(|name| !values.contains_key(name))
            .collect();
        if !missing.is_empty() {
            return Err(TemplateError::MissingPlaceholders {
                template: kind,
                missing,
            });
        }

        let template = self.get(kind);
        let env = message_environment();
        let subject = env.render_str(&template.subject, values)?;
        let body = env.render_str(&template.body, values)?;

        Ok(RenderedMessage {
            kind,
            subject: subject.trim().to_string(),
            body,
        })
    }

    pub fn describe(&self) -> Result<Vec<TemplateInfo>, TemplateError> {
        TemplateKind::ALL
            .iter()
            .map(|kind| {
                Ok(TemplateInfo {
                    id: kind.id(),
                    title: kind.title(),
                    placeholders: self.required_placeholders(*kind)?,
                })
            })
            .collect()
    }
}

fn message_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env
}

fn referenced_names(template: &MessageTemplate) -> Result<BTreeSet<String>, TemplateError> {
    let env = message_environment();
    let mut names = BTreeSet::new();
    for source in [&template.subject, &template.body] {
        let compiled = env.template_from_str(source)?;
        names.extend(compiled.undeclared_variables(false));
    }
    Ok(names)
}

pub fn generate<S: Serialize>(name: &str, template: &str, ctx: S) -> anyhow::Result<String> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);

    env.add_template(name, template)?;
    let tmpl = env.get_template(name)?;

    let rendered = tmpl.render(ctx)?;

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_values(kind: TemplateKind) -> Values {
        kind.placeholders()
            .iter()
            .map(|name| (name.to_string(), format!("value of {}", name)))
            .collect()
    }

    #[test]
    fn test_builtin_templates_reference_their_whole_contract() -> anyhow::Result<()> {
        let set = TemplateSet::builtin();
        for kind in TemplateKind::ALL {
            let mut expected: Vec<String> =
                kind.placeholders().iter().map(|p| p.to_string()).collect();
            expected.sort();

            assert_eq!(set.required_placeholders(kind)?, expected, "{}", kind);
        }
        Ok(())
    }

    #[test]
    fn test_render_confirmation() -> anyhow::Result<()> {
        let values: Values = [
            ("meeting_title", "Sprint Review"),
            ("date", "2026-02-01"),
            ("recipient_name", "Alex"),
            ("meeting_time", "10:00 AM"),
            ("duration", "30"),
            ("participants", "Alex, Sam"),
            ("location", "Zoom"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let rendered = TemplateSet::builtin().render(TemplateKind::Confirmation, &values)?;

        assert_eq!(rendered.subject, "Confirmed: Sprint Review on 2026-02-01");
        assert!(rendered.body.contains("Sprint Review"));
        assert!(rendered.body.contains("10:00 AM"));
        assert!(rendered.body.contains("Zoom"));
        assert!(rendered.body.starts_with("Hi Alex,"));
        assert!(!rendered.body.contains("{{"));
        assert!(!rendered.subject.contains("{{"));
        Ok(())
    }

    #[test]
    fn test_render_every_kind_with_complete_values() -> anyhow::Result<()> {
        let set = TemplateSet::builtin();
        for kind in TemplateKind::ALL {
            let values = complete_values(kind);
            let rendered = set.render(kind, &values)?;
            let text = format!("{}\n{}", rendered.subject, rendered.body);

            assert!(!text.contains("{{"), "{} left a marker", kind);
            assert!(!text.contains("}}"), "{} left a marker", kind);
            for value in values.values() {
                assert!(text.contains(value.as_str()), "{} lost '{}'", kind, value);
            }
        }
        Ok(())
    }

    #[test]
    fn test_missing_values_are_all_reported() {
        let mut values = complete_values(TemplateKind::Decline);
        values.remove("reason");
        values.remove("alternatives_suggestion");

        let err = TemplateSet::builtin()
            .render(TemplateKind::Decline, &values)
            .unwrap_err();

        match err {
            TemplateError::MissingPlaceholders { template, missing } => {
                assert_eq!(template, TemplateKind::Decline);
                assert_eq!(missing, vec!["alternatives_suggestion", "reason"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_values_are_inserted_verbatim() -> anyhow::Result<()> {
        let mut values = complete_values(TemplateKind::Decline);
        values.insert("reason".to_string(), "<b>{{ recipient_name }}</b> & co".to_string());
        values.insert("unused".to_string(), "ignored".to_string());

        let rendered = TemplateSet::builtin().render(TemplateKind::Decline, &values)?;

        assert!(rendered.body.contains("Reason: <b>{{ recipient_name }}</b> & co"));
        assert!(!rendered.body.contains("ignored"));
        Ok(())
    }

    #[test]
    fn test_override_narrows_required_placeholders() -> anyhow::Result<()> {
        let set = TemplateSet::builtin().with_override(
            TemplateKind::Decline,
            Some("Sorry, {{ recipient_name }}".to_string()),
            Some("I can't make {{ meeting_title }}.".to_string()),
        )?;

        assert_eq!(
            set.required_placeholders(TemplateKind::Decline)?,
            vec!["meeting_title", "recipient_name"]
        );

        let values: Values = [("recipient_name", "Sam"), ("meeting_title", "Retro")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let rendered = set.render(TemplateKind::Decline, &values)?;
        assert_eq!(rendered.subject, "Sorry, Sam");
        assert_eq!(rendered.body, "I can't make Retro.");
        Ok(())
    }

    #[test]
    fn test_override_rejects_names_outside_contract() {
        let err = TemplateSet::builtin()
            .with_override(
                TemplateKind::Confirmation,
                None,
                Some("See you at {{ venue }} on {{ date }}".to_string()),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            TemplateError::UnknownPlaceholders { ref unknown, .. } if unknown == &vec!["venue".to_string()]
        ));
    }

    #[test]
    fn test_parse_template_kind() {
        assert_eq!("confirmation".parse::<TemplateKind>().unwrap(), TemplateKind::Confirmation);
        assert_eq!("reschedule".parse::<TemplateKind>().unwrap(), TemplateKind::RescheduleRequest);
        assert_eq!("Counter-Proposal".parse::<TemplateKind>().unwrap(), TemplateKind::CounterProposal);
        assert_eq!("apology".parse::<TemplateKind>().unwrap(), TemplateKind::ApologyAlternative);
        assert!("invitation".parse::<TemplateKind>().is_err());
    }
}
