//! Calendars shared by the calendar and negotiation tests.

pub const ALICE: &str = r#"
{
  "user_id": "alice",
  "timezone": "Europe/London",
  "working_hours": { "start": "09:00", "end": "17:00" },
  "preferences": { "flexibility_score": 0.8, "priorities": ["client_meetings"] },
  "events": [
    { "title": "Client call", "start": "2026-01-16T14:00:00", "end": "2026-01-16T15:00:00" },
    { "title": "Standup", "start": "2026-01-16T09:00:00", "end": "2026-01-16T09:15:00" }
  ]
}
"#;

pub const BOB: &str = r#"
{
  "user_id": "bob",
  "timezone": "America/New_York",
  "working_hours": { "start": "09:00", "end": "17:00" },
  "preferences": { "flexibility_score": 0.4, "priorities": ["deep_work", "no_late_meetings"] },
  "events": [
    { "title": "Focus block", "start": "2026-01-16T09:00:00", "end": "2026-01-16T10:00:00" }
  ]
}
"#;
