use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Failed to read calendar file '{0}': {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Calendar is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Calendar must be a JSON object.")]
    NotAnObject,

    #[error("Missing key: {0}")]
    MissingKey(String),

    #[error("Unknown time zone '{0}'; use an IANA name such as 'Europe/London'.")]
    InvalidTimezone(String),

    #[error("Invalid date-time '{0}'; expected ISO-8601 such as '2026-01-16T10:00:00'.")]
    InvalidDateTime(String),

    #[error("Invalid clock time '{0}'; expected HH:MM.")]
    InvalidTime(String),

    #[error("At least one participant calendar is required.")]
    NoParticipants,

    #[error("Meeting duration must be between 1 and {max} minutes, got {0}.", max = super::availability::MAX_DURATION_MINUTES)]
    InvalidDuration(i64),
}
