use crate::calendar::availability::MAX_DURATION_MINUTES;
use crate::calendar::model::{load_calendar, parse_calendar, ParticipantCalendar};
use crate::core::assistant::{NegotiateOptions, ScheduleAssistant};
use crate::core::template::{TemplateError, TemplateKind, Values};
use crate::mcp::stdio::{Message, Transport};
use crate::messaging::tone::Tone;
use crate::negotiation::agent::{MeetingRequest, Priority};
use crate::shared::utils::path::expand_tilde;
use chrono::NaiveDate;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

static TOOLS_JSON: &str = include_str!("./tools.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum JsonRpcErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool '{0}'.")]
    UnknownTool(String),

    #[error("Missing required argument '{0}'.")]
    MissingArgument(&'static str),

    #[error("Invalid argument '{0}': {1}")]
    InvalidArgument(&'static str, String),
}

/// Template and argument problems are the caller's to fix.
pub fn error_code(err: &anyhow::Error) -> JsonRpcErrorCode {
    if err.downcast_ref::<TemplateError>().is_some() || err.downcast_ref::<ToolError>().is_some() {
        JsonRpcErrorCode::InvalidParams
    } else {
        JsonRpcErrorCode::InternalError
    }
}

pub struct McpHandler<'a> {
    assistant: &'a ScheduleAssistant,
}

impl<'a> McpHandler<'a> {
    pub fn new(assistant: &'a ScheduleAssistant) -> Self {
        Self { assistant }
    }

    pub async fn launch_mcp(&self, transport: &dyn Transport) -> anyhow::Result<()> {
        let mut stream = transport.receive();

        info!("MCP stdio transport server started. Waiting for JSON messages on stdin...");

        while let Some(msg_result) = stream.next().await {
            match msg_result {
                Ok(Message::Request {
                    id, method, params, ..
                }) => {
                    debug!("Got Request: id={}, method={}, params={:?}", id, method, params);

                    if let Err(err) = self.handle_request(transport, id, method, params).await {
                        warn!("Error handling request: {:?}", err);
                        self.send_error_response(
                            transport,
                            id,
                            JsonRpcErrorCode::InternalError,
                            format!("Failed to handle request: {}", err),
                        )
                        .await?;
                    }
                }
                Ok(Message::Notification { method, params, .. }) => {
                    debug!("Got Notification: method={}, params={:?}", method, params);
                }
                Ok(Message::Response {
                    id, result, error, ..
                }) => {
                    debug!("Got Response: id={}, result={:?}, error={:?}", id, result, error);
                }
                Err(e) => {
                    warn!("Error receiving message: {:?}", e);
                }
            }
        }

        transport.close().await?;
        info!("MCP server stopped");
        Ok(())
    }

    async fn handle_request(
        &self,
        transport: &dyn Transport,
        id: u64,
        method: String,
        params: Option<Value>,
    ) -> anyhow::Result<()> {
        match &*method {
            "initialize" => self.handle_initialize(transport, id).await?,
            "tools/list" => self.handle_tools_list(transport, id).await?,
            "tools/call" => {
                let params_val = params.unwrap_or(Value::Null);
                self.handle_tools_call(transport, id, &params_val).await?;
            }
            other => {
                self.send_error_response(
                    transport,
                    id,
                    JsonRpcErrorCode::MethodNotFound,
                    format!("Method '{}' is not supported.", other),
                )
                .await?
            }
        }
        Ok(())
    }

    async fn handle_initialize(&self, transport: &dyn Transport, id: u64) -> anyhow::Result<()> {
        let response = Message::Response {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(json!({
                "capabilities": {
                    "experimental": {},
                    "prompts": { "listChanged": false },
                    "resources": { "listChanged": false, "subscribe": false },
                    "tools": { "listChanged": false }
                },
                "protocolVersion": "2024-11-05",
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
            error: None,
        };
        transport.send(response).await?;
        Ok(())
    }

    async fn handle_tools_list(&self, transport: &dyn Transport, id: u64) -> anyhow::Result<()> {
        let tools_value: Value = serde_json::from_str(TOOLS_JSON)?;

        let response = Message::Response {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(tools_value),
            error: None,
        };

        transport.send(response).await?;
        Ok(())
    }

    async fn handle_tools_call(
        &self,
        transport: &dyn Transport,
        id: u64,
        params_val: &Value,
    ) -> anyhow::Result<()> {
        match self.call_tool(params_val).await {
            Ok(text) => self.send_text_response(transport, id, &text).await?,
            Err(err) => {
                let code = error_code(&err);
                let message = match code {
                    JsonRpcErrorCode::InvalidParams => err.to_string(),
                    _ => format!("Unexpected error: {:#}", err),
                };
                self.send_error_response(transport, id, code, message)
                    .await?;
            }
        }

        Ok(())
    }

    /// Runs one `tools/call` and returns its result as JSON text.
    pub async fn call_tool(&self, params_val: &Value) -> anyhow::Result<String> {
        let tool_name = params_val
            .get("name")
            .and_then(Value::as_str)
            .ok_or(ToolError::MissingArgument("name"))?;

        let result = match tool_name {
            "list_templates" => json!({ "templates": self.assistant.list_templates()? }),
            "render_template" => self.render_template(params_val)?,
            "find_meeting_slots" => self.find_meeting_slots(params_val)?,
            "negotiate_meeting" => self.negotiate_meeting(params_val).await?,
            other => return Err(ToolError::UnknownTool(other.to_string()).into()),
        };

        Ok(serde_json::to_string(&result)?)
    }

    fn render_template(&self, params_val: &Value) -> anyhow::Result<Value> {
        let kind: TemplateKind = required_str(params_val, "template")?.parse()?;

        let mut values = Values::new();
        if let Some(object) = params_val.pointer("/arguments/values").and_then(Value::as_object) {
            for (name, value) in object {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                values.insert(name.clone(), text);
            }
        }

        let tone = match params_val.pointer("/arguments/tone").and_then(Value::as_str) {
            Some(t) => t
                .parse::<Tone>()
                .map_err(|e| ToolError::InvalidArgument("tone", e))?,
            None => Tone::default(),
        };

        let rendered = self.assistant.render(kind, &values, tone)?;
        Ok(serde_json::to_value(rendered)?)
    }

    fn find_meeting_slots(&self, params_val: &Value) -> anyhow::Result<Value> {
        let calendars = calendars_argument(params_val)?;
        let (since, until) = window_arguments(params_val)?;
        let search = self.assistant.slot_search(
            since,
            until,
            duration_argument(params_val)?,
            params_val
                .pointer("/arguments/max_slots")
                .and_then(Value::as_u64)
                .map(|n| n as usize),
            false,
        );

        let slots = self.assistant.find_slots(&calendars, &search)?;
        Ok(json!({ "slots": slots }))
    }

    async fn negotiate_meeting(&self, params_val: &Value) -> anyhow::Result<Value> {
        let calendars = calendars_argument(params_val)?;
        let duration_minutes = duration_argument(params_val)?;
        let (since, until) = window_arguments(params_val)?;
        let search = self.assistant.slot_search(
            since,
            until,
            duration_minutes,
            None,
            false,
        );

        let priority = match params_val.pointer("/arguments/priority").and_then(Value::as_str) {
            Some(p) => p
                .parse::<Priority>()
                .map_err(|e| ToolError::InvalidArgument("priority", e))?,
            None => Priority::default(),
        };
        let request = MeetingRequest {
            title: required_str(params_val, "title")?.to_string(),
            duration_minutes,
            priority,
            participants: calendars.iter().map(|c| c.user_id.clone()).collect(),
            description: None,
            location: None,
        };

        let report = self
            .assistant
            .negotiate(calendars, request, &search, &NegotiateOptions::default())
            .await?;
        Ok(serde_json::to_value(report)?)
    }

    async fn send_text_response(
        &self,
        transport: &dyn Transport,
        id: u64,
        text: &str,
    ) -> anyhow::Result<()> {
        let response = Message::Response {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(json!({
                "content": [{
                    "type": "text",
                    "text": text,
                }],
            })),
            error: None,
        };
        transport.send(response).await?;
        Ok(())
    }

    async fn send_error_response(
        &self,
        transport: &dyn Transport,
        id: u64,
        code: JsonRpcErrorCode,
        message: String,
    ) -> anyhow::Result<()> {
        let response = Message::Response {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(json!({
                "code": code as i32,
                "message": message,
            })),
        };
        transport.send(response).await?;
        Ok(())
    }
}

fn required_str<'v>(params_val: &'v Value, name: &'static str) -> Result<&'v str, ToolError> {
    params_val
        .pointer(&format!("/arguments/{}", name))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or(ToolError::MissingArgument(name))
}

fn date_argument(params_val: &Value, name: &'static str) -> Result<NaiveDate, ToolError> {
    let value = required_str(params_val, name)?;
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ToolError::InvalidArgument(name, format!("'{}' is not a YYYY-MM-DD date", value)))
}

fn duration_argument(params_val: &Value) -> Result<i64, ToolError> {
    let minutes = params_val
        .pointer("/arguments/duration_minutes")
        .and_then(Value::as_i64)
        .ok_or(ToolError::MissingArgument("duration_minutes"))?;
    if !(1..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(ToolError::InvalidArgument(
            "duration_minutes",
            format!("must be between 1 and {}, got {}", MAX_DURATION_MINUTES, minutes),
        ));
    }
    Ok(minutes)
}

fn window_arguments(params_val: &Value) -> Result<(NaiveDate, NaiveDate), ToolError> {
    let since = date_argument(params_val, "since")?;
    let until = date_argument(params_val, "until")?;
    if since > until {
        return Err(ToolError::InvalidArgument(
            "until",
            format!("{} is before since {}", until, since),
        ));
    }
    Ok((since, until))
}

/// Each entry is either a path to a calendar JSON file or the calendar
/// object itself.
fn calendars_argument(params_val: &Value) -> anyhow::Result<Vec<ParticipantCalendar>> {
    let entries = params_val
        .pointer("/arguments/calendars")
        .and_then(Value::as_array)
        .filter(|entries| !entries.is_empty())
        .ok_or(ToolError::MissingArgument("calendars"))?;

    entries
        .iter()
        .map(|entry| -> anyhow::Result<ParticipantCalendar> {
            match entry {
                Value::String(path) => Ok(load_calendar(&expand_tilde(path))?),
                Value::Object(_) => Ok(parse_calendar(&entry.to_string())?),
                _ => Err(ToolError::InvalidArgument(
                    "calendars",
                    "expected a file path or a calendar object".to_string(),
                )
                .into()),
            }
        })
        .collect()
}
