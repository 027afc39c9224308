mod calendar;
mod config;
mod core;
mod gemini;
mod mcp;
mod messaging;
mod negotiation;
mod shared;

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{ArgGroup, Args, Parser, Subcommand};
use serde_json::Value;

use crate::calendar::model::{load_calendar, ParticipantCalendar};
use crate::config::AgentKind;
use crate::core::assistant::{NegotiateOptions, ScheduleAssistant};
use crate::core::template::{TemplateKind, Values};
use crate::core::window::SearchWindow;
use crate::messaging::tone::Tone;
use crate::negotiation::agent::{MeetingRequest, Priority};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " version ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Parser)]
#[command(
    name = "schedule-assistant",
    about = "Finds common meeting times across participant calendars, negotiates between them, and drafts the emails. It can also run as an MCP (Model Context Protocol) server.",
    disable_version_flag = true
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). Logs go to stderr.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(long, short = 'V', help = "Print version")]
    pub version: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(name = "templates", about = "List message templates and their placeholders")]
    Templates {
        #[arg(long, help = "Print JSON instead of text.")]
        json: bool,
    },
    #[command(name = "render", about = "Render a message template")]
    Render {
        #[arg(help = "Template id, e.g. confirmation or reschedule_request.")]
        template: String,
        #[arg(
            long = "set",
            value_name = "NAME=VALUE",
            value_parser = parse_key_val,
            help = "Placeholder value. Repeatable; wins over --values."
        )]
        set: Vec<(String, String)>,
        #[arg(long, value_name = "FILE", help = "JSON object of placeholder values.")]
        values: Option<PathBuf>,
        #[arg(long, default_value = "professional", help = "professional, formal, casual or friendly.")]
        tone: Tone,
        #[arg(long, help = "Print JSON instead of text.")]
        json: bool,
    },
    #[command(name = "slots", about = "Find common free time across calendars")]
    Slots {
        #[command(flatten)]
        search: SearchArgs,
        #[arg(long, help = "Print JSON instead of text.")]
        json: bool,
    },
    #[command(name = "negotiate", about = "Negotiate a meeting time and draft the messages")]
    Negotiate {
        #[command(flatten)]
        search: SearchArgs,
        #[arg(long, help = "Meeting title.")]
        title: String,
        #[arg(long, default_value = "medium", help = "high, medium or low.")]
        priority: Priority,
        #[arg(long, help = "Meeting location for confirmations.")]
        location: Option<String>,
        #[arg(long, help = "Negotiation rounds before giving up.")]
        max_rounds: Option<u32>,
        #[arg(long, help = "rules (offline) or gemini.")]
        agent: Option<AgentKind>,
        #[arg(long, help = "Print JSON instead of text.")]
        json: bool,
    },
    #[command(name = "mcp", about = "Launch schedule-assistant as an MCP server")]
    Mcp,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("window").args(["since", "today", "this_week", "next_week"])))]
struct SearchArgs {
    #[arg(
        long = "calendar",
        value_name = "FILE",
        required = true,
        help = "Participant calendar JSON. Repeat once per participant."
    )]
    calendars: Vec<PathBuf>,
    #[arg(
        long,
        value_name = "DATE",
        requires = "until",
        help = "Start date (YYYY-MM-DD). Requires --until."
    )]
    since: Option<NaiveDate>,
    #[arg(
        long,
        value_name = "DATE",
        requires = "since",
        help = "End date (YYYY-MM-DD). Requires --since."
    )]
    until: Option<NaiveDate>,
    #[arg(long, help = "Search today only.")]
    today: bool,
    #[arg(long, help = "Search the current week (Mon-Sun).")]
    this_week: bool,
    #[arg(long, help = "Search the upcoming week (Mon-Sun).")]
    next_week: bool,
    #[arg(long, default_value_t = 30, help = "Meeting length in minutes.")]
    duration: i64,
    #[arg(long, help = "Maximum number of candidate slots.")]
    max_slots: Option<usize>,
    #[arg(long, help = "Consider time outside working hours.")]
    ignore_working_hours: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", APP_VERSION);
        std::process::exit(0);
    }

    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(true)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let assistant = ScheduleAssistant::new()?;

    match cli.command {
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
        }
        Some(Commands::Templates { json }) => {
            let infos = assistant.list_templates()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&infos)?);
            } else {
                for info in infos {
                    println!("{:<22} {}", info.id, info.title);
                    println!("{:<22} {}", "", info.placeholders.join(", "));
                }
            }
        }
        Some(Commands::Render {
            template,
            set,
            values,
            tone,
            json,
        }) => {
            let kind: TemplateKind = template.parse()?;
            let values = collect_values(values, set)?;
            let rendered = assistant.render(kind, &values, tone)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rendered)?);
            } else {
                println!("Subject: {}\n\n{}", rendered.subject, rendered.body);
            }
        }
        Some(Commands::Slots { search, json }) => {
            let calendars = load_calendars(&search.calendars)?;
            let slot_search = build_search(&assistant, &search);
            let slots = assistant.find_slots(&calendars, &slot_search)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&slots)?);
            } else {
                print!("{}", assistant.slots_report(&slot_search, &slots)?);
            }
        }
        Some(Commands::Negotiate {
            search,
            title,
            priority,
            location,
            max_rounds,
            agent,
            json,
        }) => {
            let calendars = load_calendars(&search.calendars)?;
            let slot_search = build_search(&assistant, &search);
            let request = MeetingRequest {
                title,
                duration_minutes: search.duration,
                priority,
                participants: calendars.iter().map(|c| c.user_id.clone()).collect(),
                description: None,
                location,
            };
            let options = NegotiateOptions { agent, max_rounds };

            let report = assistant
                .negotiate(calendars, request, &slot_search, &options)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", assistant.negotiation_report(&report)?);
            }
        }
        Some(Commands::Mcp) => assistant.launch_mcp().await?,
    }

    Ok(())
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing placeholder name in '{}'", s));
    }
    Ok((name.to_string(), value.to_string()))
}

fn collect_values(file: Option<PathBuf>, set: Vec<(String, String)>) -> anyhow::Result<Values> {
    let mut values = Values::new();

    if let Some(path) = file {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read values file '{}'", path.display()))?;
        let parsed: serde_json::Map<String, Value> = serde_json::from_str(&content)
            .with_context(|| format!("values file '{}' must be a JSON object", path.display()))?;
        for (name, value) in parsed {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            values.insert(name, text);
        }
    }

    values.extend(set);
    Ok(values)
}

fn load_calendars(paths: &[PathBuf]) -> anyhow::Result<Vec<ParticipantCalendar>> {
    paths
        .iter()
        .map(|path| load_calendar(path).with_context(|| format!("in calendar '{}'", path.display())))
        .collect()
}

fn build_search(
    assistant: &ScheduleAssistant,
    args: &SearchArgs,
) -> crate::calendar::availability::SlotSearch {
    let (since, until) = determine_window(assistant, args);
    assistant.slot_search(
        since,
        until,
        args.duration,
        args.max_slots,
        args.ignore_working_hours,
    )
}

fn determine_window(assistant: &ScheduleAssistant, args: &SearchArgs) -> (NaiveDate, NaiveDate) {
    if let (Some(since), Some(until)) = (args.since, args.until) {
        return (since, until);
    }

    let window = if args.today {
        SearchWindow::Today
    } else if args.this_week {
        SearchWindow::ThisWeek
    } else if args.next_week {
        SearchWindow::NextWeek
    } else {
        SearchWindow::NextTwoWeeks
    };
    assistant.search_window(window)
}
