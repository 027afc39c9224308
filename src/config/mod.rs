pub mod error;
pub mod templates;

use crate::config::error::ConfigError;
use crate::core::template::{TemplateKind, TemplateSet};
use crate::gemini::client::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::messaging::generator::DEFAULT_LOCATION;
use crate::negotiation::orchestrator::DEFAULT_MAX_ROUNDS;
use crate::shared::utils;
use chrono_tz::Tz;
use mlua::{Lua, Table, Value};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

pub const CONFIG_FILE_PATH_ENV: &str = "SCHEDULE_ASSISTANT_CONFIG_FILE_PATH";
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
const LUA_MODULE_NAME: &str = "schedule-assistant";
const DEFAULT_MAX_SLOTS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub settings: Settings,
    pub negotiation: NegotiationSettings,
    pub gemini: GeminiSettings,
    pub messaging: MessagingSettings,
    pub templates: Vec<TemplateOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub tz: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationSettings {
    pub max_rounds: u32,
    pub max_slots: usize,
    pub agent: AgentKind,
    pub respect_working_hours: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentKind {
    #[default]
    Rules,
    Gemini,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Rules => f.write_str("rules"),
            AgentKind::Gemini => f.write_str("gemini"),
        }
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rules" | "rule" | "offline" => Ok(AgentKind::Rules),
            "gemini" | "llm" => Ok(AgentKind::Gemini),
            other => Err(format!("unknown agent '{}'; expected rules or gemini", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagingSettings {
    pub default_location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateOverride {
    pub kind: TemplateKind,
    pub subject: Option<String>,
    pub body: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            settings: Settings {
                tz: "UTC".to_string(),
            },
            negotiation: NegotiationSettings {
                max_rounds: DEFAULT_MAX_ROUNDS,
                max_slots: DEFAULT_MAX_SLOTS,
                agent: AgentKind::default(),
                respect_working_hours: true,
            },
            gemini: GeminiSettings {
                api_key: None,
                model: DEFAULT_MODEL.to_string(),
                base_url: DEFAULT_BASE_URL.to_string(),
            },
            messaging: MessagingSettings {
                default_location: DEFAULT_LOCATION.to_string(),
            },
            templates: vec![],
        }
    }
}

impl Config {
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.settings
            .tz
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.settings.tz.clone(), "config".to_string()))
    }

    /// Built-in templates with the configured overrides applied.
    pub fn template_set(&self) -> Result<TemplateSet, crate::core::template::TemplateError> {
        self.templates
            .iter()
            .try_fold(TemplateSet::builtin(), |set, o| {
                set.with_override(o.kind, o.subject.clone(), o.body.clone())
            })
    }
}

impl GeminiSettings {
    /// The configured key, else `$GOOGLE_API_KEY`.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        self.api_key_or(env::var(API_KEY_ENV).ok())
    }

    fn api_key_or(&self, fallback: Option<String>) -> Result<String, ConfigError> {
        self.api_key
            .clone()
            .or(fallback)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}

pub fn init() -> anyhow::Result<Config> {
    let explicit = env::var(CONFIG_FILE_PATH_ENV).ok();
    match get_config_file_path(explicit.as_deref())? {
        Some(path_buf) => load_config(&path_buf),
        None => Ok(Config::default()),
    }
}

/// An explicitly named file must exist; a missing default file means the
/// built-in defaults.
fn get_config_file_path(explicit: Option<&str>) -> anyhow::Result<Option<PathBuf>> {
    let config_file_path_buf = match explicit {
        Some(path) => {
            let path_buf = utils::path::expand_tilde(path.trim());
            if !path_buf.is_file() {
                return Err(ConfigError::ConfigFileNotFoundError(utils::path::contract_tilde(
                    &path_buf,
                ))
                .into());
            }
            path_buf
        }
        None => {
            let home_dir = dirs::home_dir().ok_or(ConfigError::HomeEnvironmentNotFoundError)?;
            home_dir.join(".config/schedule-assistant/config.lua")
        }
    };

    Ok(config_file_path_buf
        .is_file()
        .then_some(config_file_path_buf))
}

fn register_module(lua: &Lua) -> anyhow::Result<()> {
    let assistant_mod = lua.create_table()?;
    let template_sub_mod = lua.create_table()?;

    let builtin = TemplateSet::builtin();
    for kind in TemplateKind::ALL {
        let template = builtin.get(kind);
        let template_tbl = lua.create_table()?;
        template_tbl
            .set("subject", template.subject.as_str())
            .map_err(|e| ConfigError::LuaRuntimeError(e.to_string()))?;
        template_tbl
            .set("body", template.body.as_str())
            .map_err(|e| ConfigError::LuaRuntimeError(e.to_string()))?;
        template_sub_mod.set(kind.id(), template_tbl)?;
    }
    assistant_mod.set("template", template_sub_mod)?;

    let globals = lua.globals();
    let package: Table = globals.get("package")?;
    let loaded: Table = package.get("loaded")?;
    loaded.set(LUA_MODULE_NAME, assistant_mod)?;

    Ok(())
}

pub fn load_config(config_file_path: &Path) -> anyhow::Result<Config> {
    let lua = Lua::new();
    let display_path = utils::path::contract_tilde(config_file_path);

    let config_path = config_file_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .to_string_lossy();

    lua.load(format!(
        r#"package.path = package.path .. ";{}/?.lua""#,
        config_path
    ))
    .exec()?;

    register_module(&lua)?;

    let config_code = fs::read_to_string(config_file_path)?;
    let config_eval = lua.load(&config_code).set_name(display_path.as_str()).eval()?;

    let config_tbl = match config_eval {
        Value::Table(table) => table,
        other => {
            return Err(ConfigError::NotATable(display_path, other.type_name().to_string()).into())
        }
    };

    let defaults = Config::default();

    let settings = match config_tbl.get::<_, Option<Table>>("settings")? {
        Some(table) => Settings {
            tz: table
                .get::<_, Option<String>>("TZ")?
                .unwrap_or(defaults.settings.tz),
        },
        None => defaults.settings,
    };
    if settings.tz.parse::<Tz>().is_err() {
        return Err(ConfigError::InvalidTimezone(settings.tz, display_path).into());
    }

    let negotiation = match config_tbl.get::<_, Option<Table>>("negotiation")? {
        Some(table) => {
            let agent = match table.get::<_, Option<String>>("agent")? {
                Some(value) => value.parse::<AgentKind>().map_err(|_| {
                    ConfigError::InvalidValue(
                        "negotiation.agent".to_owned(),
                        value.clone(),
                        display_path.clone(),
                    )
                })?,
                None => defaults.negotiation.agent,
            };
            let max_rounds = table
                .get::<_, Option<u32>>("maxRounds")?
                .unwrap_or(defaults.negotiation.max_rounds);
            if max_rounds == 0 {
                return Err(ConfigError::InvalidValue(
                    "negotiation.maxRounds".to_owned(),
                    max_rounds.to_string(),
                    display_path,
                )
                .into());
            }

            NegotiationSettings {
                max_rounds,
                max_slots: table
                    .get::<_, Option<usize>>("maxSlots")?
                    .unwrap_or(defaults.negotiation.max_slots),
                agent,
                respect_working_hours: table
                    .get::<_, Option<bool>>("respectWorkingHours")?
                    .unwrap_or(defaults.negotiation.respect_working_hours),
            }
        }
        None => defaults.negotiation,
    };

    let gemini = match config_tbl.get::<_, Option<Table>>("gemini")? {
        Some(table) => GeminiSettings {
            api_key: table.get::<_, Option<String>>("apiKey")?,
            model: table
                .get::<_, Option<String>>("model")?
                .unwrap_or(defaults.gemini.model),
            base_url: table
                .get::<_, Option<String>>("baseURL")?
                .unwrap_or(defaults.gemini.base_url),
        },
        None => defaults.gemini,
    };

    let messaging = match config_tbl.get::<_, Option<Table>>("messaging")? {
        Some(table) => MessagingSettings {
            default_location: table
                .get::<_, Option<String>>("defaultLocation")?
                .unwrap_or(defaults.messaging.default_location),
        },
        None => defaults.messaging,
    };

    let mut templates = Vec::new();
    if let Some(table) = config_tbl.get::<_, Option<Table>>("templates")? {
        for pair in table.pairs::<String, Table>() {
            let (id, template_tbl) = pair?;
            let kind = id
                .parse::<TemplateKind>()
                .map_err(|_| ConfigError::UnknownTemplate(id.clone(), display_path.clone()))?;
            templates.push(TemplateOverride {
                kind,
                subject: template_tbl.get::<_, Option<String>>("subject")?,
                body: template_tbl.get::<_, Option<String>>("body")?,
            });
        }
    }
    templates.sort_by_key(|o| o.kind);

    let config = Config {
        settings,
        negotiation,
        gemini,
        messaging,
        templates,
    };

    config
        .templates
        .iter()
        .try_fold(TemplateSet::builtin(), |set, o| {
            set.with_override(o.kind, o.subject.clone(), o.body.clone())
                .map_err(|e| {
                    ConfigError::InvalidTemplate(
                        o.kind.id().to_owned(),
                        display_path.clone(),
                        e.to_string(),
                    )
                })
        })?;

    Ok(config)
}
