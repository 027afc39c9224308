use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found; please check if '{0}' exists.")]
    ConfigFileNotFoundError(String),

    #[error("Required field '{0}' is not found; please set '{0}' in '{1}'.")]
    RequiredFieldNotFound(String, String),

    #[error("'{0}' must return a table, e.g. 'return {{ settings = {{ TZ = \"UTC\" }} }}'; got {1}.")]
    NotATable(String, String),

    #[error("The $HOME environment variable is not set; please set it.")]
    HomeEnvironmentNotFoundError,

    #[error("Lua runtime error: {0}")]
    LuaRuntimeError(String),

    #[error("Invalid value '{1}' for '{0}' in '{2}'.")]
    InvalidValue(String, String, String),

    #[error("Unknown time zone '{0}' in '{1}'; use an IANA name such as 'Europe/London'.")]
    InvalidTimezone(String, String),

    #[error("Unknown template 'templates.{0}' in '{1}'.")]
    UnknownTemplate(String, String),

    #[error("Template 'templates.{0}' in '{1}' is invalid: {2}")]
    InvalidTemplate(String, String, String),

    #[error("Gemini API key is not set; please set 'gemini.apiKey' in config.lua or the GOOGLE_API_KEY environment variable.")]
    MissingApiKey,
}
