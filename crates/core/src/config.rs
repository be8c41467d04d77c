//! Runtime settings for bogbot.
//!
//! Settings are addressed by dotted keys (`slack.bot_token`) and layered in a
//! fixed order: built-in defaults, the first `bogbot.toml` found, `BOGBOT_*`
//! environment variables, then [`ConfigOverrides`]. Every layer goes through the
//! same key assignment, so a key accepted in one place is accepted in all of them.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use toml::{Table, Value};

pub const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";

/// Searched in order when no explicit path is given.
pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["bogbot.toml", "config/bogbot.toml"];

/// Every settable key, in the order `bogbot-cli config` prints them.
pub const SETTING_KEYS: [&str; 11] = [
    "database.url",
    "database.max_connections",
    "database.timeout_secs",
    "slack.app_token",
    "slack.bot_token",
    "slack.api_base_url",
    "server.bind_address",
    "server.health_check_port",
    "server.graceful_shutdown_secs",
    "logging.level",
    "logging.format",
];

/// Short environment names read when the canonical one is unset.
const ENV_ALIASES: [(&str, &str); 2] =
    [("logging.level", "BOGBOT_LOG_LEVEL"), ("logging.format", "BOGBOT_LOG_FORMAT")];

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Socket Mode needs both tokens: the app-level token opens the socket and the
/// bot token posts replies and reads channel membership.
#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [Self::Compact, Self::Pretty, Self::Json]
            .into_iter()
            .find(|format| value.trim().eq_ignore_ascii_case(format.as_str()))
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "unsupported log format `{}` (expected compact|pretty|json)",
                    value.trim()
                ))
            })
    }
}

/// Values supplied by the caller, applied after every other layer.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_api_base_url: Option<String>,
}

impl ConfigOverrides {
    fn into_entries(self) -> impl Iterator<Item = (&'static str, String)> {
        [
            ("database.url", self.database_url),
            ("logging.level", self.log_level),
            ("slack.app_token", self.slack_app_token),
            ("slack.bot_token", self.slack_bot_token),
            ("slack.api_base_url", self.slack_api_base_url),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("config file references unset environment variable `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("config file has an unterminated `${{...}}` reference")]
    UnterminatedInterpolation,
    #[error("{origin} sets unknown key `{key}`")]
    UnknownKey { origin: String, key: String },
    #[error("{origin} sets `{key}` to `{value}`, which is not a valid value")]
    InvalidValue { origin: String, key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Why a single assignment was refused.
enum Rejected {
    UnknownKey,
    BadValue,
}

impl Rejected {
    fn at(self, origin: impl Into<String>, key: &str, value: &str) -> ConfigError {
        let (origin, key) = (origin.into(), key.to_owned());
        match self {
            Self::UnknownKey => ConfigError::UnknownKey { origin, key },
            Self::BadValue => ConfigError::InvalidValue { origin, key, value: value.to_owned() },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://bogbot.db".to_owned(),
                max_connections: 5,
                timeout_secs: 30,
            },
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                api_base_url: DEFAULT_SLACK_API_BASE_URL.to_owned(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_owned(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_owned(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match locate_config_file(options.config_path.as_deref()) {
            Some(path) => config.apply_file(&path)?,
            None if options.require_file => {
                let expected =
                    options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        config.apply_env()?;
        for (key, value) in options.overrides.into_entries() {
            config.assign(key, &value).map_err(|rejected| rejected.at("override", key, &value))?;
        }

        config.validate()?;
        Ok(config)
    }

    fn assign(&mut self, key: &str, value: &str) -> Result<(), Rejected> {
        match key {
            "database.url" => self.database.url = value.to_owned(),
            "database.max_connections" => self.database.max_connections = number(value)?,
            "database.timeout_secs" => self.database.timeout_secs = number(value)?,
            "slack.app_token" => self.slack.app_token = value.to_owned().into(),
            "slack.bot_token" => self.slack.bot_token = value.to_owned().into(),
            "slack.api_base_url" => self.slack.api_base_url = value.to_owned(),
            "server.bind_address" => self.server.bind_address = value.to_owned(),
            "server.health_check_port" => self.server.health_check_port = number(value)?,
            "server.graceful_shutdown_secs" => self.server.graceful_shutdown_secs = number(value)?,
            "logging.level" => self.logging.level = value.trim().to_owned(),
            "logging.format" => {
                self.logging.format = value.parse().map_err(|_| Rejected::BadValue)?;
            }
            _ => return Err(Rejected::UnknownKey),
        }
        Ok(())
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
        let table = raw
            .parse::<Table>()
            .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })?;

        let origin = format!("config file `{}`", path.display());
        for (key, value) in flatten(table) {
            let value = match value {
                Value::String(text) => interpolate(&text)?,
                other => other.to_string(),
            };
            self.assign(&key, &value).map_err(|rejected| rejected.at(&origin, &key, &value))?;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        for key in SETTING_KEYS {
            let alias = ENV_ALIASES.iter().find(|(aliased, _)| *aliased == key).map(|(_, name)| *name);
            let found = std::iter::once(env_key(key))
                .chain(alias.map(str::to_owned))
                .find_map(|name| read_env(&name).map(|value| (name, value)));

            if let Some((name, value)) = found {
                self.assign(key, &value)
                    .map_err(|rejected| rejected.at(format!("environment variable {name}"), key, &value))?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.database.url.trim();
        require(
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:",
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
        )?;
        require(self.database.max_connections > 0, "database.max_connections must be greater than zero")?;
        require(
            (1..=300).contains(&self.database.timeout_secs),
            "database.timeout_secs must be in range 1..=300",
        )?;

        check_token(
            "slack.app_token",
            self.slack.app_token.expose_secret(),
            ("xapp-", "Basic Information > App-Level Tokens"),
            "xoxb-",
        )?;
        check_token(
            "slack.bot_token",
            self.slack.bot_token.expose_secret(),
            ("xoxb-", "OAuth & Permissions > Bot User OAuth Token"),
            "xapp-",
        )?;
        let api = self.slack.api_base_url.trim();
        require(
            api.starts_with("http://") || api.starts_with("https://"),
            "slack.api_base_url must start with http:// or https://",
        )?;

        require(self.server.health_check_port > 0, "server.health_check_port must be greater than zero")?;
        require(
            self.server.graceful_shutdown_secs > 0,
            "server.graceful_shutdown_secs must be greater than zero",
        )?;
        require(
            LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()),
            "logging.level must be one of trace|debug|info|warn|error",
        )
    }
}

/// `database.url` -> `BOGBOT_DATABASE_URL`.
pub fn env_key(key: &str) -> String {
    format!("BOGBOT_{}", key.replace('.', "_").to_ascii_uppercase())
}

/// The file `load` would read: the explicit path if it exists, otherwise the
/// first existing candidate.
pub fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => CONFIG_FILE_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists()),
    }
}

/// `[section] field = v` becomes `("section.field", v)`. Top-level scalars keep
/// their bare name and are rejected later as unknown keys.
fn flatten(table: Table) -> Vec<(String, Value)> {
    let mut entries = Vec::new();
    for (section, value) in table {
        match value {
            Value::Table(fields) => entries.extend(
                fields.into_iter().map(|(field, value)| (format!("{section}.{field}"), value)),
            ),
            other => entries.push((section, other)),
        }
    }
    entries
}

/// Replaces each `${VAR}` with the value of that environment variable.
fn interpolate(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let reference = &rest[start + 2..];
        let end = reference.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &reference[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_owned() })?;
        output.push_str(&value);
        rest = &reference[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn number<T: FromStr>(value: &str) -> Result<T, Rejected> {
    value.trim().parse().map_err(|_| Rejected::BadValue)
}

fn read_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn require(holds: bool, message: &str) -> Result<(), ConfigError> {
    if holds {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.to_owned()))
    }
}

/// Tokens must be present and carry their own prefix. Pasting the other
/// token is the usual mistake, so it gets named.
fn check_token(
    key: &str,
    token: &str,
    (prefix, console_path): (&str, &str),
    other_prefix: &str,
) -> Result<(), ConfigError> {
    if token.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{key} is required. Find it at https://api.slack.com/apps > Your App > {console_path}"
        )));
    }
    if token.starts_with(prefix) {
        return Ok(());
    }

    let hint = if token.starts_with(other_prefix) {
        format!(" (hint: that is a `{other_prefix}` token, the two are easy to swap)")
    } else {
        String::new()
    };
    Err(ConfigError::Validation(format!("{key} must start with `{prefix}`{hint}")))
}
