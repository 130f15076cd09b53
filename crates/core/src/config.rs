use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduling::SchedulerConfig;

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerSettings,
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub tick_interval_secs: u64,
    pub max_fires_per_tick: usize,
}

impl SchedulerSettings {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig { max_fires_per_tick: self.max_fires_per_tick }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ToolsConfig {
    /// When true, mutating expense tools require a human decision.
    pub expense_confirmation: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { expense_confirmation: true }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub scheduler_enabled: Option<bool>,
    pub tick_interval_secs: Option<u64>,
    pub expense_confirmation: Option<bool>,
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
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://switchyard.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            scheduler: SchedulerSettings {
                enabled: true,
                tick_interval_secs: 60,
                max_fires_per_tick: 100,
            },
            tools: ToolsConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("switchyard.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(scheduler) = patch.scheduler {
            if let Some(enabled) = scheduler.enabled {
                self.scheduler.enabled = enabled;
            }
            if let Some(tick_interval_secs) = scheduler.tick_interval_secs {
                self.scheduler.tick_interval_secs = tick_interval_secs;
            }
            if let Some(max_fires_per_tick) = scheduler.max_fires_per_tick {
                self.scheduler.max_fires_per_tick = max_fires_per_tick;
            }
        }

        if let Some(tools) = patch.tools {
            if let Some(expense_confirmation) = tools.expense_confirmation {
                self.tools.expense_confirmation = expense_confirmation;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SWITCHYARD_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SWITCHYARD_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("SWITCHYARD_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SWITCHYARD_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SWITCHYARD_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SWITCHYARD_SCHEDULER_ENABLED") {
            self.scheduler.enabled = parse_bool("SWITCHYARD_SCHEDULER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SWITCHYARD_SCHEDULER_TICK_INTERVAL_SECS") {
            self.scheduler.tick_interval_secs =
                parse_u64("SWITCHYARD_SCHEDULER_TICK_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("SWITCHYARD_SCHEDULER_MAX_FIRES_PER_TICK") {
            self.scheduler.max_fires_per_tick =
                parse_usize("SWITCHYARD_SCHEDULER_MAX_FIRES_PER_TICK", &value)?;
        }

        if let Some(value) = read_env("SWITCHYARD_TOOLS_EXPENSE_CONFIRMATION") {
            self.tools.expense_confirmation =
                parse_bool("SWITCHYARD_TOOLS_EXPENSE_CONFIRMATION", &value)?;
        }

        let log_level =
            read_env("SWITCHYARD_LOGGING_LEVEL").or_else(|| read_env("SWITCHYARD_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SWITCHYARD_LOGGING_FORMAT").or_else(|| read_env("SWITCHYARD_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(enabled) = overrides.scheduler_enabled {
            self.scheduler.enabled = enabled;
        }
        if let Some(tick_interval_secs) = overrides.tick_interval_secs {
            self.scheduler.tick_interval_secs = tick_interval_secs;
        }
        if let Some(expense_confirmation) = overrides.expense_confirmation {
            self.tools.expense_confirmation = expense_confirmation;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_scheduler(&self.scheduler)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("switchyard.toml"), PathBuf::from("config/switchyard.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerSettings) -> Result<(), ConfigError> {
    if scheduler.tick_interval_secs == 0 || scheduler.tick_interval_secs > 3600 {
        return Err(ConfigError::Validation(
            "scheduler.tick_interval_secs must be in range 1..=3600".to_string(),
        ));
    }

    if scheduler.max_fires_per_tick == 0 {
        return Err(ConfigError::Validation(
            "scheduler.max_fires_per_tick must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    scheduler: Option<SchedulerPatch>,
    tools: Option<ToolsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerPatch {
    enabled: Option<bool>,
    tick_interval_secs: Option<u64>,
    max_fires_per_tick: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolsPatch {
    expense_confirmation: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
