use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub ops_key: Option<SecretString>,
}

/// Model backend (OpenAI-style assistants API) settings. The retry knobs
/// default to the values the conversation driver is specified against:
/// 5 attempts, 10s backoff, 15s wait when a run is already active.
#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub poll_interval_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_secs: u64,
    pub active_run_wait_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub recall_interval_minutes: u64,
}

#[derive(Clone, Debug)]
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
    pub model_base_url: Option<String>,
    pub model_api_key: Option<String>,
    pub scheduler_enabled: Option<bool>,
    pub ops_key: Option<String>,
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
                url: "sqlite://frontdesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig { host: "127.0.0.1".to_string(), port: 8080, ops_key: None },
            model: ModelConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
                poll_interval_secs: 2,
                max_attempts: 5,
                retry_backoff_secs: 10,
                active_run_wait_secs: 15,
            },
            scheduler: SchedulerConfig { enabled: true, recall_interval_minutes: 5 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("frontdesk.toml"));
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

        if let Some(server) = patch.server {
            if let Some(host) = server.host {
                self.server.host = host;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(ops_key) = server.ops_key {
                self.server.ops_key = Some(secret_value(ops_key));
            }
        }

        if let Some(model) = patch.model {
            if let Some(base_url) = model.base_url {
                self.model.base_url = base_url;
            }
            if let Some(api_key) = model.api_key {
                self.model.api_key = Some(secret_value(api_key));
            }
            if let Some(poll_interval_secs) = model.poll_interval_secs {
                self.model.poll_interval_secs = poll_interval_secs;
            }
            if let Some(max_attempts) = model.max_attempts {
                self.model.max_attempts = max_attempts;
            }
            if let Some(retry_backoff_secs) = model.retry_backoff_secs {
                self.model.retry_backoff_secs = retry_backoff_secs;
            }
            if let Some(active_run_wait_secs) = model.active_run_wait_secs {
                self.model.active_run_wait_secs = active_run_wait_secs;
            }
        }

        if let Some(scheduler) = patch.scheduler {
            if let Some(enabled) = scheduler.enabled {
                self.scheduler.enabled = enabled;
            }
            if let Some(recall_interval_minutes) = scheduler.recall_interval_minutes {
                self.scheduler.recall_interval_minutes = recall_interval_minutes;
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
        if let Some(value) = read_env("FRONTDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("FRONTDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("FRONTDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("FRONTDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("FRONTDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FRONTDESK_SERVER_HOST") {
            self.server.host = value;
        }
        if let Some(value) = read_env("FRONTDESK_SERVER_PORT") {
            self.server.port = parse_u16("FRONTDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("FRONTDESK_OPS_KEY") {
            self.server.ops_key = Some(secret_value(value));
        }

        if let Some(value) = read_env("FRONTDESK_MODEL_BASE_URL") {
            self.model.base_url = value;
        }
        if let Some(value) = read_env("FRONTDESK_MODEL_API_KEY") {
            self.model.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("FRONTDESK_MODEL_POLL_INTERVAL_SECS") {
            self.model.poll_interval_secs =
                parse_u64("FRONTDESK_MODEL_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("FRONTDESK_MODEL_MAX_ATTEMPTS") {
            self.model.max_attempts = parse_u32("FRONTDESK_MODEL_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("FRONTDESK_MODEL_RETRY_BACKOFF_SECS") {
            self.model.retry_backoff_secs =
                parse_u64("FRONTDESK_MODEL_RETRY_BACKOFF_SECS", &value)?;
        }
        if let Some(value) = read_env("FRONTDESK_MODEL_ACTIVE_RUN_WAIT_SECS") {
            self.model.active_run_wait_secs =
                parse_u64("FRONTDESK_MODEL_ACTIVE_RUN_WAIT_SECS", &value)?;
        }

        if let Some(value) = read_env("FRONTDESK_SCHEDULER_ENABLED") {
            self.scheduler.enabled = parse_bool("FRONTDESK_SCHEDULER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("FRONTDESK_SCHEDULER_RECALL_INTERVAL_MINUTES") {
            self.scheduler.recall_interval_minutes =
                parse_u64("FRONTDESK_SCHEDULER_RECALL_INTERVAL_MINUTES", &value)?;
        }

        let log_level =
            read_env("FRONTDESK_LOGGING_LEVEL").or_else(|| read_env("FRONTDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FRONTDESK_LOGGING_FORMAT").or_else(|| read_env("FRONTDESK_LOG_FORMAT"));
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
        if let Some(model_base_url) = overrides.model_base_url {
            self.model.base_url = model_base_url;
        }
        if let Some(model_api_key) = overrides.model_api_key {
            self.model.api_key = Some(secret_value(model_api_key));
        }
        if let Some(scheduler_enabled) = overrides.scheduler_enabled {
            self.scheduler.enabled = scheduler_enabled;
        }
        if let Some(ops_key) = overrides.ops_key {
            self.server.ops_key = Some(secret_value(ops_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_model(&self.model)?;
        validate_scheduler(&self.scheduler)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    if let Some(from_env) = read_env("FRONTDESK_CONFIG") {
        let path = PathBuf::from(from_env);
        return path.exists().then_some(path);
    }

    [PathBuf::from("frontdesk.toml"), PathBuf::from("config/frontdesk.toml")]
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

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.host.trim().is_empty() {
        return Err(ConfigError::Validation("server.host must not be empty".to_string()));
    }
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    if let Some(ops_key) = &server.ops_key {
        if ops_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.ops_key must not be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_model(model: &ModelConfig) -> Result<(), ConfigError> {
    if !model.base_url.starts_with("http://") && !model.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "model.base_url must start with http:// or https://".to_string(),
        ));
    }
    if model.poll_interval_secs == 0 || model.poll_interval_secs > 60 {
        return Err(ConfigError::Validation(
            "model.poll_interval_secs must be in range 1..=60".to_string(),
        ));
    }
    if model.max_attempts == 0 || model.max_attempts > 20 {
        return Err(ConfigError::Validation(
            "model.max_attempts must be in range 1..=20".to_string(),
        ));
    }

    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerConfig) -> Result<(), ConfigError> {
    if scheduler.recall_interval_minutes == 0 {
        return Err(ConfigError::Validation(
            "scheduler.recall_interval_minutes must be greater than zero".to_string(),
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    model: Option<ModelPatch>,
    scheduler: Option<SchedulerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    host: Option<String>,
    port: Option<u16>,
    ops_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    poll_interval_secs: Option<u64>,
    max_attempts: Option<u32>,
    retry_backoff_secs: Option<u64>,
    active_run_wait_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerPatch {
    enabled: Option<bool>,
    recall_interval_minutes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
