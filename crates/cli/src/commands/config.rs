use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use frontdesk_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let secret = |present: bool| if present { "<redacted>" } else { "<unset>" }.to_string();
    let entries: Vec<(&str, String, Option<&str>)> = vec![
        ("database.url", config.database.url.clone(), Some("FRONTDESK_DATABASE_URL")),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            Some("FRONTDESK_DATABASE_MAX_CONNECTIONS"),
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            Some("FRONTDESK_DATABASE_TIMEOUT_SECS"),
        ),
        ("server.host", config.server.host.clone(), Some("FRONTDESK_SERVER_HOST")),
        ("server.port", config.server.port.to_string(), Some("FRONTDESK_SERVER_PORT")),
        ("server.ops_key", secret(config.server.ops_key.is_some()), Some("FRONTDESK_OPS_KEY")),
        ("model.base_url", config.model.base_url.clone(), Some("FRONTDESK_MODEL_BASE_URL")),
        ("model.api_key", secret(config.model.api_key.is_some()), Some("FRONTDESK_MODEL_API_KEY")),
        (
            "model.poll_interval_secs",
            config.model.poll_interval_secs.to_string(),
            Some("FRONTDESK_MODEL_POLL_INTERVAL_SECS"),
        ),
        (
            "model.max_attempts",
            config.model.max_attempts.to_string(),
            Some("FRONTDESK_MODEL_MAX_ATTEMPTS"),
        ),
        (
            "model.retry_backoff_secs",
            config.model.retry_backoff_secs.to_string(),
            Some("FRONTDESK_MODEL_RETRY_BACKOFF_SECS"),
        ),
        (
            "model.active_run_wait_secs",
            config.model.active_run_wait_secs.to_string(),
            Some("FRONTDESK_MODEL_ACTIVE_RUN_WAIT_SECS"),
        ),
        (
            "scheduler.enabled",
            config.scheduler.enabled.to_string(),
            Some("FRONTDESK_SCHEDULER_ENABLED"),
        ),
        (
            "scheduler.recall_interval_minutes",
            config.scheduler.recall_interval_minutes.to_string(),
            Some("FRONTDESK_SCHEDULER_RECALL_INTERVAL_MINUTES"),
        ),
        ("logging.level", config.logging.level.clone(), Some("FRONTDESK_LOGGING_LEVEL")),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            Some("FRONTDESK_LOGGING_FORMAT"),
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in entries {
        let source =
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {key} = {value} (source: {source})"));
    }
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    if let Some(from_env) = env::var_os("FRONTDESK_CONFIG") {
        let path = PathBuf::from(from_env);
        return path.exists().then_some(path);
    }

    [PathBuf::from("frontdesk.toml"), PathBuf::from("config/frontdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
