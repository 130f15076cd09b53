use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use switchyard_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::CommandResult;

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    CommandResult { exit_code: 0, output: render(&config, options.config_path.as_deref()) }
}

pub fn render(config: &AppConfig, explicit_path: Option<&Path>) -> String {
    let config_file_path = detect_config_path(explicit_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields: [(&str, String, &[&str]); 9] = [
        ("database.url", config.database.url.clone(), &["SWITCHYARD_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["SWITCHYARD_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["SWITCHYARD_DATABASE_TIMEOUT_SECS"],
        ),
        (
            "scheduler.enabled",
            config.scheduler.enabled.to_string(),
            &["SWITCHYARD_SCHEDULER_ENABLED"],
        ),
        (
            "scheduler.tick_interval_secs",
            config.scheduler.tick_interval_secs.to_string(),
            &["SWITCHYARD_SCHEDULER_TICK_INTERVAL_SECS"],
        ),
        (
            "scheduler.max_fires_per_tick",
            config.scheduler.max_fires_per_tick.to_string(),
            &["SWITCHYARD_SCHEDULER_MAX_FIRES_PER_TICK"],
        ),
        (
            "tools.expense_confirmation",
            config.tools.expense_confirmation.to_string(),
            &["SWITCHYARD_TOOLS_EXPENSE_CONFIRMATION"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["SWITCHYARD_LOGGING_LEVEL", "SWITCHYARD_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["SWITCHYARD_LOGGING_FORMAT", "SWITCHYARD_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in fields {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }
    lines.join("\n")
}

fn detect_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("switchyard.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/switchyard.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
