use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use serde_json::{json, Map, Value};
use switchyard_cli::commands::{config, migrate, resolve, schedules, tick, tools};
use switchyard_core::config::{AppConfig, LoadOptions};
use switchyard_core::{ConversationId, Decision, ToolCallRequest};

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("SWITCHYARD_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("SWITCHYARD_DATABASE_URL", "postgres://localhost/switchyard")], || {
        let result = migrate::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_attributes_env_overrides() {
    with_env(
        &[
            ("SWITCHYARD_DATABASE_URL", "sqlite::memory:"),
            ("SWITCHYARD_LOG_LEVEL", "debug"),
        ],
        || {
            let result = config::run(&LoadOptions::default());
            assert_eq!(result.exit_code, 0);
            let url_line =
                "- database.url = sqlite::memory: (source: env (SWITCHYARD_DATABASE_URL))";
            assert!(result.output.contains(url_line));
            assert!(result
                .output
                .contains("- logging.level = debug (source: env (SWITCHYARD_LOG_LEVEL))"));
            assert!(result.output.contains("- scheduler.tick_interval_secs = 60 (source: default)"));
        },
    );
}

#[test]
fn tools_lists_the_builtin_catalogue() {
    with_env(&[("SWITCHYARD_DATABASE_URL", "sqlite::memory:")], || {
        let result = tools::run(&LoadOptions::default());
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let names: Vec<&str> = payload["data"]
            .as_array()
            .map(|tools| tools.iter().filter_map(|tool| tool["name"].as_str()).collect())
            .unwrap_or_default();
        assert!(names.contains(&"create_expense"));
        assert!(names.contains(&"schedule_task"));
        assert_eq!(payload["message"], format!("{} tool(s) registered", names.len()));
    });
}

#[test]
fn resolve_reports_not_found_for_unknown_conversation() {
    with_env(&[("SWITCHYARD_DATABASE_URL", "sqlite::memory:")], || {
        let result =
            resolve::run(&LoadOptions::default(), "conv-missing", "call-1", Decision::Approve);
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "resolve");
        assert_eq!(payload["error_class"], "not_found");
    });
}

#[test]
fn pending_then_resolve_against_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir.path().join("switchyard.db"));

    seed_conversation(&url, "conv-cli", |calls| {
        calls.push(ToolCallRequest::new(
            "call-expense",
            "create_expense",
            object(json!({"description": "Team lunch", "amount": 48.2})),
            1,
        ));
    });

    with_env(&[("SWITCHYARD_DATABASE_URL", url.as_str())], || {
        let pending = resolve::pending(&LoadOptions::default(), "conv-cli");
        assert_eq!(pending.exit_code, 0);
        let payload = parse_payload(&pending.output);
        assert_eq!(payload["data"][0]["callId"], "call-expense");
        assert_eq!(payload["data"][0]["toolName"], "create_expense");

        let resolved =
            resolve::run(&LoadOptions::default(), "conv-cli", "call-expense", Decision::Approve);
        assert_eq!(resolved.exit_code, 0, "{}", resolved.output);
        let payload = parse_payload(&resolved.output);
        assert_eq!(payload["data"]["status"], "completed");

        let again =
            resolve::run(&LoadOptions::default(), "conv-cli", "call-expense", Decision::Reject);
        assert_eq!(again.exit_code, 0, "a repeated decision returns the recorded outcome");
        assert_eq!(parse_payload(&again.output)["data"]["status"], "completed");

        let drained = resolve::pending(&LoadOptions::default(), "conv-cli");
        assert_eq!(parse_payload(&drained.output)["data"], json!([]));
    });
}

#[test]
fn schedules_tick_and_cancel_against_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir.path().join("switchyard.db"));

    seed_conversation(&url, "conv-sched", |calls| {
        calls.push(ToolCallRequest::new(
            "call-delay",
            "schedule_task",
            object(json!({
                "kind": "delayed",
                "delaySeconds": 1,
                "toolName": "remember",
                "arguments": {"key": "ping", "value": "pong"}
            })),
            1,
        ));
        calls.push(ToolCallRequest::new(
            "call-cron",
            "schedule_task",
            object(json!({
                "kind": "cron",
                "cronExpression": "0 9 * * *",
                "toolName": "echo",
                "arguments": {"text": "morning"}
            })),
            1,
        ));
    });

    with_env(&[("SWITCHYARD_DATABASE_URL", url.as_str())], || {
        let listed = schedules::list(&LoadOptions::default(), "conv-sched");
        assert_eq!(listed.exit_code, 0);
        let payload = parse_payload(&listed.output);
        let entries = payload["data"].as_array().cloned().unwrap_or_default();
        assert_eq!(entries.len(), 2);
        let cron_id = entries
            .iter()
            .find(|entry| entry["kind"] == "cron")
            .and_then(|entry| entry["scheduleId"].as_str())
            .expect("cron entry present")
            .to_string();

        let far_future = chrono::Utc::now() + chrono::Duration::hours(1);
        let ticked = tick::run(&LoadOptions::default(), Some(far_future));
        assert_eq!(ticked.exit_code, 0, "{}", ticked.output);
        let payload = parse_payload(&ticked.output);
        assert!(payload["data"]["fired"].as_u64().unwrap_or_default() >= 1);
        assert_eq!(payload["data"]["failed"], 0);

        let cancelled = schedules::cancel(&LoadOptions::default(), "conv-sched", &cron_id);
        assert_eq!(cancelled.exit_code, 0, "{}", cancelled.output);

        let missing = schedules::cancel(&LoadOptions::default(), "conv-sched", &cron_id);
        assert_eq!(missing.exit_code, 6);
        assert_eq!(parse_payload(&missing.output)["error_class"], "not_found");

        let remaining = schedules::list(&LoadOptions::default(), "conv-sched");
        assert_eq!(parse_payload(&remaining.output)["data"], json!([]));
    });
}

fn seed_conversation(
    url: &str,
    conversation: &str,
    build: impl FnOnce(&mut Vec<ToolCallRequest>),
) {
    let mut calls = Vec::new();
    build(&mut calls);

    let mut config = AppConfig::default();
    config.database.url = url.to_string();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime should build");
    runtime.block_on(async {
        let app = switchyard_agent::bootstrap_with_config(config).await.expect("bootstrap");
        app.runtime
            .dispatch(&ConversationId::from(conversation), calls)
            .await
            .expect("seed dispatch");
        app.db_pool.close().await;
    });
}

fn database_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SWITCHYARD_DATABASE_URL",
        "SWITCHYARD_DATABASE_MAX_CONNECTIONS",
        "SWITCHYARD_DATABASE_TIMEOUT_SECS",
        "SWITCHYARD_SCHEDULER_ENABLED",
        "SWITCHYARD_SCHEDULER_TICK_INTERVAL_SECS",
        "SWITCHYARD_SCHEDULER_MAX_FIRES_PER_TICK",
        "SWITCHYARD_TOOLS_EXPENSE_CONFIRMATION",
        "SWITCHYARD_LOGGING_LEVEL",
        "SWITCHYARD_LOGGING_FORMAT",
        "SWITCHYARD_LOG_LEVEL",
        "SWITCHYARD_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
