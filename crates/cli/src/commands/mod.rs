pub mod config;
pub mod migrate;
pub mod resolve;
pub mod run;
pub mod schedules;
pub mod tick;
pub mod tools;

use std::future::Future;

use serde::Serialize;
use serde_json::Value;
use switchyard_agent::{bootstrap, Application, BootstrapError, RuntimeError};
use switchyard_core::config::LoadOptions;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub(crate) fn from_bootstrap_error(command: &str, error: &BootstrapError) -> Self {
        match error {
            BootstrapError::Config(error) => Self::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            ),
            BootstrapError::DatabaseConnect(_) => {
                Self::failure(command, "db_connectivity", error.to_string(), 4)
            }
            BootstrapError::Migration(_) => {
                Self::failure(command, "migration", error.to_string(), 5)
            }
            BootstrapError::Registry(_) => {
                Self::failure(command, "runtime_init", error.to_string(), 3)
            }
        }
    }

    pub(crate) fn from_runtime_error(command: &str, error: &RuntimeError) -> Self {
        let exit_code = match error {
            RuntimeError::Repository(_) if error.error_class() == "database" => 4,
            _ => 6,
        };
        Self::failure(command, error.error_class(), error.to_string(), exit_code)
    }
}

/// Boots the application on a single-threaded runtime and hands it to `body`.
/// The pool is closed once `body` finishes.
pub(crate) fn with_application<F, Fut>(
    command: &str,
    options: &LoadOptions,
    body: F,
) -> CommandResult
where
    F: FnOnce(Application) -> Fut,
    Fut: Future<Output = CommandResult>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async {
        let app = match bootstrap(options.clone()).await {
            Ok(app) => app,
            Err(error) => return CommandResult::from_bootstrap_error(command, &error),
        };
        let pool = app.db_pool.clone();
        let result = body(app).await;
        pool.close().await;
        result
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn to_data<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}
