use serde_json::json;
use switchyard_core::config::{AppConfig, LoadOptions};
use switchyard_db::connect_with_settings;
use switchyard_db::migrations::{self, MIGRATOR};

use crate::commands::CommandResult;

/// Applies every pending migration. Running it twice is a no-op.
pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let database = &config.database;
    let applied = runtime.block_on(async {
        let pool =
            connect_with_settings(&database.url, database.max_connections, database.timeout_secs)
                .await
                .map_err(|error| {
                    CommandResult::failure("migrate", "db_connectivity", error.to_string(), 4)
                })?;
        let outcome = migrations::run_pending(&pool).await;
        pool.close().await;
        outcome.map_err(|error| {
            CommandResult::failure("migrate", "migration", error.to_string(), 5)
        })
    });

    if let Err(failure) = applied {
        return failure;
    }

    let versions: Vec<_> = MIGRATOR
        .iter()
        .filter(|migration| !migration.migration_type.is_down_migration())
        .map(|migration| {
            json!({"version": migration.version, "description": migration.description})
        })
        .collect();
    CommandResult::success_with_data(
        "migrate",
        format!("{} migration(s) current for {}", versions.len(), database.url),
        Some(json!(versions)),
    )
}
