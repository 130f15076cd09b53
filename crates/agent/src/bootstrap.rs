use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use switchyard_core::config::{AppConfig, ConfigError, LoadOptions};
use switchyard_core::{Orchestrator, RegistryError, SystemClock};
use switchyard_db::{connect_with_settings, migrations, DbPool, SqlConversationStateRepository};

use crate::audit::TracingAuditSink;
use crate::runtime::AgentRuntime;
use crate::tools::builtin_registry;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("tool registration failed: {0}")]
    Registry(#[from] RegistryError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting runtime bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let registry = builtin_registry(&config.tools)?;
    let tool_count = registry.len();
    let orchestrator =
        Orchestrator::with_config(Arc::new(registry), config.scheduler.scheduler_config())
            .with_audit_sink(Arc::new(TracingAuditSink));
    let runtime = AgentRuntime::new(
        orchestrator,
        Arc::new(SqlConversationStateRepository::new(db_pool.clone())),
        Arc::new(SystemClock),
    );
    info!(
        event_name = "system.bootstrap.tools_registered",
        correlation_id = "bootstrap",
        tool_count,
        expense_confirmation = config.tools.expense_confirmation,
        "built-in tools registered"
    );

    Ok(Application { config, db_pool, runtime })
}
