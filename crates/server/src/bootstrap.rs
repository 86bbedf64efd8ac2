use std::sync::Arc;

use tablebell_agent::AgentRuntime;
use tablebell_core::config::{AppConfig, ConfigError, LoadOptions};
use tablebell_core::ports::SystemClock;
use tablebell_db::{connect_with_settings, migrations, sql_collaborators, DbPool};
use thiserror::Error;
use tracing::info;

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
    #[error("nlu extractor could not be built: {0:#}")]
    Extractor(anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    config.validate()?;
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        nlu_provider = ?config.nlu.provider,
        database_url = %config.database.url,
        "bootstrapping turn service"
    );

    let db_pool = prepare_database(&config).await?;
    let collaborators =
        sql_collaborators(db_pool.clone(), config.commission.clone(), Arc::new(SystemClock));
    let runtime = AgentRuntime::new(collaborators, &config).map_err(BootstrapError::Extractor)?;

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        extractor = runtime.extractor_name(),
        "turn service ready"
    );
    Ok(Application { config, db_pool, runtime })
}

/// Opens the pool and brings the schema up to date; a half-migrated
/// database never reaches the turn handler.
async fn prepare_database(config: &AppConfig) -> Result<DbPool, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;

    let pending = migrations::pending_versions(&db_pool)
        .await
        .map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.database_ready",
        correlation_id = "bootstrap",
        applied_migrations = pending.len(),
        "database connected and migrated"
    );
    Ok(db_pool)
}

#[cfg(test)]
mod tests {
    use tablebell_core::config::{ConfigOverrides, LoadOptions, NluProvider};

    use crate::bootstrap::bootstrap;

    fn options(overrides: ConfigOverrides) -> LoadOptions {
        LoadOptions { overrides, ..LoadOptions::default() }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_when_http_nlu_has_no_endpoint() {
        let result = bootstrap(options(ConfigOverrides {
            database_url: Some("sqlite::memory:".to_string()),
            nlu_provider: Some(NluProvider::Http),
            ..ConfigOverrides::default()
        }))
        .await;

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("nlu.base_url"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_builds_the_rule_based_runtime() {
        let app = bootstrap(options(ConfigOverrides {
            database_url: Some("sqlite::memory:".to_string()),
            ..ConfigOverrides::default()
        }))
        .await
        .expect("bootstrap should succeed with defaults");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('restaurant', 'booking', 'food_order', 'audit_event')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema available after bootstrap");
        assert_eq!(table_count, 4);
        assert_eq!(app.runtime.extractor_name(), "rule_based");

        app.db_pool.close().await;
    }
}
