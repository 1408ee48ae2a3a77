use std::sync::Arc;

use axum::Router;
use outpass_core::config::{AppConfig, ConfigError, LoadOptions};
use outpass_core::scheduler::JobScheduler;
use outpass_db::{connect_with_config, migrations, DbPool, SqlAuditLog, SqlStore};
use thiserror::Error;
use tracing::info;

use crate::state::AppState;
use crate::{api, health};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
    pub scheduler: JobScheduler,
}

impl Application {
    pub fn router(&self) -> Router {
        Router::new()
            .merge(health::router(self.db_pool.clone(), self.state.notifier.bus().clone()))
            .merge(api::router(self.state.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let store = Arc::new(SqlStore::new(db_pool.clone()));
    let audit = Arc::new(SqlAuditLog::new(db_pool.clone()));
    let state = AppState::new(&config, store.clone(), audit);
    let scheduler = state.scheduler(store);

    Ok(Application { config, db_pool, state, scheduler })
}
