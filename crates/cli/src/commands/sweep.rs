use std::sync::Arc;

use chrono::Utc;
use outpass_core::notifier::Notifier;
use outpass_core::realtime::EventBus;
use outpass_core::scheduler::JobScheduler;
use outpass_core::token::TokenService;
use outpass_db::{connect_with_config, migrations, SqlStore};
use serde_json::json;

use crate::commands::{prepare, CommandResult};

/// One maintenance pass against the configured database. Deletions are
/// broadcast on a local bus with no subscribers; connected clients of a
/// running server are not notified.
pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("sweep") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let store = Arc::new(SqlStore::new(pool.clone()));
        let scheduler = JobScheduler::new(
            store.clone(),
            TokenService::new(store, config.credential.ttl_secs),
            Notifier::new(EventBus::new(config.realtime.channel_capacity)),
        );
        let report = scheduler
            .tick(Utc::now())
            .await
            .map_err(|error| ("maintenance", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(report)
    });

    match result {
        Ok(report) => CommandResult::success_with(
            "sweep",
            "maintenance pass completed",
            json!({
                "credentials_purged": report.credentials_purged,
                "jobs_run": report.jobs_run,
                "requests_deleted": report.requests_deleted,
            }),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sweep", error_class, message, exit_code)
        }
    }
}
