//! Durable deferred cleanup plus the credential TTL sweep.
//!
//! Jobs live in the store, so a restart picks up whatever was due while the
//! process was down. Running a job twice is harmless: deleting a missing
//! request is a no-op and completion is a plain state write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::job::{JobKind, ScheduledJob};
use crate::errors::ApplicationError;
use crate::notifier::Notifier;
use crate::store::OutpassStore;
use crate::token::TokenService;

/// Jobs claimed per pass.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub credentials_purged: u64,
    pub jobs_run: u32,
    pub requests_deleted: u32,
}

#[derive(Clone)]
pub struct JobScheduler {
    store: Arc<dyn OutpassStore>,
    tokens: TokenService,
    notifier: Notifier,
}

impl JobScheduler {
    pub fn new(store: Arc<dyn OutpassStore>, tokens: TokenService, notifier: Notifier) -> Self {
        Self { store, tokens, notifier }
    }

    /// Executes every job whose `run_at` has passed.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<MaintenanceReport, ApplicationError> {
        let mut report = MaintenanceReport::default();
        for job in self.store.due_jobs(now, DEFAULT_BATCH_SIZE).await? {
            if self.execute(&job).await? {
                report.requests_deleted += 1;
            }
            self.store.complete_job(&job.id, now).await?;
            report.jobs_run += 1;
        }
        Ok(report)
    }

    /// One full maintenance pass: TTL sweep, then due jobs.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<MaintenanceReport, ApplicationError> {
        let credentials_purged = self.tokens.sweep(now).await?;
        let report = MaintenanceReport { credentials_purged, ..self.run_due(now).await? };
        if report.jobs_run > 0 || report.credentials_purged > 0 {
            info!(
                event_name = "maintenance.sweep.completed",
                credentials_purged = report.credentials_purged,
                jobs_run = report.jobs_run,
                requests_deleted = report.requests_deleted,
                "maintenance pass completed"
            );
        }
        Ok(report)
    }

    async fn execute(&self, job: &ScheduledJob) -> Result<bool, ApplicationError> {
        match job.kind {
            JobKind::DeleteRequest => {
                let deleted = self.store.delete_request(&job.target).await?;
                if deleted {
                    self.notifier.request_deleted(&job.target);
                    info!(
                        event_name = "maintenance.request.deleted",
                        request_id = %job.target,
                        job_id = %job.id.0,
                        "finalized request deleted"
                    );
                } else {
                    warn!(
                        event_name = "maintenance.request.already_gone",
                        request_id = %job.target,
                        job_id = %job.id.0,
                        "scheduled deletion found nothing to delete"
                    );
                }
                Ok(deleted)
            }
        }
    }
}
