use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use outpass_core::domain::credential::{Credential, CredentialId};
use outpass_core::domain::job::{JobId, JobKind, JobState, ScheduledJob};
use outpass_core::domain::principal::PrincipalId;
use outpass_core::domain::request::{
    ApprovalStep, LeaveWindow, Request, RequestId, RequestStatus,
};
use outpass_core::store::{OutpassStore, RequestFilter, StepTransition, StoreError};

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id,
    requester_id,
    requester_name,
    reason,
    window_from,
    window_to,
    status,
    branch,
    section,
    approval_chain_json,
    credential_id,
    created_at,
    updated_at";

const CREDENTIAL_COLUMNS: &str = "id, secret, request_id, expires_at, used, created_at";

const JOB_COLUMNS: &str = "id, kind, target, run_at, state, created_at, completed_at";

/// SQLite-backed store. Each compare-and-set is a single guarded `UPDATE`
/// inside a transaction that also carries the credential insert.
#[derive(Clone)]
pub struct SqlStore {
    pool: DbPool,
}

impl SqlStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_request(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM leave_request WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(request_from_row).transpose()
    }

    async fn insert_request(&self, request: &Request) -> Result<(), RepositoryError> {
        let chain = encode_chain(&request.approval_chain)?;
        sqlx::query(
            "INSERT INTO leave_request (
                id,
                requester_id,
                requester_name,
                reason,
                window_from,
                window_to,
                status,
                branch,
                section,
                approval_chain_json,
                credential_id,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.requester_id.0)
        .bind(&request.requester_name)
        .bind(&request.reason)
        .bind(format_timestamp(request.window.from))
        .bind(format_timestamp(request.window.to))
        .bind(request.status.as_str())
        .bind(&request.branch)
        .bind(&request.section)
        .bind(chain)
        .bind(request.credential_id.as_ref().map(|id| id.0.as_str()))
        .bind(format_timestamp(request.created_at))
        .bind(format_timestamp(request.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn select_requests(&self, filter: &RequestFilter) -> Result<Vec<Request>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS}
             FROM leave_request
             WHERE (?1 IS NULL OR requester_id = ?1)
               AND (?2 IS NULL OR branch = ?2)
               AND (?3 IS NULL OR section = ?3)
               AND (?4 IS NULL OR status = ?4)
             ORDER BY created_at DESC, id ASC"
        ))
        .bind(filter.requester.as_ref().map(|id| id.0.as_str()))
        .bind(filter.branch.as_deref())
        .bind(filter.section.as_deref())
        .bind(filter.status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            let request = request_from_row(row)?;
            // pending_role is evaluated over the decoded chain.
            if filter.matches(&request) {
                requests.push(request);
            }
        }
        Ok(requests)
    }

    async fn apply_transition(
        &self,
        transition: StepTransition,
    ) -> Result<Option<Request>, RepositoryError> {
        let step_json = serde_json::to_string(&transition.step).map_err(|error| {
            RepositoryError::Decode(format!("cannot encode approval step: {error}"))
        })?;
        let step_path = format!("$[{}]", transition.step_index);
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE leave_request
             SET approval_chain_json = json_set(approval_chain_json, ?1, json(?2)),
                 status = ?3,
                 updated_at = ?4,
                 credential_id = COALESCE(?5, credential_id)
             WHERE id = ?6
               AND status = ?7
               AND json_extract(approval_chain_json, ?1 || '.role') = ?8
               AND json_extract(approval_chain_json, ?1 || '.status') = ?9",
        )
        .bind(&step_path)
        .bind(step_json)
        .bind(transition.request_status.as_str())
        .bind(format_timestamp(transition.updated_at))
        .bind(transition.credential.as_ref().map(|credential| credential.id.0.as_str()))
        .bind(&transition.request_id.0)
        .bind(transition.expected_request_status.as_str())
        .bind(transition.step.role.as_str())
        .bind(transition.expected_step_status.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        if let Some(credential) = &transition.credential {
            insert_credential(&mut tx, credential).await?;
        }

        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM leave_request WHERE id = ?"))
            .bind(&transition.request_id.0)
            .fetch_one(&mut *tx)
            .await?;
        let request = request_from_row(row)?;
        tx.commit().await?;

        Ok(Some(request))
    }

    async fn update_status(
        &self,
        id: &RequestId,
        expected: RequestStatus,
        status: RequestStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Request>, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE leave_request SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(format_timestamp(updated_at))
        .bind(&id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Ok(None);
        }
        self.fetch_request(id).await
    }

    async fn remove_request(&self, id: &RequestId) -> Result<bool, RepositoryError> {
        let deleted = sqlx::query("DELETE FROM leave_request WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn credential_where(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<Credential>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM qr_credential WHERE {column} = ?
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        row.map(credential_from_row).transpose()
    }

    async fn purge_credentials(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        Ok(sqlx::query("DELETE FROM qr_credential WHERE expires_at <= ?")
            .bind(format_timestamp(now))
            .execute(&self.pool)
            .await?
            .rows_affected())
    }

    async fn insert_job(&self, job: &ScheduledJob) -> Result<bool, RepositoryError> {
        let inserted = sqlx::query(
            "INSERT INTO scheduled_job (id, kind, target, run_at, state, created_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(kind, target) DO NOTHING",
        )
        .bind(&job.id.0)
        .bind(job.kind.as_str())
        .bind(&job.target.0)
        .bind(format_timestamp(job.run_at))
        .bind(job.state.as_str())
        .bind(format_timestamp(job.created_at))
        .bind(job.completed_at.map(format_timestamp))
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }

    async fn select_due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS}
             FROM scheduled_job
             WHERE state = ? AND run_at <= ?
             ORDER BY run_at ASC
             LIMIT ?"
        ))
        .bind(JobState::Scheduled.as_str())
        .bind(format_timestamp(now))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(job_from_row).collect()
    }

    async fn mark_job_completed(
        &self,
        id: &JobId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE scheduled_job SET state = ?, completed_at = ? WHERE id = ?")
            .bind(JobState::Completed.as_str())
            .bind(format_timestamp(completed_at))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OutpassStore for SqlStore {
    async fn create_request(&self, request: Request) -> Result<(), StoreError> {
        Ok(self.insert_request(&request).await?)
    }

    async fn get_request_by_id(&self, id: &RequestId) -> Result<Option<Request>, StoreError> {
        Ok(self.fetch_request(id).await?)
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<Request>, StoreError> {
        Ok(self.select_requests(filter).await?)
    }

    async fn conditional_update_step(
        &self,
        transition: StepTransition,
    ) -> Result<Option<Request>, StoreError> {
        Ok(self.apply_transition(transition).await?)
    }

    async fn set_request_status(
        &self,
        id: &RequestId,
        expected: RequestStatus,
        status: RequestStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Request>, StoreError> {
        Ok(self.update_status(id, expected, status, updated_at).await?)
    }

    async fn delete_request(&self, id: &RequestId) -> Result<bool, StoreError> {
        Ok(self.remove_request(id).await?)
    }

    async fn find_credential_by_secret(
        &self,
        secret: &str,
    ) -> Result<Option<Credential>, StoreError> {
        Ok(self.credential_where("secret", secret).await?)
    }

    async fn find_credential_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<Credential>, StoreError> {
        Ok(self.credential_where("request_id", &request_id.0).await?)
    }

    async fn delete_expired_credentials(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.purge_credentials(now).await?)
    }

    async fn schedule_job(&self, job: ScheduledJob) -> Result<bool, StoreError> {
        Ok(self.insert_job(&job).await?)
    }

    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, StoreError> {
        Ok(self.select_due_jobs(now, limit).await?)
    }

    async fn complete_job(
        &self,
        id: &JobId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Ok(self.mark_job_completed(id, completed_at).await?)
    }
}

async fn insert_credential(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    credential: &Credential,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO qr_credential (id, secret, request_id, expires_at, used, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&credential.id.0)
    .bind(&credential.secret)
    .bind(&credential.request_id.0)
    .bind(format_timestamp(credential.expires_at))
    .bind(credential.used)
    .bind(format_timestamp(credential.created_at))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn encode_chain(chain: &[ApprovalStep]) -> Result<String, RepositoryError> {
    serde_json::to_string(chain)
        .map_err(|error| RepositoryError::Decode(format!("cannot encode approval chain: {error}")))
}

fn request_from_row(row: SqliteRow) -> Result<Request, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_raw}`")))?;

    let chain_raw = row.try_get::<String, _>("approval_chain_json")?;
    let approval_chain: Vec<ApprovalStep> = serde_json::from_str(&chain_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid approval_chain_json `{chain_raw}` ({error})"))
    })?;

    let from = parse_timestamp("window_from", row.try_get("window_from")?)?;
    let to = parse_timestamp("window_to", row.try_get("window_to")?)?;
    let window = LeaveWindow::new(from, to)
        .map_err(|error| RepositoryError::Decode(format!("invalid leave window ({error})")))?;

    Ok(Request {
        id: RequestId(row.try_get("id")?),
        requester_id: PrincipalId(row.try_get("requester_id")?),
        requester_name: row.try_get("requester_name")?,
        reason: row.try_get("reason")?,
        window,
        status,
        branch: row.try_get("branch")?,
        section: row.try_get("section")?,
        approval_chain,
        credential_id: row.try_get::<Option<String>, _>("credential_id")?.map(CredentialId),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn credential_from_row(row: SqliteRow) -> Result<Credential, RepositoryError> {
    Ok(Credential {
        id: CredentialId(row.try_get("id")?),
        secret: row.try_get("secret")?,
        request_id: RequestId(row.try_get("request_id")?),
        expires_at: parse_timestamp("expires_at", row.try_get("expires_at")?)?,
        used: row.try_get("used")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn job_from_row(row: SqliteRow) -> Result<ScheduledJob, RepositoryError> {
    let kind_raw = row.try_get::<String, _>("kind")?;
    let kind = JobKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown job kind `{kind_raw}`")))?;
    let state_raw = row.try_get::<String, _>("state")?;
    let state = JobState::parse(&state_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown job state `{state_raw}`")))?;

    Ok(ScheduledJob {
        id: JobId(row.try_get("id")?),
        kind,
        target: RequestId(row.try_get("target")?),
        run_at: parse_timestamp("run_at", row.try_get("run_at")?)?,
        state,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
    })
}
