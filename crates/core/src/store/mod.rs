use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::credential::Credential;
use crate::domain::job::{JobId, ScheduledJob};
use crate::domain::principal::{PrincipalId, Role};
use crate::domain::request::{ApprovalStep, Request, RequestId, RequestStatus, StepStatus};

pub mod memory;

pub use memory::InMemoryStore;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("duplicate record: {0}")]
    Duplicate(String),
}

/// Server-side listing filter. `None` fields do not constrain the result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub requester: Option<PrincipalId>,
    pub branch: Option<String>,
    pub section: Option<String>,
    pub status: Option<RequestStatus>,
    /// Only requests whose chain still has a pending step for this role.
    pub pending_role: Option<Role>,
}

impl RequestFilter {
    pub fn matches(&self, request: &Request) -> bool {
        self.requester.as_ref().map_or(true, |id| &request.requester_id == id)
            && self.branch.as_ref().map_or(true, |branch| &request.branch == branch)
            && self.section.as_ref().map_or(true, |section| &request.section == section)
            && self.status.map_or(true, |status| request.status == status)
            && self.pending_role.map_or(true, |role| request.pending_step_for(role).is_some())
    }
}

/// Compare-and-set command for one chain position. The store applies it only
/// if the step at `step_index` still has role `step.role` and status
/// `expected_step_status` and the request still has `expected_request_status`;
/// the step, the request status and the optional credential commit together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepTransition {
    pub request_id: RequestId,
    pub step_index: usize,
    pub expected_step_status: StepStatus,
    pub expected_request_status: RequestStatus,
    pub step: ApprovalStep,
    pub request_status: RequestStatus,
    pub credential: Option<Credential>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait OutpassStore: Send + Sync {
    async fn create_request(&self, request: Request) -> Result<(), StoreError>;

    async fn get_request_by_id(&self, id: &RequestId) -> Result<Option<Request>, StoreError>;

    /// Newest first.
    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<Request>, StoreError>;

    /// Returns the updated request, or `None` when the guard no longer holds
    /// (or the request is gone). Nothing is written in the `None` case.
    async fn conditional_update_step(
        &self,
        transition: StepTransition,
    ) -> Result<Option<Request>, StoreError>;

    /// Compare-and-set on the request status alone.
    async fn set_request_status(
        &self,
        id: &RequestId,
        expected: RequestStatus,
        status: RequestStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Request>, StoreError>;

    /// Deleting an unknown id is not an error; returns whether a row went away.
    async fn delete_request(&self, id: &RequestId) -> Result<bool, StoreError>;

    async fn find_credential_by_secret(
        &self,
        secret: &str,
    ) -> Result<Option<Credential>, StoreError>;

    async fn find_credential_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<Credential>, StoreError>;

    async fn delete_expired_credentials(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Returns `false` when a job for the same `(kind, target)` already exists.
    async fn schedule_job(&self, job: ScheduledJob) -> Result<bool, StoreError>;

    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, StoreError>;

    async fn complete_job(&self, id: &JobId, completed_at: DateTime<Utc>)
        -> Result<(), StoreError>;
}
