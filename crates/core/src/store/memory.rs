use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::credential::Credential;
use crate::domain::job::{JobId, JobState, ScheduledJob};
use crate::domain::request::{Request, RequestId, RequestStatus};

use super::{OutpassStore, RequestFilter, StepTransition, StoreError};

#[derive(Default)]
struct State {
    requests: HashMap<String, Request>,
    credentials: HashMap<String, Credential>,
    jobs: HashMap<String, ScheduledJob>,
}

/// Process-local store. Every compare-and-set runs under one write lock, so
/// the single-document atomicity matches the SQL store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

#[async_trait]
impl OutpassStore for InMemoryStore {
    async fn create_request(&self, request: Request) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.requests.contains_key(&request.id.0) {
            return Err(StoreError::Duplicate(format!("request `{}`", request.id)));
        }
        state.requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn get_request_by_id(&self, id: &RequestId) -> Result<Option<Request>, StoreError> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).cloned())
    }

    async fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<Request>, StoreError> {
        let state = self.state.read().await;
        let mut requests: Vec<Request> =
            state.requests.values().filter(|request| filter.matches(request)).cloned().collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn conditional_update_step(
        &self,
        transition: StepTransition,
    ) -> Result<Option<Request>, StoreError> {
        let mut state = self.state.write().await;
        let State { requests, credentials, .. } = &mut *state;

        let Some(request) = requests.get_mut(&transition.request_id.0) else {
            return Ok(None);
        };
        let guard_holds = request.status == transition.expected_request_status
            && request.approval_chain.get(transition.step_index).is_some_and(|step| {
                step.role == transition.step.role && step.status == transition.expected_step_status
            });
        if !guard_holds {
            return Ok(None);
        }
        if let Some(credential) = &transition.credential {
            if credentials.contains_key(&credential.secret) {
                return Err(StoreError::Duplicate("credential secret".to_string()));
            }
        }

        request.approval_chain[transition.step_index] = transition.step;
        request.status = transition.request_status;
        request.updated_at = transition.updated_at;
        if let Some(credential) = transition.credential {
            request.credential_id = Some(credential.id.clone());
            credentials.insert(credential.secret.clone(), credential);
        }

        Ok(Some(request.clone()))
    }

    async fn set_request_status(
        &self,
        id: &RequestId,
        expected: RequestStatus,
        status: RequestStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Request>, StoreError> {
        let mut state = self.state.write().await;
        match state.requests.get_mut(&id.0) {
            Some(request) if request.status == expected => {
                request.status = status;
                request.updated_at = updated_at;
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_request(&self, id: &RequestId) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.requests.remove(&id.0).is_some())
    }

    async fn find_credential_by_secret(
        &self,
        secret: &str,
    ) -> Result<Option<Credential>, StoreError> {
        let state = self.state.read().await;
        Ok(state.credentials.get(secret).cloned())
    }

    async fn find_credential_by_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<Credential>, StoreError> {
        let state = self.state.read().await;
        Ok(state.credentials.values().find(|credential| &credential.request_id == request_id).cloned())
    }

    async fn delete_expired_credentials(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let before = state.credentials.len();
        state.credentials.retain(|_, credential| !credential.is_expired_at(now));
        Ok((before - state.credentials.len()) as u64)
    }

    async fn schedule_job(&self, job: ScheduledJob) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let exists =
            state.jobs.values().any(|existing| existing.kind == job.kind && existing.target == job.target);
        if exists {
            return Ok(false);
        }
        state.jobs.insert(job.id.0.clone(), job);
        Ok(true)
    }

    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledJob>, StoreError> {
        let state = self.state.read().await;
        let mut due: Vec<ScheduledJob> = state
            .jobs
            .values()
            .filter(|job| job.state == JobState::Scheduled && job.run_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.run_at.cmp(&b.run_at));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn complete_job(
        &self,
        id: &JobId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(job) = state.jobs.get_mut(&id.0) {
            job.state = JobState::Completed;
            job.completed_at = Some(completed_at);
        }
        Ok(())
    }
}
