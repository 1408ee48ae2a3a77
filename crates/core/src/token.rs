use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::crypto::random_hex;
use crate::domain::credential::{
    Credential, CredentialId, CredentialProjection, InvalidReason, Verification,
};
use crate::domain::request::{RequestId, RequestStatus};
use crate::errors::ApplicationError;
use crate::store::OutpassStore;

/// Random bytes per secret; hex encoding doubles the length.
pub const SECRET_BYTES: usize = 32;

/// Issues and checks QR credentials.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn OutpassStore>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(store: Arc<dyn OutpassStore>, ttl_secs: u64) -> Self {
        let ttl = Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1_000));
        Self { store, ttl }
    }

    /// Mints a credential bound to `request_id`. The caller persists it in
    /// the same commit as the final approval step.
    pub fn issue(&self, request_id: &RequestId, now: DateTime<Utc>) -> Credential {
        Credential {
            id: CredentialId(Uuid::new_v4().to_string()),
            secret: random_hex(SECRET_BYTES),
            request_id: request_id.clone(),
            expires_at: now + self.ttl,
            used: false,
            created_at: now,
        }
    }

    pub async fn verify(&self, secret: &str) -> Result<Verification, ApplicationError> {
        self.verify_at(secret, Utc::now()).await
    }

    /// Read-only check. Expiry is decided from the timestamp, not from
    /// whether the sweep has run yet.
    pub async fn verify_at(
        &self,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<Verification, ApplicationError> {
        let Some(credential) = self.store.find_credential_by_secret(secret).await? else {
            return Ok(rejected(InvalidReason::NotFound));
        };
        if credential.is_expired_at(now) {
            return Ok(rejected(InvalidReason::Expired));
        }

        let request = self.store.get_request_by_id(&credential.request_id).await?;
        let Some(request) = request.filter(|request| request.status == RequestStatus::Approved)
        else {
            return Ok(rejected(InvalidReason::NotApproved));
        };

        debug!(
            event_name = "credential.verify.valid",
            request_id = %request.id,
            "credential verified"
        );
        Ok(Verification::Valid(CredentialProjection {
            request_id: request.id,
            requester_id: request.requester_id,
            requester_name: request.requester_name,
            window: request.window,
        }))
    }

    pub async fn credential_for(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<Credential>, ApplicationError> {
        Ok(self.store.find_credential_by_request(request_id).await?)
    }

    /// Purges credentials whose expiry has passed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, ApplicationError> {
        let purged = self.store.delete_expired_credentials(now).await?;
        if purged > 0 {
            info!(event_name = "credential.sweep.purged", purged, "expired credentials purged");
        }
        Ok(purged)
    }
}

fn rejected(reason: InvalidReason) -> Verification {
    debug!(event_name = "credential.verify.invalid", reason = reason.as_str(), "credential rejected");
    Verification::Invalid(reason)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::TokenService;
    use crate::domain::credential::{InvalidReason, Verification};
    use crate::domain::principal::{Principal, PrincipalId, Role};
    use crate::domain::request::{
        ApprovalStep, NewRequest, Request, RequestStatus, StepStatus,
    };
    use crate::store::{InMemoryStore, OutpassStore, StepTransition};

    async fn approved_request(
        store: &Arc<InMemoryStore>,
        tokens: &TokenService,
        status_after: RequestStatus,
    ) -> (Request, String) {
        let student =
            Principal::new("stu-1", "Asha", Role::Student).with_branch("CSE").with_section("A");
        let now = Utc::now();
        let request = Request::open(
            &student,
            NewRequest {
                reason: "medical".to_string(),
                from: now,
                to: now + Duration::days(1),
                branch: None,
                section: None,
            },
            &[Role::Hod],
            now,
        )
        .expect("request");
        store.create_request(request.clone()).await.expect("create");

        let credential = tokens.issue(&request.id, now);
        let secret = credential.secret.clone();
        store
            .conditional_update_step(StepTransition {
                request_id: request.id.clone(),
                step_index: 0,
                expected_step_status: StepStatus::Pending,
                expected_request_status: RequestStatus::Pending,
                step: ApprovalStep {
                    role: Role::Hod,
                    approver: Some(PrincipalId("hod-1".to_string())),
                    status: StepStatus::Approved,
                    comment: None,
                    acted_at: Some(now),
                },
                request_status: status_after,
                credential: Some(credential),
                updated_at: now,
            })
            .await
            .expect("commit")
            .expect("applied");
        (request, secret)
    }

    #[tokio::test]
    async fn issued_secret_has_at_least_128_bits_and_expires_after_ttl() {
        let store = Arc::new(InMemoryStore::default());
        let tokens = TokenService::new(store, 3600);
        let now = Utc::now();
        let request_id = crate::domain::request::RequestId("req-1".to_string());

        let first = tokens.issue(&request_id, now);
        let second = tokens.issue(&request_id, now);

        assert_eq!(first.secret.len(), 64);
        assert_ne!(first.secret, second.secret);
        assert_eq!(first.expires_at, now + Duration::hours(1));
        assert!(!first.used);
    }

    #[tokio::test]
    async fn verify_reports_valid_projection_then_expired() {
        let store = Arc::new(InMemoryStore::default());
        let tokens = TokenService::new(store.clone(), 3600);
        let (request, secret) = approved_request(&store, &tokens, RequestStatus::Approved).await;

        let verification = tokens.verify(&secret).await.expect("verify");
        match verification {
            Verification::Valid(projection) => {
                assert_eq!(projection.request_id, request.id);
                assert_eq!(projection.requester_id, request.requester_id);
                assert_eq!(projection.window, request.window);
            }
            Verification::Invalid(reason) => panic!("expected valid credential, got {reason:?}"),
        }

        let later = Utc::now() + Duration::hours(1) + Duration::seconds(1);
        let verification = tokens.verify_at(&secret, later).await.expect("verify later");
        assert_eq!(verification.reason(), Some(InvalidReason::Expired));

        let stored = store.find_credential_by_secret(&secret).await.expect("find").expect("kept");
        assert!(!stored.used, "verification must not mark the credential used");
    }

    #[tokio::test]
    async fn verify_distinguishes_unknown_and_unapproved() {
        let store = Arc::new(InMemoryStore::default());
        let tokens = TokenService::new(store.clone(), 3600);
        let (_, secret) = approved_request(&store, &tokens, RequestStatus::Rejected).await;

        let unknown = tokens.verify("feedface").await.expect("verify unknown");
        assert_eq!(unknown.reason(), Some(InvalidReason::NotFound));

        let unapproved = tokens.verify(&secret).await.expect("verify unapproved");
        assert_eq!(unapproved.reason(), Some(InvalidReason::NotApproved));
    }

    #[tokio::test]
    async fn sweep_purges_expired_credentials() {
        let store = Arc::new(InMemoryStore::default());
        let tokens = TokenService::new(store.clone(), 60);
        let (request, secret) = approved_request(&store, &tokens, RequestStatus::Approved).await;

        assert_eq!(tokens.sweep(Utc::now()).await.expect("sweep now"), 0);
        assert!(tokens.credential_for(&request.id).await.expect("lookup").is_some());

        let purged = tokens.sweep(Utc::now() + Duration::minutes(2)).await.expect("sweep later");
        assert_eq!(purged, 1);
        let verification = tokens.verify(&secret).await.expect("verify");
        assert_eq!(verification.reason(), Some(InvalidReason::NotFound));
    }
}
