use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::audit::{self, AuditEntry, AuditLog, AuditTarget};
use crate::config::LifecycleConfig;
use crate::domain::credential::Credential;
use crate::domain::job::ScheduledJob;
use crate::domain::principal::{Principal, Role};
use crate::domain::request::{NewRequest, Request, RequestId, RequestStatus, StepStatus};
use crate::errors::{ApplicationError, DomainError};
use crate::lifecycle::transitions::{plan_cancel, plan_decision, Decision};
use crate::store::{OutpassStore, RequestFilter};
use crate::token::TokenService;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub approval_chain: Vec<Role>,
    pub enforce_chain_order: bool,
    /// `None` leaves rejected and cancelled requests in place.
    pub finalized_retention: Option<Duration>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            approval_chain: vec![Role::Mentor, Role::Hod],
            enforce_chain_order: true,
            finalized_retention: Some(Duration::minutes(5)),
        }
    }
}

impl From<&LifecycleConfig> for LifecycleSettings {
    fn from(config: &LifecycleConfig) -> Self {
        let retention = i64::try_from(config.finalized_retention_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds);
        Self {
            approval_chain: config.approval_chain.clone(),
            enforce_chain_order: config.enforce_chain_order,
            finalized_retention: retention,
        }
    }
}

/// What a committed transition means for subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A new request now waits on `approver`.
    Submitted { request: Request, approver: Role },
    /// An intermediate approval handed the request to `approver`.
    Advanced { request: Request, approver: Role },
    /// Final approval together with the credential that was issued for it.
    Approved { request: Request, credential: Credential },
    Finalized { request_id: RequestId, status: RequestStatus },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub request: Request,
    pub events: Vec<LifecycleEvent>,
}

/// Sole writer of request status and approval chains.
#[derive(Clone)]
pub struct LifecycleEngine {
    store: Arc<dyn OutpassStore>,
    tokens: TokenService,
    audit: Arc<dyn AuditLog>,
    settings: LifecycleSettings,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn OutpassStore>,
        tokens: TokenService,
        audit: Arc<dyn AuditLog>,
        settings: LifecycleSettings,
    ) -> Self {
        Self { store, tokens, audit, settings }
    }

    pub async fn submit(
        &self,
        requester: &Principal,
        input: NewRequest,
    ) -> Result<TransitionOutcome, ApplicationError> {
        if requester.role != Role::Student {
            return Err(DomainError::AccessDenied(format!(
                "{} cannot submit leave requests",
                requester.role
            ))
            .into());
        }

        if self.settings.approval_chain.is_empty() {
            return Err(ApplicationError::Configuration(
                "no approval chain is configured".to_string(),
            ));
        }

        let request = Request::open(requester, input, &self.settings.approval_chain, Utc::now())?;
        self.store.create_request(request.clone()).await?;

        info!(
            event_name = "lifecycle.request.created",
            request_id = %request.id,
            requester_id = %request.requester_id,
            branch = %request.branch,
            section = %request.section,
            "leave request submitted"
        );
        self.record(requester, "request.create", &request, &[("reason", request.reason.as_str())])
            .await;

        let events = next_approver(&request)
            .map(|approver| LifecycleEvent::Submitted { request: request.clone(), approver })
            .into_iter()
            .collect();
        Ok(TransitionOutcome { request, events })
    }

    pub async fn get(
        &self,
        principal: &Principal,
        id: &RequestId,
    ) -> Result<Request, ApplicationError> {
        let request = self.load(id).await?;
        if principal.role == Role::Student && !request.is_owned_by(&principal.id) {
            return Err(DomainError::AccessDenied(format!(
                "request {id} belongs to another requester"
            ))
            .into());
        }
        Ok(request)
    }

    /// Requests visible to `principal`, narrowed by an optional status.
    pub async fn list(
        &self,
        principal: &Principal,
        status: Option<RequestStatus>,
    ) -> Result<Vec<Request>, ApplicationError> {
        let mut filter = visibility_filter(principal);
        if let Some(status) = status {
            if filter.status.is_some_and(|scoped| scoped != status) {
                return Ok(Vec::new());
            }
            filter.status = Some(status);
        }
        Ok(self.store.list_requests(&filter).await?)
    }

    pub async fn approve(
        &self,
        approver: &Principal,
        id: &RequestId,
        comment: Option<String>,
    ) -> Result<TransitionOutcome, ApplicationError> {
        self.decide(approver, id, Decision::Approve, comment).await
    }

    pub async fn reject(
        &self,
        approver: &Principal,
        id: &RequestId,
        comment: Option<String>,
    ) -> Result<TransitionOutcome, ApplicationError> {
        self.decide(approver, id, Decision::Reject, comment).await
    }

    pub async fn cancel(
        &self,
        requester: &Principal,
        id: &RequestId,
    ) -> Result<TransitionOutcome, ApplicationError> {
        let request = self.load(id).await?;
        let to = plan_cancel(&request, &requester.id)?;
        let now = Utc::now();

        let Some(updated) = self.store.set_request_status(id, RequestStatus::Pending, to, now).await?
        else {
            return Err(concurrent_change(id));
        };

        info!(
            event_name = "lifecycle.request.cancelled",
            request_id = %updated.id,
            requester_id = %requester.id,
            "leave request cancelled"
        );
        self.record(requester, "request.cancel", &updated, &[]).await;
        self.schedule_cleanup(&updated, now).await;

        let events =
            vec![LifecycleEvent::Finalized { request_id: updated.id.clone(), status: updated.status }];
        Ok(TransitionOutcome { request: updated, events })
    }

    /// Issued credential for an approved request, visible to its owner only.
    pub async fn credential_for(
        &self,
        requester: &Principal,
        id: &RequestId,
    ) -> Result<Credential, ApplicationError> {
        let request = self.load(id).await?;
        if !request.is_owned_by(&requester.id) {
            return Err(DomainError::AccessDenied(format!(
                "request {id} belongs to another requester"
            ))
            .into());
        }
        if request.status != RequestStatus::Approved {
            return Err(DomainError::StateConflict(format!(
                "request {id} is {} and has no credential",
                request.status.as_str()
            ))
            .into());
        }
        self.tokens.credential_for(id).await?.ok_or_else(|| {
            DomainError::NotFound(format!("credential for request {id} has expired")).into()
        })
    }

    async fn decide(
        &self,
        approver: &Principal,
        id: &RequestId,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<TransitionOutcome, ApplicationError> {
        let request = self.load(id).await?;
        let plan = plan_decision(&request, approver, decision, self.settings.enforce_chain_order)?;
        let now = Utc::now();

        let credential = plan.issues_credential.then(|| self.tokens.issue(id, now));
        let transition = plan.into_transition(&request, approver, comment, credential.clone(), now);
        let Some(updated) = self.store.conditional_update_step(transition).await? else {
            warn!(
                event_name = "lifecycle.request.conflict",
                request_id = %id,
                approver_id = %approver.id,
                decision = decision.as_str(),
                "step changed between read and commit"
            );
            return Err(concurrent_change(id));
        };

        info!(
            event_name = lifecycle_event_name(updated.status),
            request_id = %updated.id,
            approver_id = %approver.id,
            role = %approver.role,
            status = updated.status.as_str(),
            "approval step decided"
        );
        self.record(
            approver,
            match decision {
                Decision::Approve => "request.approve",
                Decision::Reject => "request.reject",
            },
            &updated,
            &[("role", approver.role.as_str()), ("status", updated.status.as_str())],
        )
        .await;

        let mut events = Vec::new();
        match (updated.status, credential) {
            (RequestStatus::Approved, Some(credential)) => {
                audit::record(
                    self.audit.as_ref(),
                    AuditEntry::new(
                        approver.id.0.clone(),
                        "credential.issue",
                        credential.id.0.clone(),
                        AuditTarget::Credential,
                    )
                    .with_metadata("request_id", updated.id.0.clone())
                    .with_metadata("expires_at", credential.expires_at.to_rfc3339()),
                )
                .await;
                events.push(LifecycleEvent::Approved { request: updated.clone(), credential });
            }
            (RequestStatus::Rejected, _) => self.schedule_cleanup(&updated, now).await,
            (_, _) => {
                if let Some(next) = next_approver(&updated) {
                    events.push(LifecycleEvent::Advanced { request: updated.clone(), approver: next });
                }
            }
        }
        if updated.status.is_terminal() {
            events.push(LifecycleEvent::Finalized {
                request_id: updated.id.clone(),
                status: updated.status,
            });
        }

        Ok(TransitionOutcome { request: updated, events })
    }

    async fn load(&self, id: &RequestId) -> Result<Request, ApplicationError> {
        self.store
            .get_request_by_id(id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("request {id} does not exist")).into())
    }

    async fn schedule_cleanup(&self, request: &Request, now: DateTime<Utc>) {
        let Some(retention) = self.settings.finalized_retention else {
            return;
        };
        let Some(run_at) = now.checked_add_signed(retention) else {
            warn!(
                event_name = "lifecycle.cleanup.skipped",
                request_id = %request.id,
                retention_secs = retention.num_seconds(),
                "retention overflows the clock; request left in place"
            );
            return;
        };
        let job = ScheduledJob::delete_request(request.id.clone(), run_at, now);
        match self.store.schedule_job(job).await {
            Ok(true) => info!(
                event_name = "lifecycle.cleanup.scheduled",
                request_id = %request.id,
                run_at = %run_at.to_rfc3339(),
                "finalized request scheduled for deletion"
            ),
            Ok(false) => {}
            Err(error) => warn!(
                event_name = "lifecycle.cleanup.schedule_failed",
                request_id = %request.id,
                error = %error,
                "could not schedule finalized request for deletion"
            ),
        }
    }

    async fn record(
        &self,
        actor: &Principal,
        action: &str,
        request: &Request,
        metadata: &[(&str, &str)],
    ) {
        let entry = metadata.iter().fold(
            AuditEntry::new(actor.id.0.clone(), action, request.id.0.clone(), AuditTarget::Request),
            |entry, (key, value)| entry.with_metadata(*key, *value),
        );
        audit::record(self.audit.as_ref(), entry).await;
    }
}

fn next_approver(request: &Request) -> Option<Role> {
    request.approval_chain.iter().find(|step| step.status == StepStatus::Pending).map(|step| step.role)
}

fn visibility_filter(principal: &Principal) -> RequestFilter {
    match principal.role {
        Role::Student => {
            RequestFilter { requester: Some(principal.id.clone()), ..RequestFilter::default() }
        }
        Role::Mentor => RequestFilter {
            branch: Some(principal.branch.clone().unwrap_or_default()),
            section: Some(principal.section.clone().unwrap_or_default()),
            status: Some(RequestStatus::Pending),
            pending_role: Some(Role::Mentor),
            ..RequestFilter::default()
        },
        Role::Hod => RequestFilter {
            branch: Some(principal.branch.clone().unwrap_or_default()),
            status: Some(RequestStatus::MentorsApproved),
            pending_role: Some(Role::Hod),
            ..RequestFilter::default()
        },
        Role::Watchman => {
            RequestFilter { status: Some(RequestStatus::Approved), ..RequestFilter::default() }
        }
        Role::Dev => RequestFilter::default(),
    }
}

fn lifecycle_event_name(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Pending => "lifecycle.request.pending",
        RequestStatus::MentorsApproved => "lifecycle.request.mentors_approved",
        RequestStatus::Approved => "lifecycle.request.approved",
        RequestStatus::Rejected => "lifecycle.request.rejected",
        RequestStatus::Cancelled => "lifecycle.request.cancelled",
    }
}

fn concurrent_change(id: &RequestId) -> ApplicationError {
    DomainError::StateConflict(format!("request {id} was decided concurrently")).into()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::{LifecycleEngine, LifecycleEvent, LifecycleSettings};
    use crate::audit::InMemoryAuditLog;
    use crate::domain::credential::Verification;
    use crate::domain::principal::{Principal, Role};
    use crate::domain::request::{NewRequest, RequestStatus, StepStatus};
    use crate::errors::{ApplicationError, DomainError};
    use crate::store::{InMemoryStore, OutpassStore};
    use crate::token::TokenService;

    struct Harness {
        engine: LifecycleEngine,
        store: Arc<InMemoryStore>,
        tokens: TokenService,
        audit: InMemoryAuditLog,
    }

    fn harness(settings: LifecycleSettings) -> Harness {
        let store = Arc::new(InMemoryStore::default());
        let tokens = TokenService::new(store.clone(), 3600);
        let audit = InMemoryAuditLog::default();
        let engine =
            LifecycleEngine::new(store.clone(), tokens.clone(), Arc::new(audit.clone()), settings);
        Harness { engine, store, tokens, audit }
    }

    fn student() -> Principal {
        Principal::new("stu-1", "Asha", Role::Student).with_branch("CSE").with_section("A")
    }

    fn mentor(id: &str) -> Principal {
        Principal::new(id, "Meera", Role::Mentor).with_branch("CSE").with_section("A")
    }

    fn hod() -> Principal {
        Principal::new("hod-1", "Harish", Role::Hod).with_branch("CSE")
    }

    fn medical_leave() -> NewRequest {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("date");
        NewRequest {
            reason: "medical".to_string(),
            from,
            to: from + Duration::days(1),
            branch: Some("CSE".to_string()),
            section: Some("A".to_string()),
        }
    }

    fn is_conflict(error: &ApplicationError) -> bool {
        matches!(error, ApplicationError::Domain(DomainError::StateConflict(_)))
    }

    #[tokio::test]
    async fn full_chain_issues_verifiable_credential() {
        let h = harness(LifecycleSettings::default());

        let created = h.engine.submit(&student(), medical_leave()).await.expect("submit");
        let id = created.request.id.clone();
        assert_eq!(created.request.status, RequestStatus::Pending);
        assert!(matches!(
            created.events.as_slice(),
            [LifecycleEvent::Submitted { approver: Role::Mentor, .. }]
        ));

        let mentored = h.engine.approve(&mentor("men-1"), &id, Some("ok".into())).await.expect("mentor");
        assert_eq!(mentored.request.status, RequestStatus::MentorsApproved);
        assert_eq!(mentored.request.approval_chain[0].comment.as_deref(), Some("ok"));
        assert!(matches!(
            mentored.events.as_slice(),
            [LifecycleEvent::Advanced { approver: Role::Hod, .. }]
        ));

        let approved = h.engine.approve(&hod(), &id, None).await.expect("hod");
        assert_eq!(approved.request.status, RequestStatus::Approved);
        assert!(approved.request.credential_id.is_some());
        let secret = match approved.events.as_slice() {
            [LifecycleEvent::Approved { credential, .. }, LifecycleEvent::Finalized { status: RequestStatus::Approved, .. }] => {
                credential.secret.clone()
            }
            other => panic!("unexpected events {other:?}"),
        };

        match h.tokens.verify(&secret).await.expect("verify") {
            Verification::Valid(projection) => {
                assert_eq!(projection.request_id, id);
                assert_eq!(projection.requester_id, student().id);
                assert_eq!(projection.window, created.request.window);
            }
            Verification::Invalid(reason) => panic!("credential rejected: {reason:?}"),
        }

        let owned = h.engine.credential_for(&student(), &id).await.expect("owner credential");
        assert_eq!(owned.secret, secret);

        let actions: Vec<String> = h.audit.entries().into_iter().map(|entry| entry.action).collect();
        assert_eq!(
            actions,
            vec!["request.create", "request.approve", "request.approve", "credential.issue"]
        );
    }

    #[tokio::test]
    async fn repeated_approval_conflicts_and_issues_no_second_credential() {
        let h = harness(LifecycleSettings::default());
        let id = h.engine.submit(&student(), medical_leave()).await.expect("submit").request.id;

        h.engine.approve(&mentor("men-1"), &id, None).await.expect("first");
        let error = h.engine.approve(&mentor("men-1"), &id, None).await.expect_err("second");
        assert!(is_conflict(&error));

        h.engine.approve(&hod(), &id, None).await.expect("hod");
        let error = h.engine.approve(&hod(), &id, None).await.expect_err("hod again");
        assert!(is_conflict(&error));
        let error = h.engine.reject(&hod(), &id, None).await.expect_err("reject after approve");
        assert!(is_conflict(&error));
    }

    #[tokio::test]
    async fn concurrent_approvals_have_exactly_one_winner() {
        let h = harness(LifecycleSettings::default());
        let id = h.engine.submit(&student(), medical_leave()).await.expect("submit").request.id;

        let first = mentor("men-1");
        let second = mentor("men-2");
        let (a, b) = tokio::join!(
            h.engine.approve(&first, &id, None),
            h.engine.approve(&second, &id, None)
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
        assert!(outcomes.iter().filter_map(|outcome| outcome.as_ref().err()).all(is_conflict));

        let stored = h.store.get_request_by_id(&id).await.expect("get").expect("exists");
        assert_eq!(stored.status, RequestStatus::MentorsApproved);
        assert_eq!(stored.approval_chain[0].status, StepStatus::Approved);
    }

    #[tokio::test]
    async fn cancel_then_approve_conflicts() {
        let h = harness(LifecycleSettings::default());
        let id = h.engine.submit(&student(), medical_leave()).await.expect("submit").request.id;

        let cancelled = h.engine.cancel(&student(), &id).await.expect("cancel");
        assert_eq!(cancelled.request.status, RequestStatus::Cancelled);
        assert!(matches!(
            cancelled.events.as_slice(),
            [LifecycleEvent::Finalized { status: RequestStatus::Cancelled, .. }]
        ));

        let error = h.engine.approve(&mentor("men-1"), &id, None).await.expect_err("approve");
        assert!(is_conflict(&error));

        let due = h.store.due_jobs(Utc::now() + Duration::minutes(10), 10).await.expect("jobs");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].target, id);
    }

    #[tokio::test]
    async fn cancel_commits_even_when_retention_overflows_the_clock() {
        let huge = Duration::try_seconds(i64::MAX / 1_000).expect("representable");
        let h = harness(LifecycleSettings { finalized_retention: Some(huge), ..LifecycleSettings::default() });
        let id = h.engine.submit(&student(), medical_leave()).await.expect("submit").request.id;

        let cancelled = h.engine.cancel(&student(), &id).await.expect("cancel");
        assert_eq!(cancelled.request.status, RequestStatus::Cancelled);
        let due = h.store.due_jobs(Utc::now() + Duration::days(365), 10).await.expect("jobs");
        assert!(due.is_empty());
    }

    #[test]
    fn settings_from_config_drop_zero_and_unrepresentable_retention() {
        let mut config = crate::config::LifecycleConfig {
            approval_chain: vec![Role::Mentor, Role::Hod],
            enforce_chain_order: true,
            finalized_retention_secs: 0,
        };
        assert_eq!(LifecycleSettings::from(&config).finalized_retention, None);

        config.finalized_retention_secs = u64::MAX;
        assert_eq!(LifecycleSettings::from(&config).finalized_retention, None);

        config.finalized_retention_secs = 300;
        assert_eq!(LifecycleSettings::from(&config).finalized_retention, Some(Duration::minutes(5)));
    }

    #[tokio::test]
    async fn submit_without_a_configured_chain_is_a_configuration_failure() {
        let h = harness(LifecycleSettings { approval_chain: Vec::new(), ..LifecycleSettings::default() });

        let error = h.engine.submit(&student(), medical_leave()).await.expect_err("no chain");
        assert!(matches!(error, ApplicationError::Configuration(_)));
        assert!(h.engine.list(&student(), None).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn cancel_by_non_owner_is_denied() {
        let h = harness(LifecycleSettings::default());
        let id = h.engine.submit(&student(), medical_leave()).await.expect("submit").request.id;
        let other = Principal::new("stu-2", "Ravi", Role::Student);

        let error = h.engine.cancel(&other, &id).await.expect_err("not owner");
        assert!(matches!(error, ApplicationError::Domain(DomainError::AccessDenied(_))));
    }

    #[tokio::test]
    async fn reject_is_terminal_and_schedules_cleanup_only_when_retained() {
        let h = harness(LifecycleSettings { finalized_retention: None, ..LifecycleSettings::default() });
        let id = h.engine.submit(&student(), medical_leave()).await.expect("submit").request.id;

        let rejected = h.engine.reject(&mentor("men-1"), &id, Some("no".into())).await.expect("reject");
        assert_eq!(rejected.request.status, RequestStatus::Rejected);
        assert_eq!(rejected.request.approval_chain[0].status, StepStatus::Rejected);
        assert_eq!(rejected.request.approval_chain[1].status, StepStatus::Pending);

        let error = h.engine.approve(&hod(), &id, None).await.expect_err("after reject");
        assert!(is_conflict(&error));
        let due = h.store.due_jobs(Utc::now() + Duration::days(1), 10).await.expect("jobs");
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn out_of_order_hod_approval_follows_setting() {
        let strict = harness(LifecycleSettings::default());
        let id = strict.engine.submit(&student(), medical_leave()).await.expect("submit").request.id;
        let error = strict.engine.approve(&hod(), &id, None).await.expect_err("strict order");
        assert!(is_conflict(&error));

        let relaxed =
            harness(LifecycleSettings { enforce_chain_order: false, ..LifecycleSettings::default() });
        let id = relaxed.engine.submit(&student(), medical_leave()).await.expect("submit").request.id;
        let approved = relaxed.engine.approve(&hod(), &id, None).await.expect("relaxed order");
        assert_eq!(approved.request.status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn listing_is_scoped_by_role() {
        let h = harness(LifecycleSettings::default());
        let first = h.engine.submit(&student(), medical_leave()).await.expect("submit").request.id;
        let mut elsewhere = medical_leave();
        elsewhere.section = Some("B".to_string());
        h.engine.submit(&student(), elsewhere).await.expect("submit other section");
        let other_student = Principal::new("stu-2", "Ravi", Role::Student)
            .with_branch("CSE")
            .with_section("A");
        h.engine.submit(&other_student, medical_leave()).await.expect("submit other student");

        assert_eq!(h.engine.list(&student(), None).await.expect("own").len(), 2);
        assert_eq!(h.engine.list(&mentor("men-1"), None).await.expect("mentor").len(), 2);

        h.engine.approve(&mentor("men-1"), &first, None).await.expect("approve");
        let hod_queue = h.engine.list(&hod(), None).await.expect("hod");
        assert_eq!(hod_queue.len(), 1);
        assert_eq!(hod_queue[0].id, first);
        assert!(h
            .engine
            .list(&hod(), Some(RequestStatus::Pending))
            .await
            .expect("hod pending")
            .is_empty());

        let dev = Principal::new("dev-1", "Ops", Role::Dev);
        assert_eq!(h.engine.list(&dev, None).await.expect("dev").len(), 3);
        assert_eq!(
            h.engine.list(&dev, Some(RequestStatus::MentorsApproved)).await.expect("dev").len(),
            1
        );
    }

    #[tokio::test]
    async fn students_cannot_read_or_create_for_others() {
        let h = harness(LifecycleSettings::default());
        let id = h.engine.submit(&student(), medical_leave()).await.expect("submit").request.id;
        let other = Principal::new("stu-2", "Ravi", Role::Student);

        let error = h.engine.get(&other, &id).await.expect_err("other student");
        assert!(matches!(error, ApplicationError::Domain(DomainError::AccessDenied(_))));
        assert!(h.engine.get(&mentor("men-1"), &id).await.is_ok());

        let error = h.engine.submit(&mentor("men-1"), medical_leave()).await.expect_err("mentor");
        assert!(matches!(error, ApplicationError::Domain(DomainError::AccessDenied(_))));
    }

    #[tokio::test]
    async fn unknown_request_is_not_found() {
        let h = harness(LifecycleSettings::default());
        let missing = crate::domain::request::RequestId("missing".to_string());

        let error = h.engine.approve(&mentor("men-1"), &missing, None).await.expect_err("missing");
        assert!(matches!(error, ApplicationError::Domain(DomainError::NotFound(_))));
    }
}
