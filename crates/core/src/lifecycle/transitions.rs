use chrono::{DateTime, Utc};

use crate::domain::credential::Credential;
use crate::domain::principal::{Principal, PrincipalId, Role};
use crate::domain::request::{ApprovalStep, Request, RequestStatus, StepStatus};
use crate::errors::DomainError;
use crate::store::StepTransition;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// Checked, not-yet-committed step decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepPlan {
    pub step_index: usize,
    pub role: Role,
    pub from: RequestStatus,
    pub to: RequestStatus,
    /// Set when the decision approves the final step of the chain.
    pub issues_credential: bool,
}

impl StepPlan {
    pub fn into_transition(
        self,
        request: &Request,
        approver: &Principal,
        comment: Option<String>,
        credential: Option<Credential>,
        now: DateTime<Utc>,
    ) -> StepTransition {
        let status =
            if self.to == RequestStatus::Rejected { StepStatus::Rejected } else { StepStatus::Approved };
        StepTransition {
            request_id: request.id.clone(),
            step_index: self.step_index,
            expected_step_status: StepStatus::Pending,
            expected_request_status: self.from,
            step: ApprovalStep {
                role: self.role,
                approver: Some(approver.id.clone()),
                status,
                comment: comment.map(|comment| comment.trim().to_string()).filter(|c| !c.is_empty()),
                acted_at: Some(now),
            },
            request_status: self.to,
            credential,
            updated_at: now,
        }
    }
}

/// Edges a request status may take. Anything else is a bug.
pub fn is_allowed_edge(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::{Approved, Cancelled, MentorsApproved, Pending, Rejected};
    matches!(
        (from, to),
        (Pending, MentorsApproved)
            | (Pending, Approved)
            | (MentorsApproved, Approved)
            | (Pending, Rejected)
            | (MentorsApproved, Rejected)
            | (Pending, Cancelled)
    )
}

/// Validates an approve/reject by `actor` against the request as read.
pub fn plan_decision(
    request: &Request,
    actor: &Principal,
    decision: Decision,
    enforce_chain_order: bool,
) -> Result<StepPlan, DomainError> {
    if !matches!(request.status, RequestStatus::Pending | RequestStatus::MentorsApproved) {
        return Err(DomainError::StateConflict(format!(
            "request {} is {} and can no longer be decided",
            request.id,
            request.status.as_str()
        )));
    }

    let Some(step_index) = request.pending_step_for(actor.role) else {
        return Err(DomainError::StateConflict(format!(
            "request {} has no pending {} step",
            request.id, actor.role
        )));
    };

    if enforce_chain_order && !request.earlier_steps_approved(step_index) {
        return Err(DomainError::StateConflict(format!(
            "request {} is still waiting on an earlier approver",
            request.id
        )));
    }

    ensure_in_scope(request, actor)?;

    let (to, issues_credential) = match decision {
        Decision::Reject => (RequestStatus::Rejected, false),
        Decision::Approve if request.is_final_step(step_index) => (RequestStatus::Approved, true),
        Decision::Approve => {
            let intermediate = actor.role.intermediate_status().ok_or_else(|| {
                DomainError::InvariantViolation(format!(
                    "{} cannot hold a non-final position in the approval chain",
                    actor.role
                ))
            })?;
            (intermediate, false)
        }
    };

    if !is_allowed_edge(request.status, to) {
        return Err(DomainError::StateConflict(format!(
            "request {} cannot move from {} to {}",
            request.id,
            request.status.as_str(),
            to.as_str()
        )));
    }

    Ok(StepPlan { step_index, role: actor.role, from: request.status, to, issues_credential })
}

/// Validates a requester's cancel.
pub fn plan_cancel(request: &Request, requester: &PrincipalId) -> Result<RequestStatus, DomainError> {
    if !request.is_owned_by(requester) {
        return Err(DomainError::AccessDenied(format!(
            "request {} belongs to another requester",
            request.id
        )));
    }
    if request.status != RequestStatus::Pending {
        return Err(DomainError::StateConflict(format!(
            "request {} is {} and can only be cancelled while pending",
            request.id,
            request.status.as_str()
        )));
    }
    Ok(RequestStatus::Cancelled)
}

fn ensure_in_scope(request: &Request, actor: &Principal) -> Result<(), DomainError> {
    let same_branch = actor.branch.as_deref().map(str::trim) == Some(request.branch.as_str());
    let same_section = actor.section.as_deref().map(str::trim) == Some(request.section.as_str());
    let in_scope = match actor.role {
        Role::Mentor => same_branch && same_section,
        Role::Hod => same_branch,
        Role::Student | Role::Watchman | Role::Dev => false,
    };
    if in_scope {
        Ok(())
    } else {
        Err(DomainError::AccessDenied(format!(
            "{} {} does not approve requests for {}/{}",
            actor.role, actor.id, request.branch, request.section
        )))
    }
}
