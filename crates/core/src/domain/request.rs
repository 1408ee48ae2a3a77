use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::credential::CredentialId;
use crate::domain::principal::{Principal, PrincipalId, Role};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    MentorsApproved,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::MentorsApproved => "mentors_approved",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "mentors_approved" => Some(Self::MentorsApproved),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub role: Role,
    pub approver: Option<PrincipalId>,
    pub status: StepStatus,
    pub comment: Option<String>,
    pub acted_at: Option<DateTime<Utc>>,
}

impl ApprovalStep {
    pub fn pending(role: Role) -> Self {
        Self { role, approver: None, status: StepStatus::Pending, comment: None, acted_at: None }
    }
}

/// Half-open leave window `[from, to)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl LeaveWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, DomainError> {
        if from >= to {
            return Err(DomainError::Validation(format!(
                "leave window must start before it ends (from={}, to={})",
                from.to_rfc3339(),
                to.to_rfc3339()
            )));
        }
        Ok(Self { from, to })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub requester_id: PrincipalId,
    pub requester_name: String,
    pub reason: String,
    pub window: LeaveWindow,
    pub status: RequestStatus,
    pub branch: String,
    pub section: String,
    pub approval_chain: Vec<ApprovalStep>,
    pub credential_id: Option<CredentialId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Requester-supplied fields for a new leave request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRequest {
    pub reason: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub branch: Option<String>,
    pub section: Option<String>,
}

impl Request {
    /// Builds a pending request whose chain mirrors `chain` in order. Branch
    /// and section fall back to the requester's own org unit.
    pub fn open(
        requester: &Principal,
        input: NewRequest,
        chain: &[Role],
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if input.reason.trim().is_empty() {
            return Err(DomainError::Validation("reason must not be empty".to_string()));
        }
        let window = LeaveWindow::new(input.from, input.to)?;
        let branch = non_blank(input.branch).or_else(|| non_blank(requester.branch.clone()));
        let section = non_blank(input.section).or_else(|| non_blank(requester.section.clone()));
        let (Some(branch), Some(section)) = (branch, section) else {
            return Err(DomainError::Validation(
                "branch and section are required to route the request".to_string(),
            ));
        };
        if chain.is_empty() {
            return Err(DomainError::InvariantViolation(
                "approval chain must contain at least one step".to_string(),
            ));
        }

        Ok(Self {
            id: RequestId::generate(),
            requester_id: requester.id.clone(),
            requester_name: requester.name.clone(),
            reason: input.reason,
            window,
            status: RequestStatus::Pending,
            branch,
            section,
            approval_chain: chain.iter().copied().map(ApprovalStep::pending).collect(),
            credential_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Index of the first pending step held by `role`.
    pub fn pending_step_for(&self, role: Role) -> Option<usize> {
        self.approval_chain
            .iter()
            .position(|step| step.role == role && step.status == StepStatus::Pending)
    }

    pub fn earlier_steps_approved(&self, index: usize) -> bool {
        self.approval_chain.iter().take(index).all(|step| step.status == StepStatus::Approved)
    }

    pub fn is_final_step(&self, index: usize) -> bool {
        index + 1 == self.approval_chain.len()
    }

    pub fn is_owned_by(&self, principal: &PrincipalId) -> bool {
        &self.requester_id == principal
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{LeaveWindow, NewRequest, Request, RequestStatus, StepStatus};
    use crate::domain::principal::{Principal, Role};
    use crate::errors::DomainError;

    fn student() -> Principal {
        Principal::new("stu-1", "Asha", Role::Student).with_branch("CSE").with_section("A")
    }

    fn input(reason: &str) -> NewRequest {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("valid date");
        NewRequest {
            reason: reason.to_string(),
            from,
            to: from + Duration::days(1),
            branch: None,
            section: None,
        }
    }

    #[test]
    fn window_rejects_inverted_or_empty_range() {
        let from = Utc::now();
        assert!(matches!(LeaveWindow::new(from, from), Err(DomainError::Validation(_))));
        assert!(matches!(
            LeaveWindow::new(from, from - Duration::hours(1)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn open_builds_pending_chain_in_order() {
        let request = Request::open(&student(), input("medical"), &[Role::Mentor, Role::Hod], Utc::now())
            .expect("open request");

        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.branch, "CSE");
        assert_eq!(request.section, "A");
        assert_eq!(request.requester_name, "Asha");
        assert_eq!(request.approval_chain.len(), 2);
        assert_eq!(request.approval_chain[0].role, Role::Mentor);
        assert_eq!(request.approval_chain[1].role, Role::Hod);
        assert!(request.approval_chain.iter().all(|step| step.status == StepStatus::Pending));
        assert_eq!(request.pending_step_for(Role::Hod), Some(1));
        assert!(!request.earlier_steps_approved(1));
        assert!(request.is_final_step(1));
    }

    #[test]
    fn explicit_org_unit_overrides_requester_defaults() {
        let mut input = input("family function");
        input.branch = Some("ECE".to_string());
        input.section = Some("B".to_string());

        let request = Request::open(&student(), input, &[Role::Mentor], Utc::now()).expect("open");
        assert_eq!(request.branch, "ECE");
        assert_eq!(request.section, "B");
    }

    #[test]
    fn open_rejects_blank_reason_and_missing_org_unit() {
        let error = Request::open(&student(), input("   "), &[Role::Mentor], Utc::now())
            .expect_err("blank reason");
        assert!(matches!(error, DomainError::Validation(_)));

        let orphan = Principal::new("stu-2", "Ravi", Role::Student);
        let error = Request::open(&orphan, input("medical"), &[Role::Mentor], Utc::now())
            .expect_err("missing branch");
        assert!(matches!(error, DomainError::Validation(_)));
    }

    #[test]
    fn status_parse_round_trips_known_values() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::MentorsApproved,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert!(RequestStatus::Approved.is_terminal());
        assert!(!RequestStatus::MentorsApproved.is_terminal());
    }
}
