use serde::{Deserialize, Serialize};

use crate::domain::request::RequestStatus;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Mentor,
    Hod,
    #[serde(alias = "scanner")]
    Watchman,
    Dev,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Mentor => "mentor",
            Self::Hod => "hod",
            Self::Watchman => "watchman",
            Self::Dev => "dev",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "mentor" => Some(Self::Mentor),
            "hod" => Some(Self::Hod),
            "watchman" | "scanner" => Some(Self::Watchman),
            "dev" => Some(Self::Dev),
            _ => None,
        }
    }

    /// Roles that may occupy a position in an approval chain.
    pub fn is_approver(&self) -> bool {
        matches!(self, Self::Mentor | Self::Hod)
    }

    /// Status a request moves to when this role approves a step that is not
    /// the last one in the chain. `None` means the role can only sit at the
    /// end of a chain.
    pub fn intermediate_status(&self) -> Option<RequestStatus> {
        match self {
            Self::Mentor => Some(RequestStatus::MentorsApproved),
            Self::Hod | Self::Student | Self::Watchman | Self::Dev => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated identity of an acting party together with its org unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub name: String,
    pub role: Role,
    pub branch: Option<String>,
    pub section: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self { id: PrincipalId(id.into()), name: name.into(), role, branch: None, section: None }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}
