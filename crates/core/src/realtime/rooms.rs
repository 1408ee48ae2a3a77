use std::fmt;

use crate::domain::principal::{Principal, Role};

/// Fan-out destination scoped to a role and org unit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Room {
    Mentor { branch: String, section: String },
    Hod { branch: String },
    Scanner,
    Dev,
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mentor { branch, section } => write!(f, "mentor:{branch}:{section}"),
            Self::Hod { branch } => write!(f, "hod:{branch}"),
            Self::Scanner => f.write_str("scanner"),
            Self::Dev => f.write_str("dev"),
        }
    }
}

/// Pure mapping from principals and org units to rooms.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoomRouter;

impl RoomRouter {
    /// Rooms a connecting principal joins. Approvers missing the org unit
    /// their room needs join nothing.
    pub fn rooms_for(principal: &Principal) -> Vec<Room> {
        match principal.role {
            Role::Mentor | Role::Hod => Self::approver_room(
                principal.role,
                principal.branch.as_deref().unwrap_or_default(),
                principal.section.as_deref().unwrap_or_default(),
            )
            .into_iter()
            .collect(),
            Role::Watchman => vec![Room::Scanner],
            Role::Dev => vec![Room::Dev],
            Role::Student => Vec::new(),
        }
    }

    /// Room that holds the approvers for `role` within an org unit.
    pub fn approver_room(role: Role, branch: &str, section: &str) -> Option<Room> {
        let branch = branch.trim();
        let section = section.trim();
        match role {
            Role::Mentor if !branch.is_empty() && !section.is_empty() => {
                Some(Room::Mentor { branch: branch.to_string(), section: section.to_string() })
            }
            Role::Hod if !branch.is_empty() => Some(Room::Hod { branch: branch.to_string() }),
            Role::Mentor | Role::Hod | Role::Student | Role::Watchman | Role::Dev => None,
        }
    }
}
