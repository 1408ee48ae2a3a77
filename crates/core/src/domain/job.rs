use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    DeleteRequest,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeleteRequest => "delete_request",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "delete_request" => Some(Self::DeleteRequest),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Scheduled,
    Completed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "scheduled" => Some(Self::Scheduled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Persisted one-shot deferred action. At most one job exists per
/// `(kind, target)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub kind: JobKind,
    pub target: RequestId,
    pub run_at: DateTime<Utc>,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScheduledJob {
    pub fn delete_request(target: RequestId, run_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId(Uuid::new_v4().to_string()),
            kind: JobKind::DeleteRequest,
            target,
            run_at,
            state: JobState::Scheduled,
            created_at: now,
            completed_at: None,
        }
    }
}
