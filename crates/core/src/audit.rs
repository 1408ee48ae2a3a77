use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditTarget {
    Request,
    Credential,
}

impl AuditTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Credential => "credential",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "request" => Some(Self::Request),
            "credential" => Some(Self::Credential),
            _ => None,
        }
    }
}

/// Write-once record of an action taken against a request or credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub actor: String,
    pub action: String,
    pub target_id: String,
    pub target_type: AuditTarget,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        target_id: impl Into<String>,
        target_type: AuditTarget,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actor: actor.into(),
            action: action.into(),
            target_id: target_id.into(),
            target_type,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError>;

    /// Newest first; `page` starts at 1.
    async fn page(&self, page: u32, limit: u32) -> Result<AuditPage, StoreError>;
}

/// Appends `entry`, logging and discarding any failure.
pub async fn record(log: &dyn AuditLog, entry: AuditEntry) {
    let action = entry.action.clone();
    let target_id = entry.target_id.clone();
    if let Err(error) = log.append(entry).await {
        warn!(
            event_name = "audit.append.failed",
            action = %action,
            target_id = %target_id,
            error = %error,
            "audit log write failed"
        );
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError> {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
        Ok(())
    }

    async fn page(&self, page: u32, limit: u32) -> Result<AuditPage, StoreError> {
        let mut entries = self.entries();
        entries.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        let total = entries.len() as u64;
        let skip = page.saturating_sub(1) as usize * limit as usize;
        let entries = entries.into_iter().skip(skip).take(limit as usize).collect();
        Ok(AuditPage { entries, page, limit, total })
    }
}
