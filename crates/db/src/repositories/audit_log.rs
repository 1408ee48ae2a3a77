use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use outpass_core::audit::{AuditEntry, AuditLog, AuditPage, AuditTarget};
use outpass_core::store::StoreError;

use super::{format_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Append-only audit trail. Rows are never updated or deleted.
#[derive(Clone)]
pub struct SqlAuditLog {
    pool: DbPool,
}

impl SqlAuditLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        let metadata = serde_json::to_string(&entry.metadata).map_err(|error| {
            RepositoryError::Decode(format!("cannot encode audit metadata: {error}"))
        })?;
        sqlx::query(
            "INSERT INTO audit_log (
                id,
                actor,
                action,
                target_id,
                target_type,
                metadata_json,
                occurred_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(&entry.target_id)
        .bind(entry.target_type.as_str())
        .bind(metadata)
        .bind(format_timestamp(entry.occurred_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn select_page(&self, page: u32, limit: u32) -> Result<AuditPage, RepositoryError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM audit_log").fetch_one(&self.pool).await?;
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);

        let rows = sqlx::query(
            "SELECT id, actor, action, target_id, target_type, metadata_json, occurred_at
             FROM audit_log
             ORDER BY occurred_at DESC, id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let entries = rows.into_iter().map(entry_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(AuditPage { entries, page, limit, total: u64::try_from(total).unwrap_or_default() })
    }
}

#[async_trait]
impl AuditLog for SqlAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError> {
        Ok(self.insert(&entry).await?)
    }

    async fn page(&self, page: u32, limit: u32) -> Result<AuditPage, StoreError> {
        Ok(self.select_page(page, limit).await?)
    }
}

fn entry_from_row(row: SqliteRow) -> Result<AuditEntry, RepositoryError> {
    let target_raw = row.try_get::<String, _>("target_type")?;
    let target_type = AuditTarget::parse(&target_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown audit target `{target_raw}`")))?;
    let metadata_raw = row.try_get::<String, _>("metadata_json")?;
    let metadata: BTreeMap<String, String> =
        serde_json::from_str(&metadata_raw).map_err(|error| {
            RepositoryError::Decode(format!("invalid metadata_json `{metadata_raw}` ({error})"))
        })?;

    Ok(AuditEntry {
        id: row.try_get("id")?,
        actor: row.try_get("actor")?,
        action: row.try_get("action")?,
        target_id: row.try_get("target_id")?,
        target_type,
        metadata,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}
