//! Append-only local change journal. Every non-sync-originated mutation
//! to a Note or Todo is recorded here with `entity_id = sync_id`; the
//! legacy incremental protocol drains it to build push batches.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, Pool, Sqlite};
use uuid::Uuid;

use crate::errors::{DbError, DomainError, DomainResult, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Note,
    Todo,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Note => "note",
            EntityType::Todo => "todo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "note" => Some(EntityType::Note),
            "todo" => Some(EntityType::Todo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
    Restore,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Create => "create",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
            ChangeOperation::Restore => "restore",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ChangeOperation::Create),
            "update" => Some(ChangeOperation::Update),
            "delete" => Some(ChangeOperation::Delete),
            "restore" => Some(ChangeOperation::Restore),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub operation: ChangeOperation,
    pub payload: Option<Value>,
    pub device_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub synced: bool,
    pub synced_at: Option<DateTime<Utc>>,
}

/// A new change prior to insertion; `id` is assigned by the journal.
#[derive(Debug, Clone)]
pub struct NewChange {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub operation: ChangeOperation,
    pub payload: Option<Value>,
    pub device_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeLogStats {
    pub total: i64,
    pub unsynced: i64,
    pub by_entity_type: std::collections::HashMap<String, i64>,
}

#[async_trait]
pub trait ChangeLogRepository: Send + Sync {
    /// Single append; returns the new row id.
    async fn log(&self, change: NewChange) -> DomainResult<i64>;

    /// Transactional append of a batch.
    async fn batch_log(&self, changes: &[NewChange]) -> DomainResult<Vec<i64>>;

    /// Oldest-first slice of unsynced rows.
    async fn unsynced(&self, limit: i64) -> DomainResult<Vec<ChangeLogEntry>>;

    /// Transactional flag set.
    async fn mark_synced(&self, ids: &[i64]) -> DomainResult<()>;

    /// Deletes rows where `synced=true and synced_at < now - days_to_keep`.
    async fn cleanup_old(&self, days_to_keep: i64) -> DomainResult<u64>;

    async fn stats(&self) -> DomainResult<ChangeLogStats>;
}

pub struct SqliteChangeLogRepository {
    pool: Pool<Sqlite>,
}

impl SqliteChangeLogRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, FromRow)]
struct ChangeLogRow {
    id: i64,
    entity_type: String,
    entity_id: String,
    operation: String,
    payload: Option<String>,
    device_id: Option<String>,
    created_at: String,
    synced: i64,
    synced_at: Option<String>,
}

impl TryFrom<ChangeLogRow> for ChangeLogEntry {
    type Error = DomainError;
    fn try_from(row: ChangeLogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            entity_type: EntityType::from_str(&row.entity_type)
                .ok_or_else(|| DomainError::Validation(ValidationError::format("change_log.entity_type", &row.entity_type)))?,
            entity_id: Uuid::parse_str(&row.entity_id)
                .map_err(|_| DomainError::Validation(ValidationError::format("change_log.entity_id", &row.entity_id)))?,
            operation: ChangeOperation::from_str(&row.operation)
                .ok_or_else(|| DomainError::Validation(ValidationError::format("change_log.operation", &row.operation)))?,
            payload: row.payload.and_then(|p| serde_json::from_str(&p).ok()),
            device_id: row.device_id.as_deref().map(Uuid::parse_str).transpose().map_err(|_| {
                DomainError::Validation(ValidationError::format("change_log.device_id", "invalid uuid"))
            })?,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| DomainError::Validation(ValidationError::format("change_log.created_at", &row.created_at)))?,
            synced: row.synced != 0,
            synced_at: row
                .synced_at
                .map(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|_| DomainError::Validation(ValidationError::format("change_log.synced_at", &s)))
                })
                .transpose()?,
        })
    }
}

#[async_trait]
impl ChangeLogRepository for SqliteChangeLogRepository {
    async fn log(&self, change: NewChange) -> DomainResult<i64> {
        let ids = self.batch_log(std::slice::from_ref(&change)).await?;
        ids.into_iter().next().ok_or_else(|| DomainError::Internal("change log insert returned no id".to_string()))
    }

    async fn batch_log(&self, changes: &[NewChange]) -> DomainResult<Vec<i64>> {
        let mut tx = self.pool.begin().await.map_err(DbError::Sqlx)?;
        let mut ids = Vec::with_capacity(changes.len());
        let now = Utc::now().to_rfc3339();

        for change in changes {
            let payload_str = change.payload.as_ref().map(|v| v.to_string());
            let device_id_str = change.device_id.map(|id| id.to_string());

            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO change_log (entity_type, entity_id, operation, payload, device_id, created_at, synced)
                VALUES (?, ?, ?, ?, ?, ?, 0)
                RETURNING id
                "#,
            )
            .bind(change.entity_type.as_str())
            .bind(change.entity_id.to_string())
            .bind(change.operation.as_str())
            .bind(payload_str)
            .bind(device_id_str)
            .bind(&now)
            .fetch_one(&mut *tx)
            .await
            .map_err(DbError::Sqlx)?;

            ids.push(id);
        }

        tx.commit().await.map_err(DbError::Sqlx)?;
        Ok(ids)
    }

    async fn unsynced(&self, limit: i64) -> DomainResult<Vec<ChangeLogEntry>> {
        let rows: Vec<ChangeLogRow> = sqlx::query_as(
            r#"
            SELECT id, entity_type, entity_id, operation, payload, device_id, created_at, synced, synced_at
            FROM change_log
            WHERE synced = 0
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Sqlx)?;

        rows.into_iter().map(ChangeLogEntry::try_from).collect()
    }

    async fn mark_synced(&self, ids: &[i64]) -> DomainResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(DbError::Sqlx)?;
        let now = Utc::now().to_rfc3339();

        for id in ids {
            sqlx::query("UPDATE change_log SET synced = 1, synced_at = ? WHERE id = ?")
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(DbError::Sqlx)?;
        }

        tx.commit().await.map_err(DbError::Sqlx)?;
        Ok(())
    }

    async fn cleanup_old(&self, days_to_keep: i64) -> DomainResult<u64> {
        let cutoff = (Utc::now() - Duration::days(days_to_keep)).to_rfc3339();
        let result = sqlx::query("DELETE FROM change_log WHERE synced = 1 AND synced_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;
        Ok(result.rows_affected())
    }

    async fn stats(&self) -> DomainResult<ChangeLogStats> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM change_log")
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;
        let unsynced: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM change_log WHERE synced = 0")
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;

        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT entity_type, COUNT(*) FROM change_log GROUP BY entity_type")
                .fetch_all(&self.pool)
                .await
                .map_err(DbError::Sqlx)?;

        Ok(ChangeLogStats {
            total,
            unsynced,
            by_entity_type: rows.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> Pool<Sqlite> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_lazy("sqlite::memory:")
            .expect("pool opens");
        crate::db_migration::initialize_database(&pool).await.expect("migrations apply");
        pool
    }

    fn change(entity_type: EntityType, operation: ChangeOperation) -> NewChange {
        NewChange { entity_type, entity_id: Uuid::new_v4(), operation, payload: Some(serde_json::json!({"k": "v"})), device_id: Some(Uuid::new_v4()) }
    }

    #[tokio::test]
    async fn log_then_unsynced_round_trips_a_change() {
        let repo = SqliteChangeLogRepository::new(test_pool().await);
        let id = repo.log(change(EntityType::Note, ChangeOperation::Create)).await.unwrap();

        let pending = repo.unsynced(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].entity_type, EntityType::Note);
        assert_eq!(pending[0].operation, ChangeOperation::Create);
        assert!(!pending[0].synced);
    }

    #[tokio::test]
    async fn batch_log_inserts_all_and_preserves_order() {
        let repo = SqliteChangeLogRepository::new(test_pool().await);
        let changes = vec![
            change(EntityType::Note, ChangeOperation::Create),
            change(EntityType::Todo, ChangeOperation::Update),
            change(EntityType::Note, ChangeOperation::Delete),
        ];
        let ids = repo.batch_log(&changes).await.unwrap();
        assert_eq!(ids.len(), 3);

        let pending = repo.unsynced(10).await.unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending.iter().map(|c| c.id).collect::<Vec<_>>(), ids);
    }

    #[tokio::test]
    async fn mark_synced_removes_rows_from_unsynced() {
        let repo = SqliteChangeLogRepository::new(test_pool().await);
        let id = repo.log(change(EntityType::Todo, ChangeOperation::Create)).await.unwrap();

        repo.mark_synced(&[id]).await.unwrap();

        assert!(repo.unsynced(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsynced_respects_limit() {
        let repo = SqliteChangeLogRepository::new(test_pool().await);
        for _ in 0..5 {
            repo.log(change(EntityType::Note, ChangeOperation::Create)).await.unwrap();
        }

        let pending = repo.unsynced(2).await.unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn stats_reports_totals_and_per_entity_counts() {
        let repo = SqliteChangeLogRepository::new(test_pool().await);
        let id = repo.log(change(EntityType::Note, ChangeOperation::Create)).await.unwrap();
        repo.log(change(EntityType::Todo, ChangeOperation::Update)).await.unwrap();
        repo.mark_synced(&[id]).await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.unsynced, 1);
        assert_eq!(stats.by_entity_type.get("note").copied(), Some(1));
        assert_eq!(stats.by_entity_type.get("todo").copied(), Some(1));
    }
}
