use async_trait::async_trait;
use cartwise_core::audit::{AuditEvent, AuditSink};
use cartwise_core::errors::ApplicationError;
use sqlx::{sqlite::SqliteRow, Row};

use super::{format_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Interaction history of chat turns, keyed by correlation id.
pub struct SqlInteractionLog {
    pool: DbPool,
}

impl SqlInteractionLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO interaction_events (
                id, user_id, mission_id, correlation_id, event_type, category, outcome,
                metadata_json, occurred_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.user_id)
        .bind(&event.mission_id)
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(event.category.as_str())
        .bind(event.outcome.as_str())
        .bind(serde_json::to_string(&event.metadata)?)
        .bind(format_timestamp(event.occurred_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, mission_id, correlation_id, event_type, category, outcome,
                   metadata_json, occurred_at
            FROM interaction_events
            WHERE user_id = ?
            ORDER BY occurred_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    /// Every event of one turn in the order it was written.
    pub async fn list_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, mission_id, correlation_id, event_type, category, outcome,
                   metadata_json, occurred_at
            FROM interaction_events
            WHERE correlation_id = ?
            ORDER BY occurred_at ASC, rowid ASC
            "#,
        )
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }
}

#[async_trait]
impl AuditSink for SqlInteractionLog {
    async fn emit(&self, event: AuditEvent) -> Result<(), ApplicationError> {
        Ok(self.append(&event).await?)
    }
}

fn event_from_row(row: &SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let category: String = row.try_get("category")?;
    let outcome: String = row.try_get("outcome")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let occurred_at: String = row.try_get("occurred_at")?;

    Ok(AuditEvent {
        event_id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        mission_id: row.try_get("mission_id")?,
        correlation_id: row.try_get("correlation_id")?,
        event_type: row.try_get("event_type")?,
        category: category.parse().map_err(|error| RepositoryError::Decode(format!("{error}")))?,
        outcome: outcome.parse().map_err(|error| RepositoryError::Decode(format!("{error}")))?,
        metadata: serde_json::from_str(&metadata_json)?,
        occurred_at: parse_timestamp("occurred_at", &occurred_at)?,
    })
}
