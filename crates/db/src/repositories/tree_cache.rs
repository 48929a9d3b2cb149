use async_trait::async_trait;
use cartwise_core::errors::ApplicationError;
use cartwise_core::trees::{cache_key, CachedTreeEntry, TreeCacheStore};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use super::{format_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Append-only tree cache. Several rows may share a category; reads pick the newest live row.
pub struct SqlTreeCacheRepository {
    pool: DbPool,
}

impl SqlTreeCacheRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_latest_live(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedTreeEntry>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT category, tree_json, catalog_snapshot_json, metadata_json,
                   generated_at, expires_at
            FROM generated_tree_cache
            WHERE category = ? AND expires_at > ?
            ORDER BY generated_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(cache_key(category))
        .bind(format_timestamp(now))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn append(&self, entry: &CachedTreeEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO generated_tree_cache (
                category, tree_json, catalog_snapshot_json, metadata_json, generated_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(cache_key(&entry.category))
        .bind(serde_json::to_string(&entry.tree)?)
        .bind(serde_json::to_string(&entry.catalog_snapshot)?)
        .bind(serde_json::to_string(&entry.metadata)?)
        .bind(format_timestamp(entry.generated_at))
        .bind(format_timestamp(entry.expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_category(&self, category: &str) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM generated_tree_cache WHERE category = ?")
            .bind(cache_key(category))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn remove_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM generated_tree_cache WHERE expires_at < ?")
            .bind(format_timestamp(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TreeCacheStore for SqlTreeCacheRepository {
    async fn latest_live(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedTreeEntry>, ApplicationError> {
        Ok(self.fetch_latest_live(category, now).await?)
    }

    async fn insert(&self, entry: &CachedTreeEntry) -> Result<(), ApplicationError> {
        Ok(self.append(entry).await?)
    }

    async fn delete_category(&self, category: &str) -> Result<u64, ApplicationError> {
        Ok(self.remove_category(category).await?)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ApplicationError> {
        Ok(self.remove_expired_before(cutoff).await?)
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<CachedTreeEntry, RepositoryError> {
    let tree_json: String = row.try_get("tree_json")?;
    let snapshot_json: String = row.try_get("catalog_snapshot_json")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let generated_at: String = row.try_get("generated_at")?;
    let expires_at: String = row.try_get("expires_at")?;

    Ok(CachedTreeEntry {
        category: row.try_get("category")?,
        tree: serde_json::from_str(&tree_json)?,
        catalog_snapshot: serde_json::from_str(&snapshot_json)?,
        metadata: serde_json::from_str(&metadata_json)?,
        generated_at: parse_timestamp("generated_at", &generated_at)?,
        expires_at: parse_timestamp("expires_at", &expires_at)?,
    })
}
