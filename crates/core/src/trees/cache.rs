use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::product::Product;
use crate::domain::tree::{GeneratedTree, GenerationMetadata};
use crate::errors::ApplicationError;

const SNAPSHOT_SAMPLE: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotProduct {
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub tags: Vec<String>,
}

/// Size and head of the catalog a tree was generated from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub product_count: usize,
    pub sample: Vec<SnapshotProduct>,
}

impl CatalogSnapshot {
    pub fn of(products: &[Product]) -> Self {
        Self {
            product_count: products.len(),
            sample: products
                .iter()
                .take(SNAPSHOT_SAMPLE)
                .map(|product| SnapshotProduct {
                    sku: product.sku.clone(),
                    name: product.name.clone(),
                    price: product.price,
                    tags: product.tags.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedTreeEntry {
    pub category: String,
    pub tree: GeneratedTree,
    pub catalog_snapshot: CatalogSnapshot,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub metadata: GenerationMetadata,
}

impl CachedTreeEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Normalized cache key for a category name.
pub fn cache_key(category: &str) -> String {
    category.trim().to_lowercase()
}

/// Append-only store of generated trees. Several rows may exist per category; readers take the
/// most recently generated live one.
#[async_trait]
pub trait TreeCacheStore: Send + Sync {
    async fn latest_live(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedTreeEntry>, ApplicationError>;
    async fn insert(&self, entry: &CachedTreeEntry) -> Result<(), ApplicationError>;
    /// Deletes every row of the category and returns how many were removed.
    async fn delete_category(&self, category: &str) -> Result<u64, ApplicationError>;
    /// Deletes rows that expired strictly before `cutoff`.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ApplicationError>;
}

#[derive(Default)]
pub struct InMemoryTreeCache {
    entries: RwLock<Vec<CachedTreeEntry>>,
}

impl InMemoryTreeCache {
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl TreeCacheStore for InMemoryTreeCache {
    async fn latest_live(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedTreeEntry>, ApplicationError> {
        let key = cache_key(category);
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|entry| entry.category == key && entry.is_live(now))
            .max_by(|left, right| left.generated_at.cmp(&right.generated_at))
            .cloned())
    }

    async fn insert(&self, entry: &CachedTreeEntry) -> Result<(), ApplicationError> {
        let mut stored = entry.clone();
        stored.category = cache_key(&entry.category);
        self.entries.write().await.push(stored);
        Ok(())
    }

    async fn delete_category(&self, category: &str) -> Result<u64, ApplicationError> {
        let key = cache_key(category);
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.category != key);
        Ok((before - entries.len()) as u64)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ApplicationError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.expires_at >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}
