use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::shopper::{HouseholdContext, PurchaseHistoryEntry, UserPreference};
use crate::errors::ApplicationError;

/// Everything ranking needs to know about one shopper.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShopperProfile {
    pub preferences: Vec<UserPreference>,
    pub history: Vec<PurchaseHistoryEntry>,
    pub household: Option<HouseholdContext>,
}

#[async_trait]
pub trait ShopperProfileStore: Send + Sync {
    async fn preferences(&self, user_id: &str) -> Result<Vec<UserPreference>, ApplicationError>;
    async fn purchase_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<PurchaseHistoryEntry>, ApplicationError>;
    async fn household(&self, user_id: &str)
        -> Result<Option<HouseholdContext>, ApplicationError>;

    async fn profile(&self, user_id: &str) -> Result<ShopperProfile, ApplicationError> {
        Ok(ShopperProfile {
            preferences: self.preferences(user_id).await?,
            history: self.purchase_history(user_id).await?,
            household: self.household(user_id).await?,
        })
    }
}

#[derive(Default)]
pub struct InMemoryShopperProfiles {
    profiles: RwLock<HashMap<String, ShopperProfile>>,
}

impl InMemoryShopperProfiles {
    pub async fn set(&self, user_id: impl Into<String>, profile: ShopperProfile) {
        self.profiles.write().await.insert(user_id.into(), profile);
    }
}

#[async_trait]
impl ShopperProfileStore for InMemoryShopperProfiles {
    async fn preferences(&self, user_id: &str) -> Result<Vec<UserPreference>, ApplicationError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(user_id).map(|profile| profile.preferences.clone()).unwrap_or_default())
    }

    async fn purchase_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<PurchaseHistoryEntry>, ApplicationError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(user_id).map(|profile| profile.history.clone()).unwrap_or_default())
    }

    async fn household(
        &self,
        user_id: &str,
    ) -> Result<Option<HouseholdContext>, ApplicationError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(user_id).and_then(|profile| profile.household.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryShopperProfiles, ShopperProfile, ShopperProfileStore};
    use crate::domain::shopper::{PreferenceType, PurchaseHistoryEntry, UserPreference};

    #[tokio::test]
    async fn unknown_user_has_empty_profile() {
        let store = InMemoryShopperProfiles::default();
        assert_eq!(store.profile("ghost").await.expect("profile"), ShopperProfile::default());
    }

    #[tokio::test]
    async fn profile_assembles_all_parts() {
        let store = InMemoryShopperProfiles::default();
        let profile = ShopperProfile {
            preferences: vec![UserPreference::new(PreferenceType::Allergy, "peanut", 1.0)],
            history: vec![PurchaseHistoryEntry {
                sku: "SKU-1".to_string(),
                purchase_count: 2,
                days_since_last: 4,
            }],
            household: None,
        };
        store.set("u-1", profile.clone()).await;

        assert_eq!(store.profile("u-1").await.expect("profile"), profile);
    }
}
