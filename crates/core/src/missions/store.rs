use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::ApplicationError;
use crate::missions::states::{Mission, MissionId, MissionStatus};

#[async_trait]
pub trait MissionStore: Send + Sync {
    async fn find_by_id(&self, id: &MissionId) -> Result<Option<Mission>, ApplicationError>;
    /// All missions of the user with status `active`, paused or not.
    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Mission>, ApplicationError>;
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Mission>, ApplicationError>;
    /// Insert or replace by id.
    async fn save(&self, mission: &Mission) -> Result<(), ApplicationError>;
}

#[derive(Default)]
pub struct InMemoryMissionStore {
    missions: RwLock<HashMap<String, Mission>>,
}

#[async_trait]
impl MissionStore for InMemoryMissionStore {
    async fn find_by_id(&self, id: &MissionId) -> Result<Option<Mission>, ApplicationError> {
        let missions = self.missions.read().await;
        Ok(missions.get(&id.0).cloned())
    }

    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Mission>, ApplicationError> {
        let missions = self.missions.read().await;
        Ok(missions
            .values()
            .filter(|mission| mission.user_id == user_id && mission.status == MissionStatus::Active)
            .cloned()
            .collect())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Mission>, ApplicationError> {
        let missions = self.missions.read().await;
        let mut owned: Vec<Mission> =
            missions.values().filter(|mission| mission.user_id == user_id).cloned().collect();
        owned.sort_by(|left, right| right.last_active_at.cmp(&left.last_active_at));
        owned.truncate(limit);
        Ok(owned)
    }

    async fn save(&self, mission: &Mission) -> Result<(), ApplicationError> {
        let mut missions = self.missions.write().await;
        missions.insert(mission.id.0.clone(), mission.clone());
        Ok(())
    }
}
