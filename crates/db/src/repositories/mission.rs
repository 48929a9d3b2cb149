use async_trait::async_trait;
use cartwise_core::errors::ApplicationError;
use cartwise_core::missions::{Mission, MissionId, MissionStatus, MissionStore};
use sqlx::{sqlite::SqliteRow, Row};

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

const MISSION_COLUMNS: &str = "id, user_id, query, mission_type, status, funnel_stage, \
     items_viewed, items_added, questions_asked, last_active_at, paused_at, abandoned_at, \
     completed_at, abandon_threshold_hours, detection_confidence, expected_next_action, created_at";

pub struct SqlMissionRepository {
    pool: DbPool,
}

impl SqlMissionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_id(&self, id: &MissionId) -> Result<Option<Mission>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {MISSION_COLUMNS} FROM missions WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(mission_from_row).transpose()
    }

    async fn fetch_active(&self, user_id: &str) -> Result<Vec<Mission>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {MISSION_COLUMNS} FROM missions
             WHERE user_id = ? AND status = ?
             ORDER BY last_active_at DESC"
        ))
        .bind(user_id)
        .bind(MissionStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(mission_from_row).collect()
    }

    async fn fetch_recent(&self, user_id: &str, limit: usize) -> Result<Vec<Mission>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {MISSION_COLUMNS} FROM missions
             WHERE user_id = ?
             ORDER BY last_active_at DESC
             LIMIT ?"
        ))
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(mission_from_row).collect()
    }

    async fn upsert(&self, mission: &Mission) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO missions (
                id, user_id, query, mission_type, status, funnel_stage,
                items_viewed, items_added, questions_asked, last_active_at, paused_at,
                abandoned_at, completed_at, abandon_threshold_hours, detection_confidence,
                expected_next_action, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                funnel_stage = excluded.funnel_stage,
                items_viewed = excluded.items_viewed,
                items_added = excluded.items_added,
                questions_asked = excluded.questions_asked,
                last_active_at = excluded.last_active_at,
                paused_at = excluded.paused_at,
                abandoned_at = excluded.abandoned_at,
                completed_at = excluded.completed_at,
                expected_next_action = excluded.expected_next_action
            "#,
        )
        .bind(&mission.id.0)
        .bind(&mission.user_id)
        .bind(&mission.query)
        .bind(mission.mission_type.as_str())
        .bind(mission.status.as_str())
        .bind(mission.funnel_stage.as_str())
        .bind(i64::from(mission.items_viewed))
        .bind(i64::from(mission.items_added))
        .bind(i64::from(mission.questions_asked))
        .bind(format_timestamp(mission.last_active_at))
        .bind(mission.paused_at.map(format_timestamp))
        .bind(mission.abandoned_at.map(format_timestamp))
        .bind(mission.completed_at.map(format_timestamp))
        .bind(i64::from(mission.abandon_threshold_hours))
        .bind(mission.detection_confidence)
        .bind(&mission.expected_next_action)
        .bind(format_timestamp(mission.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MissionStore for SqlMissionRepository {
    async fn find_by_id(&self, id: &MissionId) -> Result<Option<Mission>, ApplicationError> {
        Ok(self.fetch_by_id(id).await?)
    }

    async fn list_active_for_user(&self, user_id: &str) -> Result<Vec<Mission>, ApplicationError> {
        Ok(self.fetch_active(user_id).await?)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Mission>, ApplicationError> {
        Ok(self.fetch_recent(user_id, limit).await?)
    }

    async fn save(&self, mission: &Mission) -> Result<(), ApplicationError> {
        Ok(self.upsert(mission).await?)
    }
}

fn counter(row: &SqliteRow, column: &str) -> Result<u32, RepositoryError> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("invalid {column}: {value}")))
}

fn mission_from_row(row: &SqliteRow) -> Result<Mission, RepositoryError> {
    let mission_type: String = row.try_get("mission_type")?;
    let status: String = row.try_get("status")?;
    let funnel_stage: String = row.try_get("funnel_stage")?;
    let last_active_at: String = row.try_get("last_active_at")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Mission {
        id: MissionId(row.try_get("id")?),
        user_id: row.try_get("user_id")?,
        query: row.try_get("query")?,
        mission_type: mission_type
            .parse()
            .map_err(|error| RepositoryError::Decode(format!("{error}")))?,
        status: status.parse().map_err(|error| RepositoryError::Decode(format!("{error}")))?,
        funnel_stage: funnel_stage
            .parse()
            .map_err(|error| RepositoryError::Decode(format!("{error}")))?,
        items_viewed: counter(row, "items_viewed")?,
        items_added: counter(row, "items_added")?,
        questions_asked: counter(row, "questions_asked")?,
        last_active_at: parse_timestamp("last_active_at", &last_active_at)?,
        paused_at: parse_optional_timestamp("paused_at", row.try_get("paused_at")?)?,
        abandoned_at: parse_optional_timestamp("abandoned_at", row.try_get("abandoned_at")?)?,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
        abandon_threshold_hours: counter(row, "abandon_threshold_hours")?,
        detection_confidence: row.try_get("detection_confidence")?,
        expected_next_action: row.try_get("expected_next_action")?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cartwise_core::audit::NullAuditSink;
    use cartwise_core::clock::ManualClock;
    use cartwise_core::missions::{
        FunnelStage, Mission, MissionAction, MissionService, MissionStatus, MissionStore,
        MissionType,
    };
    use chrono::{Duration, TimeZone, Utc};

    use super::SqlMissionRepository;
    use crate::repositories::test_support::setup_pool;

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0).single().expect("valid instant")
    }

    #[tokio::test]
    async fn missions_round_trip_and_update_in_place() {
        let repo = SqlMissionRepository::new(setup_pool().await);
        let mut mission =
            Mission::new("shopper-1", "best laptop for school", MissionType::Research, 0.85, start());
        repo.save(&mission).await.expect("insert");

        mission.funnel_stage = FunnelStage::Comparing;
        mission.questions_asked = 2;
        mission.paused_at = Some(start() + Duration::minutes(5));
        mission.expected_next_action = Some("compare battery life".to_string());
        repo.save(&mission).await.expect("update");

        let loaded = repo.find_by_id(&mission.id).await.expect("find").expect("present");
        assert_eq!(loaded, mission);
        assert_eq!(repo.list_for_user("shopper-1", 10).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn only_active_rows_are_listed_newest_first() {
        let repo = SqlMissionRepository::new(setup_pool().await);
        let older = Mission::new("shopper-2", "weekly groceries", MissionType::Essentials, 0.75, start());
        let newer = Mission::new(
            "shopper-2",
            "birthday party",
            MissionType::Event,
            0.9,
            start() + Duration::hours(1),
        );
        let mut done =
            Mission::new("shopper-2", "need batteries", MissionType::Precision, 0.85, start());
        done.status = MissionStatus::Completed;
        done.completed_at = Some(start());

        for mission in [&older, &newer, &done] {
            repo.save(mission).await.expect("save");
        }

        let active = repo.list_active_for_user("shopper-2").await.expect("active");
        let ids: Vec<_> = active.iter().map(|mission| mission.id.clone()).collect();
        assert_eq!(ids, vec![newer.id.clone(), older.id.clone()]);
        assert!(repo.list_active_for_user("someone-else").await.expect("active").is_empty());
    }

    #[tokio::test]
    async fn mission_service_runs_on_sqlite() {
        let clock = ManualClock::new(start());
        let service = MissionService::new(
            Arc::new(SqlMissionRepository::new(setup_pool().await)),
            Arc::new(NullAuditSink),
            Arc::new(clock.clone()),
        );

        let created = service
            .observe_message("shopper-3", "weekly groceries list", 1, "corr-1")
            .await
            .expect("observe")
            .mission()
            .cloned()
            .expect("mission");
        let (mission, outcome) = service
            .track_action(&created.id, MissionAction::AddToCart, "corr-2")
            .await
            .expect("track");

        assert_eq!(outcome.to, FunnelStage::Decided);
        assert_eq!(mission.items_added, 1);
        let active = service.get_active_mission("shopper-3").await.expect("active");
        assert_eq!(active.map(|found| found.id), Some(created.id));
    }
}
