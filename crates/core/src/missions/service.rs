use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audit::{emit_best_effort, AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::clock::Clock;
use crate::errors::{ApplicationError, DomainError};
use crate::missions::detection::{detect_mission_type, is_deviation, MissionDetection};
use crate::missions::states::{
    FunnelStage, Mission, MissionAction, MissionId, MissionStatus, MissionType,
};
use crate::missions::store::MissionStore;
use crate::missions::transitions::{apply_action, TransitionOutcome};

/// Result of feeding one chat message to the mission tracker.
#[derive(Clone, Debug, PartialEq)]
pub enum MissionObservation {
    /// The message continued the current mission.
    Continued(Mission),
    /// A new mission was created. `paused` holds the mission it displaced, if any.
    Created { mission: Mission, paused: Option<MissionId> },
    /// No active mission and no detectable intent.
    Idle,
}

impl MissionObservation {
    pub fn mission(&self) -> Option<&Mission> {
        match self {
            Self::Continued(mission) | Self::Created { mission, .. } => Some(mission),
            Self::Idle => None,
        }
    }
}

/// Snapshot the chat layer uses to phrase nudges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissionInsight {
    pub mission_id: MissionId,
    pub mission_type: MissionType,
    pub funnel_stage: FunnelStage,
    pub minutes_remaining: i64,
    pub near_abandonment: bool,
    pub stuck: bool,
    pub paused: bool,
}

pub struct MissionService {
    store: Arc<dyn MissionStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl MissionService {
    pub fn new(
        store: Arc<dyn MissionStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, audit, clock }
    }

    /// Most recently active unpaused mission. Older unpaused duplicates are paused on the way.
    pub async fn get_active_mission(
        &self,
        user_id: &str,
    ) -> Result<Option<Mission>, ApplicationError> {
        self.reconcile_duplicates(user_id).await?;
        let active = self.store.list_active_for_user(user_id).await?;
        Ok(active
            .into_iter()
            .filter(|mission| !mission.is_paused())
            .max_by(|left, right| left.last_active_at.cmp(&right.last_active_at)))
    }

    /// Pauses every unpaused active mission but the most recently active one. Returns how many
    /// rows were paused.
    pub async fn reconcile_duplicates(&self, user_id: &str) -> Result<usize, ApplicationError> {
        let mut unpaused: Vec<Mission> = self
            .store
            .list_active_for_user(user_id)
            .await?
            .into_iter()
            .filter(|mission| !mission.is_paused())
            .collect();
        if unpaused.len() < 2 {
            return Ok(0);
        }

        unpaused.sort_by(|left, right| right.last_active_at.cmp(&left.last_active_at));
        let now = self.clock.now();
        let mut paused = 0;
        for mut mission in unpaused.into_iter().skip(1) {
            mission.paused_at = Some(now);
            self.store.save(&mission).await?;
            paused += 1;
        }

        info!(
            event_name = "mission.duplicates_reconciled",
            user_id = %user_id,
            paused = paused,
            "paused older duplicate missions"
        );
        Ok(paused)
    }

    /// Lazily abandons an expired mission, then either continues it, replaces it on deviation,
    /// or creates a mission from the detected intent.
    pub async fn observe_message(
        &self,
        user_id: &str,
        text: &str,
        message_count: usize,
        correlation_id: &str,
    ) -> Result<MissionObservation, ApplicationError> {
        let detection = detect_mission_type(text, message_count);
        let mut current = self.get_active_mission(user_id).await?;

        if let Some(mission) = current.take() {
            if self.abandon_if_expired(&mission.id, correlation_id).await? {
                debug!(
                    event_name = "mission.expired_on_observe",
                    mission_id = %mission.id,
                    "expired mission abandoned before new message"
                );
            } else {
                current = Some(mission);
            }
        }

        match (current, detection) {
            (Some(mission), Some(detection)) if is_deviation(&mission, text) => {
                let paused = self.pause(&mission.id, correlation_id).await?;
                let created =
                    self.create_mission(user_id, text, detection, correlation_id).await?;
                Ok(MissionObservation::Created { mission: created, paused: Some(paused.id) })
            }
            (Some(mission), _) => {
                let (mission, _) =
                    self.track_action(&mission.id, MissionAction::Message, correlation_id).await?;
                Ok(MissionObservation::Continued(mission))
            }
            (None, Some(detection)) => {
                let created =
                    self.create_mission(user_id, text, detection, correlation_id).await?;
                Ok(MissionObservation::Created { mission: created, paused: None })
            }
            (None, None) => Ok(MissionObservation::Idle),
        }
    }

    pub async fn create_mission(
        &self,
        user_id: &str,
        query: &str,
        detection: MissionDetection,
        correlation_id: &str,
    ) -> Result<Mission, ApplicationError> {
        let mission = Mission::new(
            user_id,
            query,
            detection.mission_type,
            detection.confidence,
            self.clock.now(),
        );
        self.store.save(&mission).await?;

        info!(
            event_name = "mission.created",
            correlation_id = %correlation_id,
            mission_id = %mission.id,
            mission_type = mission.mission_type.as_str(),
            confidence = mission.detection_confidence,
            "mission created"
        );
        self.record(&mission, "mission.created", correlation_id, AuditOutcome::Success).await;
        Ok(mission)
    }

    pub async fn track_action(
        &self,
        mission_id: &MissionId,
        action: MissionAction,
        correlation_id: &str,
    ) -> Result<(Mission, TransitionOutcome), ApplicationError> {
        let mut mission = self.load(mission_id).await?;
        let outcome = match apply_action(&mut mission, action, self.clock.now()) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.record(
                    &mission,
                    "mission.action_rejected",
                    correlation_id,
                    AuditOutcome::Rejected,
                )
                .await;
                return Err(error.into());
            }
        };
        self.store.save(&mission).await?;

        if outcome.stage_changed() {
            info!(
                event_name = "mission.stage_changed",
                correlation_id = %correlation_id,
                mission_id = %mission.id,
                from = outcome.from.as_str(),
                to = outcome.to.as_str(),
                action = action.as_str(),
                "mission advanced in funnel"
            );
        }
        Ok((mission, outcome))
    }

    pub async fn pause(
        &self,
        mission_id: &MissionId,
        correlation_id: &str,
    ) -> Result<Mission, ApplicationError> {
        let mut mission = self.load_active(mission_id, "pause").await?;
        if mission.paused_at.is_none() {
            mission.paused_at = Some(self.clock.now());
            self.store.save(&mission).await?;
            self.record(&mission, "mission.paused", correlation_id, AuditOutcome::Success).await;
        }
        Ok(mission)
    }

    pub async fn resume(
        &self,
        mission_id: &MissionId,
        correlation_id: &str,
    ) -> Result<Mission, ApplicationError> {
        let mut mission = self.load_active(mission_id, "resume").await?;
        mission.paused_at = None;
        mission.last_active_at = self.clock.now();
        self.store.save(&mission).await?;
        self.record(&mission, "mission.resumed", correlation_id, AuditOutcome::Success).await;
        Ok(mission)
    }

    pub async fn complete(
        &self,
        mission_id: &MissionId,
        correlation_id: &str,
    ) -> Result<Mission, ApplicationError> {
        let mut mission = self.load_active(mission_id, "complete").await?;
        let now = self.clock.now();
        mission.status = MissionStatus::Completed;
        mission.completed_at = Some(now);
        mission.last_active_at = now;
        self.store.save(&mission).await?;
        self.record(&mission, "mission.completed", correlation_id, AuditOutcome::Success).await;
        Ok(mission)
    }

    pub async fn abandon(
        &self,
        mission_id: &MissionId,
        correlation_id: &str,
    ) -> Result<Mission, ApplicationError> {
        let mut mission = self.load_active(mission_id, "abandon").await?;
        mission.status = MissionStatus::Abandoned;
        mission.abandoned_at = Some(self.clock.now());
        self.store.save(&mission).await?;

        info!(
            event_name = "mission.abandoned",
            correlation_id = %correlation_id,
            mission_id = %mission.id,
            threshold_hours = mission.abandon_threshold_hours,
            "mission abandoned"
        );
        self.record(&mission, "mission.abandoned", correlation_id, AuditOutcome::Success).await;
        Ok(mission)
    }

    pub async fn check_abandonment(&self, mission_id: &MissionId) -> Result<bool, ApplicationError> {
        let mission = self.load(mission_id).await?;
        Ok(mission.is_abandon_eligible(self.clock.now()))
    }

    /// Abandons the mission when its threshold has elapsed. Returns whether it was abandoned.
    pub async fn abandon_if_expired(
        &self,
        mission_id: &MissionId,
        correlation_id: &str,
    ) -> Result<bool, ApplicationError> {
        if !self.check_abandonment(mission_id).await? {
            return Ok(false);
        }
        self.abandon(mission_id, correlation_id).await?;
        Ok(true)
    }

    pub async fn set_expected_next_action(
        &self,
        mission_id: &MissionId,
        expected: Option<String>,
    ) -> Result<Mission, ApplicationError> {
        let mut mission = self.load(mission_id).await?;
        mission.expected_next_action =
            expected.map(|value| value.trim().to_string()).filter(|value| !value.is_empty());
        self.store.save(&mission).await?;
        Ok(mission)
    }

    pub fn insight(&self, mission: &Mission) -> MissionInsight {
        let now = self.clock.now();
        MissionInsight {
            mission_id: mission.id.clone(),
            mission_type: mission.mission_type,
            funnel_stage: mission.funnel_stage,
            minutes_remaining: mission.time_remaining(now).num_minutes(),
            near_abandonment: mission.is_near_abandonment(now),
            stuck: mission.is_stuck(),
            paused: mission.is_paused(),
        }
    }

    async fn load(&self, mission_id: &MissionId) -> Result<Mission, ApplicationError> {
        self.store
            .find_by_id(mission_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound { entity: "mission", id: mission_id.0.clone() })
    }

    async fn load_active(
        &self,
        mission_id: &MissionId,
        operation: &str,
    ) -> Result<Mission, ApplicationError> {
        let mission = self.load(mission_id).await?;
        if !mission.is_active() {
            return Err(DomainError::InvalidMissionLifecycle {
                mission_id: mission.id.0.clone(),
                reason: format!("cannot {operation} a mission that is {}", mission.status.as_str()),
            }
            .into());
        }
        Ok(mission)
    }

    async fn record(
        &self,
        mission: &Mission,
        event_type: &str,
        correlation_id: &str,
        outcome: AuditOutcome,
    ) {
        emit_best_effort(
            self.audit.as_ref(),
            AuditEvent::new(
                Some(mission.user_id.clone()),
                correlation_id,
                event_type,
                AuditCategory::Mission,
                outcome,
            )
            .with_mission(mission.id.0.clone())
            .with_metadata("mission_type", mission.mission_type.as_str())
            .with_metadata("funnel_stage", mission.funnel_stage.as_str()),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::{MissionObservation, MissionService};
    use crate::audit::InMemoryAuditSink;
    use crate::clock::ManualClock;
    use crate::errors::{ApplicationError, DomainError};
    use crate::missions::states::{
        FunnelStage, Mission, MissionAction, MissionStatus, MissionType,
    };
    use crate::missions::store::{InMemoryMissionStore, MissionStore};

    struct Harness {
        service: MissionService,
        store: Arc<InMemoryMissionStore>,
        audit: InMemoryAuditSink,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).single().expect("valid instant");
        let clock = ManualClock::new(start);
        let store = Arc::new(InMemoryMissionStore::default());
        let audit = InMemoryAuditSink::default();
        let service =
            MissionService::new(store.clone(), Arc::new(audit.clone()), Arc::new(clock.clone()));
        Harness { service, store, audit, clock }
    }

    fn created(observation: MissionObservation) -> Mission {
        match observation {
            MissionObservation::Created { mission, .. } => mission,
            other => panic!("expected a created mission, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_message_creates_mission_and_follow_up_browses() {
        let h = harness();
        let mission = created(
            h.service
                .observe_message("u-1", "I need a new TV for the den", 1, "req-1")
                .await
                .expect("observe"),
        );
        assert_eq!(mission.mission_type, MissionType::Research);
        assert_eq!(mission.funnel_stage, FunnelStage::Arriving);

        let next = h
            .service
            .observe_message("u-1", "need one that fits the den", 2, "req-2")
            .await
            .expect("observe");
        let continued = match next {
            MissionObservation::Continued(mission) => mission,
            other => panic!("expected continuation, got {other:?}"),
        };
        assert_eq!(continued.id, mission.id);
        assert_eq!(continued.funnel_stage, FunnelStage::Browsing);
        assert!(h.audit.event_types().contains(&"mission.created".to_string()));
    }

    #[tokio::test]
    async fn deviation_pauses_old_mission_and_creates_new_one() {
        let h = harness();
        let first = created(
            h.service.observe_message("u-1", "need running shoes", 1, "req-1").await.expect("ok"),
        );

        let observation = h
            .service
            .observe_message("u-1", "planning a birthday party", 2, "req-2")
            .await
            .expect("observe");
        let (second, paused) = match observation {
            MissionObservation::Created { mission, paused } => (mission, paused),
            other => panic!("expected new mission, got {other:?}"),
        };

        assert_eq!(second.mission_type, MissionType::Event);
        assert_eq!(paused, Some(first.id.clone()));
        let stored = h.store.find_by_id(&first.id).await.expect("find").expect("exists");
        assert!(stored.is_paused());
        assert_eq!(stored.status, MissionStatus::Active);
    }

    #[tokio::test]
    async fn no_intent_and_no_mission_is_idle() {
        let h = harness();
        let observation =
            h.service.observe_message("u-1", "hello", 1, "req-1").await.expect("observe");
        assert_eq!(observation, MissionObservation::Idle);
    }

    #[tokio::test]
    async fn expired_mission_is_abandoned_lazily() {
        let h = harness();
        let first = created(
            h.service.observe_message("u-1", "need batteries", 1, "req-1").await.expect("ok"),
        );

        h.clock.advance(Duration::hours(5) + Duration::minutes(59));
        assert!(!h.service.check_abandonment(&first.id).await.expect("check"));

        h.clock.advance(Duration::minutes(1));
        assert!(h.service.abandon_if_expired(&first.id, "req-2").await.expect("abandon"));

        let stored = h.store.find_by_id(&first.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, MissionStatus::Abandoned);
        assert_eq!(stored.abandoned_at, Some(h.clock_now()));
    }

    #[tokio::test]
    async fn duplicates_are_reconciled_on_read() {
        let h = harness();
        let now = h.clock_now();
        let older = Mission::new("u-1", "party snacks", MissionType::Event, 0.9, now);
        let newer = Mission::new(
            "u-1",
            "weekly groceries",
            MissionType::Essentials,
            0.75,
            now + Duration::minutes(5),
        );
        h.store.save(&older).await.expect("save");
        h.store.save(&newer).await.expect("save");

        let active = h.service.get_active_mission("u-1").await.expect("read").expect("active");
        assert_eq!(active.id, newer.id);

        let older = h.store.find_by_id(&older.id).await.expect("find").expect("exists");
        assert!(older.is_paused());
    }

    #[tokio::test]
    async fn completed_mission_rejects_actions_and_lifecycle_changes() {
        let h = harness();
        let mission = created(
            h.service.observe_message("u-1", "need batteries", 1, "req-1").await.expect("ok"),
        );
        h.service.complete(&mission.id, "req-2").await.expect("complete");

        let action = h.service.track_action(&mission.id, MissionAction::AddToCart, "req-3").await;
        assert!(matches!(
            action,
            Err(ApplicationError::Domain(DomainError::MissionNotActive { .. }))
        ));

        let abandon = h.service.abandon(&mission.id, "req-4").await;
        assert!(matches!(
            abandon,
            Err(ApplicationError::Domain(DomainError::InvalidMissionLifecycle { .. }))
        ));
        assert!(h.audit.event_types().contains(&"mission.action_rejected".to_string()));
    }

    #[tokio::test]
    async fn insight_reports_urgency() {
        let h = harness();
        let mission = created(
            h.service.observe_message("u-1", "need batteries", 1, "req-1").await.expect("ok"),
        );
        h.clock.advance(Duration::hours(5));

        let insight = h.service.insight(&mission);
        assert_eq!(insight.minutes_remaining, 60);
        assert!(insight.near_abandonment);
        assert!(!insight.stuck);
    }

    impl Harness {
        fn clock_now(&self) -> chrono::DateTime<Utc> {
            use crate::clock::Clock;
            self.clock.now()
        }
    }
}
