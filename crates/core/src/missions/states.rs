use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissionId(pub String);

impl MissionId {
    pub fn generate() -> Self {
        Self(format!("mission-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionType {
    Precision,
    Essentials,
    Recipe,
    Event,
    Research,
}

impl MissionType {
    /// Hours of inactivity after which a mission of this type may be abandoned.
    pub fn abandon_threshold_hours(&self) -> u32 {
        match self {
            Self::Precision => 6,
            Self::Essentials => 24,
            Self::Recipe | Self::Event | Self::Research => 168,
        }
    }

    pub fn detection_confidence(&self) -> f64 {
        match self {
            Self::Precision => 0.85,
            Self::Essentials => 0.75,
            Self::Recipe | Self::Event => 0.90,
            Self::Research => 0.85,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precision => "precision",
            Self::Essentials => "essentials",
            Self::Recipe => "recipe",
            Self::Event => "event",
            Self::Research => "research",
        }
    }
}

impl std::str::FromStr for MissionType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "precision" => Ok(Self::Precision),
            "essentials" => Ok(Self::Essentials),
            "recipe" => Ok(Self::Recipe),
            "event" => Ok(Self::Event),
            "research" => Ok(Self::Research),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown mission type `{other}`")))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Active,
    Completed,
    Abandoned,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::str::FromStr for MissionStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "abandoned" => Ok(Self::Abandoned),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown mission status `{other}`")))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    Arriving,
    Browsing,
    Comparing,
    Decided,
    Checkout,
}

impl FunnelStage {
    pub const ALL: [FunnelStage; 5] =
        [Self::Arriving, Self::Browsing, Self::Comparing, Self::Decided, Self::Checkout];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arriving => "arriving",
            Self::Browsing => "browsing",
            Self::Comparing => "comparing",
            Self::Decided => "decided",
            Self::Checkout => "checkout",
        }
    }
}

impl std::str::FromStr for FunnelStage {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "arriving" => Ok(Self::Arriving),
            "browsing" => Ok(Self::Browsing),
            "comparing" => Ok(Self::Comparing),
            "decided" => Ok(Self::Decided),
            "checkout" => Ok(Self::Checkout),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown funnel stage `{other}`")))
            }
        }
    }
}

/// Observed shopper action fed to the funnel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionAction {
    ViewItem,
    AddToCart,
    Question,
    Message,
    Checkout,
}

impl MissionAction {
    pub const ALL: [MissionAction; 5] =
        [Self::ViewItem, Self::AddToCart, Self::Question, Self::Message, Self::Checkout];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewItem => "view_item",
            Self::AddToCart => "add_to_cart",
            Self::Question => "question",
            Self::Message => "message",
            Self::Checkout => "checkout",
        }
    }
}

impl std::str::FromStr for MissionAction {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "view_item" => Ok(Self::ViewItem),
            "add_to_cart" => Ok(Self::AddToCart),
            "question" => Ok(Self::Question),
            "message" => Ok(Self::Message),
            "checkout" => Ok(Self::Checkout),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown mission action `{other}`")))
            }
        }
    }
}

/// A shopper's current intent, tracked across chat turns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub user_id: String,
    pub query: String,
    pub mission_type: MissionType,
    pub status: MissionStatus,
    pub funnel_stage: FunnelStage,
    pub items_viewed: u32,
    pub items_added: u32,
    pub questions_asked: u32,
    pub last_active_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    pub abandoned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Copied from the mission type at creation and never recomputed.
    pub abandon_threshold_hours: u32,
    pub detection_confidence: f64,
    pub expected_next_action: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Mission {
    pub fn new(
        user_id: impl Into<String>,
        query: impl Into<String>,
        mission_type: MissionType,
        detection_confidence: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MissionId::generate(),
            user_id: user_id.into(),
            query: query.into(),
            mission_type,
            status: MissionStatus::Active,
            funnel_stage: FunnelStage::Arriving,
            items_viewed: 0,
            items_added: 0,
            questions_asked: 0,
            last_active_at: now,
            paused_at: None,
            abandoned_at: None,
            completed_at: None,
            abandon_threshold_hours: mission_type.abandon_threshold_hours(),
            detection_confidence,
            expected_next_action: None,
            created_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MissionStatus::Active
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn abandon_threshold(&self) -> Duration {
        Duration::hours(i64::from(self.abandon_threshold_hours))
    }

    pub fn inactive_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_active_at
    }

    /// Active missions become abandon-eligible once inactivity reaches the threshold.
    pub fn is_abandon_eligible(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.inactive_for(now) >= self.abandon_threshold()
    }

    /// Time left before abandonment, never negative.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        let remaining = self.abandon_threshold() - self.inactive_for(now);
        if remaining < Duration::zero() {
            Duration::zero()
        } else {
            remaining
        }
    }

    /// Advisory: at most a quarter of the threshold is left.
    pub fn is_near_abandonment(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        let quarter = self.abandon_threshold() / 4;
        self.time_remaining(now) <= quarter
    }

    /// Advisory: plenty of questions, nothing in the cart, still browsing.
    pub fn is_stuck(&self) -> bool {
        self.questions_asked >= 3
            && self.items_added == 0
            && self.funnel_stage == FunnelStage::Browsing
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{FunnelStage, Mission, MissionAction, MissionStatus, MissionType};

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).single().expect("valid instant")
    }

    #[test]
    fn thresholds_are_fixed_per_type() {
        assert_eq!(MissionType::Precision.abandon_threshold_hours(), 6);
        assert_eq!(MissionType::Essentials.abandon_threshold_hours(), 24);
        assert_eq!(MissionType::Recipe.abandon_threshold_hours(), 168);
        assert_eq!(MissionType::Event.abandon_threshold_hours(), 168);
        assert_eq!(MissionType::Research.abandon_threshold_hours(), 168);
    }

    #[test]
    fn precision_mission_is_eligible_at_exactly_six_hours() {
        let mission = Mission::new("u-1", "need batteries", MissionType::Precision, 0.85, start());

        let almost = start() + Duration::hours(5) + Duration::minutes(59);
        assert!(!mission.is_abandon_eligible(almost));
        assert!(mission.is_abandon_eligible(start() + Duration::hours(6)));
    }

    #[test]
    fn near_abandonment_starts_in_last_quarter() {
        let mission = Mission::new("u-1", "weekly groceries", MissionType::Essentials, 0.75, start());

        assert!(!mission.is_near_abandonment(start() + Duration::hours(17)));
        assert!(mission.is_near_abandonment(start() + Duration::hours(18)));
        assert_eq!(mission.time_remaining(start() + Duration::hours(30)), Duration::zero());
    }

    #[test]
    fn finished_missions_are_never_eligible() {
        let mut mission =
            Mission::new("u-1", "need batteries", MissionType::Precision, 0.85, start());
        mission.status = MissionStatus::Completed;

        assert!(!mission.is_abandon_eligible(start() + Duration::days(30)));
        assert!(!mission.is_near_abandonment(start() + Duration::days(30)));
    }

    #[test]
    fn stuck_requires_browsing_with_questions_and_empty_cart() {
        let mut mission = Mission::new("u-1", "best tv", MissionType::Research, 0.85, start());
        mission.funnel_stage = FunnelStage::Browsing;
        mission.questions_asked = 3;
        assert!(mission.is_stuck());

        mission.items_added = 1;
        assert!(!mission.is_stuck());
    }

    #[test]
    fn action_names_parse_back() {
        for action in MissionAction::ALL {
            assert_eq!(action.as_str().parse::<MissionAction>(), Ok(action));
        }
    }
}
