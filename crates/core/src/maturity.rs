//! Engagement maturity of a shopper.
//!
//! The score (0 to 100) is the sum of four capped components:
//! purchases `min(orders * 2, 50)`, preferences `min(count * 3, 30)`, confidence
//! `avg_confidence * 15` and tenure `min(days_since_first_order / 3, 5)`. It selects one of five
//! levels, and each level carries the recommendation strategy the ranking engine blends with.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::config::MAX_MATURITY_CACHE_TTL_SECS;
use crate::errors::ApplicationError;

pub const DEFAULT_MATURITY_TTL_SECS: u64 = 3_600;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaturityLevel {
    ColdStart,
    Onboarding,
    Emerging,
    Established,
    PowerUser,
}

impl MaturityLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 10.0 {
            Self::ColdStart
        } else if score < 30.0 {
            Self::Onboarding
        } else if score < 60.0 {
            Self::Emerging
        } else if score < 85.0 {
            Self::Established
        } else {
            Self::PowerUser
        }
    }

    pub fn strategy(&self) -> RecommendationStrategy {
        let (accuracy_weight, relevancy_weight, ask_frequency, show_confidence) = match self {
            Self::ColdStart => (0.2, 0.8, AskFrequency::High, true),
            Self::Onboarding => (0.5, 0.5, AskFrequency::Medium, true),
            Self::Emerging => (0.7, 0.3, AskFrequency::Low, false),
            Self::Established => (0.85, 0.15, AskFrequency::Minimal, false),
            Self::PowerUser => (0.95, 0.05, AskFrequency::Minimal, false),
        };
        RecommendationStrategy { accuracy_weight, relevancy_weight, ask_frequency, show_confidence }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ColdStart => "cold_start",
            Self::Onboarding => "onboarding",
            Self::Emerging => "emerging",
            Self::Established => "established",
            Self::PowerUser => "power_user",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AskFrequency {
    High,
    Medium,
    Low,
    Minimal,
}

/// How much ranking trusts personal signals (`accuracy_weight`) versus general appeal
/// (`relevancy_weight`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationStrategy {
    pub accuracy_weight: f64,
    pub relevancy_weight: f64,
    pub ask_frequency: AskFrequency,
    pub show_confidence: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaturityBreakdown {
    pub purchase_count: u32,
    pub preference_count: u32,
    pub avg_confidence: f64,
    pub days_since_first_purchase: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaturityScore {
    pub level: MaturityLevel,
    pub score: f64,
    pub breakdown: MaturityBreakdown,
    pub calculated_at: DateTime<Utc>,
}

impl MaturityScore {
    pub fn strategy(&self) -> RecommendationStrategy {
        self.level.strategy()
    }

    /// Score of a shopper the engine knows nothing about.
    pub fn cold_start(now: DateTime<Utc>) -> Self {
        compute_score(&MaturityInputs::default(), now)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreferenceSignal {
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Raw engagement facts for one shopper.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MaturityInputs {
    pub order_count: u32,
    pub preferences: Vec<PreferenceSignal>,
    pub first_order_at: Option<DateTime<Utc>>,
}

pub fn compute_score(inputs: &MaturityInputs, now: DateTime<Utc>) -> MaturityScore {
    let preference_count = u32::try_from(inputs.preferences.len()).unwrap_or(u32::MAX);
    let avg_confidence = if inputs.preferences.is_empty() {
        0.0
    } else {
        inputs
            .preferences
            .iter()
            .map(|preference| preference.confidence.clamp(0.0, 1.0))
            .sum::<f64>()
            / inputs.preferences.len() as f64
    };
    let days_since_first_purchase = inputs
        .first_order_at
        .map(|first| (now - first).num_days().max(0))
        .unwrap_or(0);

    let purchase_score = (f64::from(inputs.order_count) * 2.0).min(50.0);
    let preference_score = (f64::from(preference_count) * 3.0).min(30.0);
    let confidence_score = avg_confidence * 15.0;
    let tenure_score = (days_since_first_purchase as f64 / 3.0).min(5.0);

    let total = purchase_score + preference_score + confidence_score + tenure_score;
    let score = (total * 10.0).round() / 10.0;

    MaturityScore {
        level: MaturityLevel::from_score(score),
        score,
        breakdown: MaturityBreakdown {
            purchase_count: inputs.order_count,
            preference_count,
            avg_confidence,
            days_since_first_purchase,
        },
        calculated_at: now,
    }
}

#[async_trait]
pub trait MaturitySource: Send + Sync {
    async fn maturity_inputs(&self, user_id: &str) -> Result<MaturityInputs, ApplicationError>;
}

#[derive(Default)]
pub struct InMemoryMaturitySource {
    inputs: RwLock<HashMap<String, MaturityInputs>>,
}

impl InMemoryMaturitySource {
    pub async fn set(&self, user_id: impl Into<String>, inputs: MaturityInputs) {
        self.inputs.write().await.insert(user_id.into(), inputs);
    }
}

#[async_trait]
impl MaturitySource for InMemoryMaturitySource {
    async fn maturity_inputs(&self, user_id: &str) -> Result<MaturityInputs, ApplicationError> {
        Ok(self.inputs.read().await.get(user_id).cloned().unwrap_or_default())
    }
}

/// Per-user maturity with a TTL cache in front of the source. Writers that change a user's
/// orders or preferences call [`MaturityScorer::invalidate`].
pub struct MaturityScorer {
    source: Arc<dyn MaturitySource>,
    cache: TtlCache<String, MaturityScore>,
    clock: Arc<dyn Clock>,
}

impl MaturityScorer {
    pub fn new(source: Arc<dyn MaturitySource>, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(source, clock, DEFAULT_MATURITY_TTL_SECS)
    }

    pub fn with_ttl(source: Arc<dyn MaturitySource>, clock: Arc<dyn Clock>, ttl_secs: u64) -> Self {
        let secs = i64::try_from(ttl_secs.min(MAX_MATURITY_CACHE_TTL_SECS)).unwrap_or(0);
        let ttl = Duration::seconds(secs);
        Self { source, cache: TtlCache::new(ttl, clock.clone()), clock }
    }

    pub async fn score(&self, user_id: &str) -> Result<MaturityScore, ApplicationError> {
        let key = user_id.to_string();
        if let Some(cached) = self.cache.get(&key) {
            debug!(event_name = "maturity.cache.hit", user_id = %user_id, "maturity cache hit");
            return Ok(cached);
        }

        let inputs = self.source.maturity_inputs(user_id).await?;
        let score = compute_score(&inputs, self.clock.now());
        self.cache.insert(key, score.clone());

        info!(
            event_name = "maturity.calculated",
            user_id = %user_id,
            level = score.level.as_str(),
            score = score.score,
            "maturity score calculated"
        );
        Ok(score)
    }

    pub fn invalidate(&self, user_id: &str) -> bool {
        let removed = self.cache.invalidate(&user_id.to_string());
        if removed {
            debug!(
                event_name = "maturity.cache.invalidated",
                user_id = %user_id,
                "maturity cache entry dropped"
            );
        }
        removed
    }
}
