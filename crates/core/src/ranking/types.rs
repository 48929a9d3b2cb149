//! Types for the ranking engine

use serde::{Deserialize, Serialize};

use crate::domain::product::Product;
use crate::domain::shopper::{HouseholdContext, PurchaseHistoryEntry, UserPreference};
use crate::maturity::MaturityScore;

/// Badge shown next to a ranked product
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    Favorite,
    Organic,
    BestValue,
    New,
    UsualChoice,
    BrandMatch,
}

impl Badge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Favorite => "favorite",
            Self::Organic => "organic",
            Self::BestValue => "best_value",
            Self::New => "new",
            Self::UsualChoice => "usual_choice",
            Self::BrandMatch => "brand_match",
        }
    }
}

/// Everything known about the shopper for one ranking call
#[derive(Clone, Copy, Debug)]
pub struct RankingInput<'a> {
    /// Shopper being ranked for (used for logging only)
    pub user_id: &'a str,
    /// Maturity selects the accuracy/relevancy blend
    pub maturity: &'a MaturityScore,
    /// Stated and inferred preferences
    pub preferences: &'a [UserPreference],
    /// Purchase history keyed by SKU
    pub history: &'a [PurchaseHistoryEntry],
    /// Household facts; boosts apply only when at least one fact is known
    pub household: Option<&'a HouseholdContext>,
}

/// Component scores of a single product
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    /// Preference, history and household fit. Zero means vetoed.
    pub personal: f64,
    /// General appeal (deals, staple categories)
    pub popularity: f64,
    /// Price attractiveness
    pub value: f64,
}

/// A product with its position and explanation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedProduct {
    #[serde(flatten)]
    pub product: Product,
    /// 1-based position after sorting
    pub rank: usize,
    /// Blended final score
    pub score: f64,
    pub personal_score: f64,
    pub popularity_score: f64,
    pub value_score: f64,
    /// Human-readable reason for the top badge or score band
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_reason: Option<String>,
    #[serde(default)]
    pub badges: Vec<Badge>,
}

impl RankedProduct {
    pub fn has_badge(&self, badge: Badge) -> bool {
        self.badges.contains(&badge)
    }
}
