//! Scoring algorithms for ranked products

use crate::domain::product::Product;
use crate::domain::shopper::{
    HouseholdContext, HouseholdRole, PreferenceType, PurchaseHistoryEntry, UserPreference,
};
use crate::maturity::RecommendationStrategy;

use super::matcher::BrandMatcher;
use super::types::{Badge, ComponentScores};

/// Weight of the value component in the final blend
pub const VALUE_WEIGHT: f64 = 0.1;

const STAPLE_CATEGORIES: &[&str] = &["dairy", "produce", "bakery", "meat"];
const BABY_SIGNALS: &[&str] = &["baby", "infant"];
const TODDLER_SIGNALS: &[&str] = &["toddler", "kids"];
const ACTIVE_SIGNALS: &[&str] = &["health", "produce", "protein"];

/// Score calculator for ranked products
#[derive(Clone, Copy, Debug, Default)]
pub struct ScoreCalculator;

impl ScoreCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Calculate every component for one product
    pub fn component_scores(
        &self,
        product: &Product,
        preferences: &[UserPreference],
        history: &[PurchaseHistoryEntry],
        household: Option<&HouseholdContext>,
        matcher: &dyn BrandMatcher,
    ) -> ComponentScores {
        ComponentScores {
            personal: self.personal_score(product, preferences, history, household, matcher),
            popularity: self.popularity_score(product),
            value: self.value_score(product),
        }
    }

    /// Calculate the blended score for a strategy
    pub fn final_score(&self, scores: &ComponentScores, strategy: &RecommendationStrategy) -> f64 {
        scores.personal * strategy.accuracy_weight
            + scores.popularity * strategy.relevancy_weight
            + scores.value * VALUE_WEIGHT
    }

    /// Calculate personal fit. An allergy match returns 0 before any other signal is considered.
    pub fn personal_score(
        &self,
        product: &Product,
        preferences: &[UserPreference],
        history: &[PurchaseHistoryEntry],
        household: Option<&HouseholdContext>,
        matcher: &dyn BrandMatcher,
    ) -> f64 {
        if is_vetoed(product, preferences) {
            return 0.0;
        }

        let mut score = 1.0;
        let mut disliked = false;

        for preference in preferences {
            let confidence = preference.confidence;
            match preference.preference_type {
                PreferenceType::Dislike if product.mentions(&preference.key) => disliked = true,
                PreferenceType::Brand if matcher.matches(product, &preference.key) => {
                    score *= 1.0 + confidence * 0.5;
                }
                PreferenceType::Dietary if product.mentions(&preference.key) => {
                    score *= 1.0 + confidence * 0.3;
                }
                PreferenceType::Favorite if is_favorite(product, preference) => {
                    score *= 1.0 + confidence * 0.6;
                }
                _ => {}
            }
        }
        if disliked {
            score *= 0.2;
        }

        if let Some(entry) = history_for(product, history) {
            score *= 1.0 + (f64::from(entry.purchase_count) + 1.0).ln() * 0.2;
            if entry.days_since_last < 30 {
                score *= 1.2;
            }
        }

        if let Some(household) = household.filter(|context| context.has_discovered_facts()) {
            score *= household_boost(product, household);
        }

        score
    }

    /// Calculate general appeal
    pub fn popularity_score(&self, product: &Product) -> f64 {
        let mut score = 1.0;
        if product.bulk_deal.is_some() {
            score *= 1.3;
        }
        let category = product.category.to_lowercase();
        if STAPLE_CATEGORIES.iter().any(|staple| category.contains(staple)) {
            score *= 1.2;
        }
        score
    }

    /// Calculate price attractiveness
    pub fn value_score(&self, product: &Product) -> f64 {
        let mut score = 1.0;
        let price = product.price_f64();
        let savings = product.bulk_savings();
        if product.bulk_deal.is_some() && savings > 0.0 && price > 0.0 {
            score *= 1.0 + (savings / price) * 0.5;
        }
        if price < 5.0 {
            score *= 1.2;
        }
        if price > 15.0 {
            score *= 0.9;
        }
        score
    }

    /// Determine badges and the match reason. Badges come first in priority order (favorite,
    /// usual choice, brand, organic, best value) and the first one names the reason. Without
    /// one, the final score band provides the reason. An allergy veto zeroes the score only;
    /// badges are still derived from the product facts.
    pub fn explain(
        &self,
        product: &Product,
        final_score: f64,
        preferences: &[UserPreference],
        history: &[PurchaseHistoryEntry],
        matcher: &dyn BrandMatcher,
    ) -> (Vec<Badge>, Option<String>) {
        let mut badges = Vec::new();
        let mut reason = None;

        let mut award = |badge: Badge, text: String| {
            if reason.is_none() {
                reason = Some(text);
            }
            badges.push(badge);
        };

        if preferences.iter().any(|preference| {
            preference.preference_type == PreferenceType::Favorite
                && is_favorite(product, preference)
        }) {
            award(Badge::Favorite, "One of your favorites".to_string());
        }

        if let Some(entry) = history_for(product, history) {
            if entry.purchase_count >= 3 {
                award(
                    Badge::UsualChoice,
                    format!("Your usual choice (bought {} times)", entry.purchase_count),
                );
            }
        }

        if let Some(brand) = preferences.iter().find(|preference| {
            preference.preference_type == PreferenceType::Brand
                && preference.confidence > 0.6
                && matcher.matches(product, &preference.key)
        }) {
            award(Badge::BrandMatch, format!("From {}, a brand you like", brand.key.trim()));
        }

        let wants_organic = preferences.iter().any(|preference| {
            preference.preference_type == PreferenceType::Dietary
                && preference.normalized_key() == "organic"
                && preference.confidence > 0.5
        });
        if wants_organic && product.is_organic() {
            award(Badge::Organic, "Organic, matching your preference".to_string());
        }

        let savings = product.bulk_savings();
        if savings > 2.0 {
            award(Badge::BestValue, format!("Bulk deal saves ${savings:.2}"));
        }

        if is_new_arrival(product) {
            badges.push(Badge::New);
        }

        let reason = reason.or_else(|| score_band(final_score).map(str::to_string));
        (badges, reason)
    }
}

fn is_vetoed(product: &Product, preferences: &[UserPreference]) -> bool {
    preferences.iter().any(|preference| {
        preference.preference_type == PreferenceType::Allergy && product.mentions(&preference.key)
    })
}

fn is_favorite(product: &Product, preference: &UserPreference) -> bool {
    let key = preference.normalized_key();
    let name_match = !key.is_empty() && product.name.trim().to_lowercase() == key;
    let sku_match = preference.value.as_deref().map(str::trim) == Some(product.sku.as_str());
    name_match || sku_match
}

fn history_for<'a>(
    product: &Product,
    history: &'a [PurchaseHistoryEntry],
) -> Option<&'a PurchaseHistoryEntry> {
    history.iter().find(|entry| entry.sku == product.sku)
}

fn household_boost(product: &Product, household: &HouseholdContext) -> f64 {
    let mut boost = 1.0;

    for pet in &household.pets {
        if product.mentions(&pet.pet_type) {
            boost *= 1.0 + pet.confidence.clamp(0.0, 1.0) * 0.4;
        }
    }
    if household.has_role(HouseholdRole::Baby) && product.signals_any(BABY_SIGNALS) {
        boost *= 1.5;
    }
    if household.has_role(HouseholdRole::Toddler) && product.signals_any(TODDLER_SIGNALS) {
        boost *= 1.4;
    }
    if household.prefers_organic() && product.is_organic() {
        boost *= 1.3;
    }
    if household.is_active() && product.signals_any(ACTIVE_SIGNALS) {
        boost *= 1.2;
    }

    boost
}

fn is_new_arrival(product: &Product) -> bool {
    product.tags.iter().any(|tag| {
        let tag = tag.trim().to_lowercase();
        tag == "new" || tag == "new_arrival"
    })
}

fn score_band(score: f64) -> Option<&'static str> {
    if score > 2.0 {
        Some("Highly recommended for you")
    } else if score > 1.5 {
        Some("Recommended for you")
    } else if score > 1.2 {
        Some("Similar to what you buy")
    } else {
        None
    }
}
