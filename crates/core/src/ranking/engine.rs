//! Ranking engine implementation

use std::sync::Arc;

use tracing::debug;

use crate::domain::product::Product;

use super::matcher::{BrandMatcher, HeuristicBrandMatcher};
use super::scoring::ScoreCalculator;
use super::types::{RankedProduct, RankingInput};

/// Orders a product list for one shopper. Pure: same input, same output.
#[derive(Clone)]
pub struct RankingEngine {
    calculator: ScoreCalculator,
    matcher: Arc<dyn BrandMatcher>,
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicBrandMatcher))
    }
}

impl RankingEngine {
    pub fn new(matcher: Arc<dyn BrandMatcher>) -> Self {
        Self { calculator: ScoreCalculator::new(), matcher }
    }

    /// Scores every product, sorts by final score descending (ties keep input order) and
    /// assigns ranks starting at 1.
    pub fn rank(&self, products: &[Product], input: &RankingInput<'_>) -> Vec<RankedProduct> {
        let strategy = input.maturity.strategy();
        let matcher = self.matcher.as_ref();

        let mut ranked: Vec<RankedProduct> = products
            .iter()
            .map(|product| {
                let scores = self.calculator.component_scores(
                    product,
                    input.preferences,
                    input.history,
                    input.household,
                    matcher,
                );
                let score = self.calculator.final_score(&scores, &strategy);
                let (badges, match_reason) = self.calculator.explain(
                    product,
                    score,
                    input.preferences,
                    input.history,
                    matcher,
                );
                RankedProduct {
                    product: product.clone(),
                    rank: 0,
                    score,
                    personal_score: scores.personal,
                    popularity_score: scores.popularity,
                    value_score: scores.value,
                    match_reason,
                    badges,
                }
            })
            .collect();

        ranked.sort_by(|left, right| right.score.total_cmp(&left.score));
        for (index, item) in ranked.iter_mut().enumerate() {
            item.rank = index + 1;
        }

        debug!(
            event_name = "ranking.completed",
            user_id = %input.user_id,
            maturity_level = input.maturity.level.as_str(),
            products = ranked.len(),
            top_sku = ranked.first().map(|item| item.product.sku.as_str()).unwrap_or("none"),
            "products ranked"
        );
        ranked
    }

    /// Ranks and keeps the first `limit` results.
    pub fn top(
        &self,
        products: &[Product],
        input: &RankingInput<'_>,
        limit: usize,
    ) -> Vec<RankedProduct> {
        let mut ranked = self.rank(products, input);
        ranked.truncate(limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::RankingEngine;
    use crate::domain::product::{BulkDeal, Product};
    use crate::domain::shopper::{PreferenceType, PurchaseHistoryEntry, UserPreference};
    use crate::maturity::{compute_score, MaturityInputs, MaturityScore};
    use crate::ranking::types::{Badge, RankingInput};

    fn catalog() -> Vec<Product> {
        vec![
            Product::new("P-1", "Plain Rice", Decimal::new(300, 2), "Pantry"),
            Product::new("P-2", "Jasmine Rice", Decimal::new(300, 2), "Pantry"),
            Product::new("P-3", "Organic Brown Rice", Decimal::new(450, 2), "Pantry")
                .with_tags(["organic"]),
            Product::new("P-4", "Peanut Rice Crackers", Decimal::new(450, 2), "Snacks")
                .with_bulk_deal(BulkDeal {
                    quantity: 3,
                    bundle_price: Decimal::new(1100, 2),
                    savings: Decimal::new(250, 2),
                }),
        ]
    }

    fn emerging() -> MaturityScore {
        compute_score(
            &MaturityInputs { order_count: 25, ..MaturityInputs::default() },
            Utc::now(),
        )
    }

    #[test]
    fn ties_keep_input_order_and_ranks_are_contiguous() {
        let engine = RankingEngine::default();
        let maturity = MaturityScore::cold_start(Utc::now());
        let input = RankingInput {
            user_id: "u-1",
            maturity: &maturity,
            preferences: &[],
            history: &[],
            household: None,
        };

        let ranked = engine.rank(&catalog()[..2], &input);

        assert_eq!(ranked[0].product.sku, "P-1");
        assert_eq!(ranked[1].product.sku, "P-2");
        assert_eq!(ranked.iter().map(|item| item.rank).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn personal_signals_lift_products_for_mature_shoppers() {
        let engine = RankingEngine::default();
        let maturity = emerging();
        let preferences = vec![
            UserPreference::new(PreferenceType::Dietary, "organic", 0.9),
            UserPreference::new(PreferenceType::Allergy, "peanut", 1.0),
        ];
        let history = vec![PurchaseHistoryEntry {
            sku: "P-2".to_string(),
            purchase_count: 5,
            days_since_last: 12,
        }];
        let input = RankingInput {
            user_id: "u-1",
            maturity: &maturity,
            preferences: &preferences,
            history: &history,
            household: None,
        };

        let ranked = engine.rank(&catalog(), &input);

        assert_eq!(ranked[0].product.sku, "P-2");
        assert!(ranked[0].has_badge(Badge::UsualChoice));
        assert_eq!(ranked[1].product.sku, "P-3");
        assert!(ranked[1].has_badge(Badge::Organic));
        let vetoed = ranked.iter().find(|item| item.product.sku == "P-4").expect("present");
        assert_eq!(vetoed.personal_score, 0.0);
        assert_eq!(vetoed.rank, 4);
        assert_eq!(vetoed.badges, vec![Badge::BestValue]);
    }

    #[test]
    fn top_truncates() {
        let engine = RankingEngine::default();
        let maturity = MaturityScore::cold_start(Utc::now());
        let input = RankingInput {
            user_id: "u-1",
            maturity: &maturity,
            preferences: &[],
            history: &[],
            household: None,
        };

        assert_eq!(engine.top(&catalog(), &input, 2).len(), 2);
    }
}
