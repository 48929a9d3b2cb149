use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;

use cartwise_core::maturity::{compute_score, MaturityInputs, MaturityLevel, PreferenceSignal};
use cartwise_core::ranking::{Badge, RankingEngine, RankingInput};
use cartwise_core::{MaturityScore, PreferenceType, Product, PurchaseHistoryEntry, UserPreference};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).single().expect("valid instant")
}

fn maturity(order_count: u32) -> MaturityScore {
    compute_score(&MaturityInputs { order_count, ..MaturityInputs::default() }, now())
}

prop_compose! {
    fn product_strategy(index: usize)(
        cents in 50i64..5_000,
        organic in any::<bool>(),
        peanut in any::<bool>(),
    ) -> Product {
        let mut tags = vec!["snacks".to_string()];
        if organic {
            tags.push("organic".to_string());
        }
        if peanut {
            tags.push("contains peanut".to_string());
        }
        Product::new(format!("SKU-{index}"), format!("Snack {index}"), Decimal::new(cents, 2), "Snacks")
            .with_tags(tags)
    }
}

fn catalog_strategy() -> impl Strategy<Value = Vec<Product>> {
    (1usize..12).prop_flat_map(|len| {
        (0..len).map(product_strategy).collect::<Vec<_>>()
    })
}

proptest! {
    #[test]
    fn allergens_are_always_vetoed(products in catalog_strategy(), orders in 0u32..60) {
        let preferences = vec![
            UserPreference::new(PreferenceType::Allergy, "peanut", 0.1),
            UserPreference::new(PreferenceType::Favorite, "snack 0", 1.0),
            UserPreference::new(PreferenceType::Dietary, "organic", 0.9),
        ];
        let history: Vec<PurchaseHistoryEntry> = products
            .iter()
            .map(|product| PurchaseHistoryEntry {
                sku: product.sku.clone(),
                purchase_count: 5,
                days_since_last: 3,
            })
            .collect();
        let score = maturity(orders);
        let input = RankingInput {
            user_id: "shopper-1",
            maturity: &score,
            preferences: &preferences,
            history: &history,
            household: None,
        };

        for ranked in RankingEngine::default().rank(&products, &input) {
            if ranked.product.mentions("peanut") {
                prop_assert_eq!(ranked.personal_score, 0.0);
                prop_assert!(ranked.badges.iter().all(|badge| *badge == Badge::New));
            } else {
                prop_assert!(ranked.personal_score > 0.0);
            }
        }
    }

    #[test]
    fn ranking_is_deterministic_and_dense(products in catalog_strategy(), orders in 0u32..60) {
        let score = maturity(orders);
        let input = RankingInput {
            user_id: "shopper-2",
            maturity: &score,
            preferences: &[],
            history: &[],
            household: None,
        };
        let engine = RankingEngine::default();

        let first = engine.rank(&products, &input);
        let second = engine.rank(&products, &input);
        prop_assert_eq!(&first, &second);

        let ranks: Vec<usize> = first.iter().map(|ranked| ranked.rank).collect();
        prop_assert_eq!(ranks, (1..=products.len()).collect::<Vec<_>>());
        prop_assert!(first.windows(2).all(|pair| pair[0].score >= pair[1].score));
    }

    #[test]
    fn equal_scores_keep_input_order(copies in 2usize..10) {
        let products: Vec<Product> = (0..copies)
            .map(|index| Product::new(format!("SKU-{index}"), "Oat Milk", Decimal::new(399, 2), "Dairy"))
            .collect();
        let score = maturity(0);
        let input = RankingInput {
            user_id: "shopper-3",
            maturity: &score,
            preferences: &[],
            history: &[],
            household: None,
        };

        let skus: Vec<String> = RankingEngine::default()
            .rank(&products, &input)
            .into_iter()
            .map(|ranked| ranked.product.sku)
            .collect();
        let expected: Vec<String> = products.iter().map(|product| product.sku.clone()).collect();
        prop_assert_eq!(skus, expected);
    }

    #[test]
    fn maturity_is_bounded(
        orders in 0u32..500,
        confidences in proptest::collection::vec(0.0f64..=1.0, 0..40),
        tenure_days in proptest::option::of(0i64..2_000),
    ) {
        let inputs = MaturityInputs {
            order_count: orders,
            preferences: confidences
                .into_iter()
                .map(|confidence| PreferenceSignal { confidence, created_at: now() })
                .collect(),
            first_order_at: tenure_days.map(|days| now() - Duration::days(days)),
        };
        let score = compute_score(&inputs, now());
        prop_assert!((0.0..=100.0).contains(&score.score));
        prop_assert_eq!(score.level, MaturityLevel::from_score(score.score));
    }

    #[test]
    fn maturity_grows_with_orders_and_tenure(
        orders in 0u32..100,
        extra_orders in 0u32..100,
        days in 0i64..60,
        extra_days in 0i64..60,
    ) {
        let preferences = vec![PreferenceSignal { confidence: 0.7, created_at: now() }];
        let base = compute_score(
            &MaturityInputs {
                order_count: orders,
                preferences: preferences.clone(),
                first_order_at: Some(now() - Duration::days(days)),
            },
            now(),
        );
        let grown = compute_score(
            &MaturityInputs {
                order_count: orders + extra_orders,
                preferences,
                first_order_at: Some(now() - Duration::days(days + extra_days)),
            },
            now(),
        );
        prop_assert!(grown.score >= base.score);
        prop_assert!(grown.level >= base.level);
    }
}

#[test]
fn level_boundaries() {
    let cases = [
        (9.9, MaturityLevel::ColdStart),
        (10.0, MaturityLevel::Onboarding),
        (29.9, MaturityLevel::Onboarding),
        (30.0, MaturityLevel::Emerging),
        (59.9, MaturityLevel::Emerging),
        (60.0, MaturityLevel::Established),
        (84.9, MaturityLevel::Established),
        (85.0, MaturityLevel::PowerUser),
    ];
    for (score, level) in cases {
        assert_eq!(MaturityLevel::from_score(score), level, "score {score}");
    }
}
