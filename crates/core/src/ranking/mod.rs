//! Personalized product ranking
//!
//! Each product gets three component scores (personal fit, popularity, value) that are blended
//! with the shopper's maturity strategy, then sorted, badged and explained.

mod engine;
mod matcher;
mod scoring;
mod types;

pub use engine::RankingEngine;
pub use matcher::{BrandMatcher, HeuristicBrandMatcher};
pub use scoring::{ScoreCalculator, VALUE_WEIGHT};
pub use types::{Badge, ComponentScores, RankedProduct, RankingInput};
