pub mod analyzer;
pub mod audit;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod llm;
pub mod maturity;
pub mod missions;
pub mod profile;
pub mod ranking;
pub mod trees;

pub use analyzer::{CatalogAnalysis, CatalogAnalyzer, CatalogAttribute, SuggestedQuestion};
pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
pub use catalog::{CatalogAccessor, InMemoryCatalog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::product::{BulkDeal, Product};
pub use domain::shopper::{
    HouseholdContext, PreferenceType, PurchaseHistoryEntry, UserPreference,
};
pub use domain::tree::{DecisionTree, GeneratedTree, ProductFilter};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use llm::{GenerationError, GenerationParams, TextGenerator};
pub use maturity::{MaturityLevel, MaturityScore, MaturityScorer, RecommendationStrategy};
pub use missions::{FunnelStage, Mission, MissionAction, MissionService, MissionStatus, MissionType};
pub use profile::{ShopperProfile, ShopperProfileStore};
pub use ranking::{Badge, RankedProduct, RankingEngine, RankingInput};
pub use trees::{TreeError, TreeGenerator, TreeRegistry, TriggerMatcher};
