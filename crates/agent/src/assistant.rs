use std::sync::Arc;

use anyhow::{Context, Result};
use cartwise_core::audit::{emit_best_effort, AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use cartwise_core::catalog::CatalogAccessor;
use cartwise_core::config::PersonalizationConfig;
use cartwise_core::domain::product::Product;
use cartwise_core::domain::tree::{apply_filters, GeneratedQuestion, ProductFilter};
use cartwise_core::maturity::{MaturityScore, MaturityScorer};
use cartwise_core::missions::{
    Mission, MissionAction, MissionInsight, MissionObservation, MissionService, MissionType,
};
use cartwise_core::profile::ShopperProfileStore;
use cartwise_core::ranking::{RankedProduct, RankingEngine, RankingInput};
use cartwise_core::trees::{
    GenerateOptions, GeneratedTreeSession, TreeError, TreeGenerator, TreeRegistry, TreeSession,
    TriggerContext, WalkStep,
};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct AssistantSettings {
    pub min_trigger_confidence: f64,
    pub max_recommendations: usize,
    pub max_questions: usize,
}

impl AssistantSettings {
    pub fn from_config(config: &PersonalizationConfig) -> Self {
        Self {
            min_trigger_confidence: config.min_trigger_confidence,
            max_recommendations: config.max_recommendations.max(1),
            max_questions: config.max_questions.max(1),
        }
    }
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self::from_config(&PersonalizationConfig::default())
    }
}

/// Everything the assistant talks to.
pub struct AssistantParts {
    pub catalog: Arc<dyn CatalogAccessor>,
    pub missions: MissionService,
    pub registry: TreeRegistry,
    pub generator: TreeGenerator,
    pub profiles: Arc<dyn ShopperProfileStore>,
    pub maturity: MaturityScorer,
    pub ranking: RankingEngine,
    pub audit: Arc<dyn AuditSink>,
    pub settings: AssistantSettings,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnContext {
    pub current_category: Option<String>,
    /// Messages in the conversation so far, this one included.
    pub message_count: usize,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuestionPrompt {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
}

impl QuestionPrompt {
    fn of_generated(question: &GeneratedQuestion) -> Self {
        Self {
            id: question.id.clone(),
            text: question.text.clone(),
            options: question.options.iter().map(|option| option.label.clone()).collect(),
        }
    }
}

/// Guided flow offered for a turn.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeActivation {
    None,
    Static { tree_id: String, confidence: f64, question: QuestionPrompt },
    Generated { tree_id: String, category: String, question: QuestionPrompt },
    /// Generation failed; the chat layer answers in plain text.
    Fallback { category: String, message: String },
}

impl TreeActivation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Static { .. } => "static",
            Self::Generated { .. } => "generated",
            Self::Fallback { .. } => "fallback",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub mission: Option<Mission>,
    pub insight: Option<MissionInsight>,
    pub maturity: MaturityScore,
    pub tree: TreeActivation,
    pub category: Option<String>,
    pub recommendations: Vec<RankedProduct>,
}

/// Ranked result of a finished (or partially answered) tree.
#[derive(Clone, Debug)]
pub struct Recommendations {
    pub filters: Vec<ProductFilter>,
    /// True when the filters matched nothing and the whole category was ranked instead.
    pub relaxed: bool,
    pub products: Vec<RankedProduct>,
}

pub struct ShoppingAssistant {
    parts: AssistantParts,
}

impl ShoppingAssistant {
    pub fn new(parts: AssistantParts) -> Self {
        Self { parts }
    }

    pub fn settings(&self) -> &AssistantSettings {
        &self.parts.settings
    }

    /// One chat turn: mission tracking, tree activation, then ranking for the turn's category.
    pub async fn handle_turn(
        &self,
        user_id: &str,
        text: &str,
        context: &TurnContext,
    ) -> Result<TurnOutcome> {
        let correlation_id = context.correlation_id.as_str();
        let observation = self
            .parts
            .missions
            .observe_message(user_id, text, context.message_count, correlation_id)
            .await
            .context("mission tracking failed")?;
        let mut mission = observation.mission().cloned();

        let (tree, tree_category) = self.activate_tree(text, context, mission.as_ref()).await?;
        if let (Some(current), TreeActivation::Static { .. } | TreeActivation::Generated { .. }) =
            (mission.as_ref(), &tree)
        {
            let (updated, _) = self
                .parts
                .missions
                .track_action(&current.id, MissionAction::Question, correlation_id)
                .await
                .context("mission question tracking failed")?;
            mission = Some(updated);
        }

        let category = context
            .current_category
            .clone()
            .filter(|category| !category.trim().is_empty())
            .or(tree_category);
        let maturity = self.parts.maturity.score(user_id).await?;
        let recommendations = match category.as_deref() {
            Some(category) => {
                let products = self.parts.catalog.lookup(category);
                self.rank(user_id, &products, &maturity, self.parts.settings.max_recommendations)
                    .await?
            }
            None => Vec::new(),
        };

        info!(
            event_name = "assistant.turn_completed",
            correlation_id = %correlation_id,
            user_id = %user_id,
            mission_created = matches!(observation, MissionObservation::Created { .. }),
            tree = tree.kind(),
            recommendations = recommendations.len(),
            maturity_level = maturity.level.as_str(),
            "chat turn handled"
        );
        let mut event = AuditEvent::new(
            Some(user_id.to_string()),
            correlation_id,
            "assistant.turn",
            AuditCategory::Ranking,
            AuditOutcome::Success,
        )
        .with_metadata("tree", tree.kind())
        .with_metadata("recommendations", recommendations.len().to_string())
        .with_metadata("maturity_level", maturity.level.as_str());
        if let Some(mission) = mission.as_ref() {
            event = event.with_mission(mission.id.0.clone());
        }
        emit_best_effort(self.parts.audit.as_ref(), event).await;

        let insight = mission.as_ref().map(|mission| self.parts.missions.insight(mission));
        Ok(TurnOutcome { mission, insight, maturity, tree, category, recommendations })
    }

    /// Walks a static tree with the given answers and ranks the filtered category.
    pub async fn recommend_from_static_tree(
        &self,
        user_id: &str,
        tree_id: &str,
        category: Option<&str>,
        answers: &[String],
    ) -> Result<Recommendations> {
        let entry = self
            .parts
            .registry
            .get(tree_id)
            .with_context(|| format!("unknown decision tree `{tree_id}`"))?;
        let mut session = TreeSession::start(&entry.tree)?;
        for answer in answers {
            session.answer(answer)?;
        }

        let category = category.unwrap_or(entry.tree.category.as_str());
        let limit = session
            .max_results()
            .unwrap_or(self.parts.settings.max_recommendations)
            .min(self.parts.settings.max_recommendations);
        let filters = session.filters().to_vec();
        self.recommend_filtered(user_id, category, filters, limit).await
    }

    /// Same as [`Self::recommend_from_static_tree`] for the cached generated tree of a category.
    pub async fn recommend_from_generated_tree(
        &self,
        user_id: &str,
        category: &str,
        answers: &[String],
    ) -> Result<Recommendations> {
        let tree = self.parts.generator.get_or_generate(category, self.generate_options()).await?;
        let mut session = GeneratedTreeSession::new(&tree);
        for answer in answers {
            session.answer(answer)?;
        }
        let filters = session.filters();
        self.recommend_filtered(user_id, category, filters, self.parts.settings.max_recommendations)
            .await
    }

    async fn activate_tree(
        &self,
        text: &str,
        context: &TurnContext,
        mission: Option<&Mission>,
    ) -> Result<(TreeActivation, Option<String>)> {
        let trigger_context = TriggerContext { current_category: context.current_category.clone() };
        if let Some((entry, found)) = self.parts.registry.match_query(text, &trigger_context) {
            if found.confidence + 1e-9 >= self.parts.settings.min_trigger_confidence {
                let session = TreeSession::start(&entry.tree)?;
                if let WalkStep::Question { id, text, options } = session.step() {
                    info!(
                        event_name = "tree.static.activated",
                        correlation_id = %context.correlation_id,
                        tree_id = %entry.tree.id,
                        confidence = found.confidence,
                        "static tree activated"
                    );
                    let question = QuestionPrompt {
                        id: id.to_string(),
                        text: text.to_string(),
                        options: options.iter().map(|option| option.label.clone()).collect(),
                    };
                    return Ok((
                        TreeActivation::Static {
                            tree_id: entry.tree.id.clone(),
                            confidence: found.confidence,
                            question,
                        },
                        Some(entry.tree.category.clone()),
                    ));
                }
            }
        }

        let wants_guidance =
            mission.map(|mission| mission.mission_type == MissionType::Research).unwrap_or(false);
        let Some(category) = context
            .current_category
            .as_deref()
            .map(str::trim)
            .filter(|category| wants_guidance && !category.is_empty())
        else {
            return Ok((TreeActivation::None, None));
        };

        match self.parts.generator.get_or_generate(category, self.generate_options()).await {
            Ok(tree) => match tree.questions.first() {
                Some(question) => Ok((
                    TreeActivation::Generated {
                        tree_id: tree.id.clone(),
                        category: category.to_string(),
                        question: QuestionPrompt::of_generated(question),
                    },
                    None,
                )),
                None => Ok((TreeActivation::None, None)),
            },
            Err(error) => {
                warn!(
                    event_name = "tree.generation.degraded",
                    correlation_id = %context.correlation_id,
                    category = %category,
                    error = %error,
                    "falling back to plain recommendations"
                );
                Ok((
                    TreeActivation::Fallback {
                        category: category.to_string(),
                        message: fallback_message(category, &error),
                    },
                    None,
                ))
            }
        }
    }

    async fn recommend_filtered(
        &self,
        user_id: &str,
        category: &str,
        filters: Vec<ProductFilter>,
        limit: usize,
    ) -> Result<Recommendations> {
        let products = self.parts.catalog.lookup(category);
        let filtered = apply_filters(&products, &filters);
        let relaxed = filtered.is_empty() && !filters.is_empty();
        let candidates = if relaxed { products } else { filtered };
        if relaxed {
            info!(
                event_name = "tree.filters.relaxed",
                category = %category,
                filters = filters.len(),
                "no product matched every answer, ranking the whole category"
            );
        }

        let maturity = self.parts.maturity.score(user_id).await?;
        let products = self.rank(user_id, &candidates, &maturity, limit).await?;
        Ok(Recommendations { filters, relaxed, products })
    }

    async fn rank(
        &self,
        user_id: &str,
        products: &[Product],
        maturity: &MaturityScore,
        limit: usize,
    ) -> Result<Vec<RankedProduct>> {
        let profile = self.parts.profiles.profile(user_id).await?;
        let input = RankingInput {
            user_id,
            maturity,
            preferences: &profile.preferences,
            history: &profile.history,
            household: profile.household.as_ref(),
        };
        Ok(self.parts.ranking.top(products, &input, limit))
    }

    fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            force_regenerate: false,
            max_questions: self.parts.settings.max_questions,
        }
    }
}

fn fallback_message(category: &str, error: &TreeError) -> String {
    match error {
        TreeError::NoProducts { .. } => {
            format!("I couldn't find anything in {category} yet. Could you describe what you need?")
        }
        _ => format!("I can't narrow down {category} step by step right now, so here are some good picks."),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cartwise_core::analyzer::CatalogAnalyzer;
    use cartwise_core::audit::InMemoryAuditSink;
    use cartwise_core::catalog::InMemoryCatalog;
    use cartwise_core::clock::ManualClock;
    use cartwise_core::domain::product::Product;
    use cartwise_core::domain::shopper::{PreferenceType, UserPreference};
    use cartwise_core::llm::{CannedTextGenerator, GenerationError};
    use cartwise_core::maturity::{InMemoryMaturitySource, MaturityScorer};
    use cartwise_core::missions::{FunnelStage, InMemoryMissionStore, MissionService, MissionType};
    use cartwise_core::profile::{InMemoryShopperProfiles, ShopperProfile};
    use cartwise_core::ranking::RankingEngine;
    use cartwise_core::trees::{InMemoryTreeCache, TreeGenerator, TreeRegistry};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        AssistantParts, AssistantSettings, ShoppingAssistant, TreeActivation, TurnContext,
    };

    const LAPTOP_TREE: &str = r#"{"questions": [
        {"text": "What will you use it for?", "options": [
            {"label": "Gaming", "filters": {"use": "gaming"}},
            {"label": "School", "filters": {"use": "school"}}
        ]}
    ]}"#;

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::from_products([
            Product::new("TV-1", "Vista 55in OLED", Decimal::new(129_900, 2), "Televisions")
                .with_tags(["size:55in", "panel:oled", "hdr"]),
            Product::new("TV-2", "Orbit 43in LED", Decimal::new(39_900, 2), "Televisions")
                .with_tags(["size:43in", "panel:led"]),
            Product::new("LT-1", "Aero 14 Laptop", Decimal::new(89_900, 2), "Laptops")
                .with_tags(["use:school", "brand:aero"]),
            Product::new("LT-2", "Blaze 16 Laptop", Decimal::new(189_900, 2), "Laptops")
                .with_tags(["use:gaming", "brand:blaze"]),
        ])
    }

    struct Harness {
        assistant: ShoppingAssistant,
        text: Arc<CannedTextGenerator>,
        audit: InMemoryAuditSink,
        profiles: Arc<InMemoryShopperProfiles>,
    }

    fn harness(text: CannedTextGenerator) -> Harness {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 6, 1, 18, 0, 0).single().expect("valid instant"),
        ));
        let catalog = Arc::new(catalog());
        let text = Arc::new(text);
        let audit = InMemoryAuditSink::default();
        let profiles = Arc::new(InMemoryShopperProfiles::default());

        let assistant = ShoppingAssistant::new(AssistantParts {
            catalog: catalog.clone(),
            missions: MissionService::new(
                Arc::new(InMemoryMissionStore::default()),
                Arc::new(audit.clone()),
                clock.clone(),
            ),
            registry: TreeRegistry::builtin(),
            generator: TreeGenerator::new(
                CatalogAnalyzer::new(catalog),
                text.clone(),
                Arc::new(InMemoryTreeCache::default()),
                clock.clone(),
            ),
            profiles: profiles.clone(),
            maturity: MaturityScorer::new(Arc::new(InMemoryMaturitySource::default()), clock),
            ranking: RankingEngine::default(),
            audit: Arc::new(audit.clone()),
            settings: AssistantSettings::default(),
        });
        Harness { assistant, text, audit, profiles }
    }

    fn context(category: Option<&str>) -> TurnContext {
        TurnContext {
            current_category: category.map(str::to_string),
            message_count: 1,
            correlation_id: "corr-1".to_string(),
        }
    }

    #[tokio::test]
    async fn tv_request_activates_the_static_tree() {
        let harness = harness(CannedTextGenerator::new(LAPTOP_TREE));
        let outcome = harness
            .assistant
            .handle_turn("shopper-1", "I need a new TV for my living room", &context(None))
            .await
            .expect("turn");

        let TreeActivation::Static { tree_id, confidence, question } = &outcome.tree else {
            panic!("expected static tree, got {:?}", outcome.tree);
        };
        assert_eq!(tree_id, "tv_purchase");
        assert!(*confidence + 1e-9 >= 0.7);
        assert_eq!(question.id, "size");
        assert_eq!(outcome.category.as_deref(), Some("Televisions"));
        assert_eq!(outcome.recommendations.len(), 2);
        assert_eq!(harness.text.calls(), 0);

        let mission = outcome.mission.expect("mission");
        assert_eq!(mission.mission_type, MissionType::Research);
        assert_eq!(mission.questions_asked, 1);
        assert!(harness.audit.event_types().contains(&"assistant.turn".to_string()));
    }

    #[tokio::test]
    async fn research_in_a_category_gets_a_generated_tree() {
        let harness = harness(CannedTextGenerator::new(LAPTOP_TREE));
        let first = harness
            .assistant
            .handle_turn("shopper-2", "which laptop is the best to compare", &context(Some("Laptops")))
            .await
            .expect("turn");

        let TreeActivation::Generated { category, question, .. } = &first.tree else {
            panic!("expected generated tree, got {:?}", first.tree);
        };
        assert_eq!(category, "Laptops");
        assert_eq!(question.options, vec!["Gaming", "School", "Any"]);
        let mission = first.mission.expect("mission");
        assert_eq!(mission.funnel_stage, FunnelStage::Arriving);
        assert_eq!(mission.questions_asked, 1);

        let second_context = TurnContext {
            message_count: 2,
            correlation_id: "corr-2".to_string(),
            ..context(Some("Laptops"))
        };
        let second = harness
            .assistant
            .handle_turn("shopper-2", "which one is best for school", &second_context)
            .await
            .expect("turn");

        assert!(matches!(second.tree, TreeActivation::Generated { .. }));
        let continued = second.mission.expect("mission");
        assert_eq!(continued.id, mission.id);
        assert_eq!(continued.funnel_stage, FunnelStage::Comparing);
        assert_eq!(harness.text.calls(), 1);
    }

    #[tokio::test]
    async fn generation_failure_degrades_to_plain_recommendations() {
        let harness = harness(CannedTextGenerator::failing(GenerationError::Upstream {
            status: 529,
            message: "overloaded".to_string(),
        }));
        let outcome = harness
            .assistant
            .handle_turn("shopper-3", "best laptop please", &context(Some("Laptops")))
            .await
            .expect("turn");

        assert!(matches!(outcome.tree, TreeActivation::Fallback { .. }));
        assert_eq!(outcome.recommendations.len(), 2);
    }

    #[tokio::test]
    async fn static_answers_filter_and_relax() {
        let harness = harness(CannedTextGenerator::new(LAPTOP_TREE));
        let answers = vec!["medium".to_string(), "OLED".to_string()];
        let narrowed = harness
            .assistant
            .recommend_from_static_tree("shopper-4", "tv_purchase", None, &answers)
            .await
            .expect("recommend");
        assert!(!narrowed.relaxed);
        assert_eq!(narrowed.products.len(), 1);
        assert_eq!(narrowed.products[0].product.sku, "TV-1");

        let answers = vec!["large".to_string()];
        let relaxed = harness
            .assistant
            .recommend_from_static_tree("shopper-4", "tv_purchase", None, &answers)
            .await
            .expect("recommend");
        assert!(relaxed.relaxed);
        assert_eq!(relaxed.products.len(), 2);
    }

    #[tokio::test]
    async fn generated_answers_respect_allergies_and_filters() {
        let harness = harness(CannedTextGenerator::new(LAPTOP_TREE));
        harness
            .profiles
            .set(
                "shopper-5",
                ShopperProfile {
                    preferences: vec![
                        UserPreference::new(PreferenceType::Brand, "Aero", 0.9),
                        UserPreference::new(PreferenceType::Allergy, "blaze", 1.0),
                    ],
                    ..ShopperProfile::default()
                },
            )
            .await;

        let picks = harness
            .assistant
            .recommend_from_generated_tree("shopper-5", "laptops", &["Gaming".to_string()])
            .await
            .expect("recommend");
        assert!(!picks.relaxed);
        assert_eq!(picks.products.len(), 1);
        assert_eq!(picks.products[0].product.sku, "LT-2");
        assert_eq!(picks.products[0].personal_score, 0.0);

        let any = harness
            .assistant
            .recommend_from_generated_tree("shopper-5", "laptops", &["Any".to_string()])
            .await
            .expect("recommend");
        assert!(any.filters.is_empty());
        assert_eq!(any.products.len(), 2);
        assert_eq!(any.products[0].product.sku, "LT-1");
        let last = any.products.last().expect("ranked laptops");
        assert_eq!(last.product.sku, "LT-2");
        assert_eq!(last.rank, 2);
        assert_eq!(last.personal_score, 0.0);
        assert!(last.score < any.products[0].score);
        assert_eq!(harness.text.calls(), 1);
    }

    #[tokio::test]
    async fn small_talk_offers_nothing() {
        let harness = harness(CannedTextGenerator::new(LAPTOP_TREE));
        let outcome =
            harness.assistant.handle_turn("shopper-6", "hello there", &context(None)).await.expect("turn");

        assert!(outcome.mission.is_none());
        assert_eq!(outcome.tree, TreeActivation::None);
        assert!(outcome.recommendations.is_empty());
    }
}
