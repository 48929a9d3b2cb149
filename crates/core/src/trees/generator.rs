use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::analyzer::{analyze_products, CatalogAnalysis, CatalogAnalyzer, ANY_OPTION};
use crate::clock::Clock;
use crate::config::{MAX_TREE_CACHE_TTL_DAYS, MAX_TREE_CLEANUP_GRACE_DAYS};
use crate::domain::product::Product;
use crate::domain::tree::{GeneratedOption, GeneratedQuestion, GeneratedTree, GenerationMetadata};
use crate::llm::{GenerationParams, TextGenerator};
use crate::trees::cache::{cache_key, CachedTreeEntry, CatalogSnapshot, TreeCacheStore};
use crate::trees::decoder::{decode_tree, RawTree};
use crate::trees::validation::{is_fatal, validate_tree};
use crate::trees::TreeError;

pub const DEFAULT_MAX_QUESTIONS: usize = 4;
pub const DEFAULT_TREE_TTL_DAYS: i64 = 7;
pub const DEFAULT_CLEANUP_GRACE_DAYS: i64 = 7;

const PROMPT_ATTRIBUTES: usize = 8;
const PROMPT_SAMPLES: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerateOptions {
    pub force_regenerate: bool,
    pub max_questions: usize,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self { force_regenerate: false, max_questions: DEFAULT_MAX_QUESTIONS }
    }
}

/// Produces guided-question trees for a category, backed by an append-only cache.
///
/// Read-or-generate is not atomic: two concurrent misses may both generate and both insert.
/// Readers then see the most recent row.
pub struct TreeGenerator {
    analyzer: CatalogAnalyzer,
    text: Arc<dyn TextGenerator>,
    cache: Arc<dyn TreeCacheStore>,
    clock: Arc<dyn Clock>,
    params: GenerationParams,
    ttl: Duration,
    cleanup_grace: Duration,
}

impl TreeGenerator {
    pub fn new(
        analyzer: CatalogAnalyzer,
        text: Arc<dyn TextGenerator>,
        cache: Arc<dyn TreeCacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            analyzer,
            text,
            cache,
            clock,
            params: GenerationParams::default(),
            ttl: Duration::days(DEFAULT_TREE_TTL_DAYS),
            cleanup_grace: Duration::days(DEFAULT_CLEANUP_GRACE_DAYS),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    /// Clamped to `1..=MAX_TREE_CACHE_TTL_DAYS`.
    pub fn with_ttl_days(mut self, days: i64) -> Self {
        self.ttl = Duration::days(days.clamp(1, MAX_TREE_CACHE_TTL_DAYS));
        self
    }

    /// Clamped to `0..=MAX_TREE_CLEANUP_GRACE_DAYS`.
    pub fn with_cleanup_grace_days(mut self, days: i64) -> Self {
        self.cleanup_grace = Duration::days(days.clamp(0, MAX_TREE_CLEANUP_GRACE_DAYS));
        self
    }

    pub async fn get_or_generate(
        &self,
        category: &str,
        options: GenerateOptions,
    ) -> Result<GeneratedTree, TreeError> {
        let key = cache_key(category);

        if !options.force_regenerate {
            match self.cache.latest_live(&key, self.clock.now()).await {
                Ok(Some(entry)) => {
                    info!(
                        event_name = "tree.cache.hit",
                        category = %key,
                        tree_id = %entry.tree.id,
                        "serving cached tree"
                    );
                    return Ok(entry.tree);
                }
                Ok(None) => {
                    debug!(event_name = "tree.cache.miss", category = %key, "no live cached tree");
                }
                Err(error) => {
                    warn!(
                        event_name = "tree.cache.read_failed",
                        category = %key,
                        error = %error,
                        "tree cache read failed, regenerating"
                    );
                }
            }
        }

        let products = self.analyzer.products(category);
        let analysis = analyze_products(category, &products);
        if analysis.total_products == 0 {
            return Err(TreeError::NoProducts { category: category.trim().to_string() });
        }

        let max_questions = options.max_questions.max(1);
        let prompt = build_prompt(&analysis, &products, max_questions);
        let response = self.text.generate(&prompt, &self.params).await?;
        let raw = decode_tree(&response)?;

        let now = self.clock.now();
        let tree = GeneratedTree {
            id: format!("{}_{}", slugify(category), now.timestamp_millis()),
            category: category.trim().to_string(),
            questions: normalize_questions(raw, max_questions),
            metadata: GenerationMetadata {
                total_products: analysis.total_products,
                top_attributes: analysis
                    .attributes
                    .iter()
                    .take(PROMPT_ATTRIBUTES)
                    .map(|attribute| attribute.name.clone())
                    .collect(),
                confidence_score: confidence_score(&analysis),
                model: self.params.model.clone(),
                generated_at: now,
            },
        };

        let defects = validate_tree(&tree);
        if is_fatal(&tree) {
            return Err(TreeError::Invalid(defects));
        }
        if !defects.is_empty() {
            warn!(
                event_name = "tree.generated_with_defects",
                category = %key,
                defects = %defects.join("; "),
                "generated tree has non-fatal defects"
            );
        }

        let entry = CachedTreeEntry {
            category: key.clone(),
            tree: tree.clone(),
            catalog_snapshot: CatalogSnapshot::of(&products),
            generated_at: now,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            metadata: tree.metadata.clone(),
        };
        self.cache
            .insert(&entry)
            .await
            .map_err(|error| TreeError::Persistence(error.to_string()))?;

        info!(
            event_name = "tree.generated",
            category = %key,
            tree_id = %tree.id,
            questions = tree.questions.len(),
            confidence = tree.metadata.confidence_score,
            "generated and cached tree"
        );
        Ok(tree)
    }

    pub async fn invalidate(&self, category: &str) -> Result<u64, TreeError> {
        let removed = self
            .cache
            .delete_category(&cache_key(category))
            .await
            .map_err(|error| TreeError::Persistence(error.to_string()))?;
        info!(
            event_name = "tree.cache.invalidated",
            category = %cache_key(category),
            removed = removed,
            "tree cache invalidated"
        );
        Ok(removed)
    }

    /// Deletes entries that expired more than the grace period ago.
    pub async fn cleanup_expired(&self) -> Result<u64, TreeError> {
        let cutoff = self.clock.now() - self.cleanup_grace;
        let removed = self
            .cache
            .delete_expired_before(cutoff)
            .await
            .map_err(|error| TreeError::Persistence(error.to_string()))?;
        info!(event_name = "tree.cache.cleaned", removed = removed, "expired trees removed");
        Ok(removed)
    }
}

pub fn build_prompt(analysis: &CatalogAnalysis, products: &[Product], max_questions: usize) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are designing a short guided shopping questionnaire for the `{}` category.",
        analysis.category
    );
    let _ = writeln!(prompt, "The category has {} products.", analysis.total_products);

    let _ = writeln!(prompt, "\nMost useful attributes:");
    for attribute in analysis.attributes.iter().take(PROMPT_ATTRIBUTES) {
        let _ = writeln!(
            prompt,
            "- {}: {} distinct values, {:.0}% coverage",
            attribute.name,
            attribute.unique_values,
            attribute.coverage * 100.0
        );
    }

    let _ = writeln!(prompt, "\nSample products:");
    for product in products.iter().take(PROMPT_SAMPLES) {
        let _ = writeln!(
            prompt,
            "- {} (${}) tags: [{}]",
            product.name,
            product.price,
            product.tags.join(", ")
        );
    }

    let _ = write!(
        prompt,
        "\nWrite exactly {max_questions} questions. Each question has 2 to 5 options plus one \
         \"{ANY_OPTION}\" / \"not sure\" option. Every option carries a `filters` object mapping \
         attribute names to the accepted value or list of values (use {{}} for the \"{ANY_OPTION}\" \
         option).\nRespond with one JSON object only:\n\
         {{\"questions\": [{{\"id\": \"q1\", \"text\": \"...\", \"options\": \
         [{{\"id\": \"q1_o1\", \"label\": \"...\", \"filters\": {{\"attribute\": \"value\"}}}}]}}]}}"
    );
    prompt
}

/// Weighted blend of catalog size, number of strong attributes and top-attribute coverage.
pub fn confidence_score(analysis: &CatalogAnalysis) -> f64 {
    let size = (analysis.total_products as f64 / 50.0).min(1.0);
    let strong = analysis
        .attributes
        .iter()
        .filter(|attribute| attribute.coverage > 0.3 && attribute.discrimination_power > 0.1)
        .count();
    let strong = (strong as f64 / 5.0).min(1.0);
    let top_coverage = analysis.top_attribute().map(|attribute| attribute.coverage).unwrap_or(0.0);
    size * 0.3 + strong * 0.4 + top_coverage * 0.3
}

fn normalize_questions(raw: RawTree, max_questions: usize) -> Vec<GeneratedQuestion> {
    raw.questions
        .into_iter()
        .take(max_questions)
        .enumerate()
        .map(|(question_index, question)| {
            let question_id = non_empty(question.id)
                .unwrap_or_else(|| format!("q{}", question_index + 1));
            let mut options: Vec<GeneratedOption> = question
                .options
                .into_iter()
                .enumerate()
                .map(|(option_index, option)| GeneratedOption {
                    id: non_empty(option.id)
                        .unwrap_or_else(|| format!("{question_id}_o{}", option_index + 1)),
                    label: option.label.trim().to_string(),
                    filters: option.filters.map(|filters| filters.into_iter().collect()),
                })
                .collect();
            if !options.iter().any(|option| is_any_label(&option.label)) {
                options.push(GeneratedOption {
                    id: format!("{question_id}_any"),
                    label: ANY_OPTION.to_string(),
                    filters: Some(BTreeMap::new()),
                });
            }
            GeneratedQuestion { id: question_id, text: question.text.trim().to_string(), options }
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

fn is_any_label(label: &str) -> bool {
    let label = label.trim().to_lowercase();
    label == "any"
        || label.starts_with("any ")
        || label.contains("not sure")
        || label.contains("no preference")
}

pub fn slugify(category: &str) -> String {
    let mut slug = String::with_capacity(category.len());
    for ch in category.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "category".to_string()
    } else {
        slug
    }
}
