//! Keyword heuristic that decides whether a hand-authored tree should start for a query.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_TRIGGER_CONFIDENCE: f64 = 0.6;
pub const SHOULD_TRIGGER_CONFIDENCE: f64 = 0.7;

const WHOLE_WORD_WEIGHT: f64 = 0.3;
const PARTIAL_WEIGHT: f64 = 0.15;
const CATEGORY_WEIGHT: f64 = 0.2;
const INTENT_WEIGHT: f64 = 0.1;
const NEAR_TIE: f64 = 0.1;
const EPSILON: f64 = 1e-9;

const INTENT_PHRASES: &[&str] = &[
    "help me",
    "which",
    "what",
    "how do i",
    "looking for",
    "need",
    "want to buy",
    "shopping for",
    "recommend",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeTrigger {
    pub tree_id: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default)]
    pub priority: i32,
}

fn default_min_confidence() -> f64 {
    DEFAULT_TRIGGER_CONFIDENCE
}

impl TreeTrigger {
    pub fn new<I, T>(tree_id: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tree_id: tree_id.into(),
            keywords: keywords.into_iter().map(|keyword| keyword.into().to_lowercase()).collect(),
            categories: Vec::new(),
            min_confidence: DEFAULT_TRIGGER_CONFIDENCE,
            priority: 0,
        }
    }

    pub fn with_categories<I, T>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerContext {
    pub current_category: Option<String>,
}

impl TriggerContext {
    pub fn in_category(category: impl Into<String>) -> Self {
        Self { current_category: Some(category.into()) }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriggerMatch {
    pub tree_id: String,
    pub confidence: f64,
    pub matched_keywords: Vec<String>,
    pub matched_category: Option<String>,
    pub priority: i32,
}

struct CompiledTrigger {
    trigger: TreeTrigger,
    whole_words: Vec<Option<Regex>>,
}

/// Scores queries against a fixed set of triggers. Keyword patterns are compiled once.
pub struct TriggerMatcher {
    triggers: Vec<CompiledTrigger>,
}

impl TriggerMatcher {
    pub fn new(triggers: impl IntoIterator<Item = TreeTrigger>) -> Self {
        let triggers = triggers
            .into_iter()
            .map(|trigger| {
                let whole_words = trigger
                    .keywords
                    .iter()
                    .map(|keyword| {
                        Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword.trim()))).ok()
                    })
                    .collect();
                CompiledTrigger { trigger, whole_words }
            })
            .collect();
        Self { triggers }
    }

    pub fn triggers(&self) -> impl Iterator<Item = &TreeTrigger> {
        self.triggers.iter().map(|compiled| &compiled.trigger)
    }

    /// Every trigger that clears its own minimum, best first.
    pub fn analyze_triggers(&self, query: &str, context: &TriggerContext) -> Vec<TriggerMatch> {
        let lowered = query.to_lowercase();
        let intent = INTENT_PHRASES.iter().any(|phrase| lowered.contains(phrase));

        let mut matches: Vec<TriggerMatch> = self
            .triggers
            .iter()
            .filter_map(|compiled| score_trigger(compiled, &lowered, intent, context))
            .collect();
        sort_matches(&mut matches);

        debug!(
            event_name = "tree.trigger.analyzed",
            candidates = matches.len(),
            best = matches.first().map(|found| found.tree_id.as_str()).unwrap_or("none"),
            "trigger analysis finished"
        );
        matches
    }

    pub fn best_match(&self, query: &str, context: &TriggerContext) -> Option<TriggerMatch> {
        self.analyze_triggers(query, context).into_iter().next()
    }

    pub fn should_trigger_tree(
        &self,
        query: &str,
        context: &TriggerContext,
        min_confidence: f64,
    ) -> bool {
        self.best_match(query, context)
            .map(|found| found.confidence + EPSILON >= min_confidence)
            .unwrap_or(false)
    }
}

fn score_trigger(
    compiled: &CompiledTrigger,
    lowered: &str,
    intent: bool,
    context: &TriggerContext,
) -> Option<TriggerMatch> {
    let trigger = &compiled.trigger;
    let mut confidence = 0.0;
    let mut matched_keywords = Vec::new();

    for (keyword, whole_word) in trigger.keywords.iter().zip(&compiled.whole_words) {
        let keyword = keyword.trim();
        if keyword.is_empty() || !lowered.contains(keyword) {
            continue;
        }
        let is_whole = whole_word.as_ref().map(|pattern| pattern.is_match(lowered)).unwrap_or(false);
        confidence += if is_whole { WHOLE_WORD_WEIGHT } else { PARTIAL_WEIGHT };
        matched_keywords.push(keyword.to_string());
    }

    let matched_category = context.current_category.as_deref().and_then(|current| {
        let current = current.trim().to_lowercase();
        if current.is_empty() {
            return None;
        }
        trigger
            .categories
            .iter()
            .find(|declared| {
                let declared = declared.trim().to_lowercase();
                !declared.is_empty() && (current.contains(&declared) || declared.contains(&current))
            })
            .cloned()
    });
    if matched_category.is_some() {
        confidence += CATEGORY_WEIGHT;
    }

    if matched_keywords.is_empty() && matched_category.is_none() {
        return None;
    }
    if intent {
        confidence += INTENT_WEIGHT;
    }
    let confidence = f64::min(confidence, 1.0);
    if confidence + EPSILON < trigger.min_confidence {
        return None;
    }

    Some(TriggerMatch {
        tree_id: trigger.tree_id.clone(),
        confidence,
        matched_keywords,
        matched_category,
        priority: trigger.priority,
    })
}

/// Confidence descending; within a near-tie the higher declared priority moves ahead.
fn sort_matches(matches: &mut [TriggerMatch]) {
    matches.sort_by(|left, right| right.confidence.total_cmp(&left.confidence));
    let mut swapped = true;
    while swapped {
        swapped = false;
        for index in 1..matches.len() {
            let (ahead, behind) = (&matches[index - 1], &matches[index]);
            if behind.priority > ahead.priority
                && ahead.confidence - behind.confidence <= NEAR_TIE + EPSILON
            {
                matches.swap(index - 1, index);
                swapped = true;
            }
        }
    }
}
