use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::product::Product;

/// One option of a hand-authored question node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeOption {
    pub label: String,
    pub value: String,
    #[serde(default)]
    pub next_node_id: Option<String>,
    /// `key:value` attribute filter, or a bare feature flag. `None` means "any".
    #[serde(default)]
    pub filter_value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Question { id: String, text: String, options: Vec<TreeOption> },
    Recommendation { id: String, text: String, max_results: usize },
}

impl TreeNode {
    pub fn id(&self) -> &str {
        match self {
            Self::Question { id, .. } | Self::Recommendation { id, .. } => id,
        }
    }
}

/// Static, hand-authored guided flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub id: String,
    pub category: String,
    pub root_node_id: String,
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    pub fn node(&self, node_id: &str) -> Option<&TreeNode> {
        self.nodes.iter().find(|node| node.id() == node_id)
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.node(&self.root_node_id)
    }

    /// Structural defects: missing root, dangling `next_node_id`, no terminal node.
    pub fn defects(&self) -> Vec<String> {
        let mut defects = Vec::new();
        if self.root().is_none() {
            defects.push(format!("root node `{}` does not exist", self.root_node_id));
        }
        for node in &self.nodes {
            if let TreeNode::Question { id, options, .. } = node {
                if options.len() < 2 {
                    defects.push(format!("question `{id}` has fewer than 2 options"));
                }
                for option in options {
                    if let Some(next) = &option.next_node_id {
                        if self.node(next).is_none() {
                            defects.push(format!(
                                "option `{}` of question `{id}` points at missing node `{next}`",
                                option.value
                            ));
                        }
                    }
                }
            }
        }
        if !self.nodes.iter().any(|node| matches!(node, TreeNode::Recommendation { .. })) {
            defects.push("tree has no recommendation node".to_string());
        }
        defects
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedOption {
    pub id: String,
    pub label: String,
    /// Attribute filters applied when this option is chosen; `None` is a defect, an empty map
    /// means "no restriction".
    #[serde(default)]
    pub filters: Option<BTreeMap<String, Value>>,
}

impl GeneratedOption {
    pub fn product_filters(&self) -> Vec<ProductFilter> {
        self.filters
            .as_ref()
            .map(|filters| {
                filters
                    .iter()
                    .filter_map(|(key, value)| ProductFilter::from_json(key, value))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub id: String,
    pub text: String,
    pub options: Vec<GeneratedOption>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub total_products: usize,
    pub top_attributes: Vec<String>,
    pub confidence_score: f64,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

/// Decision tree produced by the text-generation service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTree {
    pub id: String,
    pub category: String,
    pub questions: Vec<GeneratedQuestion>,
    pub metadata: GenerationMetadata,
}

impl GeneratedTree {
    /// Collects the filters of the chosen options, given `(question_id, option_id)` answers.
    /// Unknown questions or options contribute nothing.
    pub fn filters_for(&self, answers: &[(String, String)]) -> Vec<ProductFilter> {
        answers
            .iter()
            .filter_map(|(question_id, option_id)| {
                self.questions
                    .iter()
                    .find(|question| &question.id == question_id)
                    .and_then(|question| {
                        question.options.iter().find(|option| &option.id == option_id)
                    })
            })
            .flat_map(GeneratedOption::product_filters)
            .collect()
    }
}

/// Catalog restriction accumulated from tree answers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub key: String,
    pub values: Vec<String>,
}

impl ProductFilter {
    pub fn new(key: impl Into<String>, values: Vec<String>) -> Self {
        Self { key: key.into().trim().to_lowercase(), values }
    }

    /// Parses a static option's `filter_value`: `key:value` or a bare feature flag.
    pub fn parse(filter_value: &str) -> Option<Self> {
        let trimmed = filter_value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("any") {
            return None;
        }
        match trimmed.split_once(':') {
            Some((key, value)) => Some(Self::new(key, vec![value.trim().to_string()])),
            None => Some(Self::new("features", vec![trimmed.to_string()])),
        }
    }

    fn from_json(key: &str, value: &Value) -> Option<Self> {
        let values = match value {
            Value::String(text) if text.trim().is_empty() || text.eq_ignore_ascii_case("any") => {
                return None
            }
            Value::String(text) => vec![text.clone()],
            Value::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text.clone()),
                    Value::Number(number) => Some(number.to_string()),
                    _ => None,
                })
                .collect(),
            Value::Number(number) => vec![number.to_string()],
            Value::Bool(true) => return Some(Self::new("features", vec![key.to_string()])),
            _ => return None,
        };
        if values.is_empty() {
            return None;
        }
        Some(Self::new(key, values))
    }

    /// A product passes when it carries any of the filter values as a `key:value` tag or a bare
    /// feature tag. Products without a tag for the filter key fall back to whole words of the
    /// name.
    pub fn matches(&self, product: &Product) -> bool {
        let keyed = product.tags.iter().any(|tag| {
            tag.split_once(':').is_some_and(|(key, _)| key.trim().to_lowercase() == self.key)
        });
        let name = word_padded(&product.name);

        self.values.iter().any(|value| {
            let value = value.trim().to_lowercase();
            let tagged = product.tags.iter().any(|tag| {
                let tag = tag.trim().to_lowercase();
                match tag.split_once(':') {
                    Some((key, tag_value)) => key.trim() == self.key && tag_value.trim() == value,
                    None => tag == value,
                }
            });
            if tagged {
                return true;
            }
            let needle = word_padded(&value);
            !keyed && !needle.trim().is_empty() && name.contains(&needle)
        })
    }
}

/// Lowercased words separated by single spaces, padded so `contains` only hits whole words.
fn word_padded(text: &str) -> String {
    let words: Vec<String> = text
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

/// Keeps the products that satisfy every filter.
pub fn apply_filters(products: &[Product], filters: &[ProductFilter]) -> Vec<Product> {
    products
        .iter()
        .filter(|product| filters.iter().all(|filter| filter.matches(product)))
        .cloned()
        .collect()
}
