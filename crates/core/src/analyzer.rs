use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::CatalogAccessor;
use crate::domain::product::Product;

pub const FEATURES_ATTRIBUTE: &str = "features";
pub const ANY_OPTION: &str = "Any";

const MAX_QUESTION_VALUES: usize = 5;

static SIZE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d+(?:\.\d+)?)\s?(inch|inches|in|oz|fl oz|lbs|lb|kg|g|ml|l|ct|pack|pk|gb|tb|qt|cu ft|ft)\b",
    )
    .expect("size regex")
});

const COLORS: &[&str] = &[
    "black", "white", "silver", "gray", "grey", "red", "blue", "green", "yellow", "brown",
    "beige", "navy", "pink", "purple", "orange", "gold", "stainless",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Boolean,
    Numeric,
    Categorical,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogAttribute {
    pub name: String,
    pub attribute_type: AttributeType,
    pub unique_values: usize,
    /// Most common first.
    pub values: Vec<ValueCount>,
    pub coverage: f64,
    pub discrimination_power: f64,
    pub priority: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuggestedQuestion {
    pub attribute: String,
    pub text: String,
    pub options: Vec<String>,
    pub priority: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogAnalysis {
    pub category: String,
    pub total_products: usize,
    pub attributes: Vec<CatalogAttribute>,
    pub suggested_questions: Vec<SuggestedQuestion>,
    pub warnings: Vec<String>,
}

impl CatalogAnalysis {
    pub fn top_attribute(&self) -> Option<&CatalogAttribute> {
        self.attributes.first()
    }
}

/// Extracts `(attribute, value)` pairs from a product's tags and name.
pub fn extract_attributes(product: &Product) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for tag in &product.tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        match tag.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
                pairs.push((key.trim().to_lowercase(), value.trim().to_lowercase()));
            }
            Some(_) => {}
            None => pairs.push((FEATURES_ATTRIBUTE.to_string(), tag.to_lowercase())),
        }
    }

    if let Some(captures) = SIZE_TOKEN.captures(&product.name) {
        let number = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let unit = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        let unit = match unit.to_lowercase().as_str() {
            "inch" | "inches" => "in".to_string(),
            other => other.replace(' ', ""),
        };
        pairs.push(("size".to_string(), format!("{number}{unit}")));
    }

    let name = product.name.to_lowercase();
    let words: BTreeSet<&str> =
        name.split(|ch: char| !ch.is_alphanumeric()).filter(|word| !word.is_empty()).collect();
    if let Some(color) = COLORS.iter().find(|color| words.contains(*color)) {
        pairs.push(("color".to_string(), (*color).to_string()));
    }

    pairs
}

/// Pure analysis of a product list.
pub fn analyze_products(category: &str, products: &[Product]) -> CatalogAnalysis {
    let total = products.len();
    if total == 0 {
        return CatalogAnalysis {
            category: category.to_string(),
            total_products: 0,
            attributes: Vec::new(),
            suggested_questions: Vec::new(),
            warnings: vec![format!("no products found in category `{category}`")],
        };
    }

    let mut value_counts: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    let mut products_with: BTreeMap<String, usize> = BTreeMap::new();
    for product in products {
        let mut seen_here = BTreeSet::new();
        for (name, value) in extract_attributes(product) {
            *value_counts.entry(name.clone()).or_default().entry(value).or_default() += 1;
            seen_here.insert(name);
        }
        for name in seen_here {
            *products_with.entry(name).or_default() += 1;
        }
    }

    let mut attributes: Vec<CatalogAttribute> = value_counts
        .into_iter()
        .map(|(name, counts)| {
            let with_attribute = products_with.get(&name).copied().unwrap_or(0);
            let coverage = with_attribute as f64 / total as f64;
            let unique_values = counts.len();
            let discrimination_power = (unique_values as f64 / 10.0).min(1.0) * coverage;
            let attribute_type = if unique_values == 2 {
                AttributeType::Boolean
            } else if counts.keys().all(|value| value.parse::<f64>().is_ok()) {
                AttributeType::Numeric
            } else {
                AttributeType::Categorical
            };
            let mut values: Vec<ValueCount> =
                counts.into_iter().map(|(value, count)| ValueCount { value, count }).collect();
            values.sort_by(|left, right| right.count.cmp(&left.count));

            CatalogAttribute {
                name,
                attribute_type,
                unique_values,
                values,
                coverage,
                discrimination_power,
                priority: coverage * discrimination_power,
            }
        })
        .collect();
    attributes.sort_by(|left, right| right.priority.total_cmp(&left.priority));

    let suggested_questions: Vec<SuggestedQuestion> = attributes
        .iter()
        .filter(|attribute| (2..=10).contains(&attribute.unique_values))
        .map(|attribute| {
            let mut options: Vec<String> = attribute
                .values
                .iter()
                .take(MAX_QUESTION_VALUES)
                .map(|value| value.value.clone())
                .collect();
            options.push(ANY_OPTION.to_string());
            SuggestedQuestion {
                attribute: attribute.name.clone(),
                text: question_text(attribute),
                options,
                priority: (attribute.priority * 10.0).round() as u32,
            }
        })
        .collect();

    let mut warnings = Vec::new();
    if suggested_questions.is_empty() {
        warnings.push(format!("no discriminating attributes found in category `{category}`"));
    }
    if total < 5 {
        warnings.push(format!("category `{category}` has only {total} products"));
    }

    CatalogAnalysis {
        category: category.to_string(),
        total_products: total,
        attributes,
        suggested_questions,
        warnings,
    }
}

fn question_text(attribute: &CatalogAttribute) -> String {
    match attribute.name.as_str() {
        FEATURES_ATTRIBUTE => "Which features matter most to you?".to_string(),
        "size" => "What size are you looking for?".to_string(),
        "color" => "Do you have a color in mind?".to_string(),
        name => format!("Which {} do you prefer?", name.replace('_', " ")),
    }
}

/// Analyzer bound to a catalog.
#[derive(Clone)]
pub struct CatalogAnalyzer {
    catalog: Arc<dyn CatalogAccessor>,
}

impl CatalogAnalyzer {
    pub fn new(catalog: Arc<dyn CatalogAccessor>) -> Self {
        Self { catalog }
    }

    pub fn products(&self, category: &str) -> Vec<Product> {
        self.catalog.lookup(category)
    }

    pub fn analyze(&self, category: &str) -> CatalogAnalysis {
        let products = self.catalog.lookup(category);
        let analysis = analyze_products(category, &products);
        debug!(
            event_name = "catalog.analyzed",
            category = %category,
            total_products = analysis.total_products,
            attributes = analysis.attributes.len(),
            warnings = analysis.warnings.len(),
            "catalog category analyzed"
        );
        analysis
    }
}
