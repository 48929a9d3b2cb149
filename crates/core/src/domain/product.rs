use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeal {
    pub quantity: u32,
    pub bundle_price: Decimal,
    pub savings: Decimal,
}

/// Immutable catalog record. The engine reads products but never mutates them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_deal: Option<BulkDeal>,
}

impl Product {
    pub fn new(
        sku: impl Into<String>,
        name: impl Into<String>,
        price: Decimal,
        category: impl Into<String>,
    ) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            price,
            category: category.into(),
            tags: Vec::new(),
            bulk_deal: None,
        }
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_bulk_deal(mut self, deal: BulkDeal) -> Self {
        self.bulk_deal = Some(deal);
        self
    }

    pub fn price_f64(&self) -> f64 {
        self.price.to_f64().unwrap_or(0.0)
    }

    /// Savings of the bulk deal, zero when the product has none.
    pub fn bulk_savings(&self) -> f64 {
        self.bulk_deal.as_ref().and_then(|deal| deal.savings.to_f64()).unwrap_or(0.0)
    }

    /// Case-insensitive substring test against the name and every tag.
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        self.name.to_lowercase().contains(&needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(&needle))
    }

    /// True when the name, any tag, or the category mentions one of the signal words.
    pub fn signals_any(&self, signals: &[&str]) -> bool {
        let category = self.category.to_lowercase();
        signals.iter().any(|signal| self.mentions(signal) || category.contains(signal))
    }

    pub fn is_organic(&self) -> bool {
        self.mentions("organic")
    }
}
