use std::collections::BTreeMap;

use serde::Deserialize;

use crate::domain::product::Product;

/// Read-only category lookup. Unknown categories yield an empty list.
pub trait CatalogAccessor: Send + Sync {
    fn lookup(&self, category: &str) -> Vec<Product>;
    fn categories(&self) -> Vec<String>;
}

/// Catalog held in memory, keyed by lowercased category name.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalog {
    by_category: BTreeMap<String, Vec<Product>>,
    display_names: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Flat(Vec<Product>),
    Grouped(BTreeMap<String, Vec<Product>>),
}

impl InMemoryCatalog {
    pub fn from_products(products: impl IntoIterator<Item = Product>) -> Self {
        let mut catalog = Self::default();
        for product in products {
            catalog.insert(product);
        }
        catalog
    }

    /// Accepts either a flat product array or an object of `category -> products`. In the
    /// grouped form the object key overrides each product's own category.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let catalog = match serde_json::from_str::<CatalogDocument>(raw)? {
            CatalogDocument::Flat(products) => Self::from_products(products),
            CatalogDocument::Grouped(groups) => Self::from_products(groups.into_iter().flat_map(
                |(category, products)| {
                    products.into_iter().map(move |mut product| {
                        product.category = category.clone();
                        product
                    })
                },
            )),
        };
        Ok(catalog)
    }

    pub fn insert(&mut self, product: Product) {
        let key = product.category.trim().to_lowercase();
        self.display_names.entry(key.clone()).or_insert_with(|| product.category.trim().to_string());
        self.by_category.entry(key).or_default().push(product);
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CatalogAccessor for InMemoryCatalog {
    fn lookup(&self, category: &str) -> Vec<Product> {
        self.by_category.get(&category.trim().to_lowercase()).cloned().unwrap_or_default()
    }

    fn categories(&self) -> Vec<String> {
        self.display_names.values().cloned().collect()
    }
}
