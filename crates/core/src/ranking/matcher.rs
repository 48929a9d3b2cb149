use crate::domain::product::Product;

/// Decides whether a product belongs to a preferred brand.
pub trait BrandMatcher: Send + Sync {
    fn matches(&self, product: &Product, brand_key: &str) -> bool;
}

/// Tag and name heuristics. A product matches when a tag equals the brand (bare or as
/// `brand:<key>`), when the name contains the whole key, or when the name contains each of the
/// first two words of the key longer than two characters (just the one, if only one is).
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicBrandMatcher;

impl BrandMatcher for HeuristicBrandMatcher {
    fn matches(&self, product: &Product, brand_key: &str) -> bool {
        let key = brand_key.trim().to_lowercase();
        if key.is_empty() {
            return false;
        }

        let tag_match = product.tags.iter().any(|tag| {
            let tag = tag.trim().to_lowercase();
            tag == key || tag.strip_prefix("brand:").map(str::trim) == Some(key.as_str())
        });
        if tag_match {
            return true;
        }

        let name = product.name.to_lowercase();
        if name.contains(&key) {
            return true;
        }

        let significant: Vec<&str> = key.split_whitespace().filter(|word| word.len() > 2).collect();
        !significant.is_empty() && significant.iter().take(2).all(|word| name.contains(word))
    }
}
