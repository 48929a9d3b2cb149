use std::path::Path;
use std::sync::Arc;

use cartwise_core::analyzer::CatalogAnalyzer;

use crate::commands::{load_catalog, CommandResult};

pub fn run(catalog_path: &Path, category: &str) -> CommandResult {
    let catalog = match load_catalog(catalog_path) {
        Ok(catalog) => catalog,
        Err(error) => {
            return CommandResult::failure("analyze", "catalog_input", format!("{error:#}"), 8);
        }
    };

    let analysis = CatalogAnalyzer::new(Arc::new(catalog)).analyze(category);
    let message = match analysis.top_attribute() {
        Some(top) => format!(
            "{} products, {} attributes, strongest attribute `{}`",
            analysis.total_products,
            analysis.attributes.len(),
            top.name
        ),
        None => format!("{} products, no discriminating attributes", analysis.total_products),
    };

    match serde_json::to_value(&analysis) {
        Ok(data) => CommandResult::success_with_data("analyze", message, Some(data)),
        Err(error) => CommandResult::failure("analyze", "serialization", error.to_string(), 9),
    }
}
