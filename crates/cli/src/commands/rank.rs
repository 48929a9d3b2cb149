use std::path::Path;
use std::sync::Arc;

use cartwise_core::catalog::CatalogAccessor;
use cartwise_core::clock::{Clock, SystemClock};
use cartwise_core::config::{AppConfig, LoadOptions};
use cartwise_core::maturity::{MaturityScore, MaturityScorer};
use cartwise_core::profile::{ShopperProfile, ShopperProfileStore};
use cartwise_core::ranking::{RankingEngine, RankingInput};
use cartwise_db::{connect_with_config, SqlShopperRepository};
use serde_json::json;

use crate::commands::{current_thread_runtime, load_catalog, CommandResult};

pub fn run(
    catalog_path: &Path,
    category: &str,
    user_id: Option<&str>,
    limit: Option<usize>,
) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "rank",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    let catalog = match load_catalog(catalog_path) {
        Ok(catalog) => catalog,
        Err(error) => {
            return CommandResult::failure("rank", "catalog_input", format!("{error:#}"), 8);
        }
    };
    let products = catalog.lookup(category);
    if products.is_empty() {
        return CommandResult::failure(
            "rank",
            "catalog_input",
            format!("no products found in category `{category}`"),
            8,
        );
    }

    let (profile, maturity) = match user_id {
        Some(user_id) => match load_shopper(&config, user_id) {
            Ok(loaded) => loaded,
            Err(failure) => return failure,
        },
        None => (ShopperProfile::default(), MaturityScore::cold_start(SystemClock.now())),
    };

    let user_label = user_id.unwrap_or("anonymous");
    let input = RankingInput {
        user_id: user_label,
        maturity: &maturity,
        preferences: &profile.preferences,
        history: &profile.history,
        household: profile.household.as_ref(),
    };
    let limit = limit.unwrap_or(config.personalization.max_recommendations).max(1);
    let ranked = RankingEngine::default().top(&products, &input, limit);

    let message = format!(
        "ranked {} of {} products in `{category}` for {user_label} ({})",
        ranked.len(),
        products.len(),
        maturity.level.as_str()
    );
    let data = json!({
        "category": category,
        "user_id": user_label,
        "maturity": maturity,
        "products": ranked,
    });
    CommandResult::success_with_data("rank", message, Some(data))
}

fn load_shopper(
    config: &AppConfig,
    user_id: &str,
) -> Result<(ShopperProfile, MaturityScore), CommandResult> {
    let runtime = current_thread_runtime().map_err(|error| {
        CommandResult::failure(
            "rank",
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })?;

    runtime.block_on(async {
        let pool = connect_with_config(&config.database).await.map_err(|error| {
            CommandResult::failure("rank", "db_connectivity", error.to_string(), 4)
        })?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let shoppers = Arc::new(SqlShopperRepository::new(pool.clone(), clock.clone()));

        let profile = shoppers
            .profile(user_id)
            .await
            .map_err(|error| {
                CommandResult::application_failure("rank", "shopper_profile", error, 6)
            })?;
        let maturity = MaturityScorer::with_ttl(
            shoppers,
            clock,
            config.personalization.maturity_cache_ttl_secs,
        )
        .score(user_id)
        .await
        .map_err(|error| {
            CommandResult::application_failure("rank", "shopper_profile", error, 6)
        })?;

        pool.close().await;
        Ok((profile, maturity))
    })
}
