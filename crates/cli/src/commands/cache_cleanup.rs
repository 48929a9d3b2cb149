use chrono::{Duration, Utc};
use serde_json::json;

use cartwise_core::config::{AppConfig, LoadOptions};
use cartwise_core::trees::TreeCacheStore;
use cartwise_db::{connect_with_config, SqlTreeCacheRepository};

use crate::commands::{current_thread_runtime, CommandResult};

/// Removes cached trees whose expiry passed more than the configured grace period ago.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "cache-cleanup",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "cache-cleanup",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let cutoff = Utc::now() - Duration::days(config.personalization.tree_cleanup_grace_days);
    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| {
                CommandResult::failure("cache-cleanup", "db_connectivity", error.to_string(), 4)
            })?;
        let removed = SqlTreeCacheRepository::new(pool.clone())
            .delete_expired_before(cutoff)
            .await
            .map_err(|error| {
                CommandResult::application_failure("cache-cleanup", "tree_cache", error, 6)
            })?;
        pool.close().await;
        Ok::<u64, CommandResult>(removed)
    });

    match result {
        Ok(removed) => {
            tracing::info!(
                event_name = "cli.cache_cleanup.completed",
                removed = removed,
                "expired tree cache entries removed"
            );
            CommandResult::success_with_data(
                "cache-cleanup",
                format!("removed {removed} expired cached trees"),
                Some(json!({ "removed": removed, "cutoff": cutoff.to_rfc3339() })),
            )
        }
        Err(failure) => failure,
    }
}
