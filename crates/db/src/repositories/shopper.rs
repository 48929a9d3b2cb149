use std::sync::Arc;

use async_trait::async_trait;
use cartwise_core::clock::Clock;
use cartwise_core::domain::shopper::{HouseholdContext, PurchaseHistoryEntry, UserPreference};
use cartwise_core::errors::ApplicationError;
use cartwise_core::maturity::{MaturityInputs, MaturitySource, PreferenceSignal};
use cartwise_core::profile::ShopperProfileStore;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, RepositoryError};
use crate::DbPool;

/// One line of a placed order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderLine {
    pub sku: String,
    pub quantity: u32,
}

/// Preferences, orders and household facts of shoppers. Also feeds the maturity scorer.
pub struct SqlShopperRepository {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl SqlShopperRepository {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Inserts a preference, or refreshes value and confidence of an existing one and counts the
    /// confirmation.
    pub async fn record_preference(
        &self,
        user_id: &str,
        preference: &UserPreference,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (
                user_id, preference_type, pref_key, pref_value, confidence, times_confirmed, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, preference_type, pref_key) DO UPDATE SET
                pref_value = excluded.pref_value,
                confidence = excluded.confidence,
                times_confirmed = user_preferences.times_confirmed + 1
            "#,
        )
        .bind(user_id)
        .bind(preference.preference_type.as_str())
        .bind(preference.normalized_key())
        .bind(&preference.value)
        .bind(preference.confidence)
        .bind(i64::from(preference.times_confirmed))
        .bind(format_timestamp(self.clock.now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_order(
        &self,
        order_id: &str,
        user_id: &str,
        lines: &[OrderLine],
        ordered_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for line in lines {
            sqlx::query(
                "INSERT INTO orders (order_id, user_id, sku, quantity, ordered_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(user_id)
            .bind(&line.sku)
            .bind(i64::from(line.quantity))
            .bind(format_timestamp(ordered_at))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(
            event_name = "shopper.order_recorded",
            user_id = %user_id,
            order_id = %order_id,
            lines = lines.len(),
            "order recorded"
        );
        Ok(())
    }

    pub async fn save_household(
        &self,
        user_id: &str,
        household: &HouseholdContext,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO household_profiles (user_id, context_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                context_json = excluded.context_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(serde_json::to_string(household)?)
        .bind(format_timestamp(self.clock.now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_preferences(&self, user_id: &str) -> Result<Vec<UserPreference>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT preference_type, pref_key, pref_value, confidence, times_confirmed
            FROM user_preferences
            WHERE user_id = ?
            ORDER BY confidence DESC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(preference_from_row).collect()
    }

    async fn fetch_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<PurchaseHistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT sku, COUNT(DISTINCT order_id) AS purchase_count, MAX(ordered_at) AS last_ordered_at
            FROM orders
            WHERE user_id = ?
            GROUP BY sku
            ORDER BY purchase_count DESC, sku ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let now = self.clock.now();
        rows.iter()
            .map(|row| {
                let purchase_count: i64 = row.try_get("purchase_count")?;
                let last_ordered_at: String = row.try_get("last_ordered_at")?;
                let last = parse_timestamp("last_ordered_at", &last_ordered_at)?;
                Ok(PurchaseHistoryEntry {
                    sku: row.try_get("sku")?,
                    purchase_count: u32::try_from(purchase_count).unwrap_or(u32::MAX),
                    days_since_last: u32::try_from((now - last).num_days().max(0))
                        .unwrap_or(u32::MAX),
                })
            })
            .collect()
    }

    async fn fetch_household(
        &self,
        user_id: &str,
    ) -> Result<Option<HouseholdContext>, RepositoryError> {
        let row = sqlx::query("SELECT context_json FROM household_profiles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let context_json: String = row.try_get("context_json")?;
                Ok(Some(serde_json::from_str(&context_json)?))
            }
            None => Ok(None),
        }
    }

    async fn fetch_maturity_inputs(&self, user_id: &str) -> Result<MaturityInputs, RepositoryError> {
        let orders = sqlx::query(
            r#"
            SELECT COUNT(DISTINCT order_id) AS order_count, MIN(ordered_at) AS first_order_at
            FROM orders
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        let order_count: i64 = orders.try_get("order_count")?;
        let first_order_at: Option<String> = orders.try_get("first_order_at")?;

        let preferences = sqlx::query(
            "SELECT confidence, created_at FROM user_preferences WHERE user_id = ? ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            let created_at: String = row.try_get("created_at")?;
            Ok(PreferenceSignal {
                confidence: row.try_get("confidence")?,
                created_at: parse_timestamp("created_at", &created_at)?,
            })
        })
        .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(MaturityInputs {
            order_count: u32::try_from(order_count).unwrap_or(u32::MAX),
            preferences,
            first_order_at: parse_optional_timestamp("first_order_at", first_order_at)?,
        })
    }
}

#[async_trait]
impl ShopperProfileStore for SqlShopperRepository {
    async fn preferences(&self, user_id: &str) -> Result<Vec<UserPreference>, ApplicationError> {
        Ok(self.fetch_preferences(user_id).await?)
    }

    async fn purchase_history(
        &self,
        user_id: &str,
    ) -> Result<Vec<PurchaseHistoryEntry>, ApplicationError> {
        Ok(self.fetch_history(user_id).await?)
    }

    async fn household(
        &self,
        user_id: &str,
    ) -> Result<Option<HouseholdContext>, ApplicationError> {
        Ok(self.fetch_household(user_id).await?)
    }
}

#[async_trait]
impl MaturitySource for SqlShopperRepository {
    async fn maturity_inputs(&self, user_id: &str) -> Result<MaturityInputs, ApplicationError> {
        Ok(self.fetch_maturity_inputs(user_id).await?)
    }
}

fn preference_from_row(row: &SqliteRow) -> Result<UserPreference, RepositoryError> {
    let preference_type: String = row.try_get("preference_type")?;
    let times_confirmed: i64 = row.try_get("times_confirmed")?;
    Ok(UserPreference {
        preference_type: preference_type
            .parse()
            .map_err(|error| RepositoryError::Decode(format!("{error}")))?,
        key: row.try_get("pref_key")?,
        value: row.try_get("pref_value")?,
        confidence: row.try_get("confidence")?,
        times_confirmed: u32::try_from(times_confirmed).unwrap_or(u32::MAX),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cartwise_core::clock::ManualClock;
    use cartwise_core::domain::shopper::{
        HouseholdContext, HouseholdMember, HouseholdRole, PreferenceType, UserPreference,
    };
    use cartwise_core::maturity::{MaturityLevel, MaturityScorer, MaturitySource};
    use cartwise_core::profile::ShopperProfileStore;
    use chrono::{Duration, TimeZone, Utc};

    use super::{OrderLine, SqlShopperRepository};
    use crate::repositories::test_support::setup_pool;

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 20, 12, 0, 0).single().expect("valid instant")
    }

    fn line(sku: &str) -> OrderLine {
        OrderLine { sku: sku.to_string(), quantity: 1 }
    }

    async fn repo(clock: &ManualClock) -> SqlShopperRepository {
        SqlShopperRepository::new(setup_pool().await, Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn preferences_upsert_and_count_confirmations() {
        let clock = ManualClock::new(now());
        let repo = repo(&clock).await;
        let brand = UserPreference::new(PreferenceType::Brand, "Nature Valley", 0.6);

        repo.record_preference("shopper-1", &brand).await.expect("insert");
        repo.record_preference("shopper-1", &UserPreference { confidence: 0.9, ..brand.clone() })
            .await
            .expect("confirm");
        repo.record_preference(
            "shopper-1",
            &UserPreference::new(PreferenceType::Allergy, "peanut", 1.0),
        )
        .await
        .expect("insert");

        let preferences = repo.preferences("shopper-1").await.expect("preferences");
        assert_eq!(preferences.len(), 2);
        assert_eq!(preferences[0].preference_type, PreferenceType::Allergy);
        assert_eq!(preferences[1].key, "nature valley");
        assert_eq!(preferences[1].times_confirmed, 1);
        assert!((preferences[1].confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn history_aggregates_orders_per_sku() {
        let clock = ManualClock::new(now());
        let repo = repo(&clock).await;
        repo.record_order("o-1", "shopper-2", &[line("MILK"), line("EGGS")], now() - Duration::days(40))
            .await
            .expect("order");
        repo.record_order("o-2", "shopper-2", &[line("MILK")], now() - Duration::days(3))
            .await
            .expect("order");

        let history = repo.purchase_history("shopper-2").await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sku, "MILK");
        assert_eq!(history[0].purchase_count, 2);
        assert_eq!(history[0].days_since_last, 3);
        assert_eq!(history[1].days_since_last, 40);
    }

    #[tokio::test]
    async fn household_round_trips() {
        let clock = ManualClock::new(now());
        let repo = repo(&clock).await;
        assert_eq!(repo.household("shopper-3").await.expect("household"), None);

        let household = HouseholdContext {
            people: vec![HouseholdMember {
                role: HouseholdRole::Baby,
                age_category: Some("newborn".to_string()),
            }],
            ..HouseholdContext::default()
        };
        repo.save_household("shopper-3", &household).await.expect("save");
        assert_eq!(repo.household("shopper-3").await.expect("household"), Some(household));
    }

    #[tokio::test]
    async fn maturity_inputs_feed_the_scorer() {
        let clock = ManualClock::new(now());
        let repo = Arc::new(repo(&clock).await);
        for index in 0..10 {
            repo.record_order(
                &format!("o-{index}"),
                "shopper-4",
                &[line("BREAD")],
                now() - Duration::days(30 - index),
            )
            .await
            .expect("order");
        }
        repo.record_preference(
            "shopper-4",
            &UserPreference::new(PreferenceType::Dietary, "organic", 1.0),
        )
        .await
        .expect("preference");

        let inputs = repo.maturity_inputs("shopper-4").await.expect("inputs");
        assert_eq!(inputs.order_count, 10);
        assert_eq!(inputs.preferences.len(), 1);
        assert_eq!(inputs.first_order_at, Some(now() - Duration::days(30)));

        // 20 (orders) + 3 (preference) + 15 (confidence) + 5 (tenure)
        let scorer = MaturityScorer::new(repo.clone(), Arc::new(clock.clone()));
        let score = scorer.score("shopper-4").await.expect("score");
        assert!((score.score - 43.0).abs() < 1e-9);
        assert_eq!(score.level, MaturityLevel::Emerging);
    }
}
