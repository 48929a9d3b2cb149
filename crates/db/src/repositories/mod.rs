use cartwise_core::errors::ApplicationError;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

pub mod interaction;
pub mod mission;
pub mod shopper;
pub mod tree_cache;

pub use interaction::SqlInteractionLog;
pub use mission::SqlMissionRepository;
pub use shopper::{OrderLine, SqlShopperRepository};
pub use tree_cache::SqlTreeCacheRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        Self::Persistence(value.to_string())
    }
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid {column} `{value}`: {error}")))
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|value| parse_timestamp(column, &value)).transpose()
}
