pub mod analyze;
pub mod cache_cleanup;
pub mod config;
pub mod migrate;
pub mod rank;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use cartwise_core::catalog::InMemoryCatalog;
use cartwise_core::errors::ApplicationError;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            correlation_id: None,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            correlation_id: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Reports a service-layer failure through its interface mapping: the user-safe message
    /// leads, the detail follows, and a fresh correlation id ties the output to the log line.
    pub fn application_failure(
        command: &str,
        error_class: &str,
        error: ApplicationError,
        exit_code: u8,
    ) -> Self {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let interface = error.into_interface(correlation_id.clone());
        tracing::warn!(
            event_name = "cli.command.failed",
            command = %command,
            error_class = %error_class,
            correlation_id = %correlation_id,
            error = %interface,
            "command failed"
        );
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: format!("{} ({interface})", interface.user_message()),
            correlation_id: Some(correlation_id),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_catalog(path: &Path) -> Result<InMemoryCatalog> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read catalog `{}`", path.display()))?;
    InMemoryCatalog::from_json(&raw)
        .with_context(|| format!("could not parse catalog `{}`", path.display()))
}

pub(crate) fn current_thread_runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

#[cfg(test)]
mod tests {
    use cartwise_core::errors::ApplicationError;
    use serde_json::Value;

    use super::CommandResult;

    fn payload(result: &CommandResult) -> Value {
        serde_json::from_str(&result.output).expect("valid JSON")
    }

    #[test]
    fn missing_entity_reads_as_a_bad_request() {
        let result = CommandResult::application_failure(
            "rank",
            "shopper_profile",
            ApplicationError::NotFound { entity: "shopper", id: "s-9".to_string() },
            6,
        );
        assert_eq!(result.exit_code, 6);

        let payload = payload(&result);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "shopper_profile");
        let message = payload["message"].as_str().expect("message");
        assert!(message.starts_with("The request could not be processed."));
        assert!(message.contains("shopper `s-9` was not found"));
        assert_eq!(payload["correlation_id"].as_str().map(str::len), Some(36));
    }

    #[test]
    fn storage_failure_reads_as_unavailable() {
        let result = CommandResult::application_failure(
            "cache-cleanup",
            "tree_cache",
            ApplicationError::Persistence("no such table: tree_cache".to_string()),
            6,
        );
        let message = payload(&result)["message"].as_str().unwrap_or_default().to_string();
        assert!(message.starts_with("The service is temporarily unavailable."));
        assert!(message.contains("no such table"));
    }

    #[test]
    fn plain_failures_carry_no_correlation_id() {
        let result = CommandResult::failure("rank", "catalog_input", "missing", 8);
        assert!(payload(&result).get("correlation_id").is_none());
    }
}
