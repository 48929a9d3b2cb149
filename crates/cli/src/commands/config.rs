use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use cartwise_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key_path: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key_path: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key_path, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let llm_api_key = match config.llm.api_key.as_ref() {
        Some(key) => redact_token(key.expose_secret()),
        None => "<unset>".to_string(),
    };
    let personalization = &config.personalization;

    let fields = [
        Field::new("database.url", config.database.url.clone(), &["CARTWISE_DATABASE_URL"]),
        Field::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["CARTWISE_DATABASE_MAX_CONNECTIONS"],
        ),
        Field::new(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["CARTWISE_DATABASE_TIMEOUT_SECS"],
        ),
        Field::new("llm.provider", format!("{:?}", config.llm.provider), &["CARTWISE_LLM_PROVIDER"]),
        Field::new("llm.model", config.llm.model.clone(), &["CARTWISE_LLM_MODEL"]),
        Field::new(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["CARTWISE_LLM_BASE_URL"],
        ),
        Field::new("llm.api_key", llm_api_key, &["CARTWISE_LLM_API_KEY"]),
        Field::new(
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            &["CARTWISE_LLM_TIMEOUT_SECS"],
        ),
        Field::new("llm.max_tokens", config.llm.max_tokens.to_string(), &["CARTWISE_LLM_MAX_TOKENS"]),
        Field::new(
            "llm.temperature",
            config.llm.temperature.to_string(),
            &["CARTWISE_LLM_TEMPERATURE"],
        ),
        Field::new(
            "personalization.maturity_cache_ttl_secs",
            personalization.maturity_cache_ttl_secs.to_string(),
            &["CARTWISE_MATURITY_CACHE_TTL_SECS"],
        ),
        Field::new(
            "personalization.tree_cache_ttl_days",
            personalization.tree_cache_ttl_days.to_string(),
            &["CARTWISE_TREE_CACHE_TTL_DAYS"],
        ),
        Field::new(
            "personalization.tree_cleanup_grace_days",
            personalization.tree_cleanup_grace_days.to_string(),
            &[],
        ),
        Field::new(
            "personalization.max_questions",
            personalization.max_questions.to_string(),
            &["CARTWISE_MAX_QUESTIONS"],
        ),
        Field::new(
            "personalization.min_trigger_confidence",
            personalization.min_trigger_confidence.to_string(),
            &["CARTWISE_MIN_TRIGGER_CONFIDENCE"],
        ),
        Field::new(
            "personalization.max_recommendations",
            personalization.max_recommendations.to_string(),
            &[],
        ),
        Field::new(
            "logging.level",
            config.logging.level.clone(),
            &["CARTWISE_LOGGING_LEVEL", "CARTWISE_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["CARTWISE_LOGGING_FORMAT", "CARTWISE_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.iter().map(|field| {
        render_line(
            field.key_path,
            &field.value,
            field_source(
                field.key_path,
                field.env_keys,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        )
    }));
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("cartwise.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/cartwise.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps a recognizable key prefix such as `sk-` and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn tokens_keep_only_their_prefix() {
        assert_eq!(redact_token("sk-ant-abc123"), "sk-***");
        assert_eq!(redact_token("plainsecret"), "<redacted>");
        assert_eq!(redact_token("   "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: toml::Value =
            "[personalization]\nmax_questions = 3\n".parse().expect("valid toml");
        assert!(contains_path(&doc, "personalization.max_questions"));
        assert!(!contains_path(&doc, "personalization.tree_cache_ttl_days"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}
