use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bounds that keep cache expiry arithmetic inside the representable date range.
pub const MAX_MATURITY_CACHE_TTL_SECS: u64 = 30 * 24 * 3_600;
pub const MAX_TREE_CACHE_TTL_DAYS: i64 = 365;
pub const MAX_TREE_CLEANUP_GRACE_DAYS: i64 = 365;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub personalization: PersonalizationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Knobs of the personalization engine.
#[derive(Clone, Debug, PartialEq)]
pub struct PersonalizationConfig {
    pub maturity_cache_ttl_secs: u64,
    pub tree_cache_ttl_days: i64,
    pub tree_cleanup_grace_days: i64,
    pub max_questions: usize,
    pub min_trigger_confidence: f64,
    pub max_recommendations: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub max_questions: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        Self {
            maturity_cache_ttl_secs: 3_600,
            tree_cache_ttl_days: 7,
            tree_cleanup_grace_days: 7,
            max_questions: 4,
            min_trigger_confidence: 0.7,
            max_recommendations: 10,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://cartwise.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 60,
                max_tokens: 2_000,
                temperature: 0.3,
            },
            personalization: PersonalizationConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("cartwise.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
        }

        if let Some(personalization) = patch.personalization {
            if let Some(ttl) = personalization.maturity_cache_ttl_secs {
                self.personalization.maturity_cache_ttl_secs = ttl;
            }
            if let Some(days) = personalization.tree_cache_ttl_days {
                self.personalization.tree_cache_ttl_days = days;
            }
            if let Some(days) = personalization.tree_cleanup_grace_days {
                self.personalization.tree_cleanup_grace_days = days;
            }
            if let Some(max_questions) = personalization.max_questions {
                self.personalization.max_questions = max_questions;
            }
            if let Some(confidence) = personalization.min_trigger_confidence {
                self.personalization.min_trigger_confidence = confidence;
            }
            if let Some(limit) = personalization.max_recommendations {
                self.personalization.max_recommendations = limit;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CARTWISE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CARTWISE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_value("CARTWISE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CARTWISE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_value("CARTWISE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CARTWISE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("CARTWISE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CARTWISE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("CARTWISE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CARTWISE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_value("CARTWISE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CARTWISE_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_value("CARTWISE_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("CARTWISE_LLM_TEMPERATURE") {
            self.llm.temperature = parse_value("CARTWISE_LLM_TEMPERATURE", &value)?;
        }

        if let Some(value) = read_env("CARTWISE_MATURITY_CACHE_TTL_SECS") {
            self.personalization.maturity_cache_ttl_secs =
                parse_value("CARTWISE_MATURITY_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("CARTWISE_TREE_CACHE_TTL_DAYS") {
            self.personalization.tree_cache_ttl_days =
                parse_value("CARTWISE_TREE_CACHE_TTL_DAYS", &value)?;
        }
        if let Some(value) = read_env("CARTWISE_MAX_QUESTIONS") {
            self.personalization.max_questions = parse_value("CARTWISE_MAX_QUESTIONS", &value)?;
        }
        if let Some(value) = read_env("CARTWISE_MIN_TRIGGER_CONFIDENCE") {
            self.personalization.min_trigger_confidence =
                parse_value("CARTWISE_MIN_TRIGGER_CONFIDENCE", &value)?;
        }

        let log_level =
            read_env("CARTWISE_LOGGING_LEVEL").or_else(|| read_env("CARTWISE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CARTWISE_LOGGING_FORMAT").or_else(|| read_env("CARTWISE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(max_questions) = overrides.max_questions {
            self.personalization.max_questions = max_questions;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_personalization(&self.personalization)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("cartwise.toml"), PathBuf::from("config/cartwise.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation("llm.max_tokens must be greater than zero".to_string()));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_personalization(config: &PersonalizationConfig) -> Result<(), ConfigError> {
    if !(1..=MAX_MATURITY_CACHE_TTL_SECS).contains(&config.maturity_cache_ttl_secs) {
        return Err(ConfigError::Validation(format!(
            "personalization.maturity_cache_ttl_secs must be in range 1..={MAX_MATURITY_CACHE_TTL_SECS}"
        )));
    }

    if !(1..=MAX_TREE_CACHE_TTL_DAYS).contains(&config.tree_cache_ttl_days) {
        return Err(ConfigError::Validation(format!(
            "personalization.tree_cache_ttl_days must be in range 1..={MAX_TREE_CACHE_TTL_DAYS}"
        )));
    }

    if !(0..=MAX_TREE_CLEANUP_GRACE_DAYS).contains(&config.tree_cleanup_grace_days) {
        return Err(ConfigError::Validation(format!(
            "personalization.tree_cleanup_grace_days must be in range 0..={MAX_TREE_CLEANUP_GRACE_DAYS}"
        )));
    }

    if !(1..=10).contains(&config.max_questions) {
        return Err(ConfigError::Validation(
            "personalization.max_questions must be in range 1..=10".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.min_trigger_confidence) {
        return Err(ConfigError::Validation(
            "personalization.min_trigger_confidence must be in range 0.0..=1.0".to_string(),
        ));
    }

    if config.max_recommendations == 0 {
        return Err(ConfigError::Validation(
            "personalization.max_recommendations must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    personalization: Option<PersonalizationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct PersonalizationPatch {
    maturity_cache_ttl_secs: Option<u64>,
    tree_cache_ttl_days: Option<i64>,
    tree_cleanup_grace_days: Option<i64>,
    max_questions: Option<usize>,
    min_trigger_confidence: Option<f64>,
    max_recommendations: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        validate_personalization, AppConfig, ConfigError, ConfigOverrides, LlmProvider,
        LoadOptions, LogFormat, PersonalizationConfig, MAX_MATURITY_CACHE_TTL_SECS,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_engine_constants() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.personalization.maturity_cache_ttl_secs == 3_600, "maturity ttl is 1h")?;
        ensure(config.personalization.tree_cache_ttl_days == 7, "tree ttl is 7 days")?;
        ensure(config.personalization.max_questions == 4, "default question count is 4")?;
        ensure(matches!(config.llm.provider, LlmProvider::Ollama), "default provider is ollama")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CARTWISE_API_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("cartwise.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "anthropic"
api_key = "${TEST_CARTWISE_API_KEY}"
model = "claude-test"

[personalization]
max_questions = 3
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from the environment",
            )?;
            ensure(config.personalization.max_questions == 3, "file should set max_questions")?;
            Ok(())
        })();

        clear_vars(&["TEST_CARTWISE_API_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTWISE_LOG_LEVEL", "warn");
        env::set_var("CARTWISE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["CARTWISE_LOG_LEVEL", "CARTWISE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTWISE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("CARTWISE_LLM_MODEL", "model-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("cartwise.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[llm]
model = "model-from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.llm.model == "model-from-env", "env model should win over file")?;
            Ok(())
        })();

        clear_vars(&["CARTWISE_DATABASE_URL", "CARTWISE_LLM_MODEL"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTWISE_LLM_PROVIDER", "anthropic");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["CARTWISE_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn invalid_numeric_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTWISE_MAX_QUESTIONS", "many");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default()).err();
            ensure(
                matches!(error, Some(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "CARTWISE_MAX_QUESTIONS"),
                "non-numeric max questions should be rejected",
            )
        })();

        clear_vars(&["CARTWISE_MAX_QUESTIONS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CARTWISE_LLM_PROVIDER", "openai");
        env::set_var("CARTWISE_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["CARTWISE_LLM_PROVIDER", "CARTWISE_LLM_API_KEY"]);
        result
    }

    #[test]
    fn cache_ttls_are_bounded() {
        let defaults = PersonalizationConfig::default();
        assert!(validate_personalization(&defaults).is_ok());

        let huge_maturity = PersonalizationConfig {
            maturity_cache_ttl_secs: 100_000_000_000_000,
            ..PersonalizationConfig::default()
        };
        assert!(matches!(
            validate_personalization(&huge_maturity),
            Err(ConfigError::Validation(message)) if message.contains("maturity_cache_ttl_secs")
        ));

        let longest = PersonalizationConfig {
            maturity_cache_ttl_secs: MAX_MATURITY_CACHE_TTL_SECS,
            ..PersonalizationConfig::default()
        };
        assert!(validate_personalization(&longest).is_ok());

        let huge_tree = PersonalizationConfig {
            tree_cache_ttl_days: i64::MAX,
            ..PersonalizationConfig::default()
        };
        assert!(matches!(
            validate_personalization(&huge_tree),
            Err(ConfigError::Validation(message)) if message.contains("tree_cache_ttl_days")
        ));

        let huge_grace = PersonalizationConfig {
            tree_cleanup_grace_days: 1_000_000,
            ..PersonalizationConfig::default()
        };
        assert!(validate_personalization(&huge_grace).is_err());
    }
}
