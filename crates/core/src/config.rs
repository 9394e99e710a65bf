use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub generation: GenerationConfig,
    pub search: SearchConfig,
    pub scheduler: SchedulerSettings,
    pub logging: LoggingConfig,
}

/// Generation provider (Gemini-style JSON API).
#[derive(Clone, Debug)]
pub struct GenerationConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
}

/// Paper search provider (CORE-style works API).
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub page_limit: u32,
    pub timeout_secs: u64,
}

/// Rate limiting and retry policy.
///
/// The two buckets model per-call-class throughput (lite = classification
/// and query-optimization calls, heavy = narrative generation), while
/// `daily_limit` is a single provider-wide cap shared by both.
#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    pub daily_limit: u32,
    pub lite: BucketConfig,
    pub heavy: BucketConfig,
    pub retries: u32,
    pub initial_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct BucketConfig {
    pub capacity: u32,
    pub refill_interval_secs: u64,
    pub max_in_flight: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
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
    pub generation_api_key: Option<String>,
    pub generation_model: Option<String>,
    pub search_api_key: Option<String>,
    pub log_level: Option<String>,
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
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig {
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                api_key: None,
                model: "gemini-2.0-flash".to_string(),
                timeout_secs: 30,
            },
            search: SearchConfig {
                base_url: "https://api.core.ac.uk/v3".to_string(),
                api_key: None,
                page_limit: 15,
                timeout_secs: 30,
            },
            scheduler: SchedulerSettings {
                daily_limit: 1500,
                lite: BucketConfig { capacity: 15, refill_interval_secs: 60, max_in_flight: 1 },
                heavy: BucketConfig { capacity: 15, refill_interval_secs: 60, max_in_flight: 1 },
                retries: 3,
                initial_delay_ms: 1000,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("quill.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(generation) = patch.generation {
            if let Some(base_url) = generation.base_url {
                self.generation.base_url = base_url;
            }
            if let Some(api_key_value) = generation.api_key {
                self.generation.api_key = Some(secret_value(api_key_value));
            }
            if let Some(model) = generation.model {
                self.generation.model = model;
            }
            if let Some(timeout_secs) = generation.timeout_secs {
                self.generation.timeout_secs = timeout_secs;
            }
        }

        if let Some(search) = patch.search {
            if let Some(base_url) = search.base_url {
                self.search.base_url = base_url;
            }
            if let Some(api_key_value) = search.api_key {
                self.search.api_key = Some(secret_value(api_key_value));
            }
            if let Some(page_limit) = search.page_limit {
                self.search.page_limit = page_limit;
            }
            if let Some(timeout_secs) = search.timeout_secs {
                self.search.timeout_secs = timeout_secs;
            }
        }

        if let Some(scheduler) = patch.scheduler {
            if let Some(daily_limit) = scheduler.daily_limit {
                self.scheduler.daily_limit = daily_limit;
            }
            if let Some(lite) = scheduler.lite {
                apply_bucket_patch(&mut self.scheduler.lite, lite);
            }
            if let Some(heavy) = scheduler.heavy {
                apply_bucket_patch(&mut self.scheduler.heavy, heavy);
            }
            if let Some(retries) = scheduler.retries {
                self.scheduler.retries = retries;
            }
            if let Some(initial_delay_ms) = scheduler.initial_delay_ms {
                self.scheduler.initial_delay_ms = initial_delay_ms;
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
        if let Some(value) = read_env("QUILL_GENERATION_API_KEY") {
            self.generation.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("QUILL_GENERATION_BASE_URL") {
            self.generation.base_url = value;
        }
        if let Some(value) = read_env("QUILL_GENERATION_MODEL") {
            self.generation.model = value;
        }
        if let Some(value) = read_env("QUILL_SEARCH_API_KEY") {
            self.search.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("QUILL_SEARCH_BASE_URL") {
            self.search.base_url = value;
        }
        if let Some(value) = read_env("QUILL_SEARCH_PAGE_LIMIT") {
            self.search.page_limit = parse_u32("QUILL_SEARCH_PAGE_LIMIT", &value)?;
        }
        if let Some(value) = read_env("QUILL_DAILY_LIMIT") {
            self.scheduler.daily_limit = parse_u32("QUILL_DAILY_LIMIT", &value)?;
        }
        if let Some(value) = read_env("QUILL_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("QUILL_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(api_key_value) = overrides.generation_api_key {
            self.generation.api_key = Some(secret_value(api_key_value));
        }
        if let Some(model) = overrides.generation_model {
            self.generation.model = model;
        }
        if let Some(api_key_value) = overrides.search_api_key {
            self.search.api_key = Some(secret_value(api_key_value));
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("generation.base_url must not be empty".into()));
        }
        if self.search.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("search.base_url must not be empty".into()));
        }
        if self.search.page_limit == 0 {
            return Err(ConfigError::Validation("search.page_limit must be at least 1".into()));
        }
        if self.scheduler.daily_limit == 0 {
            return Err(ConfigError::Validation("scheduler.daily_limit must be at least 1".into()));
        }
        for (name, bucket) in
            [("lite", &self.scheduler.lite), ("heavy", &self.scheduler.heavy)]
        {
            if bucket.capacity == 0 {
                return Err(ConfigError::Validation(format!(
                    "scheduler.{name}.capacity must be at least 1"
                )));
            }
            if bucket.refill_interval_secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "scheduler.{name}.refill_interval_secs must be at least 1"
                )));
            }
            if bucket.max_in_flight == 0 {
                return Err(ConfigError::Validation(format!(
                    "scheduler.{name}.max_in_flight must be at least 1"
                )));
            }
        }
        Ok(())
    }

    /// Effective values with secrets redacted, for `quill config`.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "generation": {
                "base_url": self.generation.base_url,
                "api_key": redact(self.generation.api_key.as_ref()),
                "model": self.generation.model,
                "timeout_secs": self.generation.timeout_secs,
            },
            "search": {
                "base_url": self.search.base_url,
                "api_key": redact(self.search.api_key.as_ref()),
                "page_limit": self.search.page_limit,
                "timeout_secs": self.search.timeout_secs,
            },
            "scheduler": {
                "daily_limit": self.scheduler.daily_limit,
                "lite": bucket_summary(&self.scheduler.lite),
                "heavy": bucket_summary(&self.scheduler.heavy),
                "retries": self.scheduler.retries,
                "initial_delay_ms": self.scheduler.initial_delay_ms,
            },
            "logging": {
                "level": self.logging.level,
                "format": format!("{:?}", self.logging.format).to_lowercase(),
            },
        })
    }
}

fn apply_bucket_patch(bucket: &mut BucketConfig, patch: BucketPatch) {
    if let Some(capacity) = patch.capacity {
        bucket.capacity = capacity;
    }
    if let Some(refill_interval_secs) = patch.refill_interval_secs {
        bucket.refill_interval_secs = refill_interval_secs;
    }
    if let Some(max_in_flight) = patch.max_in_flight {
        bucket.max_in_flight = max_in_flight;
    }
}

fn bucket_summary(bucket: &BucketConfig) -> serde_json::Value {
    serde_json::json!({
        "capacity": bucket.capacity,
        "refill_interval_secs": bucket.refill_interval_secs,
        "max_in_flight": bucket.max_in_flight,
    })
}

fn redact(secret: Option<&SecretString>) -> &'static str {
    match secret {
        Some(value) if !value.expose_secret().is_empty() => "***redacted***",
        _ => "(unset)",
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    let default = PathBuf::from("quill.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    generation: Option<GenerationPatch>,
    search: Option<SearchPatch>,
    scheduler: Option<SchedulerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerationPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    page_limit: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerPatch {
    daily_limit: Option<u32>,
    lite: Option<BucketPatch>,
    heavy: Option<BucketPatch>,
    retries: Option<u32>,
    initial_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BucketPatch {
    capacity: Option<u32>,
    refill_interval_secs: Option<u64>,
    max_in_flight: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AppConfig, ConfigOverrides, LoadOptions};

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.daily_limit, 1500);
        assert_eq!(config.scheduler.lite.capacity, 15);
    }

    #[test]
    fn file_patch_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[generation]
model = "gemini-2.0-flash-lite"

[scheduler]
daily_limit = 100

[scheduler.heavy]
capacity = 5
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("load config");

        assert_eq!(config.generation.model, "gemini-2.0-flash-lite");
        assert_eq!(config.scheduler.daily_limit, 100);
        assert_eq!(config.scheduler.heavy.capacity, 5);
        // Untouched sections keep defaults.
        assert_eq!(config.scheduler.lite.capacity, 15);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("definitely-not-here.toml".into()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let mut config = AppConfig::default();
        config.scheduler.lite.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn programmatic_overrides_win() {
        let config = AppConfig::load(LoadOptions {
            config_path: Some("definitely-not-here.toml".into()),
            require_file: false,
            overrides: ConfigOverrides {
                generation_model: Some("gemini-exp".to_string()),
                ..ConfigOverrides::default()
            },
        })
        .expect("load config");
        assert_eq!(config.generation.model, "gemini-exp");
    }

    #[test]
    fn summary_redacts_secrets() {
        let mut config = AppConfig::default();
        config.generation.api_key = Some("top-secret".to_string().into());
        let summary = config.redacted_summary();
        assert_eq!(summary["generation"]["api_key"], "***redacted***");
        assert_eq!(summary["search"]["api_key"], "(unset)");
    }
}
