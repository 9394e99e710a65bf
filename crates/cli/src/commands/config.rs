use std::path::PathBuf;

use quill_core::config::{AppConfig, LoadOptions};

/// Prints effective configuration (env > file > default) with secrets
/// redacted.
pub fn run(config_path: Option<PathBuf>) -> String {
    let options = LoadOptions { config_path, ..LoadOptions::default() };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    serde_json::to_string_pretty(&config.redacted_summary())
        .unwrap_or_else(|error| format!("config serialization failed: {error}"))
}
