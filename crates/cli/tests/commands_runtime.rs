use std::env;
use std::sync::{Mutex, OnceLock};

use quill_cli::commands::{config, doctor};
use serde_json::Value;

#[test]
fn doctor_passes_with_a_generation_key() {
    with_env(&[("QUILL_GENERATION_API_KEY", "test-key")], || {
        let result = doctor::run(None, true);
        assert_eq!(result.exit_code, 0, "expected all readiness checks to pass");

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "pass");
        let checks = report["checks"].as_array().expect("checks array");
        assert!(checks
            .iter()
            .any(|check| check["name"] == "generation_key_readiness" && check["status"] == "pass"));
    });
}

#[test]
fn doctor_fails_without_a_generation_key() {
    with_env(&[], || {
        let result = doctor::run(None, true);
        assert_eq!(result.exit_code, 1, "expected missing key to fail readiness");

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "fail");
        let checks = report["checks"].as_array().expect("checks array");
        assert!(checks
            .iter()
            .any(|check| check["name"] == "generation_key_readiness" && check["status"] == "fail"));
    });
}

#[test]
fn doctor_skips_downstream_checks_when_config_is_invalid() {
    with_env(&[("QUILL_SEARCH_PAGE_LIMIT", "0")], || {
        let result = doctor::run(None, true);
        assert_eq!(result.exit_code, 1);

        let report = parse_payload(&result.output);
        let checks = report["checks"].as_array().expect("checks array");
        assert!(checks
            .iter()
            .any(|check| check["name"] == "config_validation" && check["status"] == "fail"));
        assert!(checks
            .iter()
            .any(|check| check["name"] == "scheduler_budget" && check["status"] == "skipped"));
    });
}

#[test]
fn config_output_redacts_the_api_keys() {
    with_env(
        &[
            ("QUILL_GENERATION_API_KEY", "super-secret-generation"),
            ("QUILL_SEARCH_API_KEY", "super-secret-search"),
        ],
        || {
            let output = config::run(None);
            assert!(!output.contains("super-secret-generation"));
            assert!(!output.contains("super-secret-search"));

            let summary = parse_payload(&output);
            assert_eq!(summary["generation"]["api_key"], "***redacted***");
            assert_eq!(summary["search"]["api_key"], "***redacted***");
        },
    );
}

#[test]
fn config_reports_validation_failures() {
    with_env(&[("QUILL_DAILY_LIMIT", "0")], || {
        let output = config::run(None);
        assert!(output.starts_with("config validation failed"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "QUILL_GENERATION_API_KEY",
        "QUILL_GENERATION_BASE_URL",
        "QUILL_GENERATION_MODEL",
        "QUILL_SEARCH_API_KEY",
        "QUILL_SEARCH_BASE_URL",
        "QUILL_SEARCH_PAGE_LIMIT",
        "QUILL_DAILY_LIMIT",
        "QUILL_LOG_LEVEL",
        "QUILL_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
