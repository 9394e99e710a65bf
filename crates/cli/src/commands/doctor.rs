use std::path::PathBuf;

use quill_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Offline readiness checks: config loads and validates, provider
/// credentials are present. No network calls.
pub fn run(config_path: Option<PathBuf>, json_output: bool) -> CommandResult {
    let report = build_report(config_path);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed: {error}\"}}"
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(config_path: Option<PathBuf>) -> DoctorReport {
    let mut checks = Vec::new();

    let options = LoadOptions { config_path, ..LoadOptions::default() };
    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_generation_key(&config));
            checks.push(check_search_key(&config));
            checks.push(check_scheduler_budget(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["generation_key_readiness", "search_key_readiness", "scheduler_budget"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_generation_key(config: &AppConfig) -> DoctorCheck {
    match config.generation.api_key {
        Some(_) => DoctorCheck {
            name: "generation_key_readiness",
            status: CheckStatus::Pass,
            details: "generation api key is configured".to_string(),
        },
        None => DoctorCheck {
            name: "generation_key_readiness",
            status: CheckStatus::Fail,
            details: "generation api key is missing (set QUILL_GENERATION_API_KEY)".to_string(),
        },
    }
}

fn check_search_key(config: &AppConfig) -> DoctorCheck {
    // The search API works unauthenticated at reduced rate limits, so a
    // missing key passes with a note.
    match config.search.api_key {
        Some(_) => DoctorCheck {
            name: "search_key_readiness",
            status: CheckStatus::Pass,
            details: "search api key is configured".to_string(),
        },
        None => DoctorCheck {
            name: "search_key_readiness",
            status: CheckStatus::Pass,
            details: "search api key is not set; requests will be unauthenticated".to_string(),
        },
    }
}

fn check_scheduler_budget(config: &AppConfig) -> DoctorCheck {
    let per_minute = config.scheduler.lite.capacity + config.scheduler.heavy.capacity;
    DoctorCheck {
        name: "scheduler_budget",
        status: CheckStatus::Pass,
        details: format!(
            "daily limit {}, up to {per_minute} scheduled calls per refill interval",
            config.scheduler.daily_limit
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];
    for check in &report.checks {
        let status = match check.status {
            CheckStatus::Pass => "pass",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("  [{status}] {}: {}", check.name, check.details));
    }
    lines.join("\n")
}
