use serde::Serialize;
use tablebell_agent::build_extractor;
use tablebell_core::config::{AppConfig, LoadOptions, NluProvider};
use tablebell_db::{migrations, ping};

use crate::commands::{block_on, open_pool, CommandResult, Failure, EXIT_CONFIG};

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
    #[serde(skip)]
    exit_code: u8,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into(), exit_code: 0 }
    }

    fn fail(name: &'static str, details: impl Into<String>, exit_code: u8) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into(), exit_code }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
            exit_code: 0,
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: &LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = report
        .checks
        .iter()
        .find(|check| check.status == CheckStatus::Fail)
        .map(|check| check.exit_code)
        .unwrap_or(0);

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            serde_json::json!({
                "overall_status": "fail",
                "summary": "doctor serialization failed",
                "error": error.to_string(),
            })
            .to_string()
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_nlu_readiness(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string(), EXIT_CONFIG));
            checks.push(DoctorCheck::skipped("nlu_readiness"));
            checks.push(DoctorCheck::skipped("database_connectivity"));
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

/// Builds the configured extractor without calling out to the model.
fn check_nlu_readiness(config: &AppConfig) -> DoctorCheck {
    match build_extractor(&config.nlu) {
        Ok(extractor) => {
            let details = match config.nlu.provider {
                NluProvider::RuleBased => "rule-based extraction, no external endpoint".to_string(),
                NluProvider::Http => format!(
                    "`{}` extraction via model `{}`, rule-based fallback on failure",
                    extractor.name(),
                    config.nlu.model
                ),
            };
            DoctorCheck::pass("nlu_readiness", details)
        }
        Err(error) => DoctorCheck::fail("nlu_readiness", format!("{error:#}"), EXIT_CONFIG),
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let result = block_on(async {
        let pool = open_pool(config).await?;
        ping(&pool).await.map_err(Failure::database)?;
        let pending = migrations::pending_versions(&pool).await.map_err(Failure::database)?;
        pool.close().await;
        Ok(pending.len())
    });

    match result {
        Ok(0) => DoctorCheck::pass("database_connectivity", "connected, schema up to date"),
        Ok(pending) => DoctorCheck::pass(
            "database_connectivity",
            format!("connected, {pending} migration(s) pending; run `tablebell migrate`"),
        ),
        Err(failure) => DoctorCheck::fail(
            "database_connectivity",
            format!("failed to reach database: {}", failure.message),
            failure.exit_code,
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

