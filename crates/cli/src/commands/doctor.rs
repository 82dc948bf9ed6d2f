use serde::Serialize;
use sqlx::Row;

use frontdesk_core::config::{AppConfig, LoadOptions};
use frontdesk_db::{connect_with_settings, migrations, DbPool};

use crate::commands::{runtime, CommandResult};

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

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed: {}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };
    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_model_endpoint(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["model_endpoint", "database_connectivity", "migrations_current"] {
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

fn check_model_endpoint(config: &AppConfig) -> DoctorCheck {
    let base_url = config.model.base_url.trim();
    let well_formed = base_url
        .strip_prefix("https://")
        .or_else(|| base_url.strip_prefix("http://"))
        .is_some_and(|rest| !rest.is_empty());

    if well_formed {
        DoctorCheck {
            name: "model_endpoint",
            status: CheckStatus::Pass,
            details: format!("model base URL `{base_url}` is well-formed"),
        }
    } else {
        DoctorCheck {
            name: "model_endpoint",
            status: CheckStatus::Fail,
            details: format!("model base URL `{base_url}` is not an http(s) URL"),
        }
    }
}

/// Connectivity plus a migrations-current comparison against the embedded
/// migrator. Doctor never mutates the database.
fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to connect to database: {error}"),
                }];
            }
        };

        let mut checks = vec![DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        }];
        checks.push(check_migrations(&pool).await);
        pool.close().await;
        checks
    })
}

async fn check_migrations(pool: &DbPool) -> DoctorCheck {
    let expected = migrations::MIGRATOR.iter().count() as i64;
    let applied = sqlx::query("SELECT COUNT(*) AS count FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .ok()
        .and_then(|row| row.try_get::<i64, _>("count").ok());

    match applied {
        Some(applied) if applied >= expected => DoctorCheck {
            name: "migrations_current",
            status: CheckStatus::Pass,
            details: format!("{applied} of {expected} migrations applied"),
        },
        Some(applied) => DoctorCheck {
            name: "migrations_current",
            status: CheckStatus::Fail,
            details: format!("{applied} of {expected} migrations applied; run `frontdesk migrate`"),
        },
        None => DoctorCheck {
            name: "migrations_current",
            status: CheckStatus::Fail,
            details: "migration history table missing; run `frontdesk migrate`".to_string(),
        },
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
