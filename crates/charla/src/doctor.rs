// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `charla doctor` command implementation.
//!
//! Quick diagnostic checks against the environment: configuration sanity,
//! database accessibility, and the presence of an active flow definition.

use std::time::Instant;

use charla_config::model::CharlaConfig;
use charla_core::CharlaError;
use charla_storage::queries::flows;
use charla_storage::Database;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

struct CheckResult {
    name: &'static str,
    status: CheckStatus,
    message: String,
}

/// Run the `charla doctor` command.
pub async fn run_doctor(config: &CharlaConfig) -> Result<(), CharlaError> {
    let started = Instant::now();
    let mut results = Vec::new();

    results.push(check_config(config));
    results.push(check_database(config).await);
    results.push(check_active_flow(config).await);

    println!();
    println!("  charla doctor");
    println!("  {}", "-".repeat(50));
    let mut failed = false;
    for result in &results {
        let symbol = match result.status {
            CheckStatus::Pass => "ok  ",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => {
                failed = true;
                "FAIL"
            }
        };
        println!("  [{symbol}] {:<18} {}", result.name, result.message);
    }
    println!("  {}", "-".repeat(50));
    println!("  completed in {:?}", started.elapsed());

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn check_config(config: &CharlaConfig) -> CheckResult {
    match charla_config::validation::validate_config(config) {
        Ok(()) => CheckResult {
            name: "config",
            status: CheckStatus::Pass,
            message: format!("agent '{}' configured", config.agent.name),
        },
        Err(errors) => CheckResult {
            name: "config",
            status: CheckStatus::Fail,
            message: format!("{} validation error(s)", errors.len()),
        },
    }
}

async fn check_database(config: &CharlaConfig) -> CheckResult {
    match Database::open(&config.storage.database_path).await {
        Ok(db) => match db.close().await {
            Ok(()) => CheckResult {
                name: "database",
                status: CheckStatus::Pass,
                message: format!("{} is writable", config.storage.database_path),
            },
            Err(e) => CheckResult {
                name: "database",
                status: CheckStatus::Warn,
                message: format!("opened, but close failed: {e}"),
            },
        },
        Err(e) => CheckResult {
            name: "database",
            status: CheckStatus::Fail,
            message: e.to_string(),
        },
    }
}

async fn check_active_flow(config: &CharlaConfig) -> CheckResult {
    let db = match Database::open(&config.storage.database_path).await {
        Ok(db) => db,
        Err(_) => {
            return CheckResult {
                name: "flow",
                status: CheckStatus::Warn,
                message: "skipped (database unavailable)".to_string(),
            };
        }
    };
    let result = flows::get_active_flow(&db, &config.engine.default_flow).await;
    let close_result = db.close().await;
    let mut check = match result {
        Ok(Some(record)) => CheckResult {
            name: "flow",
            status: CheckStatus::Pass,
            message: format!(
                "'{}' v{} active",
                record.name, record.version
            ),
        },
        Ok(None) => CheckResult {
            name: "flow",
            status: CheckStatus::Warn,
            message: format!(
                "no active flow named '{}'; new sessions will lack transitions",
                config.engine.default_flow
            ),
        },
        Err(e) => CheckResult {
            name: "flow",
            status: CheckStatus::Fail,
            message: e.to_string(),
        },
    };
    if let Err(e) = close_result {
        if check.status != CheckStatus::Fail {
            check.status = CheckStatus::Warn;
            check.message = format!("{}; close failed: {e}", check.message);
        }
    }
    check
}
