//! `qdd` install command implementation.

use miette::{IntoDiagnostic, Result};
use qdd_core::pkg::{
    plan_install, InstallFailure, InstallSummary, Installer, InvalidEntryError, LocalFs,
    LockNode, PlanOptions, TarballFetcher, INLINE_LOCK_ENV,
};
use qdd_core::Config;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Printed when the project already has a `node_modules` directory.
pub const NODE_MODULES_PRESENT: &str =
    "Please delete your node_modules directory before installing.";

/// Install result for JSON output (`{ ok, install, error }`).
#[derive(Serialize)]
struct InstallJsonResult {
    ok: bool,
    install: Option<InstallSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

#[derive(Serialize)]
struct ErrorInfo {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<FailureInfo>,
}

#[derive(Serialize)]
struct FailureInfo {
    name: String,
    code: String,
    message: String,
}

impl ErrorInfo {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            failures: Vec::new(),
        }
    }
}

/// Run the install for `config.cwd`.
pub fn run(config: &Config) -> Result<()> {
    let json = config.json_logs;

    let inline_source = std::env::var_os(INLINE_LOCK_ENV).map(PathBuf::from);
    let lock = match LockNode::load(&config.cwd, inline_source.as_deref()) {
        Ok(lock) => lock,
        Err(e) => {
            if json {
                print_json(&failed(ErrorInfo::new(e.code(), e.message())))?;
            }
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let tasks = match plan_install(&lock, &config.cwd, &PlanOptions::from_config(config)) {
        Ok(tasks) => tasks,
        Err(e) => {
            if json {
                print_json(&failed(ErrorInfo::new(e.code(), e.to_string())))?;
            }
            print_invalid_entry(&e);
            std::process::exit(1);
        }
    };
    debug!(tasks = tasks.len(), "Planned install");

    let fetcher = TarballFetcher::new(&config.cwd).into_diagnostic()?;
    let installer = Installer::from_config(config, Arc::new(fetcher), Arc::new(LocalFs));

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    match runtime.block_on(installer.run(&tasks)) {
        Ok(summary) => {
            if json {
                print_json(&InstallJsonResult {
                    ok: true,
                    install: Some(summary),
                    error: None,
                })?;
            } else {
                println!("qdd install");
                println!(
                    "  packages: {} total, {} cached, {} downloaded",
                    summary.total, summary.cache_hits, summary.fetched
                );
            }
            Ok(())
        }
        Err(failure) => {
            if json {
                print_json(&failed(failure_info(&failure)))?;
            } else {
                print_failure(&failure);
            }
            std::process::exit(1);
        }
    }
}

fn print_invalid_entry(e: &InvalidEntryError) {
    eprintln!("invalid entry found in package-lock.json");
    eprintln!("{}", e.render_entry());
    eprintln!("fix this, delete node_modules, and try again");
}

fn print_failure(failure: &InstallFailure) {
    eprintln!("qdd install failed");
    match failure {
        InstallFailure::CacheRoot(e) => eprintln!("  ! {} {}", e.code(), e.message()),
        InstallFailure::Tasks {
            failures,
            cancelled,
        } => {
            for f in failures {
                eprintln!("  ! {}: {} {}", f.name, f.error.code(), f.error.message());
            }
            if *cancelled > 0 {
                eprintln!("  {cancelled} package(s) not attempted");
            }
        }
    }
}

fn failure_info(failure: &InstallFailure) -> ErrorInfo {
    let first = failure.errors().first().copied();
    let mut info = ErrorInfo::new(first.map_or("", |e| e.code()), failure.to_string());
    if let InstallFailure::Tasks { failures, .. } = failure {
        info.failures = failures
            .iter()
            .map(|f| FailureInfo {
                name: f.name.clone(),
                code: f.error.code().to_string(),
                message: f.error.message().to_string(),
            })
            .collect();
    }
    info
}

fn failed(error: ErrorInfo) -> InstallJsonResult {
    InstallJsonResult {
        ok: false,
        install: None,
        error: Some(error),
    }
}

fn print_json(result: &InstallJsonResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result).into_diagnostic()?);
    Ok(())
}
