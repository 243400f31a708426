//! Doctor command - validate configuration and show status

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::args::DoctorArgs;
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    policy: CheckResult,
    mastodon: CheckResult,
    x: CheckResult,
    checkpoint: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        policy: CheckResult::error("Not checked"),
        mastodon: CheckResult::error("Not checked"),
        x: CheckResult::error("Not checked"),
        checkpoint: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    // Check config
    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {:#}", e));
            None
        }
    };

    if let Some(ref config) = config {
        report.policy = check_policy(config);
        report.mastodon = check_mastodon(config);
        report.x = check_x(config);
        report.checkpoint = check_checkpoint(config);
    }

    // Determine overall status
    let checks = [
        &report.config,
        &report.policy,
        &report.mastodon,
        &report.x,
        &report.checkpoint,
    ];

    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok());

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    // Output report
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

fn check_policy(config: &AppConfig) -> CheckResult {
    let mode = match config.run_mode() {
        Ok(mode) => mode,
        Err(e) => return CheckResult::error(format!("{:#}", e)),
    };

    match config.mirror_policy() {
        Ok(policy) => CheckResult::ok(format!(
            "Mode: {:?}, Link: {:?}, Budget: {}",
            mode, policy.link_mode, policy.character_budget
        ))
        .with_details(serde_json::json!({
            "visibilities": policy.visibilities,
            "tags_to_append": policy.tags_to_append,
            "interval_secs": policy.poll_interval.as_secs(),
            "dry_run": config.general.dry_run,
        })),
        Err(e) => CheckResult::error(format!("{:#}", e)),
    }
}

fn check_mastodon(config: &AppConfig) -> CheckResult {
    let mastodon = &config.mastodon;

    match mastodon.provider.as_str() {
        "stub" => {
            return match &mastodon.stub_posts_path {
                Some(path) if !path.exists() => CheckResult::error(format!(
                    "Stub posts file does not exist: {}",
                    path.display()
                )),
                Some(path) => CheckResult::ok(format!("Provider: stub ({})", path.display())),
                None => CheckResult::ok("Provider: stub (no posts)"),
            };
        }
        "mastodon" => {}
        other => return CheckResult::error(format!("Unknown provider: {}", other)),
    }

    if mastodon.api_base_url.trim().is_empty() {
        return CheckResult::error("mastodon.api_base_url is empty");
    }

    check_token_env(
        &mastodon.access_token_env,
        &format!("Instance: {}", mastodon.api_base_url),
    )
}

fn check_x(config: &AppConfig) -> CheckResult {
    match config.x.provider.as_str() {
        "x" => check_token_env(&config.x.user_token_env, "Provider: x"),
        "outbox" => CheckResult::ok(format!(
            "Provider: outbox ({})",
            config.x.outbox_path.display()
        )),
        "stub" => CheckResult::ok("Provider: stub (offline)"),
        other => CheckResult::error(format!("Unknown provider: {}", other)),
    }
}

fn check_checkpoint(config: &AppConfig) -> CheckResult {
    let checkpoint = &config.checkpoint;

    match checkpoint.strategy.as_str() {
        "introspection" => {
            if config.x.provider == "stub" {
                CheckResult::warn("Introspection against the stub target forgets every run")
            } else {
                CheckResult::ok("Strategy: introspection (read from the target feed)")
            }
        }
        "explicit" => match checkpoint.backend.as_str() {
            "memory" => CheckResult::warn("Backend: memory (not persisted between runs)"),
            "file" | "sqlite" => check_checkpoint_path(&checkpoint.backend, &checkpoint.path),
            other => CheckResult::error(format!("Unknown checkpoint backend: {}", other)),
        },
        other => CheckResult::error(format!("Unknown checkpoint strategy: {}", other)),
    }
}

fn check_checkpoint_path(backend: &str, path: &Path) -> CheckResult {
    if path.is_dir() {
        return CheckResult::error(format!(
            "Checkpoint path is a directory: {}",
            path.display()
        ));
    }

    let state = if path.exists() { "exists" } else { "not yet written" };
    CheckResult::ok(format!(
        "Backend: {}, Path: {} ({})",
        backend,
        path.display(),
        state
    ))
}

fn check_token_env(env_var: &str, label: &str) -> CheckResult {
    if env_var.is_empty() {
        return CheckResult::error(format!("{}, no token env var configured", label));
    }

    // Presence only; the value is never printed
    match std::env::var(env_var) {
        Ok(val) if !val.is_empty() => {
            CheckResult::ok(format!("{}, Token: {} (set)", label, env_var))
        }
        _ => CheckResult::warn(format!("{}, Token: {} (not set)", label, env_var)),
    }
}

fn print_report(report: &DoctorReport) {
    println!("toot-mirror Doctor Report");
    println!("=========================");
    println!();

    print_check("Config", &report.config);
    print_check("Policy", &report.policy);
    print_check("Mastodon", &report.mastodon);
    print_check("X", &report.x);
    print_check("Checkpoint", &report.checkpoint);

    println!();
    let symbol = match report.overall.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} Overall: {}", symbol, report.overall.to_uppercase());

    if report.overall == "ok" {
        println!();
        println!("Ready to run! Try: toot-mirror run --dry-run --once");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    let symbol = match result.status.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} {}: {}", symbol, name, result.message);
}
