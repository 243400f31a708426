//! Run command - mirror loop in once, poll, or stream mode

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use toot_mirror_domain::{RunMode, SystemClock, usecases::MirrorEngine};

use crate::args::RunArgs;
use crate::config::AppConfig;
use crate::wiring::{build_checkpoint, build_source, build_target};

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    let mode = if args.once {
        RunMode::Once
    } else if args.poll {
        RunMode::Poll
    } else if args.stream {
        RunMode::Stream
    } else {
        config.run_mode()?
    };

    let mirror_config = config.mirror_config(args.dry_run)?;

    tracing::info!(
        mode = ?mode,
        dry_run = mirror_config.dry_run,
        source = %config.mastodon.provider,
        target = %config.x.provider,
        checkpoint = %config.checkpoint.strategy,
        "Starting toot-mirror run"
    );

    // Build dependencies
    let source = build_source(&config).await?;
    let target = build_target(&config).await?;
    let checkpoint = build_checkpoint(&config, &target).await?;

    let engine = MirrorEngine::new(
        source,
        target,
        checkpoint,
        Arc::new(SystemClock),
        mirror_config,
    )
    .context("Invalid mirror configuration")?;

    match mode {
        RunMode::Once => {
            let report = engine.run_once().await.context("Mirror cycle failed")?;

            for mirrored in &report.mirrored {
                tracing::info!(
                    source_id = %mirrored.source_id,
                    target_ids = ?mirrored.target_ids,
                    "Mirrored"
                );
            }

            tracing::info!(
                fetched = report.fetched,
                eligible = report.eligible,
                skipped_malformed = report.skipped_malformed,
                mirrored = report.mirrored.len(),
                dry_run = report.dry_run,
                "Mirror cycle complete"
            );
        }
        RunMode::Poll => {
            engine
                .run_poll(shutdown_signal())
                .await
                .context("Poll loop stopped")?;
        }
        RunMode::Stream => {
            engine
                .run_stream(shutdown_signal())
                .await
                .context("Stream loop stopped")?;
        }
    }

    tracing::info!("toot-mirror run completed");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
