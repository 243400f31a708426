//! Checkpoint command - inspect or edit the stored checkpoint

use anyhow::{Context, Result, bail};
use std::path::PathBuf;

use crate::args::{CheckpointArgs, CheckpointCommands};
use crate::config::AppConfig;
use crate::wiring::{build_checkpoint, build_explicit_checkpoint, build_target};

pub async fn execute(args: CheckpointArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;

    match args.command {
        CheckpointCommands::Show => show(&config).await,
        CheckpointCommands::Set { id } => set(&config, &id).await,
        CheckpointCommands::Clear => clear(&config).await,
    }
}

async fn show(config: &AppConfig) -> Result<()> {
    // The introspection strategy derives the checkpoint from the target feed
    let target = build_target(config).await?;
    let store = build_checkpoint(config, &target).await?;

    match store
        .load()
        .await
        .context("Failed to load checkpoint")?
    {
        Some(id) => println!("{}", id),
        None => println!("No checkpoint ({} strategy)", store.strategy()),
    }

    Ok(())
}

async fn set(config: &AppConfig, id: &str) -> Result<()> {
    require_explicit(config, "set")?;

    let id = id.trim();
    if id.is_empty() {
        bail!("Checkpoint ID must not be empty");
    }

    let store = build_explicit_checkpoint(config).await?;
    store
        .save(id)
        .await
        .context("Failed to save checkpoint")?;

    tracing::info!(checkpoint = %id, backend = store.strategy(), "Checkpoint set");
    println!("Checkpoint set to {}", id);
    Ok(())
}

async fn clear(config: &AppConfig) -> Result<()> {
    require_explicit(config, "clear")?;

    let store = build_explicit_checkpoint(config).await?;
    store.clear().await.context("Failed to clear checkpoint")?;

    tracing::info!(backend = store.strategy(), "Checkpoint cleared");
    println!("Checkpoint cleared");
    Ok(())
}

fn require_explicit(config: &AppConfig, action: &str) -> Result<()> {
    if config.checkpoint.strategy.trim() != "explicit" {
        bail!(
            "Cannot {} the checkpoint with the {} strategy; it is read from the target feed",
            action,
            config.checkpoint.strategy
        );
    }
    Ok(())
}
