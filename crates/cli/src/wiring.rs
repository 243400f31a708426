//! Builds port implementations from configuration

use anyhow::{Context, Result, bail};
use secrecy::SecretString;
use std::sync::Arc;
use toot_mirror_adapters::{
    checkpoint::{FileCheckpointStore, InMemoryCheckpointStore, SqliteCheckpointStore},
    mastodon::{MastodonSourceFeed, StubSourceFeed},
    outbox::{OutboxTargetFeed, OutboxWriter},
    x::{StubTargetFeed, XTargetFeed},
};
use toot_mirror_domain::{CheckpointStore, FeedIntrospectionCheckpoint, SourceFeed, TargetFeed};

use crate::config::AppConfig;

pub async fn build_source(config: &AppConfig) -> Result<Arc<dyn SourceFeed>> {
    match config.mastodon.provider.trim() {
        "mastodon" => {
            if config.mastodon.api_base_url.trim().is_empty() {
                bail!("mastodon.api_base_url is empty");
            }
            let token = load_secret(&config.mastodon.access_token_env, "mastodon")?;
            Ok(Arc::new(MastodonSourceFeed::new(
                token,
                config.mastodon.api_base_url.clone(),
                config.general.page_size,
            )))
        }
        "stub" => match &config.mastodon.stub_posts_path {
            Some(path) => {
                let stub = StubSourceFeed::from_json_file(path)
                    .await
                    .with_context(|| format!("Failed to load stub posts: {}", path.display()))?;
                Ok(Arc::new(stub))
            }
            None => Ok(Arc::new(StubSourceFeed::empty())),
        },
        other => bail!("Invalid mastodon.provider: {}", other),
    }
}

pub async fn build_target(config: &AppConfig) -> Result<Arc<dyn TargetFeed>> {
    match config.x.provider.trim() {
        "x" => {
            let token = load_secret(&config.x.user_token_env, "x")?;
            Ok(Arc::new(
                XTargetFeed::new(token, config.mirror.character_budget)
                    .with_page_size(config.general.page_size),
            ))
        }
        "outbox" => {
            let writer = OutboxWriter::new(config.x.outbox_path.clone())
                .await
                .context("Failed to initialize outbox writer")?;
            Ok(Arc::new(OutboxTargetFeed::new(writer)))
        }
        "stub" => Ok(Arc::new(StubTargetFeed::new())),
        other => bail!("Invalid x.provider: {}", other),
    }
}

pub async fn build_checkpoint(
    config: &AppConfig,
    target: &Arc<dyn TargetFeed>,
) -> Result<Arc<dyn CheckpointStore>> {
    match config.checkpoint.strategy.trim() {
        "explicit" => build_explicit_checkpoint(config).await,
        "introspection" => Ok(Arc::new(FeedIntrospectionCheckpoint::new(
            Arc::clone(target),
            &config.mastodon.api_base_url,
            &config.mirror.banner,
        ))),
        other => bail!("Invalid checkpoint.strategy: {}", other),
    }
}

pub async fn build_explicit_checkpoint(config: &AppConfig) -> Result<Arc<dyn CheckpointStore>> {
    let path = &config.checkpoint.path;
    match config.checkpoint.backend.trim() {
        "file" => Ok(Arc::new(FileCheckpointStore::new(path.clone()))),
        "sqlite" => Ok(Arc::new(
            SqliteCheckpointStore::new(path)
                .await
                .with_context(|| format!("Failed to open checkpoint database: {}", path.display()))?,
        )),
        "memory" => Ok(Arc::new(InMemoryCheckpointStore::new())),
        other => bail!("Invalid checkpoint.backend: {}", other),
    }
}

pub fn load_secret(env_var: &str, provider: &str) -> Result<SecretString> {
    if env_var.trim().is_empty() {
        bail!("No token env var configured for {}", provider);
    }

    let value = std::env::var(env_var)
        .with_context(|| format!("Missing token env var {} for {}", env_var, provider))?;

    if value.trim().is_empty() {
        bail!("Token env var {} is empty for {}", env_var, provider);
    }

    Ok(SecretString::new(value.into()))
}
