//! Outbox target feed: appends mirrored posts to a JSONL file for review.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use toot_mirror_domain::{AccountIdentity, PublishError, TargetFeed, TargetPost};
use uuid::Uuid;

use crate::links_in_text;

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct OutboxWriter {
    path: PathBuf,
    file: Arc<Mutex<tokio::fs::File>>,
}

impl OutboxWriter {
    pub async fn new(path: PathBuf) -> Result<Self, OutboxError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, entry: &OutboxEntry) -> Result<(), OutboxError> {
        let line = serde_json::to_string(entry)?;
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    /// Entries in file order (oldest first); unreadable lines are skipped
    async fn read_all(&self) -> Result<Vec<OutboxEntry>, OutboxError> {
        let _guard = self.file.lock().await;
        let contents = fs::read_to_string(&self.path).await?;
        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(error) => {
                    tracing::warn!(error = %error, "Skipping unreadable outbox line");
                    None
                }
            })
            .collect())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OutboxEntry {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thread_parent: Option<String>,
    text: String,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

/// Target feed that writes to an outbox file instead of a platform
#[derive(Debug, Clone)]
pub struct OutboxTargetFeed {
    writer: OutboxWriter,
}

impl OutboxTargetFeed {
    pub fn new(writer: OutboxWriter) -> Self {
        Self { writer }
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }
}

#[async_trait]
impl TargetFeed for OutboxTargetFeed {
    async fn verify_identity(&self) -> Result<AccountIdentity, PublishError> {
        Ok(AccountIdentity {
            id: "outbox".to_string(),
            username: self.writer.path().display().to_string(),
        })
    }

    async fn recent_posts(&self, _account_id: &str) -> Result<Vec<TargetPost>, PublishError> {
        let entries = self
            .writer
            .read_all()
            .await
            .map_err(|error| PublishError::Network(format!("Outbox read failed: {}", error)))?;

        Ok(entries
            .into_iter()
            .rev()
            .map(|entry| TargetPost {
                embedded_links: links_in_text(&entry.text),
                id: entry.id,
                body: entry.text,
            })
            .collect())
    }

    async fn publish(
        &self,
        body: &str,
        thread_parent: Option<&str>,
    ) -> Result<String, PublishError> {
        let entry = OutboxEntry {
            id: Uuid::new_v4().to_string(),
            thread_parent: thread_parent.map(str::to_string),
            text: body.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };

        self.writer
            .append(&entry)
            .await
            .map_err(|error| PublishError::Network(format!("Outbox write failed: {}", error)))?;

        Ok(entry.id)
    }

    fn platform(&self) -> &'static str {
        "outbox"
    }
}
