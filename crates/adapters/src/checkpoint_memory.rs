//! In-memory checkpoint store for testing and dry runs

use async_trait::async_trait;
use std::sync::RwLock;
use toot_mirror_domain::{CheckpointError, CheckpointStore};

/// In-memory checkpoint store implementation
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    current: RwLock<Option<String>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing checkpoint
    pub fn with_checkpoint(source_post_id: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(Some(source_post_id.into())),
        }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self) -> Result<Option<String>, CheckpointError> {
        let current = self
            .current
            .read()
            .map_err(|e| CheckpointError::Database(e.to_string()))?;
        Ok(current.clone())
    }

    async fn save(&self, source_post_id: &str) -> Result<(), CheckpointError> {
        let mut current = self
            .current
            .write()
            .map_err(|e| CheckpointError::Database(e.to_string()))?;
        *current = Some(source_post_id.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        let mut current = self
            .current
            .write()
            .map_err(|e| CheckpointError::Database(e.to_string()))?;
        *current = None;
        Ok(())
    }

    fn strategy(&self) -> &'static str {
        "memory"
    }
}
