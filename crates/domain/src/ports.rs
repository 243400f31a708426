//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{AccountIdentity, SourcePost, StreamEvent, TargetPost};

/// Error type for source feed operations
#[derive(Debug, Error)]
pub enum SourceFeedError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<Duration>),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Stream error: {0}")]
    Stream(String),
}

impl SourceFeedError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceFeedError::Network(_) | SourceFeedError::RateLimited(_)
        )
    }
}

/// Event stream returned by [`SourceFeed::subscribe`]
pub type EventStream = BoxStream<'static, Result<StreamEvent, SourceFeedError>>;

/// Port for reading posts from the source platform
#[async_trait]
pub trait SourceFeed: Send + Sync {
    /// Resolve the account the credentials belong to
    async fn verify_identity(&self) -> Result<AccountIdentity, SourceFeedError>;

    /// Most recent posts of an account, newest first
    async fn recent_posts(&self, account_id: &str) -> Result<Vec<SourcePost>, SourceFeedError>;

    /// Push channel of account events
    async fn subscribe(&self, account_id: &str) -> Result<EventStream, SourceFeedError>;
}

/// Error type for target feed operations
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Rejected by platform: {0}")]
    Rejected(String),
    #[error("Content too long: {len} > {max}")]
    ContentTooLong { len: usize, max: usize },
}

impl PublishError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, PublishError::Network(_) | PublishError::RateLimited)
    }
}

/// Port for the platform posts are mirrored onto
#[async_trait]
pub trait TargetFeed: Send + Sync {
    /// Resolve the account the credentials belong to
    async fn verify_identity(&self) -> Result<AccountIdentity, PublishError>;

    /// Most recent posts of an account, newest first
    async fn recent_posts(&self, account_id: &str) -> Result<Vec<TargetPost>, PublishError>;

    /// Publish a body, optionally as a reply to `thread_parent`; returns the new post ID
    async fn publish(&self, body: &str, thread_parent: Option<&str>)
    -> Result<String, PublishError>;

    /// Get the platform name (e.g., "x", "outbox")
    fn platform(&self) -> &'static str;
}

/// Error type for checkpoint store operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Target feed error: {0}")]
    Feed(String),
    #[error("Target feed unavailable: {0}")]
    Unavailable(String),
    #[error("Operation not supported by {0} checkpoint store")]
    Unsupported(&'static str),
}

impl CheckpointError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, CheckpointError::Unavailable(_))
    }
}

/// Port for persisting the mirroring frontier
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// ID of the last mirrored source post, `None` if there is none
    async fn load(&self) -> Result<Option<String>, CheckpointError>;

    /// Durably record the last mirrored source post
    async fn save(&self, source_post_id: &str) -> Result<(), CheckpointError>;

    /// Forget the stored checkpoint
    async fn clear(&self) -> Result<(), CheckpointError>;

    /// Short name of the strategy (e.g., "file", "introspection")
    fn strategy(&self) -> &'static str;
}

/// Port for time/clock operations (enables deterministic testing)
#[async_trait]
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;

    /// Wait for the given duration
    async fn sleep(&self, duration: Duration);
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SourceFeedError::Network("reset".into()).is_transient());
        assert!(SourceFeedError::RateLimited(None).is_transient());
        assert!(!SourceFeedError::Auth("bad".into()).is_transient());
        assert!(PublishError::RateLimited.is_transient());
        assert!(!PublishError::Rejected("duplicate".into()).is_transient());
    }
}
