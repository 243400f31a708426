//! Mastodon source adapters

mod read;
mod stream;

pub use read::MastodonSourceFeed;
pub use stream::{SseDecoder, SseFrame, frame_to_event};

use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::sync::Mutex;
use toot_mirror_domain::{
    AccountIdentity, EventStream, SourceFeed, SourceFeedError, SourcePost, StreamEvent,
};

/// Stub source feed for testing and offline runs
pub struct StubSourceFeed {
    identity: AccountIdentity,
    posts: Vec<SourcePost>,
    events: Mutex<Vec<StreamEvent>>,
}

impl StubSourceFeed {
    /// Create an empty stub
    pub fn empty() -> Self {
        Self::with_posts(vec![])
    }

    /// Create a stub with predefined posts, newest first
    pub fn with_posts(posts: Vec<SourcePost>) -> Self {
        let account_id = posts
            .first()
            .map(|post| post.account_id.clone())
            .unwrap_or_else(|| "stub".to_string());
        Self {
            identity: AccountIdentity {
                id: account_id,
                username: "stub".to_string(),
            },
            posts,
            events: Mutex::new(vec![]),
        }
    }

    /// Load posts from a JSON array of source posts
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SourceFeedError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SourceFeedError::Api(format!("{}: {}", path.display(), e)))?;
        let posts: Vec<SourcePost> = serde_json::from_str(&contents)
            .map_err(|e| SourceFeedError::Api(format!("{}: {}", path.display(), e)))?;
        Ok(Self::with_posts(posts))
    }

    /// Events delivered by the next subscription
    pub fn with_events(self, events: Vec<StreamEvent>) -> Self {
        *self.events.lock().unwrap_or_else(|e| e.into_inner()) = events;
        self
    }
}

#[async_trait]
impl SourceFeed for StubSourceFeed {
    async fn verify_identity(&self) -> Result<AccountIdentity, SourceFeedError> {
        Ok(self.identity.clone())
    }

    async fn recent_posts(&self, _account_id: &str) -> Result<Vec<SourcePost>, SourceFeedError> {
        Ok(self.posts.clone())
    }

    async fn subscribe(&self, _account_id: &str) -> Result<EventStream, SourceFeedError> {
        let events = std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()));
        Ok(futures::stream::iter(events.into_iter().map(Ok)).boxed())
    }
}
