//! X (Twitter) API adapters

mod read;
mod write;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::SecretString;
use std::sync::Mutex;
use std::time::Duration;
use toot_mirror_domain::{AccountIdentity, PublishError, TargetFeed, TargetPost};

use crate::links_in_text;

/// X API v2 target feed
pub struct XTargetFeed {
    client: Client,
    user_token: SecretString,
    base_url: String,
    max_chars: usize,
    page_size: usize,
}

impl XTargetFeed {
    pub fn new(user_token: SecretString, max_chars: usize) -> Self {
        Self::with_base_url(user_token, "https://api.twitter.com".to_string(), max_chars)
    }

    pub fn with_base_url(user_token: SecretString, base_url: String, max_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            user_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_chars,
            page_size: 20,
        }
    }

    /// Number of tweets read back for checkpoint introspection (5..=100)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(5, 100);
        self
    }
}

/// Map non-success responses onto the publish error taxonomy
async fn check_status(response: Response) -> Result<Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(PublishError::Auth("Invalid user token".to_string()));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PublishError::RateLimited);
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        return Err(PublishError::Network(format!(
            "Server error {}: {}",
            status, body
        )));
    }

    Err(PublishError::Rejected(format!("{}: {}", status, body)))
}

#[async_trait]
impl TargetFeed for XTargetFeed {
    async fn verify_identity(&self) -> Result<AccountIdentity, PublishError> {
        self.fetch_me().await
    }

    async fn recent_posts(&self, account_id: &str) -> Result<Vec<TargetPost>, PublishError> {
        self.fetch_user_tweets(account_id).await
    }

    async fn publish(
        &self,
        body: &str,
        thread_parent: Option<&str>,
    ) -> Result<String, PublishError> {
        self.create_tweet(body, thread_parent).await
    }

    fn platform(&self) -> &'static str {
        "x"
    }
}

/// Stub target feed for testing and offline runs
pub struct StubTargetFeed {
    published: Mutex<Vec<TargetPost>>,
}

impl StubTargetFeed {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(vec![]),
        }
    }

    /// Get all posts that were published, oldest first
    pub fn get_published(&self) -> Vec<TargetPost> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for StubTargetFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TargetFeed for StubTargetFeed {
    async fn verify_identity(&self) -> Result<AccountIdentity, PublishError> {
        Ok(AccountIdentity {
            id: "stub".to_string(),
            username: "stub".to_string(),
        })
    }

    async fn recent_posts(&self, _account_id: &str) -> Result<Vec<TargetPost>, PublishError> {
        let mut posts = self.get_published();
        posts.reverse();
        Ok(posts)
    }

    async fn publish(
        &self,
        body: &str,
        _thread_parent: Option<&str>,
    ) -> Result<String, PublishError> {
        let mut published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        let id = format!("stub_{}", published.len() + 1);
        published.push(TargetPost {
            id: id.clone(),
            body: body.to_string(),
            embedded_links: links_in_text(body),
        });
        Ok(id)
    }

    fn platform(&self) -> &'static str {
        "stub"
    }
}
