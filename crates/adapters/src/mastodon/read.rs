//! Mastodon REST adapter for reading the account's statuses

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use time::OffsetDateTime;
use toot_mirror_domain::{
    AccountIdentity, EventStream, SourceFeed, SourceFeedError, SourcePost, Visibility,
};

use super::stream::event_stream;

/// Mastodon source feed reading a single account
pub struct MastodonSourceFeed {
    client: Client,
    access_token: SecretString,
    base_url: String,
    streaming_url: String,
    page_size: usize,
}

impl MastodonSourceFeed {
    pub fn new(access_token: SecretString, base_url: String, page_size: usize) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            access_token,
            streaming_url: base_url.clone(),
            base_url,
            page_size: page_size.clamp(1, 40),
        }
    }

    /// Use a separate host for the streaming API
    pub fn with_streaming_url(mut self, streaming_url: String) -> Self {
        self.streaming_url = streaming_url.trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, url: &str) -> Result<Response, SourceFeedError> {
        let response = self
            .client
            .get(url)
            .header(
                "Authorization",
                format!("Bearer {}", self.access_token.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| SourceFeedError::Network(e.to_string()))?;

        check_status(response).await
    }
}

/// Map non-success responses onto the source error taxonomy
pub(super) async fn check_status(response: Response) -> Result<Response, SourceFeedError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SourceFeedError::Auth(format!(
            "Access token rejected ({})",
            status
        )));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| {
                OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok()
            })
            .map(|reset| {
                let wait = reset - OffsetDateTime::now_utc();
                Duration::from_secs(wait.whole_seconds().max(0) as u64)
            });
        return Err(SourceFeedError::RateLimited(retry_after));
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        return Err(SourceFeedError::Network(format!(
            "Server error {}: {}",
            status, body
        )));
    }

    Err(SourceFeedError::Api(format!("Unexpected status {}: {}", status, body)))
}

#[derive(Deserialize)]
struct Account {
    id: String,
    username: String,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
}

/// Status entity as returned by the REST and streaming APIs
#[derive(Deserialize)]
pub(super) struct Status {
    id: String,
    account: Account,
    visibility: String,
    in_reply_to_id: Option<String>,
    #[serde(default)]
    mentions: Vec<serde_json::Value>,
    reblog: Option<serde_json::Value>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    tags: Vec<Tag>,
    url: Option<String>,
    uri: String,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

impl From<Status> for SourcePost {
    fn from(status: Status) -> Self {
        let visibility = status.visibility.parse().unwrap_or_else(|_| {
            tracing::debug!(
                status_id = %status.id,
                visibility = %status.visibility,
                "Unknown visibility, treating as private"
            );
            Visibility::Private
        });

        SourcePost {
            is_reply: status.in_reply_to_id.is_some() || !status.mentions.is_empty(),
            is_reshare: status.reblog.is_some(),
            url: status.url.unwrap_or(status.uri),
            id: status.id,
            account_id: status.account.id,
            visibility,
            content: status.content,
            tags: status.tags.into_iter().map(|t| t.name).collect(),
            created_at: status.created_at,
        }
    }
}

#[async_trait]
impl SourceFeed for MastodonSourceFeed {
    async fn verify_identity(&self) -> Result<AccountIdentity, SourceFeedError> {
        let url = format!("{}/api/v1/accounts/verify_credentials", self.base_url);
        let account: Account = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|e| SourceFeedError::Api(e.to_string()))?;

        Ok(AccountIdentity {
            id: account.id,
            username: account.username,
        })
    }

    async fn recent_posts(&self, account_id: &str) -> Result<Vec<SourcePost>, SourceFeedError> {
        tracing::debug!(account_id = %account_id, limit = self.page_size, "Fetching statuses");

        let url = format!(
            "{}/api/v1/accounts/{}/statuses?limit={}",
            self.base_url, account_id, self.page_size
        );
        let statuses: Vec<Status> = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|e| SourceFeedError::Api(e.to_string()))?;

        Ok(statuses.into_iter().map(SourcePost::from).collect())
    }

    async fn subscribe(&self, account_id: &str) -> Result<EventStream, SourceFeedError> {
        tracing::debug!(account_id = %account_id, "Opening user stream");

        let url = format!("{}/api/v1/streaming/user", self.streaming_url);
        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.access_token.expose_secret()),
            )
            .header("Accept", "text/event-stream")
            // The client-wide timeout would cut the long-lived stream
            .timeout(Duration::from_secs(60 * 60 * 24 * 365))
            .send()
            .await
            .map_err(|e| SourceFeedError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        Ok(event_stream(response))
    }
}
