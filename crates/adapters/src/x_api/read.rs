//! X API read side: account lookup and timeline for checkpoint introspection

use secrecy::ExposeSecret;
use serde::Deserialize;
use toot_mirror_domain::{AccountIdentity, PublishError, TargetPost};

use super::{XTargetFeed, check_status};

#[derive(Deserialize)]
struct UserResponse {
    data: UserData,
}

#[derive(Deserialize)]
struct UserData {
    id: String,
    username: String,
}

#[derive(Deserialize)]
struct TweetsResponse {
    data: Option<Vec<Tweet>>,
}

#[derive(Deserialize)]
struct Tweet {
    id: String,
    text: String,
    entities: Option<Entities>,
}

#[derive(Deserialize)]
struct Entities {
    #[serde(default)]
    urls: Vec<UrlEntity>,
}

#[derive(Deserialize)]
struct UrlEntity {
    #[serde(default)]
    start: usize,
    url: String,
    expanded_url: Option<String>,
}

impl From<Tweet> for TargetPost {
    fn from(tweet: Tweet) -> Self {
        let mut urls = tweet.entities.map(|e| e.urls).unwrap_or_default();
        urls.sort_by_key(|u| u.start);

        TargetPost {
            id: tweet.id,
            body: tweet.text,
            embedded_links: urls
                .into_iter()
                .map(|u| u.expanded_url.unwrap_or(u.url))
                .collect(),
        }
    }
}

impl XTargetFeed {
    /// Resolve the account behind the user token
    pub(super) async fn fetch_me(&self) -> Result<AccountIdentity, PublishError> {
        let url = format!("{}/2/users/me", self.base_url);

        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.user_token.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let user: UserResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        Ok(AccountIdentity {
            id: user.data.id,
            username: user.data.username,
        })
    }

    /// Most recent tweets of an account, newest first
    pub(super) async fn fetch_user_tweets(
        &self,
        user_id: &str,
    ) -> Result<Vec<TargetPost>, PublishError> {
        let url = format!(
            "{}/2/users/{}/tweets?tweet.fields=entities&max_results={}",
            self.base_url, user_id, self.page_size
        );

        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.user_token.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let tweets: TweetsResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let posts: Vec<TargetPost> = tweets
            .data
            .unwrap_or_default()
            .into_iter()
            .map(TargetPost::from)
            .collect();

        tracing::debug!(user_id = %user_id, count = posts.len(), "Fetched target timeline");

        Ok(posts)
    }
}
