//! X API write side: creating tweets

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use toot_mirror_domain::PublishError;

use super::{XTargetFeed, check_status};

#[derive(Serialize)]
struct CreateTweetRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplySettings<'a>>,
}

#[derive(Serialize)]
struct ReplySettings<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

impl XTargetFeed {
    /// Post a tweet, optionally as a reply; returns the new tweet ID
    pub(super) async fn create_tweet(
        &self,
        text: &str,
        in_reply_to: Option<&str>,
    ) -> Result<String, PublishError> {
        let len = text.chars().count();
        if len > self.max_chars {
            return Err(PublishError::ContentTooLong {
                len,
                max: self.max_chars,
            });
        }

        let request = CreateTweetRequest {
            text,
            reply: in_reply_to.map(|id| ReplySettings {
                in_reply_to_tweet_id: id,
            }),
        };

        let url = format!("{}/2/tweets", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.user_token.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let tweet: CreateTweetResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        tracing::debug!(tweet_id = %tweet.data.id, reply_to = ?in_reply_to, "Created tweet");

        Ok(tweet.data.id)
    }
}
