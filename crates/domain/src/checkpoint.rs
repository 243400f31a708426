//! Checkpoint derived from the target feed's own history
//!
//! Instead of storing the frontier separately, the most recent target post
//! carrying a back-link (or banner) to a source post marks it.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::model::TargetPost;
use crate::ports::{CheckpointError, CheckpointStore, PublishError, TargetFeed};

const ID_PATTERN: &str = "([0-9A-Za-z]+)";

/// Checkpoint store that reads the frontier back from the target feed
pub struct FeedIntrospectionCheckpoint<T: TargetFeed + ?Sized> {
    target: Arc<T>,
    link_pattern: Regex,
    banner_pattern: Option<Regex>,
    account_id: OnceCell<String>,
}

impl<T: TargetFeed + ?Sized> FeedIntrospectionCheckpoint<T> {
    /// `source_base_url` is the source instance (e.g. `https://mastodon.social`);
    /// `banner_template` is the banner with an `{id}` placeholder
    pub fn new(target: Arc<T>, source_base_url: &str, banner_template: &str) -> Self {
        Self {
            target,
            link_pattern: source_link_pattern(source_base_url),
            banner_pattern: banner_pattern(banner_template),
            account_id: OnceCell::new(),
        }
    }

    /// Source post ID referenced by a target post, if any
    pub fn referenced_source_id(&self, post: &TargetPost) -> Option<String> {
        let from_links = post
            .embedded_links
            .iter()
            .find_map(|link| self.match_link(link));
        if from_links.is_some() {
            return from_links;
        }

        let from_body = post
            .body
            .split_whitespace()
            .find_map(|token| self.match_link(token));
        if from_body.is_some() {
            return from_body;
        }

        self.banner_pattern
            .as_ref()
            .and_then(|pattern| pattern.captures(&post.body))
            .map(|caps| caps[1].to_string())
    }

    fn match_link(&self, link: &str) -> Option<String> {
        self.link_pattern
            .captures(link.trim())
            .map(|caps| caps[1].to_string())
    }

    async fn target_account_id(&self) -> Result<&str, CheckpointError> {
        let id = self
            .account_id
            .get_or_try_init(|| async {
                self.target
                    .verify_identity()
                    .await
                    .map(|identity| identity.id)
                    .map_err(feed_error)
            })
            .await?;
        Ok(id.as_str())
    }
}

fn feed_error(error: PublishError) -> CheckpointError {
    if error.is_transient() {
        CheckpointError::Unavailable(error.to_string())
    } else {
        CheckpointError::Feed(error.to_string())
    }
}

fn source_link_pattern(source_base_url: &str) -> Regex {
    let base = source_base_url.trim().trim_end_matches('/');
    let host = base
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(base);
    let pattern = format!(
        r"^https?://{}/(?:@[^/\s]+|web/statuses|users/[^/\s]+/statuses|notice)/{}/?$",
        regex::escape(host),
        ID_PATTERN
    );
    Regex::new(&pattern).expect("escaped host forms a valid regex")
}

fn banner_pattern(banner_template: &str) -> Option<Regex> {
    let template = banner_template.trim();
    let (before, after) = template.split_once("{id}")?;
    let pattern = format!(
        "{}{}{}",
        regex::escape(before),
        ID_PATTERN,
        regex::escape(after)
    );
    Regex::new(&pattern).ok()
}

#[async_trait]
impl<T: TargetFeed + ?Sized> CheckpointStore for FeedIntrospectionCheckpoint<T> {
    async fn load(&self) -> Result<Option<String>, CheckpointError> {
        let account_id = self.target_account_id().await?;
        let posts = self
            .target
            .recent_posts(account_id)
            .await
            .map_err(feed_error)?;

        let found = posts.iter().find_map(|post| self.referenced_source_id(post));

        tracing::debug!(
            scanned = posts.len(),
            checkpoint = ?found,
            "Scanned target feed for checkpoint"
        );

        Ok(found)
    }

    async fn save(&self, _source_post_id: &str) -> Result<(), CheckpointError> {
        // The published post is the checkpoint
        Ok(())
    }

    async fn clear(&self) -> Result<(), CheckpointError> {
        Err(CheckpointError::Unsupported("introspection"))
    }

    fn strategy(&self) -> &'static str {
        "introspection"
    }
}
