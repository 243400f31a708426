//! Domain models and value objects

use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

/// Visibility of a source post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
            Visibility::Direct => "direct",
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "public" => Ok(Visibility::Public),
            "unlisted" => Ok(Visibility::Unlisted),
            "private" => Ok(Visibility::Private),
            "direct" => Ok(Visibility::Direct),
            other => Err(format!("unknown visibility: {}", other)),
        }
    }
}

/// A post on the source platform (Mastodon), candidate for mirroring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePost {
    /// Platform-specific status ID
    pub id: String,
    /// ID of the authoring account
    pub account_id: String,
    /// Who can see the post
    pub visibility: Visibility,
    /// Whether this post replies to someone (or mentions someone)
    pub is_reply: bool,
    /// Whether this is a boost of another post
    pub is_reshare: bool,
    /// Raw HTML body
    pub content: String,
    /// Hashtag names, oldest-first as authored
    #[serde(default)]
    pub tags: Vec<String>,
    /// Canonical URL of the post
    pub url: String,
    /// When the post was created
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// An account on either platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub id: String,
    pub username: String,
}

/// A post already present on the target platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetPost {
    pub id: String,
    pub body: String,
    /// Expanded link targets, in the order they appear in the body
    #[serde(default)]
    pub embedded_links: Vec<String>,
}

/// A post ready to be published on the target platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundPost {
    /// Plain-text body, within the character budget
    pub body: String,
    /// Post this one continues, if it is part of a thread
    pub thread_parent: Option<String>,
}

impl OutboundPost {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            thread_parent: None,
        }
    }

    /// Copy of this post threaded under `parent`
    pub fn in_reply_to(&self, parent: impl Into<String>) -> Self {
        Self {
            body: self.body.clone(),
            thread_parent: Some(parent.into()),
        }
    }

    /// Body length in characters
    pub fn char_len(&self) -> usize {
        self.body.chars().count()
    }
}

/// Plain-text rendering of a source post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedContent {
    pub text: String,
    /// Tags selected for appending, most recent first
    pub tags: Vec<String>,
    /// External links found in the markup
    pub links: Vec<String>,
}

/// A source post paired with the posts composed from it
#[derive(Debug, Clone)]
pub struct ComposedEntry {
    pub source_id: String,
    pub source_url: String,
    pub posts: Vec<OutboundPost>,
}

/// How the mirrored post refers back to the original
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// Append a link to the source post
    #[default]
    BackLink,
    /// Append a fixed banner instead of a link
    Banner,
}

/// Mirroring rules, fixed for the lifetime of an engine
#[derive(Debug, Clone)]
pub struct MirrorPolicy {
    /// Maximum characters per outbound post
    pub character_budget: usize,
    /// Number of hashtags to append when truncating
    pub tags_to_append: usize,
    pub link_mode: LinkMode,
    /// Characters reserved for the ellipsis and separators in back-link mode
    pub reserved_suffix_chars: usize,
    /// Banner appended in banner mode; `{id}` expands to the source post ID
    pub banner_template: String,
    /// Longest text the source platform allows
    pub source_max_chars: usize,
    /// Remove inline URLs from the body, relying on the back-link instead
    pub strip_inline_links: bool,
    /// Visibilities that qualify for mirroring
    pub visibilities: Vec<Visibility>,
    /// Wait between poll cycles
    pub poll_interval: Duration,
}

impl Default for MirrorPolicy {
    fn default() -> Self {
        Self {
            character_budget: 280,
            tags_to_append: 2,
            link_mode: LinkMode::BackLink,
            reserved_suffix_chars: 3,
            banner_template: " [Mirrored Toot {id}]".to_string(),
            source_max_chars: 500,
            strip_inline_links: false,
            visibilities: vec![Visibility::Public, Visibility::Unlisted],
            poll_interval: Duration::from_secs(300),
        }
    }
}

impl MirrorPolicy {
    /// Banner text for a given source post
    pub fn banner_for(&self, source_id: &str) -> String {
        self.banner_template.replace("{id}", source_id)
    }

    /// Check the policy before any network call is made
    pub fn validate(&self) -> Result<(), String> {
        if self.character_budget == 0 {
            return Err("character_budget must be greater than zero".to_string());
        }
        if self.reserved_suffix_chars >= self.character_budget {
            return Err(format!(
                "reserved_suffix_chars ({}) must be smaller than character_budget ({})",
                self.reserved_suffix_chars, self.character_budget
            ));
        }
        if self.visibilities.is_empty() {
            return Err("at least one visibility must be mirrored".to_string());
        }
        if self.link_mode == LinkMode::Banner
            && self.banner_template.chars().count() >= self.character_budget
        {
            return Err("banner does not fit within character_budget".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("poll interval must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Event delivered by a source subscription
#[derive(Debug, Clone)]
pub enum StreamEvent {
    PostCreated(SourcePost),
    PostDeleted(String),
    Notification(String),
    Heartbeat,
}

/// How the engine keeps running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Once,
    Poll,
    Stream,
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "once" => Ok(RunMode::Once),
            "poll" => Ok(RunMode::Poll),
            "stream" => Ok(RunMode::Stream),
            other => Err(format!("unknown run mode: {}", other)),
        }
    }
}

/// Outcome of looking up the checkpoint in the visible window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointLookup {
    /// The checkpointed post is visible; only newer posts are pending
    Found(String),
    /// No checkpoint stored yet
    FirstRun,
    /// A checkpoint exists but is not among the visible posts
    OutOfWindow(String),
}

/// A source post that made it to the target
#[derive(Debug, Clone)]
pub struct MirroredPost {
    pub source_id: String,
    /// IDs of the target posts, in thread order
    pub target_ids: Vec<String>,
}

/// Summary of one mirroring cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: OffsetDateTime,
    pub fetched: usize,
    pub eligible: usize,
    pub skipped_malformed: usize,
    pub lookup: CheckpointLookup,
    pub mirrored: Vec<MirroredPost>,
    pub dry_run: bool,
}
