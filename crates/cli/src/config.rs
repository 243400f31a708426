//! Configuration loading and management

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use toot_mirror_domain::{LinkMode, MirrorPolicy, RunMode, Visibility, usecases::MirrorConfig};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub mirror: MirrorSection,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub mastodon: MastodonConfig,

    #[serde(default)]
    pub x: XConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default = "default_run_mode")]
    pub run_mode: String,

    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_secs: u64,

    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_secs: u64,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorSection {
    #[serde(default = "default_character_budget")]
    pub character_budget: usize,

    #[serde(default = "default_tags_to_append")]
    pub tags_to_append: usize,

    #[serde(default = "default_true")]
    pub link_to_mastodon: bool,

    #[serde(default = "default_reserved_suffix_chars")]
    pub reserved_suffix_chars: usize,

    #[serde(default = "default_banner")]
    pub banner: String,

    #[serde(default = "default_source_max_chars")]
    pub source_max_chars: usize,

    #[serde(default)]
    pub strip_inline_links: bool,

    #[serde(default = "default_visibilities")]
    pub visibilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// explicit | introspection
    #[serde(default = "default_checkpoint_strategy")]
    pub strategy: String,

    /// file | sqlite | memory (explicit strategy only)
    #[serde(default = "default_checkpoint_backend")]
    pub backend: String,

    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastodonConfig {
    /// mastodon | stub
    #[serde(default = "default_mastodon_provider")]
    pub provider: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Source posts (JSON array) served by the stub provider
    #[serde(default)]
    pub stub_posts_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XConfig {
    /// x | outbox | stub
    #[serde(default = "default_x_provider")]
    pub provider: String,

    #[serde(default = "default_x_user_token_env")]
    pub user_token_env: String,

    #[serde(default = "default_outbox_path")]
    pub outbox_path: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_run_mode() -> String {
    "once".to_string()
}

fn default_interval_minutes() -> u64 {
    5
}

fn default_page_size() -> usize {
    40
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    2
}

fn default_retry_max_delay() -> u64 {
    60
}

fn default_reconnect_delay() -> u64 {
    10
}

fn default_character_budget() -> usize {
    280
}

fn default_tags_to_append() -> usize {
    2
}

fn default_reserved_suffix_chars() -> usize {
    3
}

fn default_banner() -> String {
    " [Mirrored Toot {id}]".to_string()
}

fn default_source_max_chars() -> usize {
    500
}

fn default_visibilities() -> Vec<String> {
    vec!["public".to_string(), "unlisted".to_string()]
}

fn default_checkpoint_strategy() -> String {
    "explicit".to_string()
}

fn default_checkpoint_backend() -> String {
    "file".to_string()
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("./last_mirrored")
}

fn default_mastodon_provider() -> String {
    "mastodon".to_string()
}

fn default_api_base_url() -> String {
    "https://mastodon.social".to_string()
}

fn default_access_token_env() -> String {
    "MASTODON_ACCESS_TOKEN".to_string()
}

fn default_x_provider() -> String {
    "x".to_string()
}

fn default_x_user_token_env() -> String {
    "X_USER_TOKEN".to_string()
}

fn default_outbox_path() -> PathBuf {
    PathBuf::from("./outbox.jsonl")
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            run_mode: default_run_mode(),
            interval_minutes: default_interval_minutes(),
            page_size: default_page_size(),
            max_retries: default_max_retries(),
            retry_base_delay_secs: default_retry_base_delay(),
            retry_max_delay_secs: default_retry_max_delay(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

impl Default for MirrorSection {
    fn default() -> Self {
        Self {
            character_budget: default_character_budget(),
            tags_to_append: default_tags_to_append(),
            link_to_mastodon: true,
            reserved_suffix_chars: default_reserved_suffix_chars(),
            banner: default_banner(),
            source_max_chars: default_source_max_chars(),
            strip_inline_links: false,
            visibilities: default_visibilities(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            strategy: default_checkpoint_strategy(),
            backend: default_checkpoint_backend(),
            path: default_checkpoint_path(),
        }
    }
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            provider: default_mastodon_provider(),
            api_base_url: default_api_base_url(),
            access_token_env: default_access_token_env(),
            stub_posts_path: None,
        }
    }
}

impl Default for XConfig {
    fn default() -> Self {
        Self {
            provider: default_x_provider(),
            user_token_env: default_x_user_token_env(),
            outbox_path: default_outbox_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            // User specified a path that doesn't exist
            bail!("Config file not found: {}", path.display());
        }

        // Add environment variable overrides
        builder = builder.add_source(
            config::Environment::with_prefix("TOOT_MIRROR")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Parsed `general.run_mode`
    pub fn run_mode(&self) -> Result<RunMode> {
        self.general
            .run_mode
            .parse()
            .map_err(|e: String| anyhow::anyhow!("Invalid general.run_mode: {}", e))
    }

    /// Build the immutable mirroring policy, validating it up front
    pub fn mirror_policy(&self) -> Result<MirrorPolicy> {
        let mirror = &self.mirror;

        let visibilities = mirror
            .visibilities
            .iter()
            .map(|v| v.parse::<Visibility>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid mirror.visibilities: {}", e))?;

        let policy = MirrorPolicy {
            character_budget: mirror.character_budget,
            tags_to_append: mirror.tags_to_append,
            link_mode: if mirror.link_to_mastodon {
                LinkMode::BackLink
            } else {
                LinkMode::Banner
            },
            reserved_suffix_chars: mirror.reserved_suffix_chars,
            banner_template: mirror.banner.clone(),
            source_max_chars: mirror.source_max_chars,
            strip_inline_links: mirror.strip_inline_links,
            visibilities,
            poll_interval: Duration::from_secs(self.general.interval_minutes * 60),
        };

        policy
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid mirror configuration: {}", e))?;

        Ok(policy)
    }

    /// Engine configuration; `dry_run` is forced on when the flag asks for it
    pub fn mirror_config(&self, dry_run: bool) -> Result<MirrorConfig> {
        Ok(MirrorConfig {
            policy: self.mirror_policy()?,
            dry_run: dry_run || self.general.dry_run,
            max_retries: self.general.max_retries,
            retry_base_delay: Duration::from_secs(self.general.retry_base_delay_secs),
            retry_max_delay: Duration::from_secs(self.general.retry_max_delay_secs),
            reconnect_delay: Duration::from_secs(self.general.reconnect_delay_secs),
        })
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# toot-mirror configuration

[general]
dry_run = true
run_mode = "once"  # once, poll, stream
interval_minutes = 5
page_size = 40
max_retries = 3
retry_base_delay_secs = 2
retry_max_delay_secs = 60
reconnect_delay_secs = 10

[mirror]
character_budget = 280
tags_to_append = 2
# false appends the banner below instead of a link back to the toot
link_to_mastodon = true
reserved_suffix_chars = 3
banner = " [Mirrored Toot {id}]"
source_max_chars = 500
strip_inline_links = false
visibilities = ["public", "unlisted"]

[checkpoint]
strategy = "explicit"  # explicit, introspection
backend = "file"  # file, sqlite, memory
path = "./last_mirrored"

[mastodon]
provider = "mastodon"  # mastodon, stub
api_base_url = "https://mastodon.social"
access_token_env = "MASTODON_ACCESS_TOKEN"
# stub_posts_path = "./posts.json"

[x]
provider = "x"  # x, outbox, stub
user_token_env = "X_USER_TOKEN"
outbox_path = "./outbox.jsonl"
"#
        .to_string()
    }
}
