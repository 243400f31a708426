//! toot-mirror adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `mastodon`: Mastodon REST and streaming source feed
//! - `x`: X (Twitter) API target feed
//! - `outbox`: JSONL outbox target feed
//! - `checkpoint`: file, SQLite and in-memory checkpoint stores

mod checkpoint_file;
mod checkpoint_memory;
mod checkpoint_sqlite;

pub mod mastodon;
pub mod outbox;
pub mod x_api;

/// Re-exports for checkpoint adapters
pub mod checkpoint {
    pub use crate::checkpoint_file::FileCheckpointStore;
    pub use crate::checkpoint_memory::InMemoryCheckpointStore;
    pub use crate::checkpoint_sqlite::SqliteCheckpointStore;
}

/// Re-exports for X API adapters
pub mod x {
    pub use crate::x_api::{StubTargetFeed, XTargetFeed};
}

/// Absolute URLs appearing as whitespace-separated tokens of a plain-text body
pub(crate) fn links_in_text(body: &str) -> Vec<String> {
    body.split_whitespace()
        .filter(|token| token.starts_with("http://") || token.starts_with("https://"))
        .map(str::to_string)
        .collect()
}
