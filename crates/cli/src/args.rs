//! CLI argument definitions

use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;

/// toot-mirror: mirror public Mastodon posts onto X without double-posting
#[derive(Parser, Debug)]
#[command(name = "toot-mirror")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mirror new posts from Mastodon to the target
    Run(RunArgs),

    /// Preview the outbound posts for a piece of text
    Compose(ComposeArgs),

    /// Inspect or edit the stored checkpoint
    Checkpoint(CheckpointArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("mode").args(["once", "poll", "stream"])))]
pub struct RunArgs {
    /// Log what would be published without publishing
    #[arg(long)]
    pub dry_run: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Run a cycle every configured interval until interrupted
    #[arg(long)]
    pub poll: bool,

    /// Follow the user's streaming timeline until interrupted
    #[arg(long)]
    pub stream: bool,
}

#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Post body (HTML or plain text)
    #[arg(long)]
    pub text: String,

    /// URL of the source post used for the back-link
    #[arg(long, default_value = "https://mastodon.social/@me/1")]
    pub url: String,

    /// Source post ID used for the banner
    #[arg(long, default_value = "1")]
    pub id: String,

    /// Hashtags, comma separated
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CheckpointArgs {
    #[command(subcommand)]
    pub command: CheckpointCommands,
}

#[derive(Subcommand, Debug)]
pub enum CheckpointCommands {
    /// Print the stored checkpoint
    Show,

    /// Overwrite the checkpoint with a source post ID
    Set {
        /// Source post ID
        id: String,
    },

    /// Remove the checkpoint so the next run starts fresh
    Clear,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Create example configuration file
    Init {
        /// Output path for config file
        #[arg(long, default_value = "./config.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
