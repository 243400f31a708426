//! Compose command - preview outbound posts for a piece of text

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use time::OffsetDateTime;
use toot_mirror_domain::{SourcePost, Visibility, normalize, usecases::PostComposer};

use crate::args::ComposeArgs;
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct ComposeOutput {
    source_id: String,
    source_url: String,
    link_mode: String,
    character_budget: usize,
    posts: Vec<ComposedPost>,
}

#[derive(Debug, Serialize)]
struct ComposedPost {
    body: String,
    chars: usize,
}

pub async fn execute(args: ComposeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref())?;
    let policy = config.mirror_policy()?;

    let post = SourcePost {
        id: args.id.clone(),
        account_id: "cli".to_string(),
        visibility: Visibility::Public,
        is_reply: false,
        is_reshare: false,
        content: args.text,
        tags: args
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        url: args.url.clone(),
        created_at: OffsetDateTime::now_utc(),
    };

    let content = normalize(&post, &policy).context("Nothing to mirror")?;

    tracing::debug!(
        text_length = content.text.chars().count(),
        tags = ?content.tags,
        links = content.links.len(),
        "Normalized input"
    );

    let link_mode = format!("{:?}", policy.link_mode);
    let character_budget = policy.character_budget;
    let composer = PostComposer::new(policy);
    let posts = composer.compose(&content, &post.url, &post.id);

    let output = ComposeOutput {
        source_id: post.id,
        source_url: post.url,
        link_mode,
        character_budget,
        posts: posts
            .iter()
            .map(|p| ComposedPost {
                body: p.body.clone(),
                chars: p.char_len(),
            })
            .collect(),
    };

    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialize output")?;
        println!("{}", json);
    } else {
        print_human(&output);
    }

    Ok(())
}

fn print_human(output: &ComposeOutput) {
    println!(
        "{} post(s) for {} ({} mode, budget {})",
        output.posts.len(),
        output.source_id,
        output.link_mode,
        output.character_budget
    );
    for (i, post) in output.posts.iter().enumerate() {
        println!();
        println!("[{}/{}] {} chars", i + 1, output.posts.len(), post.chars);
        println!("{}", post.body);
    }
}
