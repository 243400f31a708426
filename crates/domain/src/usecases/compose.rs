//! Composition use case - fits normalized content into target-platform posts

use crate::model::{LinkMode, MirrorPolicy, NormalizedContent, OutboundPost};

const ELLIPSIS: char = '…';

/// Builds outbound posts that respect the policy's character budget
pub struct PostComposer {
    policy: MirrorPolicy,
}

impl PostComposer {
    pub fn new(policy: MirrorPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &MirrorPolicy {
        &self.policy
    }

    /// Compose one or two posts for a source post.
    ///
    /// Every returned body is non-empty and at most `character_budget` characters.
    pub fn compose(
        &self,
        content: &NormalizedContent,
        source_url: &str,
        source_id: &str,
    ) -> Vec<OutboundPost> {
        let bodies = match self.policy.link_mode {
            LinkMode::BackLink => vec![self.compose_back_link(content, source_url)],
            LinkMode::Banner => self.compose_banner(&content.text, source_id),
        };

        bodies
            .into_iter()
            .map(|body| OutboundPost::new(clamp_with_ellipsis(&body, self.policy.character_budget)))
            .filter(|post| !post.body.is_empty())
            .collect()
    }

    fn compose_back_link(&self, content: &NormalizedContent, url: &str) -> String {
        let budget = self.policy.character_budget;
        let text = content.text.as_str();
        let url_len = char_len(url);

        if text.is_empty() {
            return if url_len <= budget {
                url.to_string()
            } else {
                truncate_chars(url, budget).to_string()
            };
        }

        let suffix = join_suffix(&hashtag_string(&content.tags), url);
        if char_len(text) + 1 + char_len(&suffix) <= budget {
            // Tags are only spent when the text has to be cut
            return format!("{} {}", text, url);
        }

        // Drop the least recent tags until the fixed part fits
        let mut tags: Vec<String> = content.tags.clone();
        let (tag_string, overhead) = loop {
            let tag_string = hashtag_string(&tags);
            let overhead = self.suffix_overhead(!tag_string.is_empty());
            if char_len(&tag_string) + url_len + overhead <= budget || tags.is_empty() {
                break (tag_string, overhead);
            }
            tags.pop();
        };

        let fixed = char_len(&tag_string) + url_len + overhead;
        if fixed > budget {
            tracing::warn!(
                url_len = url_len,
                budget = budget,
                "Back-link does not fit the budget, dropping it"
            );
            return clamp_with_ellipsis(text, budget);
        }

        let keep = budget - fixed;
        let truncated = truncate_chars(text, keep).trim_end();
        let suffix = join_suffix(&tag_string, url);
        if truncated.is_empty() {
            format!("{} {}", ELLIPSIS, suffix)
        } else {
            format!("{}{} {}", truncated, ELLIPSIS, suffix)
        }
    }

    /// Characters taken by the ellipsis and separators around the suffix
    fn suffix_overhead(&self, has_tags: bool) -> usize {
        let actual = if has_tags { 3 } else { 2 };
        self.policy.reserved_suffix_chars.max(actual)
    }

    fn compose_banner(&self, text: &str, source_id: &str) -> Vec<String> {
        let budget = self.policy.character_budget;
        let banner = self.policy.banner_for(source_id);
        let banner_len = char_len(&banner);

        if text.is_empty() {
            return vec![banner.trim().to_string()];
        }

        if char_len(text) + banner_len <= budget {
            return vec![format!("{}{}", text, banner)];
        }

        let text = clamp_with_ellipsis(text, self.policy.source_max_chars);
        // Shift the cut so part two still fits once the banner is appended
        let target = ((char_len(&text) + banner_len) / 2).min(budget);
        let (first, second) = split_near(&text, target);

        let first = clamp_with_ellipsis(&first, budget);
        let second = clamp_with_ellipsis(&second, budget.saturating_sub(banner_len));
        let second = format!("{}{}", second, banner).trim_start().to_string();

        vec![first, second]
    }
}

/// Split text into two parts at the last word boundary not past the midpoint.
///
/// A first word longer than the midpoint is split at the midpoint itself.
pub fn split_at_midpoint(text: &str) -> (String, String) {
    split_near(text, char_len(text) / 2)
}

/// Split text at the last word boundary not past `midpoint` characters
pub fn split_near(text: &str, midpoint: usize) -> (String, String) {
    let mut cut: Option<usize> = None;
    let mut previous_was_space = true;

    for (char_pos, (byte_idx, ch)) in text.char_indices().enumerate() {
        let is_space = ch.is_whitespace();
        if is_space && !previous_was_space {
            if char_pos > midpoint {
                break;
            }
            cut = Some(byte_idx);
        }
        previous_was_space = is_space;
    }

    let cut = cut.unwrap_or_else(|| byte_offset(text, midpoint));
    (
        text[..cut].trim_end().to_string(),
        text[cut..].trim_start().to_string(),
    )
}

/// `#tag` names joined by spaces
pub fn hashtag_string(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| format!("#{}", tag))
        .collect::<Vec<_>>()
        .join(" ")
}

fn join_suffix(tag_string: &str, url: &str) -> String {
    if tag_string.is_empty() {
        url.to_string()
    } else {
        format!("{} {}", tag_string, url)
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    &text[..byte_offset(text, max_chars)]
}

/// Cut text to `limit` characters, marking the cut with an ellipsis
fn clamp_with_ellipsis(text: &str, limit: usize) -> String {
    if char_len(text) <= limit {
        return text.to_string();
    }
    if limit == 0 {
        return String::new();
    }
    let kept = truncate_chars(text, limit - 1).trim_end();
    format!("{}{}", kept, ELLIPSIS)
}
