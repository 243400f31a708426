//! Content normalization - turns a source post's HTML body into plain text

use regex::{Captures, Regex};
use std::sync::LazyLock;
use thiserror::Error;

use crate::model::{LinkMode, MirrorPolicy, NormalizedContent, SourcePost};

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .expect("valid regex")
});

static BLOCK_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(?:p|div|blockquote|h[1-6]|pre)\s*>").expect("valid regex")
});

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</li\s*>").expect("valid regex"));

// Only tag-open grammar counts as markup; `x < 3 and y > 5` is text
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z/!?][^<>]*>").expect("valid regex"));

static TRAILING_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z/!?][^<>]*$").expect("valid regex"));

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});")
        .expect("valid regex")
});

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b([^>]*)>").expect("valid regex"));

static HREF: LazyLock<Regex> = LazyLock::new(|| attribute_regex("href"));
static CLASS: LazyLock<Regex> = LazyLock::new(|| attribute_regex("class"));
static REL: LazyLock<Regex> = LazyLock::new(|| attribute_regex("rel"));

fn attribute_regex(name: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)\b{}\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        name
    ))
    .expect("valid regex")
}

/// Upper bound on strip/decode passes; each pass that changes the text shortens it
const MAX_PASSES: usize = 32;

/// Error raised when a post cannot be mirrored
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("Post {post_id} has no visible content")]
    Empty { post_id: String },
}

/// Render an HTML body as the text a browser would show.
///
/// The result is a fixpoint: running it again returns the same string.
pub fn extract_plain_text(raw: &str) -> String {
    let mut current = normalize_whitespace(raw);
    for _ in 0..MAX_PASSES {
        let next = normalize_whitespace(&decode_entities(&strip_markup(&current)));
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn strip_markup(text: &str) -> String {
    let text = SCRIPT_OR_STYLE.replace_all(text, "");
    let text = BLOCK_END.replace_all(&text, "\n\n");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    TRAILING_FRAGMENT.replace_all(&text, "").into_owned()
}

/// Decode HTML character references; unknown names are left as written
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            if let Some(hex) = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
            {
                return numeric_char(u32::from_str_radix(hex, 16).ok());
            }
            if let Some(dec) = name.strip_prefix('#') {
                return numeric_char(dec.parse::<u32>().ok());
            }
            match named_entity(name) {
                Some(decoded) => decoded.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn numeric_char(code: Option<u32>) -> String {
    match code.and_then(char::from_u32) {
        Some(c) if c == '\n' || c == '\t' || !c.is_control() => c.to_string(),
        _ => String::new(),
    }
}

fn named_entity(name: &str) -> Option<&'static str> {
    let decoded = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        "hellip" => "…",
        "mdash" => "—",
        "ndash" => "–",
        "lsquo" => "‘",
        "rsquo" => "’",
        "ldquo" => "“",
        "rdquo" => "”",
        "laquo" => "«",
        "raquo" => "»",
        "bull" => "•",
        "middot" => "·",
        "copy" => "©",
        "reg" => "®",
        "trade" => "™",
        "deg" => "°",
        "euro" => "€",
        "pound" => "£",
        "yen" => "¥",
        "cent" => "¢",
        "sect" => "§",
        "times" => "×",
        "divide" => "÷",
        "shy" => "",
        "zwj" => "\u{200d}",
        "zwnj" => "\u{200c}",
        _ => return None,
    };
    Some(decoded)
}

/// Collapse horizontal whitespace, trim lines, keep at most one blank line in a row
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = false;

    for line in text.split(['\n', '\r']) {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !lines.is_empty() {
                blank_run = true;
            }
            continue;
        }
        if blank_run {
            lines.push(String::new());
            blank_run = false;
        }
        lines.push(collapsed);
    }

    lines.join("\n")
}

/// Hyperlink targets in the markup that point outside the source platform's
/// tag listings and mentions, in document order
pub fn extract_external_links(raw: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();

    for anchor in ANCHOR.captures_iter(raw) {
        let attrs = &anchor[1];
        let Some(href) = attribute_value(&HREF, attrs) else {
            continue;
        };
        let href = decode_entities(href.trim());
        if !(href.starts_with("http://") || href.starts_with("https://")) {
            continue;
        }

        let rel = attribute_value(&REL, attrs).unwrap_or_default();
        let class = attribute_value(&CLASS, attrs).unwrap_or_default();
        let is_tag_link = rel.split_whitespace().any(|token| token == "tag")
            || class.split_whitespace().any(|token| token == "hashtag")
            || link_path(&href).contains("/tags/");
        let is_mention = class.split_whitespace().any(|token| token == "mention");

        if is_tag_link || is_mention || links.contains(&href) {
            continue;
        }
        links.push(href);
    }

    links
}

fn attribute_value<'a>(pattern: &Regex, attrs: &'a str) -> Option<&'a str> {
    pattern
        .captures(attrs)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str())
}

fn link_path(url: &str) -> &str {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    match without_scheme.find('/') {
        Some(idx) => &without_scheme[idx..],
        None => "",
    }
}

/// Remove inline occurrences of `links` from plain text
pub fn strip_links(text: &str, links: &[String]) -> String {
    let mut stripped = text.to_string();
    // Longest first so a link that prefixes another does not leave a tail behind
    let mut sorted: Vec<&String> = links.iter().collect();
    sorted.sort_by_key(|link| std::cmp::Reverse(link.len()));
    for link in sorted {
        stripped = stripped.replace(link.as_str(), "");
    }
    normalize_whitespace(&stripped)
}

/// Pick the `limit` most recently authored tags.
///
/// Tags arrive oldest-first; the result is most-recent-first.
pub fn select_tags(tags: &[String], limit: usize) -> Vec<String> {
    tags.iter().rev().take(limit).cloned().collect()
}

/// Normalize a source post according to the mirroring policy
pub fn normalize(post: &SourcePost, policy: &MirrorPolicy) -> Result<NormalizedContent, ContentError> {
    let mut text = extract_plain_text(&post.content);
    let links = extract_external_links(&post.content);

    if policy.strip_inline_links && policy.link_mode == LinkMode::BackLink {
        text = strip_links(&text, &links);
    }

    if text.is_empty() && links.is_empty() {
        return Err(ContentError::Empty {
            post_id: post.id.clone(),
        });
    }

    let tag_names: Vec<String> = post
        .tags
        .iter()
        .map(|tag| tag.trim().trim_start_matches('#').to_string())
        .filter(|tag| !tag.is_empty())
        .collect();

    Ok(NormalizedContent {
        text,
        tags: select_tags(&tag_names, policy.tags_to_append),
        links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Visibility;
    use time::OffsetDateTime;

    const MASTODON_BODY: &str = r#"<p>Shipped a new release &amp; wrote about it: <a href="https://blog.example.com/posts/release-notes?a=1&amp;b=2" target="_blank" rel="nofollow noopener noreferrer"><span class="invisible">https://</span><span class="ellipsis">blog.example.com/posts/rel</span><span class="invisible">ease-notes?a=1&amp;b=2</span></a></p><p>Thanks <span class="h-card"><a href="https://mastodon.social/@friend" class="u-url mention">@<span>friend</span></a></span>! <a href="https://mastodon.social/tags/rust" class="mention hashtag" rel="tag">#<span>rust</span></a></p>"#;

    fn post_with(content: &str, tags: &[&str]) -> SourcePost {
        SourcePost {
            id: "100".to_string(),
            account_id: "1".to_string(),
            visibility: Visibility::Public,
            is_reply: false,
            is_reshare: false,
            content: content.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            url: "https://mastodon.social/@me/100".to_string(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_plain_text_from_mastodon_markup() {
        let text = extract_plain_text(MASTODON_BODY);
        assert_eq!(
            text,
            "Shipped a new release & wrote about it: https://blog.example.com/posts/release-notes?a=1&b=2\n\nThanks @friend! #rust"
        );
    }

    #[test]
    fn test_plain_text_line_breaks() {
        assert_eq!(
            extract_plain_text("<p>one<br>two<br />three</p><p>four</p>"),
            "one\ntwo\nthree\n\nfour"
        );
    }

    #[test]
    fn test_plain_text_decodes_numeric_entities() {
        assert_eq!(extract_plain_text("caf&#233; &#x263A; &#0;"), "café \u{263a}");
    }

    #[test]
    fn test_plain_text_leaves_unknown_entities() {
        assert_eq!(extract_plain_text("AT&madeup;T"), "AT&madeup;T");
    }

    #[test]
    fn test_plain_text_drops_unterminated_tag() {
        assert_eq!(extract_plain_text("hello <a href=\"https://x"), "hello");
    }

    #[test]
    fn test_plain_text_is_idempotent() {
        let samples = [
            MASTODON_BODY,
            "&amp;lt;p&amp;gt;nested&amp;lt;/p&amp;gt;",
            "<p>a &lt;b&gt; c</p>",
            "  spaced \t out\r\n\r\n\r\nlines  ",
            "<script>alert(1)</script>visible",
            "&amp;amp;amp;",
            "broken <p class=\"x\" unterminated",
            "",
        ];
        for sample in samples {
            let once = extract_plain_text(sample);
            let twice = extract_plain_text(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", sample);
            assert!(!once.contains('<') || !once.contains('>'), "{:?}", once);
        }

        let comparison = "<p>if x &lt; 3 and y &gt; 5 then go</p>";
        let once = extract_plain_text(comparison);
        assert_eq!(once, "if x < 3 and y > 5 then go");
        assert_eq!(extract_plain_text(&once), once);
    }

    #[test]
    fn test_plain_text_keeps_literal_angle_brackets() {
        assert_eq!(extract_plain_text("a &lt;3 b"), "a <3 b");
        assert_eq!(extract_plain_text("<p>1 &lt; 2</p><p>3 &gt; 2</p>"), "1 < 2\n\n3 > 2");
        assert_eq!(extract_plain_text("-&gt; arrow &lt;-"), "-> arrow <-");
    }

    #[test]
    fn test_external_links_skip_tags_and_mentions() {
        let links = extract_external_links(MASTODON_BODY);
        assert_eq!(
            links,
            vec!["https://blog.example.com/posts/release-notes?a=1&b=2".to_string()]
        );
    }

    #[test]
    fn test_external_links_skip_tag_paths_without_rel() {
        let links = extract_external_links(
            r#"<a href="https://example.social/tags/cats">#cats</a> <a href='https://example.org/a'>a</a> <a href="https://example.org/a">again</a>"#,
        );
        assert_eq!(links, vec!["https://example.org/a".to_string()]);
    }

    #[test]
    fn test_strip_links_removes_inline_urls() {
        let text = "read this https://example.org/a today";
        let stripped = strip_links(text, &["https://example.org/a".to_string()]);
        assert_eq!(stripped, "read this today");
    }

    #[test]
    fn test_select_tags_takes_most_recent_first() {
        let tags: Vec<String> = ["a", "b", "c", "d"].iter().map(|t| t.to_string()).collect();
        assert_eq!(select_tags(&tags, 2), vec!["d".to_string(), "c".to_string()]);
        assert!(select_tags(&tags, 0).is_empty());
        assert_eq!(select_tags(&tags, 10).len(), 4);
    }

    #[test]
    fn test_normalize_selects_tags_and_links() {
        let post = post_with(MASTODON_BODY, &["rust", "release", "#blog"]);
        let content = normalize(&post, &MirrorPolicy::default()).unwrap();
        assert_eq!(content.tags, vec!["blog".to_string(), "release".to_string()]);
        assert_eq!(content.links.len(), 1);
    }

    #[test]
    fn test_normalize_strips_inline_links_when_configured() {
        let post = post_with(MASTODON_BODY, &[]);
        let policy = MirrorPolicy {
            strip_inline_links: true,
            ..Default::default()
        };
        let content = normalize(&post, &policy).unwrap();
        assert!(!content.text.contains("https://blog.example.com"));
        assert!(content.text.starts_with("Shipped a new release & wrote about it:"));
    }

    #[test]
    fn test_normalize_rejects_empty_post() {
        let post = post_with("<p> </p><br>", &["tag"]);
        assert_eq!(
            normalize(&post, &MirrorPolicy::default()),
            Err(ContentError::Empty {
                post_id: "100".to_string()
            })
        );
    }
}
