//! Strict feed parsing (RSS 2.0 / Atom / JSON Feed) via `feed-rs`, mapping
//! entries to [`CandidatePost`] and tolerating alternate author representations
//! (`author`, `dc:creator`, nested `<author><name>`) the way `feed-rs` already
//! normalizes them into `entry.authors`.

use blogwatch_core::error::{CoreError, CoreResult};
use blogwatch_core::types::CandidatePost;

/// Parses feed bytes into candidates. An empty byte slice yields an empty list,
/// not an error (spec §8 boundary behavior).
pub fn parse_feed(bytes: &[u8], source_name: &str) -> CoreResult<Vec<CandidatePost>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    let feed = feed_rs::parser::parse(bytes).map_err(|e| CoreError::ParseFormat(e.to_string()))?;

    let posts = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;

            let title = entry.title.map(|t| t.content).unwrap_or_default();
            if title.trim().is_empty() {
                return None;
            }

            let mut post = CandidatePost::new(source_name, url, title.trim());

            if let Some(at) = entry.published.or(entry.updated) {
                post = post.with_published_at(at.with_timezone(&chrono::Utc));
            }

            if let Some(author) = entry.authors.first() {
                post = post.with_author(author.name.clone());
            }

            if let Some(summary) = entry.summary {
                post = post.with_summary(summary.content);
            }

            let tags: Vec<String> = entry.categories.into_iter().map(|c| c.term).collect();
            if !tags.is_empty() {
                post = post.with_tags(tags);
            }

            Some(post)
        })
        .collect();

    Ok(posts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example Engineering</title>
    <item>
      <title>How we scaled to 1M QPS</title>
      <link>https://x.test/a</link>
      <dc:creator xmlns:dc="http://purl.org/dc/elements/1.1/">Jane Doe</dc:creator>
      <pubDate>Mon, 01 Jan 2026 00:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Rolling out vector search</title>
      <link>https://x.test/b?utm_source=foo</link>
      <pubDate>Tue, 02 Jan 2026 00:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_items_with_dc_creator() {
        let posts = parse_feed(RSS.as_bytes(), "example").unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].author.as_deref(), Some("Jane Doe"));
        assert_eq!(posts[0].url, "https://x.test/a");
    }

    #[test]
    fn empty_bytes_yield_empty_list() {
        let posts = parse_feed(&[], "example").unwrap();
        assert!(posts.is_empty());
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        assert!(parse_feed(b"not a feed", "example").is_err());
    }
}
