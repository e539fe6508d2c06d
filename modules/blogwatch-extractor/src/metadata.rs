//! Metadata extraction: author, publication date, and hero image, each with a
//! JSON-LD → OpenGraph/Twitter → plain-HTML-meta fallback chain (spec §4.D).

use chrono::{DateTime, Utc};
use regex::Regex;

/// Precedence decision (spec §9 Open Question 1): JSON-LD `author` wins over
/// OpenGraph when both are present. JSON-LD is structured and less often
/// stale than an `article:author` meta tag copied from a template.
pub fn extract_author(html: &str) -> Option<String> {
    extract_json_ld_author(html)
        .or_else(|| extract_meta_property(html, "article:author"))
        .or_else(|| extract_meta_property(html, "og:author"))
        .or_else(|| extract_meta_name(html, "author"))
        .or_else(|| extract_meta_name(html, "twitter:creator"))
}

/// Same precedence chain the donor used for dates: JSON-LD, then OpenGraph,
/// then generic meta tags, then an HTML5 `<time>` element.
pub fn extract_published_date(html: &str) -> Option<DateTime<Utc>> {
    if let Some(date) = extract_json_ld_date(html) {
        return Some(date);
    }
    if let Some(date) = extract_meta_property(html, "article:published_time")
        .and_then(|s| parse_date(&s))
    {
        return Some(date);
    }
    for name in &["date", "publish_date", "pubdate", "publish-date", "DC.date.issued"] {
        if let Some(date) = extract_meta_name(html, name).and_then(|s| parse_date(&s)) {
            return Some(date);
        }
    }
    extract_time_element(html)
}

/// `og:image` first, then Schema.org `image`, then the largest in-article
/// `<img>` with explicit width/height (handled by the caller, which has parsed
/// DOM access — this covers only the meta-tag tiers).
pub fn extract_hero_image_from_meta(html: &str) -> Option<String> {
    extract_meta_property(html, "og:image")
        .or_else(|| extract_json_ld_image(html))
        .or_else(|| extract_meta_name(html, "twitter:image"))
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%B %d, %Y") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

fn json_ld_blocks(html: &str) -> Vec<serde_json::Value> {
    let script_re = Regex::new(
        r#"(?si)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#,
    )
    .expect("valid regex");

    script_re
        .captures_iter(html)
        .filter_map(|cap| serde_json::from_str::<serde_json::Value>(&cap[1]).ok())
        .flat_map(|value| match value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        })
        .flat_map(|value| match value.get("@graph").and_then(|g| g.as_array()).cloned() {
            Some(graph) => graph,
            None => vec![value],
        })
        .collect()
}

fn extract_json_ld_date(html: &str) -> Option<DateTime<Utc>> {
    for item in json_ld_blocks(html) {
        for key in &["datePublished", "dateModified"] {
            if let Some(date_str) = item.get(key).and_then(|v| v.as_str()) {
                if let Some(dt) = parse_date(date_str) {
                    return Some(dt);
                }
            }
        }
    }
    None
}

fn extract_json_ld_author(html: &str) -> Option<String> {
    for item in json_ld_blocks(html) {
        let author = item.get("author")?;
        if let Some(name) = author.as_str() {
            return Some(name.to_string());
        }
        if let Some(name) = author.get("name").and_then(|n| n.as_str()) {
            return Some(name.to_string());
        }
        if let Some(arr) = author.as_array() {
            if let Some(name) = arr.first().and_then(|a| a.get("name")).and_then(|n| n.as_str()) {
                return Some(name.to_string());
            }
        }
    }
    None
}

fn extract_json_ld_image(html: &str) -> Option<String> {
    for item in json_ld_blocks(html) {
        let image = item.get("image")?;
        if let Some(url) = image.as_str() {
            return Some(url.to_string());
        }
        if let Some(url) = image.get("url").and_then(|u| u.as_str()) {
            return Some(url.to_string());
        }
        if let Some(arr) = image.as_array() {
            if let Some(url) = arr.first().and_then(|v| v.as_str()) {
                return Some(url.to_string());
            }
        }
    }
    None
}

fn extract_meta_property(html: &str, property: &str) -> Option<String> {
    let pattern = format!(
        r#"(?i)<meta[^>]*property\s*=\s*["']{property}["'][^>]*content\s*=\s*["']([^"']+)["']"#
    );
    let re = Regex::new(&pattern).ok()?;
    if let Some(cap) = re.captures(html) {
        return Some(cap[1].to_string());
    }
    let pattern2 = format!(
        r#"(?i)<meta[^>]*content\s*=\s*["']([^"']+)["'][^>]*property\s*=\s*["']{property}["']"#
    );
    let re2 = Regex::new(&pattern2).ok()?;
    re2.captures(html).map(|cap| cap[1].to_string())
}

fn extract_meta_name(html: &str, name: &str) -> Option<String> {
    let pattern = format!(r#"(?i)<meta[^>]*name\s*=\s*["']{name}["'][^>]*content\s*=\s*["']([^"']+)["']"#);
    let re = Regex::new(&pattern).ok()?;
    if let Some(cap) = re.captures(html) {
        return Some(cap[1].to_string());
    }
    let pattern2 = format!(r#"(?i)<meta[^>]*content\s*=\s*["']([^"']+)["'][^>]*name\s*=\s*["']{name}["']"#);
    let re2 = Regex::new(&pattern2).ok()?;
    re2.captures(html).map(|cap| cap[1].to_string())
}

fn extract_time_element(html: &str) -> Option<DateTime<Utc>> {
    let re = Regex::new(r#"(?i)<time[^>]*datetime\s*=\s*["']([^"']+)["']"#).ok()?;
    re.captures(html).and_then(|cap| parse_date(&cap[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_ld_author_wins_over_opengraph() {
        let html = r#"
            <html><head>
            <script type="application/ld+json">
            {"@type": "Article", "author": {"name": "Jane Doe"}}
            </script>
            <meta property="article:author" content="John Smith">
            </head></html>
        "#;
        assert_eq!(extract_author(html).as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn falls_back_to_opengraph_author() {
        let html = r#"<meta property="article:author" content="John Smith">"#;
        assert_eq!(extract_author(html).as_deref(), Some("John Smith"));
    }

    #[test]
    fn json_ld_date_published() {
        let html = r#"
            <script type="application/ld+json">
            {"datePublished": "2026-01-15T10:00:00Z"}
            </script>
        "#;
        let date = extract_published_date(html).unwrap();
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2026-01-15");
    }

    #[test]
    fn hero_image_prefers_opengraph() {
        let html = r#"<meta property="og:image" content="https://x.test/hero.png">"#;
        assert_eq!(extract_hero_image_from_meta(html).as_deref(), Some("https://x.test/hero.png"));
    }

    #[test]
    fn no_metadata_returns_none() {
        let html = "<html><body><p>nothing here</p></body></html>";
        assert!(extract_author(html).is_none());
        assert!(extract_published_date(html).is_none());
        assert!(extract_hero_image_from_meta(html).is_none());
    }
}
