//! HTML-as-feed extraction (spec §4.C.5): turns a blog index page with no feed
//! into candidate posts via a three-tier fallback, each tier tried only if the
//! previous one yields nothing validated.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use blogwatch_core::fingerprint::canonicalize;
use blogwatch_core::types::CandidatePost;

const PUBLICATION_SEGMENTS: &[&str] =
    &["/blog/", "/news/", "/post/", "/articles/", "/engineering/"];
const EXCLUDED_SEGMENTS: &[&str] = &[
    "/categories/",
    "/tags/",
    "/authors/",
    "/platform",
    "/solutions/",
    "/pricing",
    "/about",
];
const POST_LIST_MARKERS: &[&str] = &["post", "entry", "card", "article"];

pub fn extract_candidates(html: &str, source_name: &str, base_url: &str) -> Vec<CandidatePost> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let tier1 = extract_tier1(&document, base.as_ref(), source_name);
    if !tier1.is_empty() {
        return tier1;
    }

    let tier2 = extract_tier2(&document, base.as_ref(), source_name);
    if !tier2.is_empty() {
        return tier2;
    }

    extract_tier3(&document, base.as_ref(), source_name)
}

/// Tier 1: within each `<article>`, the anchor with the longest visible text is
/// the article link (breadcrumbs are short; headlines are long).
fn extract_tier1(document: &Html, base: Option<&Url>, source_name: &str) -> Vec<CandidatePost> {
    let article_sel = Selector::parse("article").unwrap();
    let anchor_sel = Selector::parse("a[href]").unwrap();

    let mut out = Vec::new();
    for article in document.select(&article_sel) {
        let longest = article
            .select(&anchor_sel)
            .max_by_key(|a| collapse_whitespace(&a.text().collect::<String>()).len());

        let Some(anchor) = longest else { continue };
        let Some(href) = anchor.value().attr("href") else { continue };
        if is_excluded(href) {
            continue;
        }
        let Some(resolved) = resolve(base, href) else { continue };
        if !is_publication_like(resolved.path()) {
            continue;
        }

        if let Some(post) = build_candidate(source_name, &resolved, anchor, article) {
            out.push(post);
        }
    }
    out
}

/// Tier 2: links nested under `<h2>`/`<h3>` inside a post-list container,
/// identified by a class or id containing a post-list marker.
fn extract_tier2(document: &Html, base: Option<&Url>, source_name: &str) -> Vec<CandidatePost> {
    let container_sel = Selector::parse("div, section, li, ul").unwrap();
    let heading_sel = Selector::parse("h2 a[href], h3 a[href]").unwrap();

    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for container in document.select(&container_sel) {
        if !is_post_list_container(&container) {
            continue;
        }
        for anchor in container.select(&heading_sel) {
            let Some(href) = anchor.value().attr("href") else { continue };
            if is_excluded(href) {
                continue;
            }
            let Some(resolved) = resolve(base, href) else { continue };
            if !seen.insert(resolved.to_string()) {
                continue;
            }
            if let Some(post) = build_candidate(source_name, &resolved, anchor, container) {
                out.push(post);
            }
        }
    }
    out
}

/// Tier 3: every anchor anywhere whose path looks like an article, deduplicated
/// by canonical URL.
fn extract_tier3(document: &Html, base: Option<&Url>, source_name: &str) -> Vec<CandidatePost> {
    let anchor_sel = Selector::parse("a[href]").unwrap();
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for anchor in document.select(&anchor_sel) {
        let Some(href) = anchor.value().attr("href") else { continue };
        if is_excluded(href) {
            continue;
        }
        let Some(resolved) = resolve(base, href) else { continue };
        if !is_publication_like(resolved.path()) {
            continue;
        }
        let canon = canonicalize(resolved.as_str());
        if !seen.insert(canon) {
            continue;
        }
        if let Some(post) = build_candidate(source_name, &resolved, anchor, anchor) {
            out.push(post);
        }
    }
    out
}

fn build_candidate(
    source_name: &str,
    url: &Url,
    anchor: ElementRef,
    container: ElementRef,
) -> Option<CandidatePost> {
    let title = collapse_whitespace(&anchor.text().collect::<String>());
    if title.is_empty() {
        return None;
    }

    let mut post = CandidatePost::new(source_name, url.as_str(), title);

    if let Some(author) = find_byline(container) {
        post = post.with_author(author);
    }
    if let Some(ts) = find_timestamp(container) {
        post = post.with_published_at(ts);
    }

    Some(post)
}

fn find_byline(container: ElementRef) -> Option<String> {
    for node in container.descendants() {
        let Some(el) = ElementRef::wrap(node) else { continue };
        let v = el.value();
        let looks_like_author = v.attr("rel") == Some("author")
            || v.attr("itemprop") == Some("author")
            || v.classes().any(|c| c.contains("author"));
        if looks_like_author {
            let text = collapse_whitespace(&el.text().collect::<String>());
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn find_timestamp(container: ElementRef) -> Option<DateTime<Utc>> {
    for node in container.descendants() {
        let Some(el) = ElementRef::wrap(node) else { continue };
        if el.value().name() == "time" {
            if let Some(dt) = el.value().attr("datetime") {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(dt) {
                    return Some(parsed.with_timezone(&Utc));
                }
            }
        }
    }
    None
}

fn is_post_list_container(el: &ElementRef) -> bool {
    let v = el.value();
    let class_match = v.classes().any(|c| {
        let lower = c.to_lowercase();
        POST_LIST_MARKERS.iter().any(|m| lower.contains(m))
    });
    let id_match = v
        .attr("id")
        .map(|id| {
            let lower = id.to_lowercase();
            POST_LIST_MARKERS.iter().any(|m| lower.contains(m))
        })
        .unwrap_or(false);
    class_match || id_match
}

fn is_publication_like(path: &str) -> bool {
    if EXCLUDED_SEGMENTS.iter().any(|s| path.contains(s)) {
        return false;
    }
    PUBLICATION_SEGMENTS.iter().any(|s| path.contains(s)) || year_month_pattern(path)
}

/// A bare `/YYYY/MM/...` prefix counts as publication-like even without one of
/// the named segments (spec §4.C.5 tier 1).
fn year_month_pattern(path: &str) -> bool {
    let mut parts = path.trim_matches('/').split('/');
    match (parts.next(), parts.next()) {
        (Some(y), Some(m)) => {
            y.len() == 4
                && y.chars().all(|c| c.is_ascii_digit())
                && m.len() == 2
                && m.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

fn is_excluded(href: &str) -> bool {
    if href.starts_with('#') || href.starts_with("mailto:") {
        return true;
    }
    EXCLUDED_SEGMENTS.iter().any(|s| href.contains(s))
}

fn resolve(base: Option<&Url>, href: &str) -> Option<Url> {
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute);
    }
    base?.join(href).ok()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_ARTICLES: &str = r#"
    <html><body>
      <article>
        <a href="/blog/">Blog</a>
        <a href="/blog/2026/01/how-we-scaled-to-1m-qps">How we scaled to 1M QPS</a>
      </article>
      <article>
        <a href="/blog/">Blog</a>
        <a href="/blog/2026/01/zero-downtime-migrations">Zero-downtime migrations at scale</a>
      </article>
      <article>
        <a href="/blog/">Blog</a>
        <a href="/blog/2026/01/rewriting-our-queue">Rewriting our queue in Rust</a>
      </article>
    </body></html>
    "#;

    #[test]
    fn tier1_picks_the_long_headline_not_the_breadcrumb() {
        let posts = extract_candidates(THREE_ARTICLES, "example", "https://example.test");
        assert_eq!(posts.len(), 3);
        assert!(posts.iter().all(|p| p.title.len() > "Blog".len()));
    }

    #[test]
    fn tier2_finds_headings_in_post_containers() {
        let html = r#"
        <html><body>
          <div class="post-card">
            <h2><a href="/news/2026/02/launch">Launching our new pipeline</a></h2>
          </div>
        </body></html>
        "#;
        let posts = extract_candidates(html, "example", "https://example.test");
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Launching our new pipeline");
    }

    #[test]
    fn excludes_navigation_paths() {
        let html = r#"<html><body><a href="/categories/rust">Rust</a></body></html>"#;
        let posts = extract_candidates(html, "example", "https://example.test");
        assert!(posts.is_empty());
    }

    #[test]
    fn empty_document_yields_empty_list() {
        assert!(extract_candidates("", "example", "https://example.test").is_empty());
    }
}
