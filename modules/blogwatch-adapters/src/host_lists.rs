//! Known-host lists consulted by the adapter factory (spec §4.C ordered rules).
//! These are the built-in defaults; `SourceHints` lets a `SourceConfig` override
//! the factory's guess without editing this list.

use std::sync::LazyLock;

use regex::Regex;

/// Hosts for Next.js-style engineering blogs whose initial HTML lacks content
/// and whose article URLs follow a `/YYYY/MM/slug` shape.
const SPA_HOSTS: &[&str] = &["vercel.com", "netflixtechblog.com", "engineering.fb.com"];

/// Hosts known to sit behind an anti-bot CDN that challenges non-browser
/// clients (Cloudflare-managed-challenge, PerimeterX, etc).
const BOT_GATED_HOSTS: &[&str] = &["medium.com", "substack.com", "cloudflare.com"];

const MEDIUM_HOSTS: &[&str] = &["medium.com"];

pub static ARTICLE_PATH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/\d{4}/\d{2}/[a-z0-9-]+/?$").expect("valid regex"));

pub fn is_spa_host(host: &str) -> bool {
    SPA_HOSTS.iter().any(|h| host_matches(host, h))
}

pub fn is_bot_gated_host(host: &str) -> bool {
    BOT_GATED_HOSTS.iter().any(|h| host_matches(host, h))
}

pub fn is_medium_host(host: &str) -> bool {
    MEDIUM_HOSTS.iter().any(|h| host_matches(host, h))
}

fn host_matches(host: &str, known: &str) -> bool {
    host == known || host.ends_with(&format!(".{known}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_and_subdomain() {
        assert!(is_medium_host("medium.com"));
        assert!(is_medium_host("blog.medium.com"));
        assert!(!is_medium_host("notmedium.com"));
    }

    #[test]
    fn article_path_pattern_matches_year_month_slug() {
        assert!(ARTICLE_PATH_PATTERN.is_match("/2026/07/scaling-vectors"));
        assert!(ARTICLE_PATH_PATTERN.is_match("/2026/07/scaling-vectors/"));
        assert!(!ARTICLE_PATH_PATTERN.is_match("/about"));
    }
}
