//! Tagged-variant adapter (spec §9 re-architecture note: no runtime reflection,
//! just an enum plus a factory keyed on `SourceConfig.hints` and URL host).

use std::sync::Arc;

use tracing::warn;
use url::Url;

use blogwatch_core::context::RenderPage;
use blogwatch_core::error::{CoreError, CoreResult};
use blogwatch_core::security::UrlValidator;
use blogwatch_core::types::{CandidatePost, SourceConfig};

use crate::fetch::{fetch, FetchOutcome};
use crate::host_lists::{is_bot_gated_host, is_medium_host, is_spa_host};
use crate::{feed, html_feed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Generic,
    Medium,
    Spa,
    BrowserFallback,
}

/// Selects an adapter variant for `source` using the ordered rules in spec §4.C:
/// explicit hints first (an external loader's best guess), then the built-in
/// host lists, generic as the default.
pub fn select_adapter(source: &SourceConfig) -> CoreResult<AdapterKind> {
    let url = Url::parse(&source.url)?;
    let host = url.host_str().unwrap_or_default();

    if source.hints.prefers_html {
        return Ok(AdapterKind::Generic);
    }
    if source.hints.prefers_browser {
        return Ok(AdapterKind::BrowserFallback);
    }
    if is_spa_host(host) {
        return Ok(AdapterKind::Spa);
    }
    if is_bot_gated_host(host) {
        return Ok(AdapterKind::BrowserFallback);
    }
    if is_medium_host(host) {
        return Ok(AdapterKind::Medium);
    }
    Ok(AdapterKind::Generic)
}

/// Dependencies every adapter needs: the plain HTTP client, the SSRF guard, and
/// an optional browser-rendering capability (absence degrades Medium/SPA).
pub struct AdapterContext {
    pub http: reqwest::Client,
    pub validator: UrlValidator,
    pub renderer: Option<Arc<dyn RenderPage>>,
}

impl AdapterKind {
    /// `discover` is the default composition `parse(fetch(...))` with
    /// adapter-specific hooks, per spec §4.C.
    pub async fn discover(
        &self,
        source: &SourceConfig,
        ctx: &AdapterContext,
    ) -> CoreResult<Vec<CandidatePost>> {
        match self {
            AdapterKind::Generic => generic_discover(source, ctx).await,
            AdapterKind::Medium => medium_discover(source, ctx).await,
            AdapterKind::Spa => spa_discover(source, ctx).await,
            AdapterKind::BrowserFallback => browser_fallback_discover(source, ctx).await,
        }
    }
}

async fn generic_discover(source: &SourceConfig, ctx: &AdapterContext) -> CoreResult<Vec<CandidatePost>> {
    let bot_gated = is_bot_gated_host(&host_of(&source.url));
    let outcome = fetch(&ctx.http, &ctx.validator, &source.url, bot_gated).await?;

    let bytes = match outcome {
        FetchOutcome::Body(bytes) => bytes,
        FetchOutcome::BotChallenged => return fall_through_to_browser(source, ctx).await,
    };

    parse_generic_bytes(&bytes, source)
}

/// Feed-first, HTML-as-feed fallback on parse failure or an empty feed.
fn parse_generic_bytes(bytes: &[u8], source: &SourceConfig) -> CoreResult<Vec<CandidatePost>> {
    match feed::parse_feed(bytes, &source.name) {
        Ok(posts) if !posts.is_empty() => Ok(posts),
        _ => {
            let html = String::from_utf8_lossy(bytes);
            Ok(html_feed::extract_candidates(&html, &source.name, &source.url))
        }
    }
}

async fn medium_discover(source: &SourceConfig, ctx: &AdapterContext) -> CoreResult<Vec<CandidatePost>> {
    let Some(renderer) = &ctx.renderer else {
        return Err(CoreError::BrowserRequired);
    };
    ctx.validator.validate_with_dns(&source.url).await?;
    let rendered = renderer.render(&source.url).await?;
    Ok(html_feed::extract_candidates(&rendered.html, &source.name, &source.url))
}

/// Next.js-style SPA: render via the browser capability, then scan anchors
/// against the canonical article URL template and dedupe by canonical URL.
async fn spa_discover(source: &SourceConfig, ctx: &AdapterContext) -> CoreResult<Vec<CandidatePost>> {
    let Some(renderer) = &ctx.renderer else {
        return Err(CoreError::BrowserRequired);
    };
    ctx.validator.validate_with_dns(&source.url).await?;
    let rendered = renderer.render(&source.url).await?;
    Ok(scan_spa_anchors(&rendered.html, &source.name, &source.url))
}

fn scan_spa_anchors(html: &str, source_name: &str, base_url: &str) -> Vec<CandidatePost> {
    use std::collections::HashSet;

    use scraper::{Html, Selector};

    use blogwatch_core::fingerprint::canonicalize;

    let document = Html::parse_document(html);
    let anchor_sel = Selector::parse("a[href]").unwrap();
    let base = Url::parse(base_url).ok();

    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for anchor in document.select(&anchor_sel) {
        let Some(href) = anchor.value().attr("href") else { continue };
        let resolved = if let Ok(abs) = Url::parse(href) {
            abs
        } else if let Some(ref b) = base {
            let Ok(joined) = b.join(href) else { continue };
            joined
        } else {
            continue;
        };

        if !crate::host_lists::ARTICLE_PATH_PATTERN.is_match(resolved.path()) {
            continue;
        }

        let canon = canonicalize(resolved.as_str());
        if !seen.insert(canon) {
            continue;
        }

        let title = anchor.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ");
        let title = if title.is_empty() { resolved.path().to_string() } else { title };

        out.push(CandidatePost::new(source_name, resolved.as_str(), title));
    }

    out
}

/// Prefers the browser capability first whenever it's available; falls back to
/// plain HTTP only as a last resort.
async fn browser_fallback_discover(
    source: &SourceConfig,
    ctx: &AdapterContext,
) -> CoreResult<Vec<CandidatePost>> {
    if let Some(renderer) = &ctx.renderer {
        ctx.validator.validate_with_dns(&source.url).await?;
        let rendered = renderer.render(&source.url).await?;
        return Ok(html_feed::extract_candidates(&rendered.html, &source.name, &source.url));
    }

    warn!(source = %source.name, "browser capability unavailable, falling back to plain HTTP");
    let outcome = fetch(&ctx.http, &ctx.validator, &source.url, true).await?;
    match outcome {
        FetchOutcome::Body(bytes) => parse_generic_bytes(&bytes, source),
        FetchOutcome::BotChallenged => Err(CoreError::BotChallenged { host: host_of(&source.url) }),
    }
}

async fn fall_through_to_browser(source: &SourceConfig, ctx: &AdapterContext) -> CoreResult<Vec<CandidatePost>> {
    match &ctx.renderer {
        Some(renderer) => {
            let rendered = renderer.render(&source.url).await?;
            Ok(html_feed::extract_candidates(&rendered.html, &source.name, &source.url))
        }
        None => Err(CoreError::BotChallenged { host: host_of(&source.url) }),
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str) -> SourceConfig {
        SourceConfig::new("example", url)
    }

    #[test]
    fn selects_spa_for_known_spa_host() {
        let s = source("https://vercel.com/blog/");
        assert_eq!(select_adapter(&s).unwrap(), AdapterKind::Spa);
    }

    #[test]
    fn selects_medium_for_medium_host() {
        let s = source("https://medium.com/@someone/feed");
        // medium.com is also bot-gated in the built-in list, so browser
        // fallback takes priority per the ordered rules.
        assert_eq!(select_adapter(&s).unwrap(), AdapterKind::BrowserFallback);
    }

    #[test]
    fn selects_generic_by_default() {
        let s = source("https://engineering.example.test/blog");
        assert_eq!(select_adapter(&s).unwrap(), AdapterKind::Generic);
    }

    #[test]
    fn hints_override_host_lists() {
        let mut s = source("https://vercel.com/blog/");
        s.hints.prefers_html = true;
        assert_eq!(select_adapter(&s).unwrap(), AdapterKind::Generic);
    }
}
