//! Enrichment Pipeline: fingerprint, dedupe, fetch, extract, summarize,
//! embed, persist — in that order, with the entry store's fingerprint marker
//! written only after the vector store upsert succeeds, so a crash between
//! the two never loses a post but can at worst re-embed it once.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tracing::{debug, info, warn};

use blogwatch_adapters::fetch::{fetch, FetchOutcome};
use blogwatch_core::context::AppContext;
use blogwatch_core::error::{CoreError, CoreResult};
use blogwatch_core::security::UrlValidator;
use blogwatch_core::types::{CandidatePost, EmbeddingRecord};
use blogwatch_store::{truncate_to_dimension, EntryStore, VectorStore};

const ARTICLE_CACHE_PREFIX: &str = "article:";
const FINGERPRINT_PREFIX: &str = "fp:";
const MAX_EMBED_INPUT_CHARS: usize = 24_000;
const MAX_SUMMARY_INPUT_CHARS: usize = 24_000;

/// What happened to one candidate, rolled up by the orchestrator into its
/// per-tick counters.
#[derive(Debug)]
pub enum EnrichOutcome {
    Persisted { fingerprint: String },
    Duplicate { fingerprint: String },
    /// Persisted, but with degraded input (extraction failed or produced
    /// nothing, so the feed's own summary was embedded instead of body text).
    Degraded { fingerprint: String, reason: String },
    Failed { error: CoreError },
}

pub struct EnrichmentPipeline {
    ctx: Arc<AppContext>,
    entry_store: EntryStore,
    vector_store: VectorStore,
    validator: UrlValidator,
}

impl EnrichmentPipeline {
    pub fn new(ctx: Arc<AppContext>, entry_store: EntryStore, vector_store: VectorStore) -> Self {
        Self {
            ctx,
            entry_store,
            vector_store,
            validator: UrlValidator::new(),
        }
    }

    /// Runs one candidate through the full pipeline. A bad post never
    /// propagates an error out of this call — every failure short of the
    /// dedupe check itself degrades to `Degraded` or `Failed`, so the caller
    /// can keep processing the rest of a source's batch.
    pub async fn enrich(&self, candidate: CandidatePost) -> EnrichOutcome {
        let fingerprint = candidate.fingerprint();

        match self.entry_store.has(&dedupe_key(&fingerprint)).await {
            Ok(true) => return EnrichOutcome::Duplicate { fingerprint },
            Ok(false) => {}
            Err(e) => return EnrichOutcome::Failed { error: e },
        }

        match self.enrich_inner(&candidate, &fingerprint).await {
            Ok(outcome) => outcome,
            Err(error) => EnrichOutcome::Failed { error },
        }
    }

    async fn enrich_inner(&self, candidate: &CandidatePost, fingerprint: &str) -> CoreResult<EnrichOutcome> {
        let mut degraded_reason: Option<String> = None;

        let article_text = if self.ctx.article.full_content_capture {
            match self.fetch_and_extract(candidate).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(url = %candidate.url, error = %e, "full-article fetch/extract failed, falling back to feed summary");
                    degraded_reason = Some(format!("fetch/extract failed: {e}"));
                    candidate.summary.clone().unwrap_or_default()
                }
            }
        } else {
            candidate.summary.clone().unwrap_or_default()
        };

        if article_text.trim().is_empty() && degraded_reason.is_none() {
            degraded_reason = Some("no article text and no feed summary".into());
        }

        let summary = self.maybe_summarize(candidate, &article_text).await;
        let canonical_text = build_canonical_text(&candidate.title, summary.as_deref(), &article_text);
        let embed_input = truncate_chars(&canonical_text, MAX_EMBED_INPUT_CHARS);

        let raw_vector = self.embed_with_retry(&embed_input).await?;
        let vector = truncate_to_dimension(&raw_vector, self.ctx.vector_db.text_vector_dimension)?;

        let mut record = EmbeddingRecord::new(
            fingerprint.to_string(),
            candidate.url.clone(),
            candidate.title.clone(),
            candidate.source_name.clone(),
            vector,
        );
        record.author = candidate.author.clone();
        record.published_at = candidate.published_at;
        record.summary = summary;

        if !record.has_finite_vector() {
            return Err(CoreError::EmbeddingFailed("embedding contained a non-finite component".into()));
        }

        self.vector_store.upsert(&record).await?;
        self.entry_store.set(&dedupe_key(fingerprint), b"1", None).await?;

        match degraded_reason {
            Some(reason) => {
                info!(url = %candidate.url, reason = %reason, "persisted with degraded content");
                Ok(EnrichOutcome::Degraded { fingerprint: fingerprint.to_string(), reason })
            }
            None => {
                debug!(url = %candidate.url, "persisted");
                Ok(EnrichOutcome::Persisted { fingerprint: fingerprint.to_string() })
            }
        }
    }

    /// Retries once on failure before giving up, per the documented recovery
    /// behavior for `ErrEmbeddingFailed`: a transient model-call failure
    /// shouldn't sink the whole candidate on the first attempt.
    async fn embed_with_retry(&self, text: &str) -> CoreResult<Vec<f32>> {
        match self.ctx.embedder.embed(text).await {
            Ok(v) => Ok(v),
            Err(first_error) => {
                warn!(error = %first_error, "embedding failed, retrying once");
                self.ctx.embedder.embed(text).await.map_err(|_| first_error)
            }
        }
    }

    async fn maybe_summarize(&self, candidate: &CandidatePost, article_text: &str) -> Option<String> {
        if !self.ctx.article.generate_summary {
            return candidate.summary.clone();
        }
        let Some(summarizer) = &self.ctx.summarizer else {
            return candidate.summary.clone();
        };
        if article_text.trim().is_empty() {
            return candidate.summary.clone();
        }
        let input = truncate_chars(article_text, MAX_SUMMARY_INPUT_CHARS);
        match summarizer.summarize(&input).await {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(url = %candidate.url, error = %e, "summarization failed, continuing without it");
                candidate.summary.clone()
            }
        }
    }

    /// Fetches the full article, caching the raw bytes under the canonical
    /// URL, then runs it through the content extractor. Returns an error
    /// (never a silent empty string) so the caller can tell "fetch/extract
    /// failed" apart from "extraction legitimately found nothing."
    async fn fetch_and_extract(&self, candidate: &CandidatePost) -> CoreResult<String> {
        let canonical_url = blogwatch_core::fingerprint::canonicalize(&candidate.url);
        let cache_key = format!("{ARTICLE_CACHE_PREFIX}{canonical_url}");

        let html = match self.entry_store.get(&cache_key).await? {
            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            None => {
                let outcome = fetch(&self.ctx.http_client, &self.validator, &candidate.url, false).await?;
                let bytes = match outcome {
                    FetchOutcome::Body(bytes) => bytes,
                    FetchOutcome::BotChallenged => {
                        return Err(CoreError::BotChallenged { host: host_of(&candidate.url) })
                    }
                };
                let ttl = ChronoDuration::from_std(self.ctx.cache.default_ttl())
                    .unwrap_or_else(|_| ChronoDuration::days(7));
                self.entry_store.set(&cache_key, &bytes, Some(ttl)).await?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };

        let article = blogwatch_extractor::extract(&html);
        if article.text.trim().is_empty() {
            return Err(CoreError::ExtractionEmpty { url: candidate.url.clone() });
        }
        Ok(article.text)
    }
}

fn dedupe_key(fingerprint: &str) -> String {
    format!("{FINGERPRINT_PREFIX}{fingerprint}")
}

fn build_canonical_text(title: &str, summary: Option<&str>, text: &str) -> String {
    format!("{title}\n\n{}\n\n{text}", summary.unwrap_or_default())
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_text_joins_title_summary_and_body() {
        let joined = build_canonical_text("Title", Some("Summary"), "Body text");
        assert_eq!(joined, "Title\n\nSummary\n\nBody text");
    }

    #[test]
    fn canonical_text_tolerates_missing_summary() {
        let joined = build_canonical_text("Title", None, "Body text");
        assert_eq!(joined, "Title\n\n\n\nBody text");
    }

    #[test]
    fn truncate_chars_is_a_noop_under_the_limit() {
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn truncate_chars_cuts_at_the_char_boundary_not_byte() {
        let s = "héllo world";
        let truncated = truncate_chars(s, 3);
        assert_eq!(truncated.chars().count(), 3);
    }

    #[test]
    fn dedupe_key_is_namespaced() {
        assert_eq!(dedupe_key("abc123"), "fp:abc123");
    }
}
