use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hints an external loader may attach to a [`SourceConfig`] to shortcut adapter
/// selection (domain family, SPA-ness, browser preference). Absence of a hint never
/// prevents selection — the factory still falls back to host-list matching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceHints {
    pub domain_family: Option<String>,
    pub prefers_browser: bool,
    pub prefers_html: bool,
}

/// Static, read-only configuration for one source, supplied once at startup by the
/// external loader (out of scope here; see spec §1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    pub poll_interval: chrono::Duration,
    pub max_posts_per_tick: usize,
    pub enabled: bool,
    pub hints: SourceHints,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            poll_interval: chrono::Duration::minutes(30),
            max_posts_per_tick: 20,
            enabled: true,
            hints: SourceHints::default(),
        }
    }

    pub fn with_poll_interval(mut self, interval: chrono::Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_posts_per_tick(mut self, max: usize) -> Self {
        self.max_posts_per_tick = max;
        self
    }

    pub fn with_hints(mut self, hints: SourceHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn is_due(&self, last_tick_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_tick_at {
            None => true,
            Some(last) => now - last >= self.poll_interval,
        }
    }
}

/// A minimally-populated article reference produced by an adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePost {
    pub source_name: String,
    pub url: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
}

impl CandidatePost {
    pub fn new(source_name: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            url: url.into(),
            title: title.into(),
            published_at: None,
            author: None,
            summary: None,
            tags: Vec::new(),
        }
    }

    pub fn with_published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// `hex(stable_hash(source_name || "\x1f" || canonicalize(url)))` per spec §3.
    /// Title and tags are deliberately excluded so upstream edits never fork the
    /// fingerprint.
    pub fn fingerprint(&self) -> String {
        crate::fingerprint::fingerprint(&self.source_name, &self.url)
    }
}

/// Produced by the content extractor from fetched article HTML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleContent {
    pub text: String,
    pub html: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub word_count: usize,
    pub hero_image_url: Option<String>,
}

impl ArticleContent {
    pub fn new(text: impl Into<String>, html: impl Into<String>) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        Self {
            text,
            html: html.into(),
            author: None,
            published_at: None,
            word_count,
            hero_image_url: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_published_at(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }

    pub fn with_hero_image_url(mut self, url: impl Into<String>) -> Self {
        self.hero_image_url = Some(url.into());
        self
    }
}

/// The final persisted unit: one row in the vector store, keyed by fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub url: String,
    pub title: String,
    pub source_name: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub vector: Vec<f32>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EmbeddingRecord {
    pub fn new(id: impl Into<String>, url: impl Into<String>, title: impl Into<String>, source_name: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
            source_name: source_name.into(),
            author: None,
            published_at: None,
            summary: None,
            vector,
            metadata: HashMap::new(),
        }
    }

    /// Every stored component must be finite (no NaN/inf leaking out of an
    /// embedding model into the index), per spec §8 invariant 3.
    pub fn has_finite_vector(&self) -> bool {
        self.vector.iter().all(|c| c.is_finite())
    }
}

/// Internal to the Entry Store: a TTL-bounded key/value row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }
}
