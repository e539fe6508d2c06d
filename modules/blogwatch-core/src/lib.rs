pub mod config;
pub mod context;
pub mod error;
pub mod fingerprint;
pub mod security;
pub mod types;

pub use context::AppContext;
pub use error::{CoreError, CoreResult};
pub use types::{
    ArticleContent, CacheEntry, CandidatePost, EmbeddingRecord, SourceConfig, SourceHints,
};

/// Render HTML down to normalized plain text (80-column wrap, matching the
/// extractor's word-count expectations).
pub fn html_to_plain_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 80).unwrap_or_default()
}
