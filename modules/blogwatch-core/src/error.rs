use thiserror::Error;

/// The nine error kinds the ingestion pipeline can raise, shared across crates so
/// that callers (the orchestrator, mainly) can pattern-match on kind rather than on
/// crate-local error types.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("bot-challenged by {host}")]
    BotChallenged { host: String },

    #[error("could not parse response as feed or HTML: {0}")]
    ParseFormat(String),

    #[error("browser rendering required but unavailable")]
    BrowserRequired,

    #[error("extraction produced empty text for {url}")]
    ExtractionEmpty { url: String },

    #[error("embedding call failed: {0}")]
    EmbeddingFailed(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Whether the orchestrator's retry driver should re-attempt the same
    /// operation, per spec §7/§9 ("convert to typed result values with a
    /// `retryable` field").
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Network(_) | CoreError::RateLimited(_) | CoreError::Database(_) | CoreError::EmbeddingFailed(_)
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
