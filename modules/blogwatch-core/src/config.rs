//! Typed configuration namespaced with `__`, per the options table in spec §6.
//! Loading environment variables is ambient plumbing, not orchestration logic — an
//! external loader (out of scope here) is expected to build these and hand them to
//! an [`crate::AppContext`].

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum CacheBackend {
    Memory,
    Postgres,
    Filesystem,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub postgres_dsn: String,
    pub ttl_hours: u64,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let backend = match env::var("CACHE__BACKEND").as_deref() {
            Ok("memory") => CacheBackend::Memory,
            Ok("filesystem") => CacheBackend::Filesystem,
            _ => CacheBackend::Postgres,
        };
        let postgres_dsn = env::var("CACHE__POSTGRES_DSN")
            .or_else(|_| env::var("VECTOR_DB__CONNECTION_STRING"))
            .unwrap_or_default();
        let ttl_hours = env::var("CACHE__TTL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24 * 7);
        Self { backend, postgres_dsn, ttl_hours }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 3600)
    }
}

#[derive(Debug, Clone)]
pub struct VectorDbConfig {
    pub connection_string: String,
    pub collection_name: String,
    /// D' — the dimension vectors are truncated to and stored at.
    pub text_vector_dimension: usize,
}

impl VectorDbConfig {
    pub fn from_env() -> Self {
        Self {
            connection_string: required_env("VECTOR_DB__CONNECTION_STRING"),
            collection_name: env::var("VECTOR_DB__COLLECTION_NAME")
                .unwrap_or_else(|_| "default".to_string()),
            text_vector_dimension: env::var("VECTOR_DB__TEXT_VECTOR_DIMENSION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1536),
        }
    }

    /// Table name for this collection's posts, e.g. `posts_default`.
    pub fn table_name(&self) -> String {
        format!("posts_{}", self.collection_name)
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model_type: String,
    pub model_name: String,
    pub embedding_dimensions: usize,
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        Self {
            model_type: env::var("EMBEDDING__MODEL_TYPE").unwrap_or_else(|_| "openai".to_string()),
            model_name: env::var("EMBEDDING__MODEL_NAME")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            embedding_dimensions: env::var("EMBEDDING__EMBEDDING_DIMENSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1536),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArticleConfig {
    pub full_content_capture: bool,
    pub generate_summary: bool,
    pub max_articles_per_feed: Option<usize>,
    pub concurrent_article_tasks: usize,
}

impl ArticleConfig {
    pub fn from_env() -> Self {
        Self {
            full_content_capture: env_bool("ARTICLE__FULL_CONTENT_CAPTURE", true),
            generate_summary: env_bool("ARTICLE__GENERATE_SUMMARY", false),
            max_articles_per_feed: env::var("ARTICLE__MAX_ARTICLES_PER_FEED")
                .ok()
                .and_then(|v| v.parse().ok()),
            concurrent_article_tasks: env::var("ARTICLE__CONCURRENT_ARTICLE_TASKS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub max_concurrent_browsers: usize,
}

impl BrowserConfig {
    pub fn from_env() -> Self {
        Self {
            max_concurrent_browsers: env::var("BROWSER__MAX_CONCURRENT_BROWSERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent_source_tasks: usize,
    pub shutdown_grace_period: Duration,
    pub tick_hard_cap: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_source_tasks: 10,
            shutdown_grace_period: Duration::from_secs(30),
            tick_hard_cap: Duration::from_secs(10 * 60),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
