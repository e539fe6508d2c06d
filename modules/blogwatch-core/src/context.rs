use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::config::{ArticleConfig, BrowserConfig, CacheConfig, EmbeddingConfig, OrchestratorConfig, VectorDbConfig};
use crate::error::CoreResult;

/// `EmbedText(text, ctx) -> [f32; N]` from spec §6, with N the model's native
/// dimension (truncated to the collection's D' downstream, not here).
#[async_trait]
pub trait EmbedText: Send + Sync {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>>;
}

/// `Summarize(text, ctx) -> string` from spec §6. Optional: the pipeline only calls
/// this when `ARTICLE__GENERATE_SUMMARY` is set.
#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, text: &str) -> CoreResult<String>;
}

/// `RenderPage(url, ctx) -> (html, status, headers)` from spec §6. Optional:
/// adapters that need it (Medium, SPA, browser-fallback) fail with
/// `CoreError::BrowserRequired` when no implementation is wired.
#[async_trait]
pub trait RenderPage: Send + Sync {
    async fn render(&self, url: &str) -> CoreResult<RenderedPage>;
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub status: u16,
    pub headers: std::collections::HashMap<String, String>,
}

#[async_trait]
impl EmbedText for ai_client::openai::OpenAi {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        use ai_client::traits::EmbedAgent;
        EmbedAgent::embed(self, text.to_string())
            .await
            .map_err(|e| crate::error::CoreError::EmbeddingFailed(e.to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        use ai_client::traits::EmbedAgent;
        EmbedAgent::embed_batch(self, texts.to_vec())
            .await
            .map_err(|e| crate::error::CoreError::EmbeddingFailed(e.to_string()))
    }
}

#[async_trait]
impl Summarize for ai_client::claude::Claude {
    async fn summarize(&self, text: &str) -> CoreResult<String> {
        self.chat_completion(
            "Summarize the unique technical contribution of this article in 2-3 sentences. \
             Do not restate generic platform boilerplate.",
            text,
        )
        .await
        .map_err(|e| crate::error::CoreError::Other(e))
    }
}

#[async_trait]
impl RenderPage for browserless_client::BrowserlessClient {
    async fn render(&self, url: &str) -> CoreResult<RenderedPage> {
        let html = self
            .content(url)
            .await
            .map_err(|e| crate::error::CoreError::Other(anyhow::anyhow!(e)))?;
        Ok(RenderedPage {
            html,
            status: 200,
            headers: std::collections::HashMap::new(),
        })
    }
}

/// Central dependency container threaded through every call site, per spec §9's
/// "global singletons for config/pool" re-architecture note: no process-wide mutable
/// state, everything explicit.
#[derive(Clone)]
pub struct AppContext {
    pub db_pool: PgPool,
    pub http_client: reqwest::Client,
    pub embedder: Arc<dyn EmbedText>,
    pub summarizer: Option<Arc<dyn Summarize>>,
    pub renderer: Option<Arc<dyn RenderPage>>,
    pub cache: CacheConfig,
    pub vector_db: VectorDbConfig,
    pub embedding: EmbeddingConfig,
    pub article: ArticleConfig,
    pub browser: BrowserConfig,
    pub orchestrator: OrchestratorConfig,
}

impl AppContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: PgPool,
        http_client: reqwest::Client,
        embedder: Arc<dyn EmbedText>,
        summarizer: Option<Arc<dyn Summarize>>,
        renderer: Option<Arc<dyn RenderPage>>,
        cache: CacheConfig,
        vector_db: VectorDbConfig,
        embedding: EmbeddingConfig,
        article: ArticleConfig,
        browser: BrowserConfig,
        orchestrator: OrchestratorConfig,
    ) -> Self {
        Self {
            db_pool,
            http_client,
            embedder,
            summarizer,
            renderer,
            cache,
            vector_db,
            embedding,
            article,
            browser,
            orchestrator,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db_pool
    }
}
