pub mod metadata;
pub mod readability;

use blogwatch_core::types::ArticleContent;

/// `extract(html) -> ArticleContent` (spec §4.D). Never errors: HTML that
/// yields no content just produces an empty-text `ArticleContent`, which the
/// enrichment pipeline treats as `ErrExtractionEmpty` and degrades from.
pub fn extract(html: &str) -> ArticleContent {
    let body = readability::extract_body(html);

    let hero_image = metadata::extract_hero_image_from_meta(html)
        .or_else(|| readability::largest_image_in(&body.html));

    let mut article = ArticleContent::new(body.text, body.html);

    if let Some(author) = metadata::extract_author(html) {
        article = article.with_author(author);
    }
    if let Some(published_at) = metadata::extract_published_date(html) {
        article = article.with_published_at(published_at);
    }
    if let Some(hero_image) = hero_image {
        article = article.with_hero_image_url(hero_image);
    }

    article
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_ARTICLE: &str = r#"
    <html><head>
      <script type="application/ld+json">
      {"@type": "Article", "author": {"name": "Jane Doe"}, "datePublished": "2026-02-01T00:00:00Z"}
      </script>
      <meta property="og:image" content="https://x.test/hero.png">
    </head><body>
      <nav><a href="/">Home</a></nav>
      <article>
        <p>We migrated our vector index to use HNSW, cutting p99 query latency
        from 400ms to under 30ms across our busiest collections.</p>
        <p>The rollout was staged over two weeks with a shadow-read comparison
        against the old IVF index before we flipped production traffic over.</p>
      </article>
    </body></html>
    "#;

    #[test]
    fn extracts_full_article_metadata_and_body() {
        let article = extract(FULL_ARTICLE);
        assert_eq!(article.author.as_deref(), Some("Jane Doe"));
        assert!(article.published_at.is_some());
        assert_eq!(article.hero_image_url.as_deref(), Some("https://x.test/hero.png"));
        assert!(article.text.contains("HNSW"));
        assert!(article.word_count > 0);
    }

    #[test]
    fn empty_html_degrades_to_empty_article() {
        let article = extract("");
        assert!(article.text.is_empty());
        assert_eq!(article.word_count, 0);
    }
}
