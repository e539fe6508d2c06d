//! Component B — the Vector Store: upsert + similarity search over fixed-dimension
//! embedding records, sharing the Entry Store's connection pool (spec §4.B).

use pgvector::Vector;
use sqlx::{PgPool, Row};

use blogwatch_core::error::{CoreError, CoreResult};
use blogwatch_core::types::EmbeddingRecord;

/// Matryoshka-style prefix truncation: keep the first `dim` components of a native
/// embedding. Errors if the input is shorter than `dim` (spec §8 boundary: "shorter
/// than D' is an `ErrEmbeddingFailed`").
pub fn truncate_to_dimension(vector: &[f32], dim: usize) -> CoreResult<Vec<f32>> {
    if vector.len() < dim {
        return Err(CoreError::EmbeddingFailed(format!(
            "embedding has {} components, need at least {dim}",
            vector.len()
        )));
    }
    Ok(vector[..dim].to_vec())
}

#[derive(Debug, Clone)]
pub struct VectorStore {
    pool: PgPool,
    table: String,
    dimension: usize,
}

impl VectorStore {
    pub fn new(pool: PgPool, collection_name: &str, dimension: usize) -> Self {
        Self {
            pool,
            table: format!("posts_{collection_name}"),
            dimension,
        }
    }

    /// Creates the collection's table (with an HNSW index over `vector`) if it
    /// doesn't already exist. The table name is derived from configuration, so
    /// this can't be a static `sqlx::migrate!` file (spec §6).
    pub async fn ensure_schema(&self) -> CoreResult<()> {
        let create = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                source TEXT NOT NULL,
                author TEXT NULL,
                published_at TIMESTAMPTZ NULL,
                summary TEXT NULL,
                vector VECTOR({dim}) NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            table = self.table,
            dim = self.dimension
        );
        sqlx::query(&create).execute(&self.pool).await?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_vector_hnsw ON {table}
             USING hnsw (vector vector_cosine_ops)",
            table = self.table
        );
        sqlx::query(&index).execute(&self.pool).await?;

        Ok(())
    }

    /// Insert or replace by `id`, relying on the primary-key conflict for
    /// idempotence (spec §9: "never emulate with read-then-write").
    pub async fn upsert(&self, record: &EmbeddingRecord) -> CoreResult<()> {
        if record.vector.len() != self.dimension {
            return Err(CoreError::EmbeddingFailed(format!(
                "record has vector length {}, collection dimension is {}",
                record.vector.len(),
                self.dimension
            )));
        }
        if !record.has_finite_vector() {
            return Err(CoreError::EmbeddingFailed("vector has non-finite components".into()));
        }

        let query = format!(
            "INSERT INTO {table} (id, url, title, source, author, published_at, summary, vector, metadata, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
             ON CONFLICT (id) DO UPDATE SET
                url = EXCLUDED.url,
                title = EXCLUDED.title,
                source = EXCLUDED.source,
                author = EXCLUDED.author,
                published_at = EXCLUDED.published_at,
                summary = EXCLUDED.summary,
                vector = EXCLUDED.vector,
                metadata = EXCLUDED.metadata,
                updated_at = now()",
            table = self.table
        );

        sqlx::query(&query)
            .bind(&record.id)
            .bind(&record.url)
            .bind(&record.title)
            .bind(&record.source_name)
            .bind(&record.author)
            .bind(record.published_at)
            .bind(&record.summary)
            .bind(Vector::from(record.vector.clone()))
            .bind(serde_json::to_value(&record.metadata).unwrap_or_default())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn upsert_batch(&self, records: &[EmbeddingRecord]) -> CoreResult<()> {
        for record in records {
            self.upsert(record).await?;
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> CoreResult<Option<EmbeddingRecord>> {
        let query = format!(
            "SELECT id, url, title, source, author, published_at, summary, vector, metadata
             FROM {table} WHERE id = $1",
            table = self.table
        );
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.map(|r| Self::row_to_record(&r)).transpose()
    }

    pub async fn delete(&self, id: &str) -> CoreResult<()> {
        let query = format!("DELETE FROM {table} WHERE id = $1", table = self.table);
        sqlx::query(&query).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Approximate nearest-neighbor search by cosine distance. Results are
    /// ordered ascending by distance (smaller = more similar); ties are broken
    /// by `id` ascending (spec §4.B).
    pub async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        source_filter: Option<&str>,
    ) -> CoreResult<Vec<(EmbeddingRecord, f32)>> {
        let vector = Vector::from(query_vector.to_vec());

        let query = if source_filter.is_some() {
            format!(
                "SELECT id, url, title, source, author, published_at, summary, vector, metadata,
                        (vector <=> $1) AS distance
                 FROM {table} WHERE source = $2
                 ORDER BY distance ASC, id ASC LIMIT $3",
                table = self.table
            )
        } else {
            format!(
                "SELECT id, url, title, source, author, published_at, summary, vector, metadata,
                        (vector <=> $1) AS distance
                 FROM {table}
                 ORDER BY distance ASC, id ASC LIMIT $2",
                table = self.table
            )
        };

        let rows = if let Some(source) = source_filter {
            sqlx::query(&query)
                .bind(vector)
                .bind(source)
                .bind(k as i64)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query(&query)
                .bind(vector)
                .bind(k as i64)
                .fetch_all(&self.pool)
                .await?
        };

        rows.iter()
            .map(|r| {
                let record = Self::row_to_record(r)?;
                let distance: f32 = r.try_get("distance")?;
                Ok((record, distance))
            })
            .collect()
    }

    pub async fn count(&self, source_filter: Option<&str>) -> CoreResult<i64> {
        let (query, bind_source) = match source_filter {
            Some(_) => (format!("SELECT count(*) FROM {table} WHERE source = $1", table = self.table), true),
            None => (format!("SELECT count(*) FROM {table}", table = self.table), false),
        };

        let count: i64 = if bind_source {
            sqlx::query_scalar(&query)
                .bind(source_filter.unwrap())
                .fetch_one(&self.pool)
                .await?
        } else {
            sqlx::query_scalar(&query).fetch_one(&self.pool).await?
        };

        Ok(count)
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> CoreResult<EmbeddingRecord> {
        let vector: Vector = row.try_get("vector")?;
        let metadata: serde_json::Value = row.try_get("metadata")?;
        Ok(EmbeddingRecord {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            title: row.try_get("title")?,
            source_name: row.try_get("source")?,
            author: row.try_get("author")?,
            published_at: row.try_get("published_at")?,
            summary: row.try_get("summary")?,
            vector: vector.to_vec(),
            metadata: serde_json::from_value(metadata).unwrap_or_default(),
        })
    }
}
