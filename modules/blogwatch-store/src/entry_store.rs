//! Component A — the TTL-bounded key/value Entry Store.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use blogwatch_core::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct EntryStore {
    pool: PgPool,
}

impl EntryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> CoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Returns the most recent unexpired value for `key`, or `None` on miss.
    /// Lazily deletes the row if it's found but past `expires_at` (spec §4.A).
    pub async fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT value, expires_at FROM cache_entries WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some((_, Some(expires_at))) if expires_at <= Utc::now() => {
                let _ = self.delete(key).await;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
        }
    }

    pub async fn has(&self, key: &str) -> CoreResult<bool> {
        let row: Option<(Option<DateTime<Utc>>,)> = sqlx::query_as(
            "SELECT expires_at FROM cache_entries WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => false,
            Some((Some(expires_at),)) => expires_at > Utc::now(),
            Some((None,)) => true,
        })
    }

    /// Writes or overwrites `key`. `ttl = None` means the entry never expires.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Option<chrono::Duration>) -> CoreResult<()> {
        let expires_at = ttl.map(|d| Utc::now() + d);

        sqlx::query(
            "INSERT INTO cache_entries (key, value, expires_at, created_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (key)
             DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at, created_at = now()",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Convenience wrapper: serialize `value` as JSON and store it. On read,
    /// [`EntryStore::get_json`] decodes bytes to UTF-8 text before attempting a
    /// JSON parse — never parses raw bytes directly (spec §7/§9).
    pub async fn set_json<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<chrono::Duration>,
    ) -> CoreResult<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| CoreError::Other(anyhow::anyhow!(e)))?;
        self.set(key, &bytes, ttl).await
    }

    /// Reads back a value written by [`EntryStore::set_json`] or
    /// [`EntryStore::set`]. Decodes bytes to UTF-8 text first; if that fails or
    /// the text isn't valid JSON, returns the raw bytes unparsed so callers can
    /// fall back to their own binary decoder. See spec §4.A / §9.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> CoreResult<Option<Deserialized<T>>> {
        let Some(bytes) = self.get(key).await? else {
            return Ok(None);
        };

        match std::str::from_utf8(&bytes) {
            Ok(text) => match serde_json::from_str::<T>(text) {
                Ok(value) => Ok(Some(Deserialized::Json(value))),
                Err(_) => Ok(Some(Deserialized::Raw(bytes))),
            },
            Err(_) => Ok(Some(Deserialized::Raw(bytes))),
        }
    }

    pub async fn delete(&self, key: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM cache_entries WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes all keys, or all keys matching `prefix` when given.
    pub async fn clear(&self, prefix: Option<&str>) -> CoreResult<u64> {
        let result = match prefix {
            Some(p) => {
                sqlx::query("DELETE FROM cache_entries WHERE key LIKE $1")
                    .bind(format!("{p}%"))
                    .execute(&self.pool)
                    .await?
            }
            None => sqlx::query("DELETE FROM cache_entries").execute(&self.pool).await?,
        };
        Ok(result.rows_affected())
    }

    /// Optional background sweep of expired rows (lazy-on-read handles
    /// correctness; this just reclaims space).
    pub async fn evict_expired(&self) -> CoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= now()",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Result of a JSON-aware read: either the value parsed as `T`, or the raw bytes
/// when they weren't UTF-8 or weren't valid JSON for `T`.
pub enum Deserialized<T> {
    Json(T),
    Raw(Vec<u8>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialized_variants_are_reachable() {
        let json: Deserialized<u8> = Deserialized::Json(1);
        let raw: Deserialized<u8> = Deserialized::Raw(vec![1, 2, 3]);
        assert!(matches!(json, Deserialized::Json(_)));
        assert!(matches!(raw, Deserialized::Raw(_)));
    }
}
