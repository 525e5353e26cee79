use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::core::error::BotError;
use crate::core::models::{PricePoint, PriceQuote};

/// SQLite-backed persistence: a TTL'd JSON response cache, the per-user
/// rate-limit windows, and the collected price history.
pub struct Storage {
    pool: SqlitePool,
    cache_writes_disabled: bool,
}

impl Storage {
    pub async fn new(pool: SqlitePool, cache_writes_disabled: bool) -> Result<Self, BotError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            cache_writes_disabled,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// Fetch a cached JSON value. Expired entries are deleted and count as
    /// a miss; unreadable entries count as a miss without being retried.
    pub async fn cache_get(&self, key: &str) -> Result<Option<Value>, BotError> {
        let row = sqlx::query("SELECT value_json, updated_at, ttl_seconds FROM cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let value_json: String = row.get("value_json");
        let updated_at: i64 = row.get("updated_at");
        let ttl_seconds: i64 = row.get("ttl_seconds");
        if Self::now() - updated_at > ttl_seconds {
            sqlx::query("DELETE FROM cache WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
            debug!(key, "cache entry expired");
            return Ok(None);
        }
        match serde_json::from_str(&value_json) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "unreadable cache entry");
                Ok(None)
            }
        }
    }

    /// Upsert a cache entry. A no-op when cache writes are disabled for
    /// this process.
    pub async fn cache_set(&self, key: &str, value: &Value, ttl_seconds: i64) -> Result<(), BotError> {
        if self.cache_writes_disabled {
            debug!(key, "cache writes disabled, skipping");
            return Ok(());
        }
        let value_json = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO cache (key, value_json, updated_at, ttl_seconds) VALUES (?, ?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, \
             updated_at = excluded.updated_at, ttl_seconds = excluded.ttl_seconds",
        )
        .bind(key)
        .bind(value_json)
        .bind(Self::now())
        .bind(ttl_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fixed-window rate limiter. The first request opens a window; requests
    /// beyond `max_requests` inside `window_seconds` are denied; an elapsed
    /// window resets the count.
    pub async fn rate_limit_allow(
        &self,
        user_id: i64,
        window_seconds: i64,
        max_requests: i64,
    ) -> Result<bool, BotError> {
        let now = Self::now();
        let row = sqlx::query("SELECT window_start, count FROM rate_limit WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            sqlx::query("INSERT INTO rate_limit (user_id, window_start, count) VALUES (?, ?, 1)")
                .bind(user_id)
                .bind(now)
                .execute(&self.pool)
                .await?;
            return Ok(true);
        };

        let window_start: i64 = row.get("window_start");
        let count: i64 = row.get("count");

        if now - window_start >= window_seconds {
            sqlx::query("UPDATE rate_limit SET window_start = ?, count = 1 WHERE user_id = ?")
                .bind(now)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            return Ok(true);
        }

        if count >= max_requests {
            debug!(user_id, count, "rate limit hit");
            return Ok(false);
        }

        sqlx::query("UPDATE rate_limit SET count = count + 1 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }

    /// Append a price snapshot unless it equals the latest stored pair for
    /// the article.
    pub async fn price_add_snapshot(&self, nmid: i64, quote: PriceQuote) -> Result<(), BotError> {
        let last = sqlx::query(
            "SELECT basic_u, product_u FROM price_history WHERE nmid = ? \
             ORDER BY ts DESC, id DESC LIMIT 1",
        )
        .bind(nmid)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = last {
            let last_basic: Option<i64> = row.get("basic_u");
            let last_product: Option<i64> = row.get("product_u");
            if last_basic == quote.basic_u && last_product == quote.product_u {
                return Ok(());
            }
        }

        sqlx::query("INSERT INTO price_history (nmid, ts, basic_u, product_u) VALUES (?, ?, ?, ?)")
            .bind(nmid)
            .bind(Self::now())
            .bind(quote.basic_u)
            .bind(quote.product_u)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Latest snapshots for an article, newest first.
    pub async fn price_history(&self, nmid: i64, limit: i64) -> Result<Vec<PricePoint>, BotError> {
        let rows = sqlx::query(
            "SELECT ts, basic_u, product_u FROM price_history WHERE nmid = ? \
             ORDER BY ts DESC, id DESC LIMIT ?",
        )
        .bind(nmid)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PricePoint {
                ts: row.get("ts"),
                basic_u: row.get("basic_u"),
                product_u: row.get("product_u"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_storage(cache_writes_disabled: bool) -> Storage {
        // one connection: each in-memory sqlite connection is its own db
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        Storage::new(pool, cache_writes_disabled)
            .await
            .expect("migrations apply")
    }

    #[tokio::test]
    async fn cache_roundtrip_and_expiry() {
        let storage = memory_storage(false).await;
        let value = json!({"products": [{"id": 1}]});

        storage.cache_set("card:1", &value, 600).await.unwrap();
        assert_eq!(storage.cache_get("card:1").await.unwrap(), Some(value.clone()));

        // zero TTL with an updated_at in the past is unreachable without
        // sleeping, so emulate expiry with a negative TTL
        storage.cache_set("card:2", &value, -1).await.unwrap();
        assert_eq!(storage.cache_get("card:2").await.unwrap(), None);
        // the expired row is gone
        let row = sqlx::query("SELECT key FROM cache WHERE key = 'card:2'")
            .fetch_optional(storage.pool())
            .await
            .unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn cache_writes_can_be_disabled() {
        let storage = memory_storage(true).await;
        let value = json!({"cached": true});
        storage.cache_set("card:1", &value, 600).await.unwrap();
        assert_eq!(storage.cache_get("card:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rate_limit_window() {
        let storage = memory_storage(false).await;
        for _ in 0..3 {
            assert!(storage.rate_limit_allow(7, 60, 3).await.unwrap());
        }
        assert!(!storage.rate_limit_allow(7, 60, 3).await.unwrap());

        // a zero-length window resets immediately
        assert!(storage.rate_limit_allow(8, 0, 1).await.unwrap());
        assert!(storage.rate_limit_allow(8, 0, 1).await.unwrap());
    }

    #[tokio::test]
    async fn price_snapshots_deduplicate() {
        let storage = memory_storage(false).await;
        let quote = PriceQuote {
            basic_u: Some(100),
            product_u: Some(90),
        };
        storage.price_add_snapshot(42, quote).await.unwrap();
        storage.price_add_snapshot(42, quote).await.unwrap();
        assert_eq!(storage.price_history(42, 10).await.unwrap().len(), 1);

        let changed = PriceQuote {
            basic_u: Some(100),
            product_u: Some(80),
        };
        storage.price_add_snapshot(42, changed).await.unwrap();
        let history = storage.price_history(42, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        // newest first
        assert_eq!(history[0].product_u, Some(80));
    }
}
