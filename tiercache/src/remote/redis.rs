use super::RemoteStore;
use crate::core::{KeyPattern, LayerError, LayerResult};
use async_trait::async_trait;
use redis::RedisError;
use redis::aio::MultiplexedConnection;
use std::collections::BTreeSet;
use std::future::Future;
use tracing::{debug, info};

/// Keys requested per `SCAN` round trip
const SCAN_PAGE_SIZE: usize = 500;

/// Redis-backed store for the primary remote tier.
///
/// Uses one multiplexed connection shared by all callers; each command
/// clones the handle, which is cheap.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to `endpoint` (e.g. `redis://127.0.0.1:6379/0`)
    pub async fn connect(endpoint: &str) -> LayerResult<Self> {
        let client = redis::Client::open(endpoint)
            .map_err(|e| LayerError::Unavailable(format!("invalid redis endpoint: {}", e)))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;

        info!("Connected to redis at {}", client.get_connection_info().addr);
        Ok(Self { connection })
    }
}

/// Follow a SCAN cursor until it returns to 0. Keys may repeat across
/// pages, so they are deduplicated.
async fn collect_scan<F, Fut>(mut fetch: F) -> LayerResult<Vec<String>>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = LayerResult<(u64, Vec<String>)>>,
{
    let mut cursor = 0;
    let mut keys = BTreeSet::new();
    loop {
        let (next, page) = fetch(cursor).await?;
        keys.extend(page);
        cursor = next;
        if cursor == 0 {
            break;
        }
    }
    Ok(keys.into_iter().collect())
}

fn map_redis_error(e: RedisError) -> LayerError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        LayerError::Unavailable(e.to_string())
    } else {
        LayerError::Backend(e.to_string())
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn ping(&self) -> LayerResult<()> {
        let mut con = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut con)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> LayerResult<Option<Vec<u8>>> {
        let mut con = self.connection.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut con)
            .await
            .map_err(map_redis_error)
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl_secs: u64) -> LayerResult<bool> {
        let mut con = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut con)
            .await
            .map_err(map_redis_error)?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> LayerResult<bool> {
        let mut con = self.connection.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut con)
            .await
            .map_err(map_redis_error)?;
        Ok(removed > 0)
    }

    async fn flush_all(&self) -> LayerResult<bool> {
        let mut con = self.connection.clone();
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut con)
            .await
            .map_err(map_redis_error)?;
        Ok(true)
    }

    /// Incremental `SCAN MATCH` instead of a blocking `KEYS`
    async fn keys_matching(&self, pattern: &KeyPattern) -> LayerResult<Vec<String>> {
        let keys = collect_scan(|cursor| {
            let mut con = self.connection.clone();
            async move {
                let page: LayerResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern.as_str())
                    .arg("COUNT")
                    .arg(SCAN_PAGE_SIZE)
                    .query_async(&mut con)
                    .await
                    .map_err(map_redis_error);
                page
            }
        })
        .await?;

        debug!("redis SCAN '{}' returned {} keys", pattern, keys.len());
        Ok(keys)
    }
}
