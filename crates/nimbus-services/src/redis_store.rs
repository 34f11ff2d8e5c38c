//! Redis-backed `KvStore`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nimbus_core::RedisConfig;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use tokio::sync::OnceCell;

use crate::kv::{bounded, KeyTtl, KvError, KvResult, KvStore};

/// After a failed connect, commands fail immediately for this long.
const CONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// `KvStore` over a multiplexed, auto-reconnecting Redis connection.
///
/// The connection is opened on first use with a single attempt, so a Redis
/// that is down at startup makes commands fail fast and lookups fall through
/// to the origin. Every command, including that first connect, is bounded by
/// `op_timeout`.
#[derive(Clone)]
pub struct RedisKvStore {
    client: redis::Client,
    conn: Arc<OnceCell<ConnectionManager>>,
    last_connect_failure: Arc<Mutex<Option<Instant>>>,
    op_timeout: Duration,
}

impl RedisKvStore {
    /// Validate `config.url`. No connection is made yet.
    pub fn new(config: &RedisConfig) -> KvResult<Self> {
        let client =
            redis::Client::open(config.url.as_str()).map_err(|e| KvError::backend("open", e))?;

        Ok(Self {
            client,
            conn: Arc::new(OnceCell::new()),
            last_connect_failure: Arc::new(Mutex::new(None)),
            op_timeout: config.op_timeout(),
        })
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    async fn connection(&self) -> KvResult<ConnectionManager> {
        if let Some(conn) = self.conn.get() {
            return Ok(conn.clone());
        }

        let last_failure = *self.last_connect_failure.lock();
        if last_failure.is_some_and(|at| at.elapsed() < CONNECT_BACKOFF) {
            return Err(KvError::backend("connect", "redis unreachable, backing off"));
        }

        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(0)
            .set_connection_timeout(self.op_timeout);

        let result = self
            .conn
            .get_or_try_init(|| async {
                ConnectionManager::new_with_config(self.client.clone(), config)
                    .await
                    .map_err(|e| KvError::backend("connect", e))
            })
            .await
            .cloned();

        match &result {
            Ok(_) => *self.last_connect_failure.lock() = None,
            Err(e) => {
                tracing::warn!("Redis connect failed: {}", e);
                *self.last_connect_failure.lock() = Some(Instant::now());
            }
        }
        result
    }
}

/// PX/PSETEX reject zero; sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn ttl_from_pttl(reply: i64) -> KeyTtl {
    match reply {
        -2 => KeyTtl::Missing,
        -1 => KeyTtl::Persistent,
        ms => KeyTtl::Expires(Duration::from_millis(ms.max(0).unsigned_abs())),
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn ping(&self) -> KvResult<String> {
        bounded("ping", self.op_timeout, async {
            let mut conn = self.connection().await?;
            let pong: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| KvError::backend("ping", e))?;
            Ok(pong)
        })
        .await
    }

    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        bounded("get", self.op_timeout, async {
            let mut conn = self.connection().await?;
            let value: Option<String> = redis::cmd("GET")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(|e| KvError::backend("get", e))?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        bounded("set", self.op_timeout, async {
            let mut conn = self.connection().await?;
            let _: () = redis::cmd("PSETEX")
                .arg(key)
                .arg(ttl_millis(ttl))
                .arg(value)
                .query_async(&mut conn)
                .await
                .map_err(|e| KvError::backend("set", e))?;
            Ok(())
        })
        .await
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        bounded("del", self.op_timeout, async {
            let mut conn = self.connection().await?;
            let _removed: i64 = redis::cmd("DEL")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(|e| KvError::backend("del", e))?;
            Ok(())
        })
        .await
    }

    async fn ttl(&self, key: &str) -> KvResult<KeyTtl> {
        bounded("ttl", self.op_timeout, async {
            let mut conn = self.connection().await?;
            let reply: i64 = redis::cmd("PTTL")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(|e| KvError::backend("ttl", e))?;
            Ok(ttl_from_pttl(reply))
        })
        .await
    }
}
