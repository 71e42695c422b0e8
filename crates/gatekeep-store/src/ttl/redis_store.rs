//! Redis-backed TTL store.
//!
//! Every command runs under a bounded timeout. A timeout is reported as
//! an error, never as an empty result, so writes fail closed.

use std::time::Duration;

use gatekeep_core::error::GatekeepResult;
use gatekeep_core::repository::TtlStore;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use tracing::{info, warn};

use crate::error::StoreError;

/// Configuration for the Redis connection.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL (e.g., `redis://127.0.0.1:6379/0`).
    pub url: String,
    /// Upper bound for a single command round-trip.
    pub op_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".into(),
            op_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Clone)]
pub struct RedisTtlStore {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisTtlStore {
    /// Open a managed (auto-reconnecting) connection.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        info!(url = %config.url, "Connecting to Redis");

        let client = redis::Client::open(config.url.as_str())?;
        let conn = tokio::time::timeout(config.op_timeout * 10, ConnectionManager::new(client))
            .await
            .map_err(|_elapsed| StoreError::Timeout {
                operation: "connect",
            })??;

        info!("Successfully connected to Redis");

        Ok(Self {
            conn,
            op_timeout: config.op_timeout,
        })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = RedisResult<T>>,
    ) -> GatekeepResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(operation, error = %e, "Redis command failed");
                Err(StoreError::Redis(e).into())
            }
            Err(_elapsed) => {
                warn!(
                    operation,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "Redis command timed out"
                );
                Err(StoreError::Timeout { operation }.into())
            }
        }
    }
}

const DELETE_IF_EQ: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Millisecond TTL for `PX`; Redis rejects zero.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl TtlStore for RedisTtlStore {
    async fn get(&self, key: &str) -> GatekeepResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded("get", async move { conn.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> GatekeepResult<()> {
        let mut conn = self.conn.clone();
        self.bounded("set_ex", async move {
            let _: () = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(ttl_millis(ttl))
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> GatekeepResult<bool> {
        let mut conn = self.conn.clone();
        self.bounded("set_nx_ex", async move {
            // Reply is "OK" when written, nil when the key already exists.
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("PX")
                .arg(ttl_millis(ttl))
                .query_async(&mut conn)
                .await?;
            Ok(reply.is_some())
        })
        .await
    }

    async fn delete(&self, key: &str) -> GatekeepResult<()> {
        let mut conn = self.conn.clone();
        self.bounded("delete", async move {
            let _removed: i64 = conn.del(key).await?;
            Ok(())
        })
        .await
    }

    async fn get_del(&self, key: &str) -> GatekeepResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded("get_del", async move {
            conn.get_del::<_, Option<String>>(key).await
        })
        .await
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> GatekeepResult<bool> {
        let mut conn = self.conn.clone();
        self.bounded("delete_if_eq", async move {
            let removed: i64 = redis::Script::new(DELETE_IF_EQ)
                .key(key)
                .arg(expected)
                .invoke_async(&mut conn)
                .await?;
            Ok(removed == 1)
        })
        .await
    }
}
