use async_trait::async_trait;
use boxoffice_core::{Backoff, CoordinatorError, LockCoordinator, LockHandle};
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::{debug, info};

const RELEASE_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

/// Ticket locks held as plain Redis keys: `SET key token NX PX lease` to claim,
/// compare-and-delete in Lua to release.
#[derive(Clone)]
pub struct RedisLockCoordinator {
    conn: MultiplexedConnection,
    release_script: redis::Script,
    backoff: Backoff,
}

impl RedisLockCoordinator {
    pub async fn new(connection_string: &str, backoff: Backoff) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis lock coordinator");
        Ok(Self {
            conn,
            release_script: redis::Script::new(RELEASE_SCRIPT),
            backoff,
        })
    }
}

fn unavailable(e: redis::RedisError) -> CoordinatorError {
    CoordinatorError::Unavailable(e.to_string())
}

fn lease_millis(lease: Duration) -> u64 {
    // PX 0 is rejected by Redis
    (lease.as_millis() as u64).max(1)
}

#[async_trait]
impl LockCoordinator for RedisLockCoordinator {
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> Result<bool, CoordinatorError> {
        let mut conn = self.conn.clone();

        // SET NX: only set if key does not exist
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(lease_millis(lease))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(result.is_some())
    }

    async fn release(&self, handle: &LockHandle) -> Result<bool, CoordinatorError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release_script
            .key(handle.key())
            .arg(handle.token())
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        if deleted == 0 {
            debug!(lock_key = %handle.key(), "Lock key held by another token or expired");
        }
        Ok(deleted == 1)
    }

    fn backoff(&self) -> Backoff {
        self.backoff
    }
}
