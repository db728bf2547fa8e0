use super::LockStore;
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// [`LockStore`] over a single Redis endpoint.
///
/// Uses `SET NX PX`, `PEXPIRE` and `DEL`. One multiplexed connection is opened
/// per database index on first use and shared by every handle afterwards.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    connections: Arc<DashMap<u32, MultiplexedConnection>>,
}

impl RedisStore {
    /// Parses `url` without connecting; connections open lazily.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            connections: Arc::new(DashMap::new()),
        })
    }

    async fn connection(&self, database: u32) -> Result<MultiplexedConnection, StoreError> {
        if let Some(conn) = self.connections.get(&database) {
            return Ok(conn.clone());
        }

        let mut info = self.client.get_connection_info().clone();
        info.redis.db = database as i64;
        let conn = redis::Client::open(info)?
            .get_multiplexed_async_connection()
            .await?;

        debug!(database, "Opened redis connection");
        self.connections.insert(database, conn.clone());
        Ok(conn)
    }
}

// Redis rejects a zero PX/PEXPIRE argument, and any expiry that overflows a
// signed 64-bit millisecond timestamp once added to the server clock.
const MAX_TTL_MS: u64 = (i64::MAX / 2) as u64;

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(MAX_TTL_MS)
        .clamp(1, MAX_TTL_MS)
}

#[async_trait]
impl LockStore for RedisStore {
    async fn set_if_absent(
        &self,
        database: u32,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection(database).await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn refresh_ttl(
        &self,
        database: u32,
        key: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection(database).await?;
        let updated: bool = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(updated)
    }

    async fn delete(&self, database: u32, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection(database).await?;
        let removed: u64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }
}
