//! Opens pooled connections to shard databases and keeps them memoized by
//! endpoint, the way a connection-pool cache should: one `sqlx::PgPool` per
//! distinct `(host, database, port)`, torn down and rebuilt whenever a
//! mapping pointing at that endpoint is invalidated in the mapping cache.

use dashmap::DashMap;
use shard_catalog_sql::gsm::shards::ShardRow;
use sqlx::postgres::PgConnectOptions;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Whether `OpenConnection`/`OpenConnectionForKey` should validate the
/// target mapping against the LSM after connecting (§4.6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionOptions {
    None,
    Validate,
}

#[derive(Clone, Hash, PartialEq, Eq)]
struct EndpointKey {
    host: String,
    database: String,
    port: Option<i32>,
}

impl From<&ShardRow> for EndpointKey {
    fn from(shard: &ShardRow) -> Self {
        EndpointKey {
            host: shard.host.clone(),
            database: shard.database.clone(),
            port: shard.port,
        }
    }
}

/// A memoized pool of connections per shard endpoint. Connections opened
/// for a specific mapping are tagged with that mapping's kill pattern
/// (§4.8) via `application_name`, so `pg_terminate_backend` can fence them
/// individually when the mapping goes offline.
pub struct ShardConnector {
    pools: DashMap<EndpointKey, sqlx::PgPool>,
}

impl Default for ShardConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardConnector {
    pub fn new() -> Self {
        ShardConnector {
            pools: DashMap::new(),
        }
    }

    /// Returns the memoized pool for a shard's own administrative use (no
    /// `application_name` tag -- used by the operation engine's LSM phases,
    /// which aren't subject to kill-on-offline fencing).
    pub async fn connect(&self, shard: &ShardRow) -> sqlx::Result<sqlx::PgPool> {
        let key = EndpointKey::from(shard);
        if let Some(pool) = self.pools.get(&key) {
            return Ok(pool.clone());
        }
        let pool = self.build_pool(shard, None).await?;
        self.pools.insert(key, pool.clone());
        Ok(pool)
    }

    /// Opens a single tagged connection for `OpenConnectionForKey` (§4.6,
    /// §4.8): not drawn from the shared administrative pool, since it must
    /// carry a mapping-specific `application_name` so it can be targeted
    /// individually by a future kill, the same way `migrate::run` tags its
    /// connection for operational visibility.
    pub async fn connect_tagged(
        &self,
        shard: &ShardRow,
        application_name: &str,
    ) -> sqlx::Result<sqlx::PgPool> {
        self.build_pool(shard, Some(application_name)).await
    }

    async fn build_pool(
        &self,
        shard: &ShardRow,
        application_name: Option<&str>,
    ) -> sqlx::Result<sqlx::PgPool> {
        let mut opts = PgConnectOptions::new()
            .host(&shard.host)
            .database(&shard.database);
        if let Some(port) = shard.port {
            opts = opts.port(port as u16);
        }
        if let Some(name) = application_name {
            opts = opts.application_name(name);
        }
        sqlx::pool::PoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
    }

    /// Drops the memoized pool for a shard, forcing the next `connect` to
    /// rebuild it. Called on cache invalidation of a map (§5) so a stale
    /// pool can't hand out sockets to a no-longer-correct target.
    pub fn invalidate(&self, shard: &ShardRow) {
        self.pools.remove(&EndpointKey::from(shard));
    }
}

/// Parses a connection string into `PgConnectOptions`, the way every
/// binary in this codebase accepts `--database-url`/`DATABASE_URL`.
pub fn parse_connect_options(database_url: &str) -> Result<PgConnectOptions> {
    PgConnectOptions::from_str(database_url).map_err(Error::storage)
}
