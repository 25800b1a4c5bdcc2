use std::sync::Arc;

use shard_catalog_sql::gsm::shard_maps::{self, ShardMapRow};
use shard_catalog_sql::gsm::shards;
use shard_catalog_sql::id::ShardMapId;
use shard_catalog_sql::types::ShardMapKind;
use sqlx::postgres::PgPoolOptions;

use shard_catalog_cache::MappingCache;

use crate::connection::{parse_connect_options, ShardConnector};
use crate::error::{Error, Result};
use crate::key::ShardKey;
use crate::operation::Engine;

use super::map::{ListShardMap, RangeShardMap};

/// `ShardMapManagerCreateMode` (§6): whether `create_sql_shard_map_manager`
/// wipes an existing catalog schema or refuses to touch one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CreateMode {
    ReplaceExisting,
    KeepExisting,
}

/// `ShardMapManagerLoadPolicy` (§6): `Eager` establishes the GSM pool
/// immediately instead of on first use; this catalog has no separate
/// shard-map name index to warm beyond that, so the two policies differ
/// only in when the connection pool is created (see DESIGN.md).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadPolicy {
    Lazy,
    Eager,
}

/// The entry point into the catalog (§4.6, §6): owns the GSM connection
/// pool, the per-endpoint shard connector, the mapping cache, and the
/// operation engine that every mutating façade call is driven through.
pub struct ShardMapManager {
    pub(crate) gsm: sqlx::PgPool,
    pub(crate) connector: Arc<ShardConnector>,
    pub(crate) cache: Arc<MappingCache>,
    pub(crate) engine: Engine,
}

impl ShardMapManager {
    fn assemble(gsm: sqlx::PgPool) -> Arc<Self> {
        let connector = Arc::new(ShardConnector::new());
        Arc::new(ShardMapManager {
            engine: Engine::new(gsm.clone(), connector.clone()),
            gsm,
            connector,
            cache: Arc::new(MappingCache::new()),
        })
    }

    /// `CreateSqlShardMapManager(connStr, mode)` (§6): creates or replaces
    /// the GSM schema, then connects. `ReplaceExisting` truncates the
    /// catalog tables after migrating so a fresh manager starts empty even
    /// against a database that already ran these migrations once.
    pub async fn create_sql_shard_map_manager(database_url: &str, mode: CreateMode) -> Result<Arc<Self>> {
        let opts = parse_connect_options(database_url)?;
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_with(opts)
            .await
            .map_err(Error::storage)?;
        shard_catalog_sql::gsm::migrate(&pool)
            .await
            .map_err(|e| Error::storage(sqlx::Error::Migrate(Box::new(e))))?;
        if mode == CreateMode::ReplaceExisting {
            sqlx::query("truncate shard_maps, shards, mappings, pending_operations")
                .execute(&pool)
                .await
                .map_err(Error::storage)?;
        }
        Ok(Self::assemble(pool))
    }

    /// `GetSqlShardMapManager(connStr, load)` (§6): connects to an existing
    /// catalog schema without migrating it. `Eager` establishes the pool
    /// immediately; `Lazy` defers the first connection attempt to the first
    /// call that needs it.
    pub async fn get_sql_shard_map_manager(database_url: &str, load: LoadPolicy) -> Result<Arc<Self>> {
        let opts = parse_connect_options(database_url)?;
        let mut builder = PgPoolOptions::new().max_connections(10);
        if load == LoadPolicy::Eager {
            builder = builder.min_connections(1);
        }
        let pool = builder.connect_with(opts).await.map_err(Error::storage)?;
        Ok(Self::assemble(pool))
    }

    pub async fn create_list_shard_map<T: ShardKey>(self: &Arc<Self>, name: &str) -> Result<ListShardMap<T>> {
        let mut txn = self.gsm.begin().await.map_err(Error::storage)?;
        let row = shard_maps::create(&mut txn, name, ShardMapKind::List, T::KEY_TYPE)
            .await
            .map_err(|e| map_unique_violation(e, name))?;
        txn.commit().await.map_err(Error::storage)?;
        Ok(ListShardMap::new(self.clone(), row.id))
    }

    pub async fn create_range_shard_map<T: ShardKey>(self: &Arc<Self>, name: &str) -> Result<RangeShardMap<T>> {
        let mut txn = self.gsm.begin().await.map_err(Error::storage)?;
        let row = shard_maps::create(&mut txn, name, ShardMapKind::Range, T::KEY_TYPE)
            .await
            .map_err(|e| map_unique_violation(e, name))?;
        txn.commit().await.map_err(Error::storage)?;
        Ok(RangeShardMap::new(self.clone(), row.id))
    }

    pub async fn get_list_shard_map<T: ShardKey>(self: &Arc<Self>, name: &str) -> Result<ListShardMap<T>> {
        let row = self.lookup_and_check(name, ShardMapKind::List, T::KEY_TYPE).await?;
        Ok(ListShardMap::new(self.clone(), row.id))
    }

    pub async fn get_range_shard_map<T: ShardKey>(self: &Arc<Self>, name: &str) -> Result<RangeShardMap<T>> {
        let row = self.lookup_and_check(name, ShardMapKind::Range, T::KEY_TYPE).await?;
        Ok(RangeShardMap::new(self.clone(), row.id))
    }

    pub async fn try_get_list_shard_map<T: ShardKey>(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<Option<ListShardMap<T>>> {
        match self.get_list_shard_map::<T>(name).await {
            Ok(m) => Ok(Some(m)),
            Err(Error::ShardMapDoesNotExist { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn try_get_range_shard_map<T: ShardKey>(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<Option<RangeShardMap<T>>> {
        match self.get_range_shard_map::<T>(name).await {
            Ok(m) => Ok(Some(m)),
            Err(Error::ShardMapDoesNotExist { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn lookup_and_check(
        &self,
        name: &str,
        kind: ShardMapKind,
        key_type: shard_catalog_codec::KeyType,
    ) -> Result<ShardMapRow> {
        let row = shard_maps::find_by_name(&self.gsm, name)
            .await
            .map_err(Error::storage)?
            .ok_or_else(|| Error::ShardMapDoesNotExist { name: name.to_string() })?;
        if row.kind != kind || row.key_type != key_type {
            return Err(Error::ShardMapTypeConversionError {
                name: name.to_string(),
                expected: key_type,
                actual: row.key_type,
            });
        }
        Ok(row)
    }

    pub async fn lookup_shard_map_by_name(&self, name: &str) -> Result<Option<ShardMapRow>> {
        shard_maps::find_by_name(&self.gsm, name).await.map_err(Error::storage)
    }

    pub async fn get_shard_maps(&self) -> Result<Vec<ShardMapRow>> {
        shard_maps::list(&self.gsm).await.map_err(Error::storage)
    }

    pub async fn delete_shard_map(&self, id: ShardMapId) -> Result<()> {
        // `shard_maps::delete` only succeeds when no shard row references
        // this map, so this list is expected to already be empty; it's kept
        // as a guard against a future precondition relaxation, not a
        // no-op we rely on staying empty.
        let remaining_shards = shards::list_by_map(&self.gsm, id).await.map_err(Error::storage)?;
        let mut txn = self.gsm.begin().await.map_err(Error::storage)?;
        let deleted = shard_maps::delete(&mut txn, id).await.map_err(Error::storage)?;
        txn.commit().await.map_err(Error::storage)?;
        if !deleted {
            return Err(Error::ShardMapHasShardsOrMappings);
        }
        self.cache.invalidate_map(id.as_uuid());
        for shard in &remaining_shards {
            self.connector.invalidate(shard);
        }
        Ok(())
    }
}

fn map_unique_violation(e: sqlx::Error, name: &str) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            Error::ShardMapAlreadyExists { name: name.to_string() }
        }
        _ => Error::storage(e),
    }
}

impl std::fmt::Debug for ShardMapManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardMapManager").finish_non_exhaustive()
    }
}
