use std::marker::PhantomData;
use std::sync::Arc;

use shard_catalog_cache::{CachedMapping, Lookup, ShardEndpoint};
use shard_catalog_codec as codec;
use shard_catalog_sql::gsm::mappings::{self, MappingRow};
use shard_catalog_sql::gsm::shards;
use shard_catalog_sql::id::{LockOwnerId, MappingId, ShardId, ShardMapId};
use shard_catalog_sql::types::{MappingStatus, ShardStatus};

use crate::connection::ConnectionOptions;
use crate::error::{Error, Result};
use crate::key::ShardKey;
use crate::operation::{
    replace_mapping::{NewRange, ReplaceMapping},
    AddMapping, AddShard, DefaultOperationFactory, RemoveMapping, RemoveShard, UpdateMappingShard,
    UpdateMappingStatus, UpdateShardStatus,
};

/// `LookupOptions` (§6): where `GetMappingForKey` is allowed to look.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LookupOptions {
    LookupInCache,
    LookupInStore,
    LookupInCacheAndStore,
}

/// A 128-bit mapping lock token (§4.9). `MappingLockToken::force()` is the
/// well-known sentinel that unlocks any mapping regardless of owner.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MappingLockToken(pub(crate) LockOwnerId);

impl MappingLockToken {
    pub fn generate() -> Self {
        MappingLockToken(LockOwnerId::generate())
    }
    pub fn force() -> Self {
        MappingLockToken(LockOwnerId::FORCE)
    }
    pub fn unlocked() -> Self {
        MappingLockToken(LockOwnerId::UNLOCKED)
    }
}

pub(crate) struct MapHandle<T> {
    pub(crate) manager: Arc<super::ShardMapManager>,
    pub(crate) shard_map_id: ShardMapId,
    is_range_map: bool,
    _key: PhantomData<T>,
}

impl<T: ShardKey> MapHandle<T> {
    fn new(manager: Arc<super::ShardMapManager>, shard_map_id: ShardMapId, is_range_map: bool) -> Self {
        MapHandle {
            manager,
            shard_map_id,
            is_range_map,
            _key: PhantomData,
        }
    }

    pub async fn create_shard(
        &self,
        protocol: Option<String>,
        host: String,
        database: String,
        port: Option<i32>,
    ) -> Result<shards::ShardRow> {
        let after = self
            .manager
            .engine
            .execute(self.shard_map_id, &DefaultOperationFactory, || {
                Box::new(AddShard::new(
                    self.shard_map_id,
                    protocol.clone(),
                    host.clone(),
                    database.clone(),
                    port,
                ))
            })
            .await?;
        let shard_id: ShardId = serde_json::from_value(after["shard_id"].clone()).map_err(Error::recovery_decode)?;
        shards::find_by_id(&self.manager.gsm, shard_id)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::ShardDoesNotExist)
    }

    pub async fn update_shard_status(&self, shard: &shards::ShardRow, new_status: ShardStatus) -> Result<()> {
        self.manager
            .engine
            .execute(self.shard_map_id, &DefaultOperationFactory, || {
                Box::new(UpdateShardStatus::new(shard.id, self.shard_map_id, shard.version, new_status))
            })
            .await?;
        Ok(())
    }

    pub async fn delete_shard(&self, shard: &shards::ShardRow) -> Result<()> {
        self.manager
            .engine
            .execute(self.shard_map_id, &DefaultOperationFactory, || {
                Box::new(RemoveShard::new(shard.id, self.shard_map_id))
            })
            .await?;
        self.manager.connector.invalidate(shard);
        Ok(())
    }

    pub async fn get_shard(&self, host: &str, database: &str) -> Result<shards::ShardRow> {
        shards::find_by_location(&self.manager.gsm, self.shard_map_id, host, database)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::ShardDoesNotExist)
    }

    pub async fn get_shards(&self) -> Result<Vec<shards::ShardRow>> {
        shards::list_by_map(&self.manager.gsm, self.shard_map_id)
            .await
            .map_err(Error::storage)
    }

    pub async fn get_shards_with_status(&self, status: ShardStatus) -> Result<Vec<shards::ShardRow>> {
        Ok(self
            .get_shards()
            .await?
            .into_iter()
            .filter(|s| s.status == status)
            .collect())
    }

    pub async fn create_mapping(&self, low: T, high: Option<T>, shard: &shards::ShardRow) -> Result<MappingRow> {
        let low_bytes = codec::encode(&low.to_key_value());
        let high_bytes = high.map(|h| codec::encode(&h.to_key_value()));
        let shard_map_id = self.shard_map_id;
        let shard_id = shard.id;
        let after = self
            .manager
            .engine
            .execute(shard_map_id, &DefaultOperationFactory, || {
                Box::new(AddMapping::new(shard_map_id, shard_id, low_bytes.clone(), high_bytes.clone()))
            })
            .await?;
        let mapping_id: MappingId =
            serde_json::from_value(after["mapping_id"].clone()).map_err(Error::recovery_decode)?;
        let row = mappings::find_by_id(&self.manager.gsm, mapping_id)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::MappingDoesNotExist)?;
        self.manager.cache.publish(
            shard_map_id.as_uuid(),
            &row.low,
            CachedMapping {
                mapping_id: row.id.as_uuid(),
                version: row.version,
                shard: shard_endpoint(shard),
            },
        );
        Ok(row)
    }

    pub async fn update_mapping_status(
        &self,
        mapping: &MappingRow,
        new_status: MappingStatus,
        token: Option<MappingLockToken>,
    ) -> Result<()> {
        check_lock(mapping, token)?;
        self.manager
            .engine
            .execute(self.shard_map_id, &DefaultOperationFactory, || {
                Box::new(UpdateMappingStatus::new(mapping.clone(), new_status))
            })
            .await?;
        self.manager.cache.invalidate(self.shard_map_id.as_uuid(), &mapping.low);
        self.invalidate_connector_for(mapping.shard_id).await?;
        Ok(())
    }

    pub async fn update_mapping_shard(
        &self,
        mapping: &MappingRow,
        new_shard: &shards::ShardRow,
        token: Option<MappingLockToken>,
    ) -> Result<()> {
        check_lock(mapping, token)?;
        if mapping.status != MappingStatus::Offline {
            return Err(Error::MappingIsNotOffline);
        }
        self.invalidate_connector_for(mapping.shard_id).await?;
        self.manager
            .engine
            .execute(self.shard_map_id, &DefaultOperationFactory, || {
                Box::new(UpdateMappingShard::new(mapping.clone(), new_shard.id))
            })
            .await?;
        self.manager.cache.invalidate(self.shard_map_id.as_uuid(), &mapping.low);
        self.manager.connector.invalidate(new_shard);
        Ok(())
    }

    pub async fn delete_mapping(&self, mapping: &MappingRow, token: Option<MappingLockToken>) -> Result<()> {
        check_lock(mapping, token)?;
        if mapping.status != MappingStatus::Offline {
            return Err(Error::MappingIsNotOffline);
        }
        self.manager
            .engine
            .execute(self.shard_map_id, &DefaultOperationFactory, || {
                Box::new(RemoveMapping::new(mapping.clone()))
            })
            .await?;
        self.manager.cache.invalidate(self.shard_map_id.as_uuid(), &mapping.low);
        self.invalidate_connector_for(mapping.shard_id).await?;
        Ok(())
    }

    /// Drops the memoized connector pool for the shard a mapping currently
    /// points at, alongside the mapping cache invalidation that always
    /// accompanies it (§5). A no-op if the shard row is gone by the time
    /// this runs (e.g. concurrent shard deletion already cleared it).
    async fn invalidate_connector_for(&self, shard_id: ShardId) -> Result<()> {
        if let Some(shard) = shards::find_by_id(&self.manager.gsm, shard_id).await.map_err(Error::storage)? {
            self.manager.connector.invalidate(&shard);
        }
        Ok(())
    }

    pub async fn lock_mapping(&self, mapping: &MappingRow, token: MappingLockToken) -> Result<()> {
        if token.0.is_force() {
            return Err(Error::MappingLockTokenReserved);
        }
        if !mapping.lock_owner.is_unlocked() {
            return Err(Error::MappingIsAlreadyLocked);
        }
        let mut txn = self.manager.gsm.begin().await.map_err(Error::storage)?;
        mappings::update_lock(&mut txn, mapping.id, mapping.version, token.0)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::MappingDoesNotExist)?;
        txn.commit().await.map_err(Error::storage)
    }

    pub async fn unlock_mapping(&self, mapping: &MappingRow, token: MappingLockToken) -> Result<()> {
        if !token.0.is_force() && mapping.lock_owner != token.0 {
            return Err(Error::MappingLockOwnerIdDoesNotMatch);
        }
        let mut txn = self.manager.gsm.begin().await.map_err(Error::storage)?;
        mappings::update_lock(&mut txn, mapping.id, mapping.version, LockOwnerId::UNLOCKED)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::MappingDoesNotExist)?;
        txn.commit().await.map_err(Error::storage)
    }

    /// `UnlockMapping(token)` (§4.6): clears every mapping in this map
    /// locked with `token`, in one statement.
    pub async fn unlock_all(&self, token: MappingLockToken) -> Result<u64> {
        let mut txn = self.manager.gsm.begin().await.map_err(Error::storage)?;
        let n = mappings::clear_locks_for_owner(&mut txn, self.shard_map_id, token.0)
            .await
            .map_err(Error::storage)?;
        txn.commit().await.map_err(Error::storage)?;
        Ok(n)
    }

    pub async fn get_mapping_lock_owner(&self, mapping: &MappingRow) -> Result<LockOwnerId> {
        let current = mappings::find_by_id(&self.manager.gsm, mapping.id)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::MappingDoesNotExist)?;
        Ok(current.lock_owner)
    }

    pub async fn get_mapping_for_key(&self, key: &T, lookup: LookupOptions) -> Result<MappingRow> {
        let key_bytes = codec::encode(&key.to_key_value());

        if lookup != LookupOptions::LookupInStore {
            if let Lookup::Hit(cached) = self.manager.cache.lookup(self.shard_map_id.as_uuid(), &key_bytes) {
                if let Some(row) = mappings::find_by_id(&self.manager.gsm, MappingId::new(cached.mapping_id))
                    .await
                    .map_err(Error::storage)?
                {
                    return Ok(row);
                }
            } else if lookup == LookupOptions::LookupInCache {
                return Err(Error::MappingNotFoundForKey);
            }
        }

        let row = mappings::find_covering(&self.manager.gsm, self.shard_map_id, self.is_range_map, &key_bytes)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::MappingNotFoundForKey)?;
        let shard = shards::find_by_id(&self.manager.gsm, row.shard_id)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::ShardDoesNotExist)?;
        self.manager.cache.publish(
            self.shard_map_id.as_uuid(),
            &row.low,
            CachedMapping {
                mapping_id: row.id.as_uuid(),
                version: row.version,
                shard: shard_endpoint(&shard),
            },
        );
        Ok(row)
    }

    pub async fn try_get_mapping_for_key(&self, key: &T, lookup: LookupOptions) -> Result<Option<MappingRow>> {
        match self.get_mapping_for_key(key, lookup).await {
            Ok(row) => Ok(Some(row)),
            Err(Error::MappingNotFoundForKey) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_mappings(&self) -> Result<Vec<MappingRow>> {
        mappings::list(&self.manager.gsm, self.shard_map_id).await.map_err(Error::storage)
    }

    pub async fn get_mappings_for_shard(&self, shard: &shards::ShardRow) -> Result<Vec<MappingRow>> {
        mappings::list_by_shard(&self.manager.gsm, shard.id).await.map_err(Error::storage)
    }

    pub async fn split_mapping(
        &self,
        mapping: &MappingRow,
        split_key: &T,
        token: Option<MappingLockToken>,
    ) -> Result<(MappingRow, MappingRow)> {
        check_lock(mapping, token)?;
        if mapping.status != MappingStatus::Online {
            return Err(Error::MappingIsOffline);
        }
        let split_bytes = codec::encode(&split_key.to_key_value());
        if split_bytes <= mapping.low {
            return Err(Error::MappingSplitPointOutOfRange);
        }
        if let Some(high) = &mapping.high {
            if &split_bytes >= high {
                return Err(Error::MappingSplitPointOutOfRange);
            }
        }

        let left = NewRange {
            low: mapping.low.clone(),
            high: Some(split_bytes.clone()),
            lock_owner: mapping.lock_owner,
        };
        let right = NewRange {
            low: split_bytes,
            high: mapping.high.clone(),
            lock_owner: mapping.lock_owner,
        };
        let shard_map_id = self.shard_map_id;
        let shard_id = mapping.shard_id;
        let removed = vec![mapping.clone()];
        let after = self
            .manager
            .engine
            .execute(shard_map_id, &DefaultOperationFactory, || {
                Box::new(ReplaceMapping::new(
                    shard_map_id,
                    shard_id,
                    removed.clone(),
                    vec![left.clone(), right.clone()],
                ))
            })
            .await?;
        self.manager.cache.invalidate(shard_map_id.as_uuid(), &mapping.low);
        self.invalidate_connector_for(shard_id).await?;
        self.fetch_replaced_pair(&after).await
    }

    pub async fn merge_mappings(
        &self,
        left: &MappingRow,
        right: &MappingRow,
        tokens: Option<(MappingLockToken, MappingLockToken)>,
    ) -> Result<MappingRow> {
        if left.shard_id != right.shard_id {
            return Err(Error::MappingsAreNotMergeable);
        }
        if left.high.as_deref() != Some(&right.low) {
            return Err(Error::MappingsAreNotMergeable);
        }
        if left.status != MappingStatus::Online || right.status != MappingStatus::Online {
            return Err(Error::MappingIsOffline);
        }
        if let Some((lt, rt)) = tokens {
            check_lock(left, Some(lt))?;
            check_lock(right, Some(rt))?;
        } else {
            check_lock(left, None)?;
            check_lock(right, None)?;
        }

        let merged = NewRange {
            low: left.low.clone(),
            high: right.high.clone(),
            lock_owner: left.lock_owner,
        };
        let shard_map_id = self.shard_map_id;
        let shard_id = left.shard_id;
        let removed = vec![left.clone(), right.clone()];
        let after = self
            .manager
            .engine
            .execute(shard_map_id, &DefaultOperationFactory, || {
                Box::new(ReplaceMapping::new(shard_map_id, shard_id, removed.clone(), vec![merged.clone()]))
            })
            .await?;
        self.manager.cache.invalidate(shard_map_id.as_uuid(), &left.low);
        self.manager.cache.invalidate(shard_map_id.as_uuid(), &right.low);
        self.invalidate_connector_for(shard_id).await?;
        let new_ids: Vec<MappingId> = serde_json::from_value(after["new_ids"].clone()).map_err(Error::recovery_decode)?;
        mappings::find_by_id(&self.manager.gsm, new_ids[0])
            .await
            .map_err(Error::storage)?
            .ok_or(Error::MappingDoesNotExist)
    }

    async fn fetch_replaced_pair(&self, after: &serde_json::Value) -> Result<(MappingRow, MappingRow)> {
        let new_ids: Vec<MappingId> = serde_json::from_value(after["new_ids"].clone()).map_err(Error::recovery_decode)?;
        let left = mappings::find_by_id(&self.manager.gsm, new_ids[0])
            .await
            .map_err(Error::storage)?
            .ok_or(Error::MappingDoesNotExist)?;
        let right = mappings::find_by_id(&self.manager.gsm, new_ids[1])
            .await
            .map_err(Error::storage)?
            .ok_or(Error::MappingDoesNotExist)?;
        Ok((left, right))
    }

    pub async fn open_connection(
        &self,
        mapping: &MappingRow,
        database_url_override: Option<&str>,
        options: ConnectionOptions,
    ) -> Result<sqlx::PgPool> {
        let shard = shards::find_by_id(&self.manager.gsm, mapping.shard_id)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::ShardDoesNotExist)?;
        let _ = database_url_override; // the shard's own location always wins; kept for API parity
        let pool = self
            .manager
            .connector
            .connect_tagged(&shard, &shard_catalog_sql::lsm::local_mappings::kill_pattern(mapping.id))
            .await
            .map_err(Error::storage)?;

        if options == ConnectionOptions::Validate {
            let local = shard_catalog_sql::lsm::local_mappings::find_by_id(&pool, mapping.id)
                .await
                .map_err(Error::storage)?;
            match local {
                Some(row) if row.version == mapping.version && row.status == MappingStatus::Online => {}
                Some(_) => return Err(Error::MappingDoesNotExist),
                None => return Err(Error::ShardDoesNotExist),
            }
        }
        Ok(pool)
    }

    pub async fn open_connection_async(
        &self,
        mapping: &MappingRow,
        options: ConnectionOptions,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<sqlx::PgPool> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::ConnectionCancelled),
            result = self.open_connection(mapping, None, options) => result,
        }
    }

    pub async fn open_connection_for_key(
        &self,
        key: &T,
        options: ConnectionOptions,
    ) -> Result<sqlx::PgPool> {
        let mapping = self.get_mapping_for_key(key, LookupOptions::LookupInCacheAndStore).await?;
        let key_bytes = codec::encode(&key.to_key_value());
        match self.open_connection(&mapping, None, options).await {
            Ok(pool) => {
                self.manager.cache.record_success(self.shard_map_id.as_uuid(), &key_bytes);
                Ok(pool)
            }
            Err(err @ Error::StorageOperationFailure { .. }) => {
                self.manager.cache.record_transient_failure(self.shard_map_id.as_uuid(), &key_bytes);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn open_connection_for_key_async(
        &self,
        key: &T,
        options: ConnectionOptions,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<sqlx::PgPool> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::ConnectionCancelled),
            result = self.open_connection_for_key(key, options) => result,
        }
    }
}

fn check_lock(mapping: &MappingRow, token: Option<MappingLockToken>) -> Result<()> {
    if mapping.lock_owner.is_unlocked() {
        return Ok(());
    }
    match token {
        Some(t) if t.0.is_force() || t.0 == mapping.lock_owner => Ok(()),
        _ => Err(Error::MappingLockOwnerIdDoesNotMatch),
    }
}

fn shard_endpoint(shard: &shards::ShardRow) -> ShardEndpoint {
    ShardEndpoint {
        protocol: shard.protocol.clone(),
        host: shard.host.clone(),
        database: shard.database.clone(),
        port: shard.port,
    }
}

/// A shard map whose keys are discrete points (§2): `CreatePointMapping`
/// maps exactly one key value to a shard.
pub struct ListShardMap<T> {
    handle: MapHandle<T>,
}

impl<T: ShardKey> ListShardMap<T> {
    pub(crate) fn new(manager: Arc<super::ShardMapManager>, shard_map_id: ShardMapId) -> Self {
        ListShardMap {
            handle: MapHandle::new(manager, shard_map_id, false),
        }
    }

    pub fn id(&self) -> ShardMapId {
        self.handle.shard_map_id
    }

    pub async fn create_shard(
        &self,
        protocol: Option<String>,
        host: String,
        database: String,
        port: Option<i32>,
    ) -> Result<shards::ShardRow> {
        self.handle.create_shard(protocol, host, database, port).await
    }

    pub async fn update_shard_status(&self, shard: &shards::ShardRow, new_status: ShardStatus) -> Result<()> {
        self.handle.update_shard_status(shard, new_status).await
    }

    pub async fn delete_shard(&self, shard: &shards::ShardRow) -> Result<()> {
        self.handle.delete_shard(shard).await
    }

    pub async fn get_shard(&self, host: &str, database: &str) -> Result<shards::ShardRow> {
        self.handle.get_shard(host, database).await
    }

    pub async fn get_shards(&self) -> Result<Vec<shards::ShardRow>> {
        self.handle.get_shards().await
    }

    pub async fn get_shards_with_status(&self, status: ShardStatus) -> Result<Vec<shards::ShardRow>> {
        self.handle.get_shards_with_status(status).await
    }

    /// `CreatePointMapping(value, shard)`.
    pub async fn create_point_mapping(&self, value: T, shard: &shards::ShardRow) -> Result<MappingRow> {
        self.handle.create_mapping(value, None, shard).await
    }

    pub async fn update_mapping_status(
        &self,
        mapping: &MappingRow,
        new_status: MappingStatus,
        token: Option<MappingLockToken>,
    ) -> Result<()> {
        self.handle.update_mapping_status(mapping, new_status, token).await
    }

    pub async fn update_mapping_shard(
        &self,
        mapping: &MappingRow,
        new_shard: &shards::ShardRow,
        token: Option<MappingLockToken>,
    ) -> Result<()> {
        self.handle.update_mapping_shard(mapping, new_shard, token).await
    }

    pub async fn delete_mapping(&self, mapping: &MappingRow, token: Option<MappingLockToken>) -> Result<()> {
        self.handle.delete_mapping(mapping, token).await
    }

    pub async fn lock_mapping(&self, mapping: &MappingRow, token: MappingLockToken) -> Result<()> {
        self.handle.lock_mapping(mapping, token).await
    }

    pub async fn unlock_mapping(&self, mapping: &MappingRow, token: MappingLockToken) -> Result<()> {
        self.handle.unlock_mapping(mapping, token).await
    }

    pub async fn unlock_all(&self, token: MappingLockToken) -> Result<u64> {
        self.handle.unlock_all(token).await
    }

    pub async fn get_mapping_lock_owner(&self, mapping: &MappingRow) -> Result<LockOwnerId> {
        self.handle.get_mapping_lock_owner(mapping).await
    }

    pub async fn get_mapping_for_key(&self, key: &T, lookup: LookupOptions) -> Result<MappingRow> {
        self.handle.get_mapping_for_key(key, lookup).await
    }

    pub async fn try_get_mapping_for_key(&self, key: &T, lookup: LookupOptions) -> Result<Option<MappingRow>> {
        self.handle.try_get_mapping_for_key(key, lookup).await
    }

    pub async fn get_mappings(&self) -> Result<Vec<MappingRow>> {
        self.handle.get_mappings().await
    }

    pub async fn open_connection(
        &self,
        mapping: &MappingRow,
        options: ConnectionOptions,
    ) -> Result<sqlx::PgPool> {
        self.handle.open_connection(mapping, None, options).await
    }

    pub async fn open_connection_for_key(&self, key: &T, options: ConnectionOptions) -> Result<sqlx::PgPool> {
        self.handle.open_connection_for_key(key, options).await
    }

    pub async fn open_connection_for_key_async(
        &self,
        key: &T,
        options: ConnectionOptions,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<sqlx::PgPool> {
        self.handle.open_connection_for_key_async(key, options, cancel).await
    }
}

/// A shard map whose keys partition an ordered space into half-open
/// intervals (§2), supporting `SplitMapping`/`MergeMappings` (§4.9).
pub struct RangeShardMap<T> {
    handle: MapHandle<T>,
}

impl<T: ShardKey> RangeShardMap<T> {
    pub(crate) fn new(manager: Arc<super::ShardMapManager>, shard_map_id: ShardMapId) -> Self {
        RangeShardMap {
            handle: MapHandle::new(manager, shard_map_id, true),
        }
    }

    pub fn id(&self) -> ShardMapId {
        self.handle.shard_map_id
    }

    pub async fn create_shard(
        &self,
        protocol: Option<String>,
        host: String,
        database: String,
        port: Option<i32>,
    ) -> Result<shards::ShardRow> {
        self.handle.create_shard(protocol, host, database, port).await
    }

    pub async fn update_shard_status(&self, shard: &shards::ShardRow, new_status: ShardStatus) -> Result<()> {
        self.handle.update_shard_status(shard, new_status).await
    }

    pub async fn delete_shard(&self, shard: &shards::ShardRow) -> Result<()> {
        self.handle.delete_shard(shard).await
    }

    pub async fn get_shard(&self, host: &str, database: &str) -> Result<shards::ShardRow> {
        self.handle.get_shard(host, database).await
    }

    pub async fn get_shards(&self) -> Result<Vec<shards::ShardRow>> {
        self.handle.get_shards().await
    }

    pub async fn get_shards_with_status(&self, status: ShardStatus) -> Result<Vec<shards::ShardRow>> {
        self.handle.get_shards_with_status(status).await
    }

    /// `CreateRangeMapping(range, shard)`; `high = None` means +infinity.
    pub async fn create_range_mapping(&self, low: T, high: Option<T>, shard: &shards::ShardRow) -> Result<MappingRow> {
        self.handle.create_mapping(low, high, shard).await
    }

    pub async fn update_mapping_status(
        &self,
        mapping: &MappingRow,
        new_status: MappingStatus,
        token: Option<MappingLockToken>,
    ) -> Result<()> {
        self.handle.update_mapping_status(mapping, new_status, token).await
    }

    pub async fn update_mapping_shard(
        &self,
        mapping: &MappingRow,
        new_shard: &shards::ShardRow,
        token: Option<MappingLockToken>,
    ) -> Result<()> {
        self.handle.update_mapping_shard(mapping, new_shard, token).await
    }

    pub async fn delete_mapping(&self, mapping: &MappingRow, token: Option<MappingLockToken>) -> Result<()> {
        self.handle.delete_mapping(mapping, token).await
    }

    pub async fn lock_mapping(&self, mapping: &MappingRow, token: MappingLockToken) -> Result<()> {
        self.handle.lock_mapping(mapping, token).await
    }

    pub async fn unlock_mapping(&self, mapping: &MappingRow, token: MappingLockToken) -> Result<()> {
        self.handle.unlock_mapping(mapping, token).await
    }

    pub async fn unlock_all(&self, token: MappingLockToken) -> Result<u64> {
        self.handle.unlock_all(token).await
    }

    pub async fn get_mapping_lock_owner(&self, mapping: &MappingRow) -> Result<LockOwnerId> {
        self.handle.get_mapping_lock_owner(mapping).await
    }

    pub async fn get_mapping_for_key(&self, key: &T, lookup: LookupOptions) -> Result<MappingRow> {
        self.handle.get_mapping_for_key(key, lookup).await
    }

    pub async fn try_get_mapping_for_key(&self, key: &T, lookup: LookupOptions) -> Result<Option<MappingRow>> {
        self.handle.try_get_mapping_for_key(key, lookup).await
    }

    pub async fn get_mappings(&self) -> Result<Vec<MappingRow>> {
        self.handle.get_mappings().await
    }

    pub async fn split_mapping(
        &self,
        mapping: &MappingRow,
        split_key: &T,
        token: Option<MappingLockToken>,
    ) -> Result<(MappingRow, MappingRow)> {
        self.handle.split_mapping(mapping, split_key, token).await
    }

    pub async fn merge_mappings(
        &self,
        left: &MappingRow,
        right: &MappingRow,
        tokens: Option<(MappingLockToken, MappingLockToken)>,
    ) -> Result<MappingRow> {
        self.handle.merge_mappings(left, right, tokens).await
    }

    pub async fn open_connection(
        &self,
        mapping: &MappingRow,
        options: ConnectionOptions,
    ) -> Result<sqlx::PgPool> {
        self.handle.open_connection(mapping, None, options).await
    }

    pub async fn open_connection_for_key(&self, key: &T, options: ConnectionOptions) -> Result<sqlx::PgPool> {
        self.handle.open_connection_for_key(key, options).await
    }

    pub async fn open_connection_for_key_async(
        &self,
        key: &T,
        options: ConnectionOptions,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<sqlx::PgPool> {
        self.handle.open_connection_for_key_async(key, options, cancel).await
    }
}

