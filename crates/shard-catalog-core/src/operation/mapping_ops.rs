use std::cell::Cell;

use async_trait::async_trait;
use shard_catalog_sql::gsm::{mappings, shard_maps};
use shard_catalog_sql::id::{LockOwnerId, MappingId, ShardId, ShardMapId};
use shard_catalog_sql::lsm::local_mappings::{self, LocalMappingRow};
use shard_catalog_sql::types::{MappingStatus, Opcode, ShardMapKind};

use super::{Operation, Txn};
use crate::error::{Error, Result};

/// `CreatePointMapping`/`CreateRangeMapping` (§4.6): `high = None` for a
/// list map's point mapping, `Some(..)` (or `None` for +infinity) for a
/// range map's interval.
pub struct AddMapping {
    pub shard_map_id: ShardMapId,
    pub shard_id: ShardId,
    pub low: Vec<u8>,
    pub high: Option<Vec<u8>>,
    generated_id: Cell<Option<MappingId>>,
}

impl AddMapping {
    pub fn new(shard_map_id: ShardMapId, shard_id: ShardId, low: Vec<u8>, high: Option<Vec<u8>>) -> Self {
        AddMapping {
            shard_map_id,
            shard_id,
            low,
            high,
            generated_id: Cell::new(None),
        }
    }

    fn id(&self) -> MappingId {
        self.generated_id.get().expect("global_pre_local must run first")
    }
}

#[async_trait]
impl Operation for AddMapping {
    fn opcode(&self) -> Opcode {
        Opcode::AddMapping
    }
    fn shard_map_id(&self) -> ShardMapId {
        self.shard_map_id
    }
    fn source_shard(&self) -> Option<ShardId> {
        Some(self.shard_id)
    }

    async fn global_pre_local(
        &mut self,
        gsm: &mut Txn<'_>,
    ) -> Result<(serde_json::Value, serde_json::Value)> {
        let map = shard_maps::find_by_id(&mut **gsm, self.shard_map_id)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::ShardMapDoesNotExist {
                name: self.shard_map_id.to_string(),
            })?;

        match map.kind {
            ShardMapKind::List => {
                if mappings::point_exists(&mut **gsm, self.shard_map_id, &self.low, None)
                    .await
                    .map_err(Error::storage)?
                {
                    return Err(Error::MappingPointAlreadyMapped);
                }
            }
            ShardMapKind::Range => {
                if mappings::range_overlaps(
                    &mut **gsm,
                    self.shard_map_id,
                    &self.low,
                    self.high.as_deref(),
                    None,
                )
                .await
                .map_err(Error::storage)?
                {
                    return Err(Error::MappingRangeAlreadyMapped);
                }
            }
        }

        let id = MappingId::generate();
        self.generated_id.set(Some(id));
        Ok((
            serde_json::Value::Null,
            serde_json::json!({ "mapping_id": id, "shard_id": self.shard_id }),
        ))
    }

    async fn local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        local_mappings::upsert(
            lsm,
            &LocalMappingRow {
                id: self.id(),
                shard_map_id: self.shard_map_id,
                low: self.low.clone(),
                high: self.high.clone(),
                status: MappingStatus::Online,
                lock_owner: LockOwnerId::UNLOCKED,
                version: 1,
            },
        )
        .await
        .map_err(Error::storage)
    }

    async fn global_post_local(&self, gsm: &mut Txn<'_>) -> Result<()> {
        mappings::create_with_id(
            gsm,
            self.id(),
            self.shard_map_id,
            self.shard_id,
            &self.low,
            self.high.as_deref(),
        )
        .await
        .map_err(Error::storage)?;
        Ok(())
    }

    async fn undo_local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        local_mappings::delete(lsm, self.id()).await.map_err(Error::storage)
    }
}

/// `DeleteMapping(m[, token])` (§4.6, §4.9): permitted only from `Offline`;
/// the façade is responsible for the lock-token check before constructing
/// this operation.
pub struct RemoveMapping {
    pub mapping: mappings::MappingRow,
}

impl RemoveMapping {
    pub fn new(mapping: mappings::MappingRow) -> Self {
        RemoveMapping { mapping }
    }
}

#[async_trait]
impl Operation for RemoveMapping {
    fn opcode(&self) -> Opcode {
        Opcode::RemoveMapping
    }
    fn shard_map_id(&self) -> ShardMapId {
        self.mapping.shard_map_id
    }
    fn source_shard(&self) -> Option<ShardId> {
        Some(self.mapping.shard_id)
    }

    async fn global_pre_local(
        &mut self,
        gsm: &mut Txn<'_>,
    ) -> Result<(serde_json::Value, serde_json::Value)> {
        let current = mappings::find_by_id(&mut **gsm, self.mapping.id)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::MappingDoesNotExist)?;
        if current.version != self.mapping.version {
            return Err(Error::MappingDoesNotExist);
        }
        if current.status != MappingStatus::Offline {
            return Err(Error::MappingIsNotOffline);
        }
        self.mapping = current.clone();
        Ok((
            serde_json::to_value(&current).unwrap_or(serde_json::Value::Null),
            serde_json::Value::Null,
        ))
    }

    async fn local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        local_mappings::delete(lsm, self.mapping.id).await.map_err(Error::storage)
    }

    async fn global_post_local(&self, gsm: &mut Txn<'_>) -> Result<()> {
        if !mappings::delete(gsm, self.mapping.id, self.mapping.version)
            .await
            .map_err(Error::storage)?
        {
            return Err(Error::MappingDoesNotExist);
        }
        Ok(())
    }

    async fn undo_local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        local_mappings::upsert(
            lsm,
            &LocalMappingRow {
                id: self.mapping.id,
                shard_map_id: self.mapping.shard_map_id,
                low: self.mapping.low.clone(),
                high: self.mapping.high.clone(),
                status: self.mapping.status,
                lock_owner: self.mapping.lock_owner,
                version: self.mapping.version,
            },
        )
        .await
        .map_err(Error::storage)
    }
}

/// `MarkMappingOffline`/`MarkMappingOnline`/`UpdateMapping(status)` (§4.9):
/// flips a mapping's status. Going offline runs the kill-on-offline fence
/// (§4.8) against its current shard as part of `LocalSource`.
pub struct UpdateMappingStatus {
    pub mapping: mappings::MappingRow,
    pub new_status: MappingStatus,
}

impl UpdateMappingStatus {
    pub fn new(mapping: mappings::MappingRow, new_status: MappingStatus) -> Self {
        UpdateMappingStatus { mapping, new_status }
    }
}

#[async_trait]
impl Operation for UpdateMappingStatus {
    fn opcode(&self) -> Opcode {
        Opcode::UpdateMapping
    }
    fn shard_map_id(&self) -> ShardMapId {
        self.mapping.shard_map_id
    }
    fn source_shard(&self) -> Option<ShardId> {
        Some(self.mapping.shard_id)
    }

    async fn global_pre_local(
        &mut self,
        gsm: &mut Txn<'_>,
    ) -> Result<(serde_json::Value, serde_json::Value)> {
        let current = mappings::find_by_id(&mut **gsm, self.mapping.id)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::MappingDoesNotExist)?;
        if current.version != self.mapping.version {
            return Err(Error::MappingDoesNotExist);
        }
        self.mapping = current.clone();
        Ok((
            serde_json::to_value(&current).unwrap_or(serde_json::Value::Null),
            serde_json::json!({ "mapping_id": current.id, "new_status": self.new_status }),
        ))
    }

    async fn local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        match self.new_status {
            MappingStatus::Offline => {
                local_mappings::mark_offline(lsm, self.mapping.id)
                    .await
                    .map_err(Error::storage)?;
                local_mappings::kill_connections(&mut **lsm, self.mapping.id)
                    .await
                    .map_err(Error::storage)?;
            }
            MappingStatus::Online => {
                local_mappings::mark_online(lsm, self.mapping.id)
                    .await
                    .map_err(Error::storage)?;
            }
        }
        Ok(())
    }

    async fn global_post_local(&self, gsm: &mut Txn<'_>) -> Result<()> {
        mappings::update_status(gsm, self.mapping.id, self.mapping.version, self.new_status)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::MappingDoesNotExist)?;
        Ok(())
    }

    async fn undo_local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        match self.mapping.status {
            MappingStatus::Offline => local_mappings::mark_offline(lsm, self.mapping.id).await,
            MappingStatus::Online => local_mappings::mark_online(lsm, self.mapping.id).await,
        }
        .map(|_| ())
        .map_err(Error::storage)
    }
}

/// `UpdateMapping(m, update)` location change (§4.9): requires the mapping
/// already be `Offline` (checked by the façade before construction); moves
/// the local projection from the old shard to the new one.
pub struct UpdateMappingShard {
    pub mapping: mappings::MappingRow,
    pub new_shard_id: ShardId,
}

impl UpdateMappingShard {
    pub fn new(mapping: mappings::MappingRow, new_shard_id: ShardId) -> Self {
        UpdateMappingShard { mapping, new_shard_id }
    }
}

#[async_trait]
impl Operation for UpdateMappingShard {
    fn opcode(&self) -> Opcode {
        Opcode::UpdateMapping
    }
    fn shard_map_id(&self) -> ShardMapId {
        self.mapping.shard_map_id
    }
    fn source_shard(&self) -> Option<ShardId> {
        Some(self.mapping.shard_id)
    }
    fn target_shard(&self) -> Option<ShardId> {
        Some(self.new_shard_id)
    }

    async fn global_pre_local(
        &mut self,
        gsm: &mut Txn<'_>,
    ) -> Result<(serde_json::Value, serde_json::Value)> {
        let current = mappings::find_by_id(&mut **gsm, self.mapping.id)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::MappingDoesNotExist)?;
        if current.version != self.mapping.version {
            return Err(Error::MappingDoesNotExist);
        }
        if current.status != MappingStatus::Offline {
            return Err(Error::MappingIsNotOffline);
        }
        self.mapping = current.clone();
        Ok((
            serde_json::to_value(&current).unwrap_or(serde_json::Value::Null),
            serde_json::json!({ "mapping_id": current.id, "new_shard_id": self.new_shard_id }),
        ))
    }

    async fn local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        local_mappings::delete(lsm, self.mapping.id).await.map_err(Error::storage)
    }

    async fn local_target(&self, lsm: &mut Txn<'_>) -> Result<()> {
        local_mappings::upsert(
            lsm,
            &LocalMappingRow {
                id: self.mapping.id,
                shard_map_id: self.mapping.shard_map_id,
                low: self.mapping.low.clone(),
                high: self.mapping.high.clone(),
                status: MappingStatus::Offline,
                lock_owner: self.mapping.lock_owner,
                version: self.mapping.version,
            },
        )
        .await
        .map_err(Error::storage)
    }

    async fn global_post_local(&self, gsm: &mut Txn<'_>) -> Result<()> {
        mappings::update_shard(gsm, self.mapping.id, self.mapping.version, self.new_shard_id)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::MappingDoesNotExist)?;
        Ok(())
    }

    async fn undo_local_target(&self, lsm: &mut Txn<'_>) -> Result<()> {
        local_mappings::delete(lsm, self.mapping.id).await.map_err(Error::storage)
    }

    async fn undo_local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        local_mappings::upsert(
            lsm,
            &LocalMappingRow {
                id: self.mapping.id,
                shard_map_id: self.mapping.shard_map_id,
                low: self.mapping.low.clone(),
                high: self.mapping.high.clone(),
                status: self.mapping.status,
                lock_owner: self.mapping.lock_owner,
                version: self.mapping.version,
            },
        )
        .await
        .map_err(Error::storage)
    }
}
