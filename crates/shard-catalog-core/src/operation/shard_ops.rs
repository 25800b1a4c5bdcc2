use std::cell::Cell;

use async_trait::async_trait;
use shard_catalog_sql::gsm::shards;
use shard_catalog_sql::id::{ShardId, ShardMapId};
use shard_catalog_sql::lsm::shard_identity;
use shard_catalog_sql::types::{Opcode, ShardStatus};

use super::{Operation, Txn};
use crate::error::{Error, Result};

/// `CreateShard(location)` (§4.6): registers a new shard endpoint and
/// stamps its identity into the shard's own LSM so the shard recognizes
/// which map it belongs to (§4.3).
pub struct AddShard {
    pub shard_map_id: ShardMapId,
    pub protocol: Option<String>,
    pub host: String,
    pub database: String,
    pub port: Option<i32>,
    generated_id: Cell<Option<ShardId>>,
}

impl AddShard {
    pub fn new(
        shard_map_id: ShardMapId,
        protocol: Option<String>,
        host: String,
        database: String,
        port: Option<i32>,
    ) -> Self {
        AddShard {
            shard_map_id,
            protocol,
            host,
            database,
            port,
            generated_id: Cell::new(None),
        }
    }

    fn id(&self) -> ShardId {
        self.generated_id.get().expect("global_pre_local must run first")
    }
}

#[async_trait]
impl Operation for AddShard {
    fn opcode(&self) -> Opcode {
        Opcode::AddShard
    }
    fn shard_map_id(&self) -> ShardMapId {
        self.shard_map_id
    }
    fn source_shard(&self) -> Option<ShardId> {
        self.generated_id.get()
    }

    async fn global_pre_local(
        &mut self,
        gsm: &mut Txn<'_>,
    ) -> Result<(serde_json::Value, serde_json::Value)> {
        if self.host.trim().is_empty() || self.database.trim().is_empty() {
            return Err(Error::ShardLocationNullOrEmpty);
        }
        if self.port.is_some_and(|p| !(0..=65535).contains(&p)) {
            return Err(Error::ShardLocationInvalidPort);
        }
        let existing = shards::find_by_location(&mut **gsm, self.shard_map_id, &self.host, &self.database)
            .await
            .map_err(Error::storage)?;
        if existing.is_some() {
            return Err(Error::ShardAlreadyExists);
        }
        let id = ShardId::generate();
        self.generated_id.set(Some(id));
        Ok((serde_json::Value::Null, serde_json::json!({ "shard_id": id })))
    }

    async fn local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        shard_identity::init(lsm, self.id(), self.shard_map_id)
            .await
            .map_err(Error::storage)
    }

    async fn global_post_local(&self, gsm: &mut Txn<'_>) -> Result<()> {
        shards::create_with_id(
            gsm,
            self.id(),
            self.shard_map_id,
            self.protocol.as_deref(),
            &self.host,
            &self.database,
            self.port,
        )
        .await
        .map_err(Error::storage)?;
        Ok(())
    }

    async fn undo_local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        // Nothing is locally observable yet: the shard's identity row is
        // harmless to leave behind (it is only ever read in the context of
        // this shard map, which will simply never reference the shard).
        let _ = lsm;
        Ok(())
    }
}

/// `UpdateShard(shard, update)` (§4.6): flips a shard's `Online`/`Offline`
/// status. Location is immutable once created, so this opcode never needs
/// an LSM phase.
pub struct UpdateShardStatus {
    pub shard_id: ShardId,
    pub shard_map_id: ShardMapId,
    pub expected_version: i64,
    pub new_status: ShardStatus,
    old_status: Cell<Option<ShardStatus>>,
}

impl UpdateShardStatus {
    pub fn new(
        shard_id: ShardId,
        shard_map_id: ShardMapId,
        expected_version: i64,
        new_status: ShardStatus,
    ) -> Self {
        UpdateShardStatus {
            shard_id,
            shard_map_id,
            expected_version,
            new_status,
            old_status: Cell::new(None),
        }
    }
}

#[async_trait]
impl Operation for UpdateShardStatus {
    fn opcode(&self) -> Opcode {
        Opcode::UpdateShard
    }
    fn shard_map_id(&self) -> ShardMapId {
        self.shard_map_id
    }
    fn source_shard(&self) -> Option<ShardId> {
        None
    }

    async fn global_pre_local(
        &mut self,
        gsm: &mut Txn<'_>,
    ) -> Result<(serde_json::Value, serde_json::Value)> {
        let row = shards::find_by_id(&mut **gsm, self.shard_id)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::ShardDoesNotExist)?;
        if row.version != self.expected_version {
            return Err(Error::ShardDoesNotExist);
        }
        self.old_status.set(Some(row.status));
        Ok((
            serde_json::to_value(&row).unwrap_or(serde_json::Value::Null),
            serde_json::json!({ "shard_id": self.shard_id, "new_status": self.new_status }),
        ))
    }

    async fn global_post_local(&self, gsm: &mut Txn<'_>) -> Result<()> {
        shards::update_status(gsm, self.shard_id, self.expected_version, self.new_status)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::ShardDoesNotExist)?;
        Ok(())
    }
}

/// `DeleteShard(shard)` (§4.6): removable only while no mapping still
/// references it, enforced by the `NOT EXISTS` guard already inside
/// `shards::delete`.
pub struct RemoveShard {
    pub shard_id: ShardId,
    pub shard_map_id: ShardMapId,
}

impl RemoveShard {
    pub fn new(shard_id: ShardId, shard_map_id: ShardMapId) -> Self {
        RemoveShard { shard_id, shard_map_id }
    }
}

#[async_trait]
impl Operation for RemoveShard {
    fn opcode(&self) -> Opcode {
        Opcode::RemoveShard
    }
    fn shard_map_id(&self) -> ShardMapId {
        self.shard_map_id
    }
    fn source_shard(&self) -> Option<ShardId> {
        None
    }

    async fn global_pre_local(
        &mut self,
        gsm: &mut Txn<'_>,
    ) -> Result<(serde_json::Value, serde_json::Value)> {
        let row = shards::find_by_id(&mut **gsm, self.shard_id)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::ShardDoesNotExist)?;
        Ok((
            serde_json::to_value(&row).unwrap_or(serde_json::Value::Null),
            serde_json::Value::Null,
        ))
    }

    async fn global_post_local(&self, gsm: &mut Txn<'_>) -> Result<()> {
        if !shards::delete(gsm, self.shard_id).await.map_err(Error::storage)? {
            return Err(Error::ShardHasMappings);
        }
        Ok(())
    }
}
