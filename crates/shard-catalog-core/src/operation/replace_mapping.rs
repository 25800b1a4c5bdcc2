use std::cell::RefCell;

use async_trait::async_trait;
use shard_catalog_sql::gsm::mappings::{self, MappingRow};
use shard_catalog_sql::id::{LockOwnerId, MappingId, ShardId, ShardMapId};
use shard_catalog_sql::lsm::local_mappings::{self, LocalMappingRow};
use shard_catalog_sql::types::{MappingStatus, Opcode};

use super::{Operation, Txn};
use crate::error::{Error, Result};

/// One new mapping to create as part of a `SplitMapping`/`MergeMappings`
/// call (§4.6, §4.9). `lock_owner` is carried over from the mapping(s)
/// being replaced (the state machine preserves the lock token across a
/// split or merge).
#[derive(Clone)]
pub struct NewRange {
    pub low: Vec<u8>,
    pub high: Option<Vec<u8>>,
    pub lock_owner: LockOwnerId,
}

/// `SplitMapping(m, key)` / `MergeMappings(a, b)` (§4.6): both are expressed
/// as "replace these existing mappings with these new ones", all owned by
/// the same shard so the opcode never needs a `LocalTarget` phase (a.shard
/// == b.shard is required by `MergeMappings`, and `SplitMapping` never
/// changes the shard).
pub struct ReplaceMapping {
    pub shard_map_id: ShardMapId,
    pub shard_id: ShardId,
    pub removed: Vec<MappingRow>,
    pub added: Vec<NewRange>,
    generated_ids: RefCell<Vec<MappingId>>,
}

impl ReplaceMapping {
    pub fn new(shard_map_id: ShardMapId, shard_id: ShardId, removed: Vec<MappingRow>, added: Vec<NewRange>) -> Self {
        ReplaceMapping {
            shard_map_id,
            shard_id,
            removed,
            added,
            generated_ids: RefCell::new(Vec::new()),
        }
    }

    fn new_ids(&self) -> Vec<MappingId> {
        self.generated_ids.borrow().clone()
    }
}

#[async_trait]
impl Operation for ReplaceMapping {
    fn opcode(&self) -> Opcode {
        Opcode::ReplaceMapping
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
        let removed_ids: std::collections::HashSet<MappingId> =
            self.removed.iter().map(|m| m.id).collect();

        for removed in &self.removed {
            let current = mappings::find_by_id(&mut **gsm, removed.id)
                .await
                .map_err(Error::storage)?
                .ok_or(Error::MappingDoesNotExist)?;
            if current.version != removed.version || current.shard_id != self.shard_id {
                return Err(Error::MappingDoesNotExist);
            }
        }

        let siblings = mappings::list(&mut **gsm, self.shard_map_id)
            .await
            .map_err(Error::storage)?;
        for new_range in &self.added {
            let overlaps = siblings.iter().any(|s| {
                !removed_ids.contains(&s.id)
                    && ranges_overlap(&s.low, s.high.as_deref(), &new_range.low, new_range.high.as_deref())
            });
            if overlaps {
                return Err(Error::MappingRangeAlreadyMapped);
            }
        }

        let mut ids = Vec::with_capacity(self.added.len());
        for _ in &self.added {
            ids.push(MappingId::generate());
        }
        *self.generated_ids.borrow_mut() = ids.clone();

        Ok((
            serde_json::to_value(&self.removed).unwrap_or(serde_json::Value::Null),
            serde_json::json!({ "shard_id": self.shard_id, "new_ids": ids }),
        ))
    }

    async fn local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        for removed in &self.removed {
            local_mappings::delete(lsm, removed.id).await.map_err(Error::storage)?;
        }
        for (new_range, id) in self.added.iter().zip(self.new_ids()) {
            local_mappings::upsert(
                lsm,
                &LocalMappingRow {
                    id,
                    shard_map_id: self.shard_map_id,
                    low: new_range.low.clone(),
                    high: new_range.high.clone(),
                    status: MappingStatus::Online,
                    lock_owner: new_range.lock_owner,
                    version: 1,
                },
            )
            .await
            .map_err(Error::storage)?;
        }
        Ok(())
    }

    async fn global_post_local(&self, gsm: &mut Txn<'_>) -> Result<()> {
        for removed in &self.removed {
            if !mappings::delete(gsm, removed.id, removed.version)
                .await
                .map_err(Error::storage)?
            {
                return Err(Error::MappingDoesNotExist);
            }
        }
        for (new_range, id) in self.added.iter().zip(self.new_ids()) {
            mappings::create_with_id(
                gsm,
                id,
                self.shard_map_id,
                self.shard_id,
                &new_range.low,
                new_range.high.as_deref(),
            )
            .await
            .map_err(Error::storage)?;
        }
        Ok(())
    }

    async fn undo_local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        for id in self.new_ids() {
            local_mappings::delete(lsm, id).await.map_err(Error::storage)?;
        }
        for removed in &self.removed {
            local_mappings::upsert(
                lsm,
                &LocalMappingRow {
                    id: removed.id,
                    shard_map_id: removed.shard_map_id,
                    low: removed.low.clone(),
                    high: removed.high.clone(),
                    status: removed.status,
                    lock_owner: removed.lock_owner,
                    version: removed.version,
                },
            )
            .await
            .map_err(Error::storage)?;
        }
        Ok(())
    }
}

fn ranges_overlap(a_low: &[u8], a_high: Option<&[u8]>, b_low: &[u8], b_high: Option<&[u8]>) -> bool {
    let a_below_b_high = match b_high {
        Some(h) => a_low < h,
        None => true,
    };
    let b_below_a_high = match a_high {
        Some(h) => b_low < h,
        None => true,
    };
    a_below_b_high && b_below_a_high
}
