//! Recovery (§4.4): before any new operation begins on a shard map, the
//! engine scans the pending-operations log for rows left behind by a
//! process that crashed mid-mutation and undoes each one to completion.
//!
//! Unlike a live operation's own undo path (driven by the still-in-memory
//! `Operation` object), recovery runs in whatever process happens to start
//! the next operation on the map -- possibly a different one than crashed
//! -- so it works purely from the JSON snapshots persisted in the log row.
//! A pending row is only ever observed with `undo_start_state` short of
//! `GlobalPostLocalCommitted`: that phase deletes the row in the same
//! transaction that applies it, so a row that survived a crash never
//! reached it.

use shard_catalog_sql::gsm::mappings::MappingRow;
use shard_catalog_sql::gsm::operations::PendingOperationRow;
use shard_catalog_sql::gsm::shards::ShardRow;
use shard_catalog_sql::id::{MappingId, ShardId, ShardMapId};
use shard_catalog_sql::lsm::local_mappings::{self, LocalMappingRow};
use shard_catalog_sql::types::{Opcode, UndoStartState};

use crate::connection::ShardConnector;
use crate::error::{Error, Result};

/// Scans and undoes every pending operation on `shard_map_id`. Serialized
/// per map (§4.4 Recovery policy): callers run this before starting any
/// new operation, including the engine itself on every `Engine::execute`.
pub async fn recover_pending(
    gsm: &sqlx::PgPool,
    connector: &ShardConnector,
    shard_map_id: ShardMapId,
) -> Result<()> {
    let pending = shard_catalog_sql::gsm::operations::list_for_map(gsm, shard_map_id)
        .await
        .map_err(Error::storage)?;

    for row in pending {
        undo_one(gsm, connector, &row).await?;
    }
    Ok(())
}

async fn lsm_pool(gsm: &sqlx::PgPool, connector: &ShardConnector, shard_id: ShardId) -> Result<sqlx::PgPool> {
    let shard: ShardRow = shard_catalog_sql::gsm::shards::find_by_id(gsm, shard_id)
        .await
        .map_err(Error::storage)?
        .ok_or(Error::ShardDoesNotExist)?;
    connector.connect(&shard).await.map_err(Error::storage)
}

async fn undo_one(gsm: &sqlx::PgPool, connector: &ShardConnector, row: &PendingOperationRow) -> Result<()> {
    tracing::warn!(op_id = %row.id, ?row.opcode, "recovering abandoned operation");

    match row.opcode {
        Opcode::AddShard => {
            // The shard row is only ever written at GlobalPostLocal, which
            // never committed for a surviving log row; the LSM identity
            // stamp left on the would-be shard is harmless to leave.
        }
        Opcode::RemoveShard | Opcode::UpdateShard => {
            // Neither opcode has an LSM phase; the GSM row was never
            // touched since GlobalPostLocal never committed.
        }
        Opcode::AddMapping => {
            if committed_past_local_source(row.undo_start_state) {
                let after: AddMappingAfter =
                    serde_json::from_value(row.after_state.clone()).map_err(Error::recovery_decode)?;
                let pool = lsm_pool(gsm, connector, after.shard_id).await?;
                let mut txn = pool.begin().await.map_err(Error::storage)?;
                local_mappings::delete(&mut txn, after.mapping_id)
                    .await
                    .map_err(Error::storage)?;
                txn.commit().await.map_err(Error::storage)?;
            }
        }
        Opcode::RemoveMapping => {
            if committed_past_local_source(row.undo_start_state) {
                let before: MappingRow =
                    serde_json::from_value(row.before_state.clone()).map_err(Error::recovery_decode)?;
                let pool = lsm_pool(gsm, connector, before.shard_id).await?;
                let mut txn = pool.begin().await.map_err(Error::storage)?;
                restore_local_row(&mut txn, &before).await?;
                txn.commit().await.map_err(Error::storage)?;
            }
        }
        Opcode::UpdateMapping => {
            let before: MappingRow =
                serde_json::from_value(row.before_state.clone()).map_err(Error::recovery_decode)?;

            if let Ok(shard_change) =
                serde_json::from_value::<UpdateMappingShardAfter>(row.after_state.clone())
            {
                if row.undo_start_state == UndoStartState::LocalTargetCommitted {
                    let pool = lsm_pool(gsm, connector, shard_change.new_shard_id).await?;
                    let mut txn = pool.begin().await.map_err(Error::storage)?;
                    local_mappings::delete(&mut txn, before.id).await.map_err(Error::storage)?;
                    txn.commit().await.map_err(Error::storage)?;
                }
                if committed_past_local_source(row.undo_start_state) {
                    let pool = lsm_pool(gsm, connector, before.shard_id).await?;
                    let mut txn = pool.begin().await.map_err(Error::storage)?;
                    restore_local_row(&mut txn, &before).await?;
                    txn.commit().await.map_err(Error::storage)?;
                }
            } else if committed_past_local_source(row.undo_start_state) {
                let pool = lsm_pool(gsm, connector, before.shard_id).await?;
                let mut txn = pool.begin().await.map_err(Error::storage)?;
                restore_local_row(&mut txn, &before).await?;
                txn.commit().await.map_err(Error::storage)?;
            }
        }
        Opcode::ReplaceMapping => {
            if committed_past_local_source(row.undo_start_state) {
                let removed: Vec<MappingRow> =
                    serde_json::from_value(row.before_state.clone()).map_err(Error::recovery_decode)?;
                let after: ReplaceMappingAfter =
                    serde_json::from_value(row.after_state.clone()).map_err(Error::recovery_decode)?;
                let pool = lsm_pool(gsm, connector, after.shard_id).await?;
                let mut txn = pool.begin().await.map_err(Error::storage)?;
                for id in after.new_ids {
                    local_mappings::delete(&mut txn, id).await.map_err(Error::storage)?;
                }
                for mapping in &removed {
                    restore_local_row(&mut txn, mapping).await?;
                }
                txn.commit().await.map_err(Error::storage)?;
            }
        }
    }

    let mut txn = gsm.begin().await.map_err(Error::storage)?;
    shard_catalog_sql::gsm::operations::delete(&mut txn, row.id)
        .await
        .map_err(Error::storage)?;
    txn.commit().await.map_err(Error::storage)?;
    tracing::info!(op_id = %row.id, "recovered operation, pending log row cleared");
    Ok(())
}

fn committed_past_local_source(state: UndoStartState) -> bool {
    !matches!(state, UndoStartState::NoPhaseCommitted)
}

async fn restore_local_row(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    mapping: &MappingRow,
) -> Result<()> {
    local_mappings::upsert(
        txn,
        &LocalMappingRow {
            id: mapping.id,
            shard_map_id: mapping.shard_map_id,
            low: mapping.low.clone(),
            high: mapping.high.clone(),
            status: mapping.status,
            lock_owner: mapping.lock_owner,
            version: mapping.version,
        },
    )
    .await
    .map_err(Error::storage)
}

#[derive(serde::Deserialize)]
struct AddMappingAfter {
    mapping_id: MappingId,
    shard_id: ShardId,
}

#[derive(serde::Deserialize)]
struct UpdateMappingShardAfter {
    #[allow(dead_code)]
    mapping_id: MappingId,
    new_shard_id: ShardId,
}

#[derive(serde::Deserialize)]
struct ReplaceMappingAfter {
    shard_id: ShardId,
    new_ids: Vec<MappingId>,
}
