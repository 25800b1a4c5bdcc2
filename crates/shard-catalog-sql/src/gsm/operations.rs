use crate::id::{OperationId, ShardMapId};
use crate::json::TextJson;
use crate::types::{Opcode, UndoStartState};
use chrono::{DateTime, Utc};

/// A row of the `pending_operations` table (§3, §4.2.1): internal
/// bookkeeping for an in-flight multi-phase mutation. Never exposed to
/// façade callers directly.
#[derive(Clone, Debug)]
pub struct PendingOperationRow {
    pub id: OperationId,
    pub shard_map_id: ShardMapId,
    pub opcode: Opcode,
    pub before_state: serde_json::Value,
    pub after_state: serde_json::Value,
    pub undo_start_state: UndoStartState,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct Raw {
    id: OperationId,
    shard_map_id: ShardMapId,
    opcode: Opcode,
    before_state: TextJson<serde_json::Value>,
    after_state: TextJson<serde_json::Value>,
    undo_start_state: UndoStartState,
    created_at: DateTime<Utc>,
}

impl From<Raw> for PendingOperationRow {
    fn from(r: Raw) -> Self {
        PendingOperationRow {
            id: r.id,
            shard_map_id: r.shard_map_id,
            opcode: r.opcode,
            before_state: r.before_state.0,
            after_state: r.after_state.0,
            undo_start_state: r.undo_start_state,
            created_at: r.created_at,
        }
    }
}

const COLUMNS: &str =
    "id, shard_map_id, opcode, before_state, after_state, undo_start_state, created_at";

/// Inserts the log row for a new operation. This is the first write of the
/// `GlobalPreLocal` phase (§4.4): once it commits, the operation is
/// recoverable even if the process crashes before another phase runs.
pub async fn insert(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    shard_map_id: ShardMapId,
    opcode: Opcode,
    before_state: &serde_json::Value,
    after_state: &serde_json::Value,
) -> sqlx::Result<PendingOperationRow> {
    let id = OperationId::generate();
    let row: Raw = sqlx::query_as(&format!(
        "insert into pending_operations \
         (id, shard_map_id, opcode, before_state, after_state, undo_start_state, created_at) \
         values ($1, $2, $3, $4, $5, $6, now()) returning {COLUMNS}"
    ))
    .bind(id)
    .bind(shard_map_id)
    .bind(opcode)
    .bind(TextJson(before_state.clone()))
    .bind(TextJson(after_state.clone()))
    .bind(UndoStartState::NoPhaseCommitted)
    .fetch_one(&mut **txn)
    .await?;
    Ok(row.into())
}

/// Advances the undo-start-state marker after a Do-phase commits, so
/// recovery knows which phases to skip if this operation is abandoned.
pub async fn advance_undo_start_state(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: OperationId,
    state: UndoStartState,
) -> sqlx::Result<()> {
    sqlx::query("update pending_operations set undo_start_state = $2 where id = $1")
        .bind(id)
        .bind(state)
        .execute(&mut **txn)
        .await?;
    Ok(())
}

/// Erases the log row on full success, or once Undo has fully reversed the
/// operation.
pub async fn delete(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: OperationId,
) -> sqlx::Result<()> {
    sqlx::query("delete from pending_operations where id = $1")
        .bind(id)
        .execute(&mut **txn)
        .await?;
    Ok(())
}

/// Lists every pending operation touching `shard_map_id`, oldest first.
/// Recovery (§4.4) calls this before any new operation begins on the map.
pub async fn list_for_map(
    db: impl sqlx::PgExecutor<'_>,
    shard_map_id: ShardMapId,
) -> sqlx::Result<Vec<PendingOperationRow>> {
    let rows: Vec<Raw> = sqlx::query_as(&format!(
        "select {COLUMNS} from pending_operations where shard_map_id = $1 order by created_at"
    ))
    .bind(shard_map_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}
