use crate::id::{ShardId, ShardMapId};

/// The single identity row written into a shard database when it is first
/// attached to a shard map. Used to fence a shard being attached to the
/// wrong map and to recognize a shard's own identity during validation.
#[derive(Clone, Copy, Debug, sqlx::FromRow)]
pub struct ShardIdentityRow {
    pub shard_id: ShardId,
    pub shard_map_id: ShardMapId,
}

pub async fn init(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    shard_id: ShardId,
    shard_map_id: ShardMapId,
) -> sqlx::Result<()> {
    sqlx::query(
        "insert into shard_identity (shard_id, shard_map_id) values ($1, $2) \
         on conflict (shard_id) do update set shard_map_id = excluded.shard_map_id",
    )
    .bind(shard_id)
    .bind(shard_map_id)
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn get(db: impl sqlx::PgExecutor<'_>) -> sqlx::Result<Option<ShardIdentityRow>> {
    sqlx::query_as("select shard_id, shard_map_id from shard_identity limit 1")
        .fetch_optional(db)
        .await
}
