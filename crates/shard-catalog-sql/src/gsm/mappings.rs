use crate::id::{LockOwnerId, MappingId, ShardId, ShardMapId};
use crate::types::MappingStatus;

/// A row of the global `mappings` table (§3, §4.2.1). `high = None` means an
/// unbounded (+infinity) upper bound; for list maps `high` is unused and
/// always `None`, with `low` holding the mapped point's encoded value.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MappingRow {
    pub id: MappingId,
    pub shard_map_id: ShardMapId,
    pub shard_id: ShardId,
    pub low: Vec<u8>,
    pub high: Option<Vec<u8>>,
    pub status: MappingStatus,
    pub lock_owner: LockOwnerId,
    pub version: i64,
}

#[derive(sqlx::FromRow)]
struct Raw {
    id: MappingId,
    shard_map_id: ShardMapId,
    shard_id: ShardId,
    low: Vec<u8>,
    high: Option<Vec<u8>>,
    status: MappingStatus,
    lock_owner: LockOwnerId,
    version: i64,
}

impl From<Raw> for MappingRow {
    fn from(r: Raw) -> Self {
        MappingRow {
            id: r.id,
            shard_map_id: r.shard_map_id,
            shard_id: r.shard_id,
            low: r.low,
            high: r.high,
            status: r.status,
            lock_owner: r.lock_owner,
            version: r.version,
        }
    }
}

const COLUMNS: &str = "id, shard_map_id, shard_id, low, high, status, lock_owner, version";

pub async fn create(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    shard_map_id: ShardMapId,
    shard_id: ShardId,
    low: &[u8],
    high: Option<&[u8]>,
) -> sqlx::Result<MappingRow> {
    create_with_id(txn, MappingId::generate(), shard_map_id, shard_id, low, high).await
}

/// Inserts a mapping row under a caller-chosen id (§4.4 GlobalPostLocal,
/// where the id was already generated during GlobalPreLocal).
pub async fn create_with_id(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: MappingId,
    shard_map_id: ShardMapId,
    shard_id: ShardId,
    low: &[u8],
    high: Option<&[u8]>,
) -> sqlx::Result<MappingRow> {
    let row: Raw = sqlx::query_as(&format!(
        "insert into mappings (id, shard_map_id, shard_id, low, high, status, lock_owner, version) \
         values ($1, $2, $3, $4, $5, $6, $7, 1) returning {COLUMNS}"
    ))
    .bind(id)
    .bind(shard_map_id)
    .bind(shard_id)
    .bind(low)
    .bind(high)
    .bind(MappingStatus::Online)
    .bind(LockOwnerId::UNLOCKED)
    .fetch_one(&mut **txn)
    .await?;
    Ok(row.into())
}

pub async fn find_by_id(
    db: impl sqlx::PgExecutor<'_>,
    id: MappingId,
) -> sqlx::Result<Option<MappingRow>> {
    let row: Option<Raw> =
        sqlx::query_as(&format!("select {COLUMNS} from mappings where id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await?;
    Ok(row.map(Into::into))
}

pub async fn list(
    db: impl sqlx::PgExecutor<'_>,
    shard_map_id: ShardMapId,
) -> sqlx::Result<Vec<MappingRow>> {
    let rows: Vec<Raw> = sqlx::query_as(&format!(
        "select {COLUMNS} from mappings where shard_map_id = $1 order by low"
    ))
    .bind(shard_map_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn list_by_shard(
    db: impl sqlx::PgExecutor<'_>,
    shard_id: ShardId,
) -> sqlx::Result<Vec<MappingRow>> {
    let rows: Vec<Raw> = sqlx::query_as(&format!(
        "select {COLUMNS} from mappings where shard_id = $1 order by low"
    ))
    .bind(shard_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Finds the mapping (if any) whose region covers `key`, for either a list
/// map (exact point match) or a range map (half-open interval containment;
/// `high is null` is treated as +infinity).
pub async fn find_covering(
    db: impl sqlx::PgExecutor<'_>,
    shard_map_id: ShardMapId,
    is_range_map: bool,
    key: &[u8],
) -> sqlx::Result<Option<MappingRow>> {
    let row: Option<Raw> = if is_range_map {
        sqlx::query_as(&format!(
            "select {COLUMNS} from mappings \
             where shard_map_id = $1 and low <= $2 and (high is null or high > $2)"
        ))
        .bind(shard_map_id)
        .bind(key)
        .fetch_optional(db)
        .await?
    } else {
        sqlx::query_as(&format!(
            "select {COLUMNS} from mappings where shard_map_id = $1 and low = $2"
        ))
        .bind(shard_map_id)
        .bind(key)
        .fetch_optional(db)
        .await?
    };
    Ok(row.map(Into::into))
}

/// Invariant 3: whether `[low, high)` would overlap an existing range
/// mapping in this map (adjacency permitted), excluding `exclude_id` (used
/// when validating a mapping's own replacement during split/merge).
pub async fn range_overlaps(
    db: impl sqlx::PgExecutor<'_>,
    shard_map_id: ShardMapId,
    low: &[u8],
    high: Option<&[u8]>,
    exclude_id: Option<MappingId>,
) -> sqlx::Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        select count(*) from mappings
        where shard_map_id = $1
          and ($4::uuid is null or id != $4)
          and ($3::bytea is null or low < $3)
          and (high is null or $2 < high)
        "#,
    )
    .bind(shard_map_id)
    .bind(low)
    .bind(high)
    .bind(exclude_id.map(|id| id.as_uuid()))
    .fetch_one(db)
    .await?;
    Ok(count > 0)
}

/// Invariant 3 (list variant): whether `key` is already mapped in this map.
pub async fn point_exists(
    db: impl sqlx::PgExecutor<'_>,
    shard_map_id: ShardMapId,
    key: &[u8],
    exclude_id: Option<MappingId>,
) -> sqlx::Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "select count(*) from mappings where shard_map_id = $1 and low = $2 and ($3::uuid is null or id != $3)",
    )
    .bind(shard_map_id)
    .bind(key)
    .bind(exclude_id.map(|id| id.as_uuid()))
    .fetch_one(db)
    .await?;
    Ok(count > 0)
}

pub async fn update_status(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: MappingId,
    expected_version: i64,
    status: MappingStatus,
) -> sqlx::Result<Option<MappingRow>> {
    let row: Option<Raw> = sqlx::query_as(&format!(
        "update mappings set status = $3, version = version + 1 \
         where id = $1 and version = $2 returning {COLUMNS}"
    ))
    .bind(id)
    .bind(expected_version)
    .bind(status)
    .fetch_optional(&mut **txn)
    .await?;
    Ok(row.map(Into::into))
}

/// Changes a mapping's owning shard. Callers must have already confirmed
/// the mapping is offline (invariant 4); this verb does not re-check it so
/// that the engine's GlobalPostLocal phase, which runs this after the
/// offline transition has already been applied and observed, isn't forced
/// to re-derive status from the row it's about to overwrite.
pub async fn update_shard(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: MappingId,
    expected_version: i64,
    shard_id: ShardId,
) -> sqlx::Result<Option<MappingRow>> {
    let row: Option<Raw> = sqlx::query_as(&format!(
        "update mappings set shard_id = $3, version = version + 1 \
         where id = $1 and version = $2 returning {COLUMNS}"
    ))
    .bind(id)
    .bind(expected_version)
    .bind(shard_id)
    .fetch_optional(&mut **txn)
    .await?;
    Ok(row.map(Into::into))
}

pub async fn update_lock(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: MappingId,
    expected_version: i64,
    lock_owner: LockOwnerId,
) -> sqlx::Result<Option<MappingRow>> {
    let row: Option<Raw> = sqlx::query_as(&format!(
        "update mappings set lock_owner = $3, version = version + 1 \
         where id = $1 and version = $2 returning {COLUMNS}"
    ))
    .bind(id)
    .bind(expected_version)
    .bind(lock_owner)
    .fetch_optional(&mut **txn)
    .await?;
    Ok(row.map(Into::into))
}

/// Clears every mapping of `shard_map_id` locked with `owner` (used by
/// `UnlockMapping(token)`, §4.6).
pub async fn clear_locks_for_owner(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    shard_map_id: ShardMapId,
    owner: LockOwnerId,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "update mappings set lock_owner = $3, version = version + 1 \
         where shard_map_id = $1 and lock_owner = $2",
    )
    .bind(shard_map_id)
    .bind(owner)
    .bind(LockOwnerId::UNLOCKED)
    .execute(&mut **txn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: MappingId,
    expected_version: i64,
) -> sqlx::Result<bool> {
    let result = sqlx::query("delete from mappings where id = $1 and version = $2")
        .bind(id)
        .bind(expected_version)
        .execute(&mut **txn)
        .await?;
    Ok(result.rows_affected() == 1)
}
