use crate::id::{LockOwnerId, MappingId, ShardMapId};
use crate::types::MappingStatus;

/// A row of a shard's `local_mappings` table (§4.3.1): the LSM's mirror of
/// a globally-committed mapping whose target is this shard. Authoritative
/// for connect-time validation *of this shard* -- see §4.3 on why a stale
/// LSM row must still refuse connections even after GSM has moved on.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LocalMappingRow {
    pub id: MappingId,
    pub shard_map_id: ShardMapId,
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
    low: Vec<u8>,
    high: Option<Vec<u8>>,
    status: MappingStatus,
    lock_owner: LockOwnerId,
    version: i64,
}

impl From<Raw> for LocalMappingRow {
    fn from(r: Raw) -> Self {
        LocalMappingRow {
            id: r.id,
            shard_map_id: r.shard_map_id,
            low: r.low,
            high: r.high,
            status: r.status,
            lock_owner: r.lock_owner,
            version: r.version,
        }
    }
}

const COLUMNS: &str = "id, shard_map_id, low, high, status, lock_owner, version";

/// Writes (or overwrites) the local projection of a mapping. Used by the
/// `LocalSource`/`LocalTarget` phases (§4.4) when a mapping is created or
/// moves onto this shard.
pub async fn upsert(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    row: &LocalMappingRow,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        insert into local_mappings (id, shard_map_id, low, high, status, lock_owner, version)
        values ($1, $2, $3, $4, $5, $6, $7)
        on conflict (id) do update set
            shard_map_id = excluded.shard_map_id,
            low = excluded.low,
            high = excluded.high,
            status = excluded.status,
            lock_owner = excluded.lock_owner,
            version = excluded.version
        "#,
    )
    .bind(row.id)
    .bind(row.shard_map_id)
    .bind(&row.low)
    .bind(&row.high)
    .bind(row.status)
    .bind(row.lock_owner)
    .bind(row.version)
    .execute(&mut **txn)
    .await?;
    Ok(())
}

pub async fn find_by_id(
    db: impl sqlx::PgExecutor<'_>,
    id: MappingId,
) -> sqlx::Result<Option<LocalMappingRow>> {
    let row: Option<Raw> = sqlx::query_as(&format!(
        "select {COLUMNS} from local_mappings where id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row.map(Into::into))
}

/// Takes the local projection of a mapping offline, as part of fencing a
/// mapping that is moving off of this shard (§4.3.2) or being marked
/// offline in place. Returns the updated row, or `None` if the mapping is
/// not present in this shard's LSM.
pub async fn mark_offline(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: MappingId,
) -> sqlx::Result<Option<LocalMappingRow>> {
    let row: Option<Raw> = sqlx::query_as(&format!(
        "update local_mappings set status = $2, version = version + 1 \
         where id = $1 returning {COLUMNS}"
    ))
    .bind(id)
    .bind(MappingStatus::Offline)
    .fetch_optional(&mut **txn)
    .await?;
    Ok(row.map(Into::into))
}

pub async fn mark_online(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: MappingId,
) -> sqlx::Result<Option<LocalMappingRow>> {
    let row: Option<Raw> = sqlx::query_as(&format!(
        "update local_mappings set status = $2, version = version + 1 \
         where id = $1 returning {COLUMNS}"
    ))
    .bind(id)
    .bind(MappingStatus::Online)
    .fetch_optional(&mut **txn)
    .await?;
    Ok(row.map(Into::into))
}

pub async fn delete(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: MappingId,
) -> sqlx::Result<()> {
    sqlx::query("delete from local_mappings where id = $1")
        .bind(id)
        .execute(&mut **txn)
        .await?;
    Ok(())
}

/// Terminates backend connections tagged with this mapping's kill pattern
/// (§4.8): `application_name = 'shard-catalog/mapping/<id>'`. Run as part of
/// the `LocalSource` phase that takes a mapping offline, so any connection
/// already open against the stale mapping fails its next statement.
pub async fn kill_connections(
    db: impl sqlx::PgExecutor<'_>,
    mapping_id: MappingId,
) -> sqlx::Result<u64> {
    let pattern = kill_pattern(mapping_id);
    let rows: Vec<(bool,)> = sqlx::query_as(
        r#"
        select pg_terminate_backend(pid)
        from pg_stat_activity
        where application_name = $1 and pid != pg_backend_pid()
        "#,
    )
    .bind(&pattern)
    .fetch_all(db)
    .await?;
    Ok(rows.len() as u64)
}

pub fn kill_pattern(mapping_id: MappingId) -> String {
    format!("shard-catalog/mapping/{mapping_id}")
}
