use crate::id::{ShardId, ShardMapId};
use crate::types::ShardStatus;

/// A row of the global `shards` table (§3, §4.2.1). Location (protocol,
/// host, database, port) is immutable after creation; only `status` and
/// `version` ever change.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShardRow {
    pub id: ShardId,
    pub shard_map_id: ShardMapId,
    pub protocol: Option<String>,
    pub host: String,
    pub database: String,
    pub port: Option<i32>,
    pub status: ShardStatus,
    pub version: i64,
}

#[derive(sqlx::FromRow)]
struct Raw {
    id: ShardId,
    shard_map_id: ShardMapId,
    protocol: Option<String>,
    host: String,
    database: String,
    port: Option<i32>,
    status: ShardStatus,
    version: i64,
}

impl From<Raw> for ShardRow {
    fn from(r: Raw) -> Self {
        ShardRow {
            id: r.id,
            shard_map_id: r.shard_map_id,
            protocol: r.protocol,
            host: r.host,
            database: r.database,
            port: r.port,
            status: r.status,
            version: r.version,
        }
    }
}

const COLUMNS: &str =
    "id, shard_map_id, protocol, host, database, port, status, version";

pub async fn create(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    shard_map_id: ShardMapId,
    protocol: Option<&str>,
    host: &str,
    database: &str,
    port: Option<i32>,
) -> sqlx::Result<ShardRow> {
    create_with_id(
        txn,
        ShardId::generate(),
        shard_map_id,
        protocol,
        host,
        database,
        port,
    )
    .await
}

/// Inserts a shard row under a caller-chosen id. Used by the operation
/// engine (§4.4), which generates the id during `GlobalPreLocal` so it can
/// reference the shard in the pending-operation log before the row itself
/// is written during `GlobalPostLocal`.
pub async fn create_with_id(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: ShardId,
    shard_map_id: ShardMapId,
    protocol: Option<&str>,
    host: &str,
    database: &str,
    port: Option<i32>,
) -> sqlx::Result<ShardRow> {
    let row: Raw = sqlx::query_as(&format!(
        "insert into shards (id, shard_map_id, protocol, host, database, port, status, version) \
         values ($1, $2, $3, $4, $5, $6, $7, 1) returning {COLUMNS}"
    ))
    .bind(id)
    .bind(shard_map_id)
    .bind(protocol)
    .bind(host)
    .bind(database)
    .bind(port)
    .bind(ShardStatus::Online)
    .fetch_one(&mut **txn)
    .await?;
    Ok(row.into())
}

pub async fn find_by_id(
    db: impl sqlx::PgExecutor<'_>,
    id: ShardId,
) -> sqlx::Result<Option<ShardRow>> {
    let row: Option<Raw> =
        sqlx::query_as(&format!("select {COLUMNS} from shards where id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await?;
    Ok(row.map(Into::into))
}

pub async fn find_by_location(
    db: impl sqlx::PgExecutor<'_>,
    shard_map_id: ShardMapId,
    host: &str,
    database: &str,
) -> sqlx::Result<Option<ShardRow>> {
    let row: Option<Raw> = sqlx::query_as(&format!(
        "select {COLUMNS} from shards where shard_map_id = $1 and host = $2 and database = $3"
    ))
    .bind(shard_map_id)
    .bind(host)
    .bind(database)
    .fetch_optional(db)
    .await?;
    Ok(row.map(Into::into))
}

pub async fn list_by_map(
    db: impl sqlx::PgExecutor<'_>,
    shard_map_id: ShardMapId,
) -> sqlx::Result<Vec<ShardRow>> {
    let rows: Vec<Raw> = sqlx::query_as(&format!(
        "select {COLUMNS} from shards where shard_map_id = $1 order by host, database"
    ))
    .bind(shard_map_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Updates a shard's status, enforcing version monotonicity (invariant 6):
/// returns `None` if `expected_version` no longer matches, which the engine
/// surfaces as `ShardDoesNotExist`.
pub async fn update_status(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: ShardId,
    expected_version: i64,
    status: ShardStatus,
) -> sqlx::Result<Option<ShardRow>> {
    let row: Option<Raw> = sqlx::query_as(&format!(
        "update shards set status = $3, version = version + 1 \
         where id = $1 and version = $2 returning {COLUMNS}"
    ))
    .bind(id)
    .bind(expected_version)
    .bind(status)
    .fetch_optional(&mut **txn)
    .await?;
    Ok(row.map(Into::into))
}

/// Deletes a shard. Succeeds only when no mapping references it.
pub async fn delete(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: ShardId,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "delete from shards where id = $1 and not exists (select 1 from mappings where shard_id = $1)",
    )
    .bind(id)
    .execute(&mut **txn)
    .await?;
    Ok(result.rows_affected() == 1)
}
