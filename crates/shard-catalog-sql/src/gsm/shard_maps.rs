use crate::id::ShardMapId;
use crate::types::{KeyTypeColumn, ShardMapKind};
use shard_catalog_codec::KeyType;

/// A row of the global `shard_maps` table (§4.2.1).
#[derive(Clone, Debug)]
pub struct ShardMapRow {
    pub id: ShardMapId,
    pub name: String,
    pub kind: ShardMapKind,
    pub key_type: KeyType,
    pub version: i64,
}

#[derive(sqlx::FromRow)]
struct Raw {
    id: ShardMapId,
    name: String,
    kind: ShardMapKind,
    key_type: KeyTypeColumn,
    version: i64,
}

impl From<Raw> for ShardMapRow {
    fn from(r: Raw) -> Self {
        ShardMapRow {
            id: r.id,
            name: r.name,
            kind: r.kind,
            key_type: r.key_type.0,
            version: r.version,
        }
    }
}

const COLUMNS: &str = "id, name, kind, key_type, version";

/// Inserts a new shard map. Fails with a unique-violation `sqlx::Error` if
/// `name` is already taken (invariant 1).
pub async fn create(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    name: &str,
    kind: ShardMapKind,
    key_type: KeyType,
) -> sqlx::Result<ShardMapRow> {
    let id = ShardMapId::generate();
    let row: Raw = sqlx::query_as(&format!(
        "insert into shard_maps (id, name, kind, key_type, version) \
         values ($1, $2, $3, $4, 1) returning {COLUMNS}"
    ))
    .bind(id)
    .bind(name)
    .bind(kind)
    .bind(KeyTypeColumn(key_type))
    .fetch_one(&mut **txn)
    .await?;
    Ok(row.into())
}

pub async fn find_by_id(
    db: impl sqlx::PgExecutor<'_>,
    id: ShardMapId,
) -> sqlx::Result<Option<ShardMapRow>> {
    let row: Option<Raw> =
        sqlx::query_as(&format!("select {COLUMNS} from shard_maps where id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await?;
    Ok(row.map(Into::into))
}

pub async fn find_by_name(
    db: impl sqlx::PgExecutor<'_>,
    name: &str,
) -> sqlx::Result<Option<ShardMapRow>> {
    let row: Option<Raw> = sqlx::query_as(&format!(
        "select {COLUMNS} from shard_maps where name = $1"
    ))
    .bind(name)
    .fetch_optional(db)
    .await?;
    Ok(row.map(Into::into))
}

pub async fn list(db: impl sqlx::PgExecutor<'_>) -> sqlx::Result<Vec<ShardMapRow>> {
    let rows: Vec<Raw> = sqlx::query_as(&format!(
        "select {COLUMNS} from shard_maps order by name"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Deletes a shard map. The `where not exists` guards make the delete safe
/// even under a race with a concurrent `CreateShard`/`CreateMapping`; the
/// façade is still expected to have already checked emptiness so it can
/// surface `ShardHasMappings`-equivalent errors before ever issuing this
/// query.
pub async fn delete(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: ShardMapId,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        delete from shard_maps
        where id = $1
          and not exists (select 1 from shards where shard_map_id = $1)
          and not exists (select 1 from mappings where shard_map_id = $1)
        "#,
    )
    .bind(id)
    .execute(&mut **txn)
    .await?;
    Ok(result.rows_affected() == 1)
}
