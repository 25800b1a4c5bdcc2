use shard_catalog_sql::id::{LockOwnerId, MappingId, ShardId, ShardMapId};
use shard_catalog_sql::lsm::{local_mappings, shard_identity};
use shard_catalog_sql::types::MappingStatus;

#[sqlx::test(migrations = "migrations/lsm")]
async fn shard_identity_is_idempotent(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let shard_id = ShardId::generate();
    let shard_map_id = ShardMapId::generate();

    let mut txn = pool.begin().await?;
    shard_identity::init(&mut txn, shard_id, shard_map_id).await?;
    txn.commit().await?;

    let found = shard_identity::get(&pool).await?.unwrap();
    assert_eq!(found.shard_id, shard_id);
    assert_eq!(found.shard_map_id, shard_map_id);

    // Re-attaching the same shard to a different map overwrites in place
    // rather than accumulating rows -- a shard only ever belongs to one map.
    let other_map = ShardMapId::generate();
    let mut txn = pool.begin().await?;
    shard_identity::init(&mut txn, shard_id, other_map).await?;
    txn.commit().await?;

    let found = shard_identity::get(&pool).await?.unwrap();
    assert_eq!(found.shard_map_id, other_map);
    Ok(())
}

#[sqlx::test(migrations = "migrations/lsm")]
async fn local_mapping_roundtrip_and_status_transitions(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let row = local_mappings::LocalMappingRow {
        id: MappingId::generate(),
        shard_map_id: ShardMapId::generate(),
        low: vec![0, 0, 0, 1],
        high: Some(vec![0, 0, 0, 2]),
        status: MappingStatus::Online,
        lock_owner: LockOwnerId::UNLOCKED,
        version: 1,
    };

    let mut txn = pool.begin().await?;
    local_mappings::upsert(&mut txn, &row).await?;
    txn.commit().await?;

    let found = local_mappings::find_by_id(&pool, row.id).await?.unwrap();
    assert_eq!(found, row);

    let mut txn = pool.begin().await?;
    let offline = local_mappings::mark_offline(&mut txn, row.id).await?.unwrap();
    txn.commit().await?;
    assert_eq!(offline.status, MappingStatus::Offline);
    assert_eq!(offline.version, 2, "status transitions bump version");

    let mut txn = pool.begin().await?;
    let online = local_mappings::mark_online(&mut txn, row.id).await?.unwrap();
    txn.commit().await?;
    assert_eq!(online.status, MappingStatus::Online);
    assert_eq!(online.version, 3);

    let mut txn = pool.begin().await?;
    local_mappings::delete(&mut txn, row.id).await?;
    txn.commit().await?;
    assert!(local_mappings::find_by_id(&pool, row.id).await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = "migrations/lsm")]
async fn mark_offline_on_missing_mapping_returns_none(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let mut txn = pool.begin().await?;
    let result = local_mappings::mark_offline(&mut txn, MappingId::generate()).await?;
    txn.commit().await?;
    assert!(result.is_none());
    Ok(())
}

#[sqlx::test(migrations = "migrations/lsm")]
async fn kill_connections_terminates_tagged_sessions_only(pool: sqlx::PgPool) -> sqlx::Result<()> {
    use sqlx::Connection;

    let mapping_id = MappingId::generate();
    let other_mapping_id = MappingId::generate();
    let base_options = pool.connect_options().as_ref().clone();

    // Single raw connections, not pools: a pool would transparently reconnect
    // a dead session on the next acquire, masking the fencing this is meant
    // to prove. A held connection handle has no such escape hatch.
    let mut tagged = sqlx::PgConnection::connect_with(
        &base_options.clone().application_name(&local_mappings::kill_pattern(mapping_id)),
    )
    .await?;
    sqlx::query("select 1").execute(&mut tagged).await?;

    let mut other = sqlx::PgConnection::connect_with(
        &base_options.application_name(&local_mappings::kill_pattern(other_mapping_id)),
    )
    .await?;
    sqlx::query("select 1").execute(&mut other).await?;

    let killed = local_mappings::kill_connections(&pool, mapping_id).await?;
    assert_eq!(killed, 1, "only the tagged session for this mapping is terminated");

    // The killed session's next statement must fail; the untagged one is untouched.
    let after_kill = sqlx::query("select 1").execute(&mut tagged).await;
    assert!(after_kill.is_err(), "terminated backend must reject further statements");
    sqlx::query("select 1").execute(&mut other).await?;

    other.close().await?;
    Ok(())
}
