use shard_catalog_codec::KeyType;
use shard_catalog_sql::gsm::{mappings, shard_maps, shards};
use shard_catalog_sql::types::ShardMapKind;

#[sqlx::test(migrations = "migrations/gsm")]
async fn create_and_lookup_shard_map(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let mut txn = pool.begin().await?;
    let map = shard_maps::create(&mut txn, "tenants", ShardMapKind::List, KeyType::Int32).await?;
    txn.commit().await?;

    let found = shard_maps::find_by_name(&pool, "tenants").await?.unwrap();
    assert_eq!(found.id, map.id);
    assert_eq!(found.version, 1);

    let dup = {
        let mut txn = pool.begin().await?;
        shard_maps::create(&mut txn, "tenants", ShardMapKind::List, KeyType::Int32).await
    };
    assert!(dup.is_err(), "duplicate name must be rejected");
    Ok(())
}

#[sqlx::test(migrations = "migrations/gsm")]
async fn shard_delete_blocked_while_mapped(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let mut txn = pool.begin().await?;
    let map = shard_maps::create(&mut txn, "tenants", ShardMapKind::List, KeyType::Int32).await?;
    let shard = shards::create(&mut txn, map.id, None, "db1.internal", "tenants", Some(5432)).await?;
    mappings::create(&mut txn, map.id, shard.id, &[1], None).await?;
    txn.commit().await?;

    let mut txn = pool.begin().await?;
    let deleted = shards::delete(&mut txn, shard.id).await?;
    txn.commit().await?;
    assert!(!deleted, "shard referenced by a mapping must not delete");
    Ok(())
}

#[sqlx::test(migrations = "migrations/gsm")]
async fn range_overlap_detection(pool: sqlx::PgPool) -> sqlx::Result<()> {
    let mut txn = pool.begin().await?;
    let map = shard_maps::create(&mut txn, "ranges", ShardMapKind::Range, KeyType::Int32).await?;
    let shard = shards::create(&mut txn, map.id, None, "db1.internal", "ranges", None).await?;
    mappings::create(&mut txn, map.id, shard.id, &[0, 0, 0, 10], Some(&[0, 0, 0, 20])).await?;
    txn.commit().await?;

    // Adjacent range is fine.
    let adjacent = mappings::range_overlaps(
        &pool,
        map.id,
        &[0, 0, 0, 20],
        Some(&[0, 0, 0, 30]),
        None,
    )
    .await?;
    assert!(!adjacent);

    // Overlapping range is rejected.
    let overlapping = mappings::range_overlaps(
        &pool,
        map.id,
        &[0, 0, 0, 15],
        Some(&[0, 0, 0, 25]),
        None,
    )
    .await?;
    assert!(overlapping);
    Ok(())
}
