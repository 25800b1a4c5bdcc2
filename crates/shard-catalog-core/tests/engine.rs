//! Engine-level tests against `Engine::execute` directly, bypassing the
//! façade, so a chosen Do-phase can be forced to fail via
//! `FaultInjectingFactory` and the resulting Undo round-trip checked against
//! the raw GSM/LSM rows.

mod support;

use std::sync::Arc;

use shard_catalog_core::connection::ShardConnector;
use shard_catalog_core::error::Error;
use shard_catalog_core::operation::{AddMapping, DefaultOperationFactory, Engine, FaultInjectingFactory, FaultPhase};
use shard_catalog_sql::gsm::{mappings, shard_maps, shards};
use shard_catalog_sql::lsm::local_mappings;
use shard_catalog_sql::types::ShardMapKind;

async fn setup() -> (sqlx::PgPool, Engine, shard_catalog_sql::id::ShardMapId, shard_catalog_sql::id::ShardId) {
    let url = support::database_url();
    let gsm_pool = sqlx::PgPool::connect(&url).await.expect("connect gsm");
    shard_catalog_sql::gsm::migrate(&gsm_pool).await.expect("gsm migration");
    shard_catalog_sql::lsm::migrate(&gsm_pool).await.expect("lsm migration (same database)");

    let mut txn = gsm_pool.begin().await.expect("begin setup txn");
    let map = shard_maps::create(
        &mut txn,
        &support::unique("engine"),
        ShardMapKind::List,
        shard_catalog_codec::KeyType::Int32,
    )
    .await
    .expect("create shard map");
    let (host, database, port) = support::parse_location(&url);
    let shard = shards::create(&mut txn, map.id, None, &host, &database, port)
        .await
        .expect("create shard");
    txn.commit().await.expect("commit setup txn");

    let connector = Arc::new(ShardConnector::new());
    let engine = Engine::new(gsm_pool.clone(), connector);
    (gsm_pool, engine, map.id, shard.id)
}

#[tokio::test]
async fn fault_at_global_post_local_undoes_the_committed_local_source() {
    let (gsm_pool, engine, shard_map_id, shard_id) = setup().await;

    let faulty = FaultInjectingFactory {
        fail_at: FaultPhase::GlobalPostLocal,
    };
    let result = engine
        .execute(shard_map_id, &faulty, || {
            Box::new(AddMapping::new(shard_map_id, shard_id, vec![0, 0, 0, 1], None))
        })
        .await;
    assert!(matches!(
        result,
        Err(Error::InjectedFault {
            phase: "GlobalPostLocal"
        })
    ));

    // GlobalPreLocal never committed its GSM effect (there is none besides
    // the log row), and LocalSource's commit was rolled back by undo.
    let mappings_after = mappings::list(&gsm_pool, shard_map_id).await.unwrap();
    assert!(mappings_after.is_empty(), "no GSM mapping row should survive a failed GlobalPostLocal");
    assert!(
        shard_catalog_sql::gsm::operations::list_for_map(&gsm_pool, shard_map_id)
            .await
            .unwrap()
            .is_empty(),
        "the pending-operations row is cleared once undo completes"
    );

    // A fresh unfaulted attempt on the same map succeeds cleanly afterward.
    let value = engine
        .execute(shard_map_id, &DefaultOperationFactory, || {
            Box::new(AddMapping::new(shard_map_id, shard_id, vec![0, 0, 0, 1], None))
        })
        .await
        .expect("retry without the injected fault succeeds");
    let mapping_id: shard_catalog_sql::id::MappingId =
        serde_json::from_value(value["mapping_id"].clone()).unwrap();
    assert!(local_mappings::find_by_id(&gsm_pool, mapping_id).await.unwrap().is_some());
}

#[tokio::test]
async fn fault_at_local_source_leaves_no_local_or_global_residue() {
    let (gsm_pool, engine, shard_map_id, shard_id) = setup().await;

    let faulty = FaultInjectingFactory {
        fail_at: FaultPhase::LocalSource,
    };
    let result = engine
        .execute(shard_map_id, &faulty, || {
            Box::new(AddMapping::new(shard_map_id, shard_id, vec![0, 0, 0, 2], None))
        })
        .await;
    assert!(matches!(
        result,
        Err(Error::InjectedFault { phase: "LocalSource" })
    ));

    assert!(mappings::list(&gsm_pool, shard_map_id).await.unwrap().is_empty());
    assert!(
        shard_catalog_sql::gsm::operations::list_for_map(&gsm_pool, shard_map_id)
            .await
            .unwrap()
            .is_empty()
    );

    // The point is free again since nothing committed, so a clean attempt
    // at the exact same key succeeds.
    engine
        .execute(shard_map_id, &DefaultOperationFactory, || {
            Box::new(AddMapping::new(shard_map_id, shard_id, vec![0, 0, 0, 2], None))
        })
        .await
        .expect("the point was never actually mapped by the faulted attempt");
}
