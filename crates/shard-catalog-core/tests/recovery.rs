//! Exercises `recovery::recover_pending` directly against a hand-crafted
//! `pending_operations` row, simulating a process that crashed after
//! `LocalSource` committed but before `GlobalPostLocal` ran -- a state the
//! engine's own inline undo (tested in `tests/engine.rs`) can never produce
//! within a single test process, since it always runs undo itself on
//! failure before returning.

mod support;

use std::sync::Arc;

use shard_catalog_core::connection::ShardConnector;
use shard_catalog_sql::id::{LockOwnerId, MappingId};
use shard_catalog_sql::lsm::local_mappings::{self, LocalMappingRow};
use shard_catalog_sql::types::{MappingStatus, Opcode, UndoStartState};

#[tokio::test]
async fn recovering_an_abandoned_add_mapping_deletes_the_stray_local_row() {
    let url = support::database_url();
    let gsm_pool = sqlx::PgPool::connect(&url).await.expect("connect gsm");
    shard_catalog_sql::gsm::migrate(&gsm_pool).await.expect("gsm migration");
    shard_catalog_sql::lsm::migrate(&gsm_pool).await.expect("lsm migration (same database)");

    let mut txn = gsm_pool.begin().await.expect("begin setup txn");
    let map = shard_catalog_sql::gsm::shard_maps::create(
        &mut txn,
        &support::unique("recovery"),
        shard_catalog_sql::types::ShardMapKind::List,
        shard_catalog_codec::KeyType::Int32,
    )
    .await
    .expect("create shard map");
    let (host, database, port) = support::parse_location(&url);
    let shard = shard_catalog_sql::gsm::shards::create(&mut txn, map.id, None, &host, &database, port)
        .await
        .expect("create shard");
    txn.commit().await.expect("commit setup txn");

    // LocalSource for AddMapping already committed this row when the
    // simulated process died, so it's on disk on the shard's own LSM.
    let mapping_id = MappingId::generate();
    let mut lsm_txn = gsm_pool.begin().await.expect("begin lsm txn");
    local_mappings::upsert(
        &mut lsm_txn,
        &LocalMappingRow {
            id: mapping_id,
            shard_map_id: map.id,
            low: vec![0, 0, 0, 9],
            high: None,
            status: MappingStatus::Online,
            lock_owner: LockOwnerId::UNLOCKED,
            version: 1,
        },
    )
    .await
    .expect("write the stray local mapping row");
    lsm_txn.commit().await.expect("commit lsm txn");

    // The pending-operations log row GlobalPreLocal would have written,
    // with undo_start_state advanced past LocalSource, matching what
    // `Engine::run_once` leaves behind right before GlobalPostLocal.
    let mut log_txn = gsm_pool.begin().await.expect("begin log txn");
    let log_row = shard_catalog_sql::gsm::operations::insert(
        &mut log_txn,
        map.id,
        Opcode::AddMapping,
        &serde_json::Value::Null,
        &serde_json::json!({ "mapping_id": mapping_id, "shard_id": shard.id }),
    )
    .await
    .expect("insert pending operation row");
    shard_catalog_sql::gsm::operations::advance_undo_start_state(
        &mut log_txn,
        log_row.id,
        UndoStartState::LocalSourceCommitted,
    )
    .await
    .expect("advance undo start state");
    log_txn.commit().await.expect("commit log txn");

    assert!(local_mappings::find_by_id(&gsm_pool, mapping_id).await.unwrap().is_some());

    let connector = Arc::new(ShardConnector::new());
    shard_catalog_core::recovery::recover_pending(&gsm_pool, &connector, map.id)
        .await
        .expect("recover the abandoned operation");

    assert!(
        local_mappings::find_by_id(&gsm_pool, mapping_id).await.unwrap().is_none(),
        "recovery must undo the LocalSource write that never reached GlobalPostLocal"
    );
    assert!(
        shard_catalog_sql::gsm::operations::list_for_map(&gsm_pool, map.id)
            .await
            .unwrap()
            .is_empty(),
        "the pending-operations row is cleared once recovery finishes undoing it"
    );

    // Recovery is a no-op on a map with nothing pending, including the one
    // it just cleaned up.
    shard_catalog_core::recovery::recover_pending(&gsm_pool, &connector, map.id)
        .await
        .expect("recovering an already-clean map is a no-op");
}
