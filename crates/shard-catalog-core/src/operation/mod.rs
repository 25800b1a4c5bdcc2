//! The operation engine (§4.4): every catalog mutation is one instance of a
//! fixed opcode, executed as an ordered sequence of phases against the GSM
//! and the LSM(s) it touches, with a durable pending-operations log row
//! bridging the phases so a crash mid-mutation can be undone by the next
//! operation's recovery scan (see [`crate::recovery`]).
//!
//! Shared engine behavior -- phase sequencing, log row bookkeeping, retry --
//! lives here. Each opcode gets its own `Operation` implementation in a
//! sibling module; the engine never needs to know more about an opcode than
//! what the trait exposes.

mod mapping_ops;
mod replace_mapping;
mod shard_ops;

pub use mapping_ops::{AddMapping, RemoveMapping, UpdateMappingShard, UpdateMappingStatus};
pub use replace_mapping::ReplaceMapping;
pub use shard_ops::{AddShard, RemoveShard, UpdateShardStatus};

use async_trait::async_trait;
use shard_catalog_sql::id::{ShardId, ShardMapId};
use shard_catalog_sql::types::{Opcode, UndoStartState};
use sqlx::{PgPool, Postgres, Transaction};

use crate::connection::ShardConnector;
use crate::error::{Error, Result};
use crate::retry::BackoffPolicy;

pub type Txn<'a> = Transaction<'a, Postgres>;

/// One instance of a catalog mutation, carrying everything the engine needs
/// to drive it through the Do/Undo phase sequence (§4.4). Implementations
/// hold their own request parameters and, once `global_pre_local` has run,
/// whatever state they generated (new ids, computed deltas) so later phases
/// and undo can use it without re-deriving it from the database.
#[async_trait]
pub trait Operation: Send {
    fn opcode(&self) -> Opcode;
    fn shard_map_id(&self) -> ShardMapId;

    /// The shard whose LSM the `LocalSource` phase targets, if this opcode
    /// touches one. `None` for shard-map-level operations with nothing to
    /// project locally.
    fn source_shard(&self) -> Option<ShardId>;

    /// The shard whose LSM the `LocalTarget` phase targets -- only set for
    /// operations that move a mapping from one shard to another.
    fn target_shard(&self) -> Option<ShardId> {
        None
    }

    /// GlobalPreLocal (§4.4): validate invariants against the current GSM
    /// state and return `(before_state, after_state)` for the pending-
    /// operations log row. Must not leave any globally-visible effect other
    /// than the log row itself, which the engine inserts after this returns.
    async fn global_pre_local(
        &mut self,
        gsm: &mut Txn<'_>,
    ) -> Result<(serde_json::Value, serde_json::Value)>;

    /// LocalSource (§4.4). Default no-op for opcodes with nothing to
    /// project locally (e.g. a pure status flip with no mapping involved).
    async fn local_source(&self, _lsm: &mut Txn<'_>) -> Result<()> {
        Ok(())
    }

    /// LocalTarget, optional (§4.4).
    async fn local_target(&self, _lsm: &mut Txn<'_>) -> Result<()> {
        Ok(())
    }

    /// GlobalPostLocal (§4.4): apply the global portion of the mutation.
    /// The engine deletes the pending-operations row in the same
    /// transaction after this returns successfully.
    async fn global_post_local(&self, gsm: &mut Txn<'_>) -> Result<()>;

    async fn undo_local_target(&self, _lsm: &mut Txn<'_>) -> Result<()> {
        Ok(())
    }

    async fn undo_local_source(&self, _lsm: &mut Txn<'_>) -> Result<()> {
        Ok(())
    }
}

/// Builds `Operation` instances. The default factory constructs the real
/// opcode structs directly; `FaultInjectingFactory` wraps any operation so
/// tests can force a chosen phase to fail and exercise the undo paths
/// deterministically (§4.4, §9).
pub trait OperationFactory: Send + Sync {
    fn prepare(&self, op: Box<dyn Operation>) -> Box<dyn Operation>;
}

pub struct DefaultOperationFactory;

impl OperationFactory for DefaultOperationFactory {
    fn prepare(&self, op: Box<dyn Operation>) -> Box<dyn Operation> {
        op
    }
}

/// Identifies a Do-phase by name, for `FaultInjectingFactory`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaultPhase {
    GlobalPreLocal,
    LocalSource,
    LocalTarget,
    GlobalPostLocal,
}

/// Forces the chosen phase of every operation it wraps to fail with
/// [`Error::InjectedFault`], so tests can assert on the engine's undo
/// behavior without needing a live fault in the driver.
pub struct FaultInjectingFactory {
    pub fail_at: FaultPhase,
}

struct FaultInjected {
    inner: Box<dyn Operation>,
    fail_at: FaultPhase,
}

#[async_trait]
impl Operation for FaultInjected {
    fn opcode(&self) -> Opcode {
        self.inner.opcode()
    }
    fn shard_map_id(&self) -> ShardMapId {
        self.inner.shard_map_id()
    }
    fn source_shard(&self) -> Option<ShardId> {
        self.inner.source_shard()
    }
    fn target_shard(&self) -> Option<ShardId> {
        self.inner.target_shard()
    }

    async fn global_pre_local(
        &mut self,
        gsm: &mut Txn<'_>,
    ) -> Result<(serde_json::Value, serde_json::Value)> {
        if self.fail_at == FaultPhase::GlobalPreLocal {
            return Err(Error::InjectedFault {
                phase: "GlobalPreLocal",
            });
        }
        self.inner.global_pre_local(gsm).await
    }

    async fn local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        if self.fail_at == FaultPhase::LocalSource {
            return Err(Error::InjectedFault {
                phase: "LocalSource",
            });
        }
        self.inner.local_source(lsm).await
    }

    async fn local_target(&self, lsm: &mut Txn<'_>) -> Result<()> {
        if self.fail_at == FaultPhase::LocalTarget {
            return Err(Error::InjectedFault {
                phase: "LocalTarget",
            });
        }
        self.inner.local_target(lsm).await
    }

    async fn global_post_local(&self, gsm: &mut Txn<'_>) -> Result<()> {
        if self.fail_at == FaultPhase::GlobalPostLocal {
            return Err(Error::InjectedFault {
                phase: "GlobalPostLocal",
            });
        }
        self.inner.global_post_local(gsm).await
    }

    async fn undo_local_target(&self, lsm: &mut Txn<'_>) -> Result<()> {
        self.inner.undo_local_target(lsm).await
    }
    async fn undo_local_source(&self, lsm: &mut Txn<'_>) -> Result<()> {
        self.inner.undo_local_source(lsm).await
    }
}

impl OperationFactory for FaultInjectingFactory {
    fn prepare(&self, op: Box<dyn Operation>) -> Box<dyn Operation> {
        Box::new(FaultInjected {
            inner: op,
            fail_at: self.fail_at,
        })
    }
}

/// Drives operations through the Do/Undo phase sequence against a GSM pool
/// and the per-shard LSM pools reachable through `ShardConnector`.
pub struct Engine {
    gsm: PgPool,
    connector: std::sync::Arc<ShardConnector>,
    retry_policy: BackoffPolicy,
}

impl Engine {
    pub fn new(gsm: PgPool, connector: std::sync::Arc<ShardConnector>) -> Self {
        Engine {
            gsm,
            connector,
            retry_policy: BackoffPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: BackoffPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn gsm(&self) -> &PgPool {
        &self.gsm
    }

    pub fn connector(&self) -> &ShardConnector {
        &self.connector
    }

    async fn lsm_pool(&self, shard_id: ShardId) -> Result<PgPool> {
        let shard = shard_catalog_sql::gsm::shards::find_by_id(&self.gsm, shard_id)
            .await
            .map_err(Error::storage)?
            .ok_or(Error::ShardDoesNotExist)?;
        self.connector.connect(&shard).await.map_err(Error::storage)
    }

    /// Runs `build` up to the retry policy's attempt budget, retrying the
    /// whole operation (never an individual phase) on a classified
    /// transient fault (§4.7, §5). `build` is called fresh on every
    /// attempt so a retry re-reads the catalog rather than replaying stale
    /// state, per the ordering guarantee in §5.
    pub async fn execute<F>(
        &self,
        shard_map_id: ShardMapId,
        factory: &dyn OperationFactory,
        mut build: F,
    ) -> Result<serde_json::Value>
    where
        F: FnMut() -> Box<dyn Operation>,
    {
        crate::recovery::recover_pending(&self.gsm, &self.connector, shard_map_id).await?;

        let mut cumulative = std::time::Duration::ZERO;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let op = factory.prepare(build());
            match self.run_once(op).await {
                Ok(value) => return Ok(value),
                Err(Error::StorageOperationFailure { source })
                    if attempt < self.retry_policy.max_attempts
                        && shard_catalog_sql::is_transient(&source) =>
                {
                    let delay = self.retry_policy.delay_for_attempt(attempt);
                    if cumulative + delay > self.retry_policy.max_cumulative {
                        return Err(Error::storage(source));
                    }
                    tracing::warn!(
                        attempt,
                        %shard_map_id,
                        error = %source,
                        "retrying catalog operation after transient storage fault"
                    );
                    tokio::time::sleep(delay).await;
                    cumulative += delay;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn run_once(&self, mut op: Box<dyn Operation>) -> Result<serde_json::Value> {
        let opcode = op.opcode();
        let shard_map_id = op.shard_map_id();

        let mut gsm_txn = self.gsm.begin().await.map_err(Error::storage)?;
        let (before_state, after_state) = op.global_pre_local(&mut gsm_txn).await?;
        let log_row = shard_catalog_sql::gsm::operations::insert(
            &mut gsm_txn,
            shard_map_id,
            opcode,
            &before_state,
            &after_state,
        )
        .await
        .map_err(Error::storage)?;
        gsm_txn.commit().await.map_err(Error::storage)?;
        tracing::info!(op_id = %log_row.id, %shard_map_id, ?opcode, "operation logged, GlobalPreLocal committed");

        if let Some(source) = op.source_shard() {
            let result = async {
                let pool = self.lsm_pool(source).await?;
                let mut txn = pool.begin().await.map_err(Error::storage)?;
                op.local_source(&mut txn).await?;
                txn.commit().await.map_err(Error::storage)
            }
            .await;
            if let Err(err) = result {
                tracing::error!(op_id = %log_row.id, ?opcode, error = %err, "LocalSource failed, undoing");
                self.undo(log_row.id, shard_map_id, op.as_ref(), UndoStartState::NoPhaseCommitted)
                    .await?;
                return Err(err);
            }
            self.advance(log_row.id, UndoStartState::LocalSourceCommitted).await?;
        }

        if let Some(target) = op.target_shard() {
            let result = async {
                let pool = self.lsm_pool(target).await?;
                let mut txn = pool.begin().await.map_err(Error::storage)?;
                op.local_target(&mut txn).await?;
                txn.commit().await.map_err(Error::storage)
            }
            .await;
            if let Err(err) = result {
                tracing::error!(op_id = %log_row.id, ?opcode, error = %err, "LocalTarget failed, undoing");
                self.undo(
                    log_row.id,
                    shard_map_id,
                    op.as_ref(),
                    UndoStartState::LocalSourceCommitted,
                )
                .await?;
                return Err(err);
            }
            self.advance(log_row.id, UndoStartState::LocalTargetCommitted).await?;
        }

        let mut gsm_txn = self.gsm.begin().await.map_err(Error::storage)?;
        let result = op.global_post_local(&mut gsm_txn).await;
        if let Err(err) = result {
            drop(gsm_txn);
            tracing::error!(op_id = %log_row.id, ?opcode, error = %err, "GlobalPostLocal failed, undoing");
            let start = if op.target_shard().is_some() {
                UndoStartState::LocalTargetCommitted
            } else {
                UndoStartState::LocalSourceCommitted
            };
            self.undo(log_row.id, shard_map_id, op.as_ref(), start).await?;
            return Err(err);
        }
        shard_catalog_sql::gsm::operations::delete(&mut gsm_txn, log_row.id)
            .await
            .map_err(Error::storage)?;
        gsm_txn.commit().await.map_err(Error::storage)?;
        tracing::info!(op_id = %log_row.id, ?opcode, "GlobalPostLocal committed, operation complete");

        Ok(after_state)
    }

    async fn advance(
        &self,
        op_id: shard_catalog_sql::id::OperationId,
        state: UndoStartState,
    ) -> Result<()> {
        let mut txn = self.gsm.begin().await.map_err(Error::storage)?;
        shard_catalog_sql::gsm::operations::advance_undo_start_state(&mut txn, op_id, state)
            .await
            .map_err(Error::storage)?;
        txn.commit().await.map_err(Error::storage)
    }

    async fn undo(
        &self,
        op_id: shard_catalog_sql::id::OperationId,
        shard_map_id: ShardMapId,
        op: &dyn Operation,
        start: UndoStartState,
    ) -> Result<()> {
        if matches!(
            start,
            UndoStartState::LocalTargetCommitted | UndoStartState::GlobalPostLocalCommitted
        ) {
            if let Some(target) = op.target_shard() {
                let pool = self.lsm_pool(target).await?;
                let mut txn = pool.begin().await.map_err(Error::storage)?;
                op.undo_local_target(&mut txn).await?;
                txn.commit().await.map_err(Error::storage)?;
            }
        }
        if !matches!(start, UndoStartState::NoPhaseCommitted) {
            if let Some(source) = op.source_shard() {
                let pool = self.lsm_pool(source).await?;
                let mut txn = pool.begin().await.map_err(Error::storage)?;
                op.undo_local_source(&mut txn).await?;
                txn.commit().await.map_err(Error::storage)?;
            }
        }
        let mut txn = self.gsm.begin().await.map_err(Error::storage)?;
        shard_catalog_sql::gsm::operations::delete(&mut txn, op_id)
            .await
            .map_err(Error::storage)?;
        txn.commit().await.map_err(Error::storage)?;
        tracing::info!(%op_id, %shard_map_id, "operation undone, pending log row cleared");
        Ok(())
    }
}
