//! The Global Shard Map store (§4.2): the authoritative catalog of shard
//! maps, shards, mappings and the pending-operations log. Every function
//! here takes either a borrowed executor (non-transactional and read-only
//! scopes) or a `&mut sqlx::Transaction` (read-write scopes) -- the store
//! itself is opcode-agnostic and only guarantees atomicity within whichever
//! scope its caller opened.

pub mod mappings;
pub mod operations;
pub mod shard_maps;
pub mod shards;

pub use mappings::MappingRow;
pub use operations::PendingOperationRow;
pub use shard_maps::ShardMapRow;
pub use shards::ShardRow;

/// Runs the GSM's own schema migrations against `pool`. Idempotent: safe to
/// call on every manager startup.
pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("migrations/gsm").run(pool).await
}
