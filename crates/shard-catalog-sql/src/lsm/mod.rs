//! The Local Shard Map store (§4.3): mirrors, inside each shard database,
//! the globally-committed mappings that target that shard. Used for
//! connect-time validation and for fencing in-flight connections when a
//! mapping's location or status changes (§4.8).

pub mod local_mappings;
pub mod shard_identity;

pub use local_mappings::LocalMappingRow;
pub use shard_identity::ShardIdentityRow;

/// Runs the LSM's own schema migrations against a shard's connection pool.
pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("migrations/lsm").run(pool).await
}
