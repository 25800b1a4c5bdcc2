//! Postgres-backed storage for the Global Shard Map (GSM) and per-shard
//! Local Shard Maps (LSM). This crate owns the row shapes, the migrations,
//! and a thin verb per store operation (§4.2, §4.3); it is intentionally
//! silent about opcodes, phases and retries -- that's the operation
//! engine's job, one layer up.

pub mod error;
pub mod gsm;
pub mod id;
pub mod json;
pub mod lsm;
pub mod types;

pub use error::{classify, is_transient, FaultClass};
pub use id::{LockOwnerId, MappingId, OperationId, ShardId, ShardMapId};
pub use json::TextJson;
pub use types::{KeyTypeColumn, MappingStatus, Opcode, ShardMapKind, ShardStatus, UndoStartState};
