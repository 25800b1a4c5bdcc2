//! The public façade (§4.6, §6): `ShardMapManager` owns the catalog
//! connection and hands out `ListShardMap<T>`/`RangeShardMap<T>` handles,
//! which are the types application code actually calls into. Everything
//! below this module -- the operation engine, recovery, the cache -- is
//! reached only through these two files.

mod manager;
mod map;

pub use manager::{CreateMode, LoadPolicy, ShardMapManager};
pub use map::{LookupOptions, MappingLockToken, ListShardMap, RangeShardMap};
