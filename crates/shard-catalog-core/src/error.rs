/// The coarse subsystem a [`Error`] was raised by (§7). Kept alongside the
/// specific variant so callers that only care about "which area of the API
/// failed" don't have to enumerate every code.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Category {
    ShardMapManager,
    ListShardMap,
    RangeShardMap,
    Recovery,
    General,
}

/// The catalog's structured error taxonomy (§7). Every façade method
/// returns this type; transient storage faults never escape directly --
/// they are retried (§4.7) and, if retries are exhausted, wrapped as
/// [`Error::StorageOperationFailure`] with the original `sqlx::Error`
/// preserved as the source.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("a shard map named '{name}' already exists")]
    ShardMapAlreadyExists { name: String },

    #[error("failed to look up shard map '{name}'")]
    ShardMapLookupFailure {
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("shard map '{name}' does not exist")]
    ShardMapDoesNotExist { name: String },

    #[error("shard map '{name}' has key type {actual} but {expected} was expected")]
    ShardMapTypeConversionError {
        name: String,
        expected: shard_catalog_codec::KeyType,
        actual: shard_catalog_codec::KeyType,
    },

    #[error("a shard map may only be deleted once it has no shards or mappings")]
    ShardMapHasShardsOrMappings,

    #[error("shard location must specify a non-empty host and database")]
    ShardLocationNullOrEmpty,

    #[error("shard endpoint port must be between 0 and 65535")]
    ShardLocationInvalidPort,

    #[error("shard does not exist, or was concurrently modified")]
    ShardDoesNotExist,

    #[error("a shard at this location already exists in the map")]
    ShardAlreadyExists,

    #[error("shard cannot be deleted while mappings still reference it")]
    ShardHasMappings,

    #[error("the key is already mapped in this list map")]
    MappingPointAlreadyMapped,

    #[error("the range overlaps an existing mapping in this range map")]
    MappingRangeAlreadyMapped,

    #[error("no mapping covers the given key")]
    MappingNotFoundForKey,

    #[error("mapping does not exist, or was concurrently modified")]
    MappingDoesNotExist,

    #[error("mapping must be taken offline before this operation")]
    MappingIsNotOffline,

    #[error("mapping is offline")]
    MappingIsOffline,

    #[error("the supplied lock owner token does not match the mapping's current owner")]
    MappingLockOwnerIdDoesNotMatch,

    #[error("the mapping is already locked by another owner")]
    MappingIsAlreadyLocked,

    #[error("the force-unlock token cannot be used to lock a mapping")]
    MappingLockTokenReserved,

    #[error("split point does not fall strictly inside the mapping's range")]
    MappingSplitPointOutOfRange,

    #[error("merge requires adjacent ranges mapped to the same shard")]
    MappingsAreNotMergeable,

    #[error("connection was cancelled before it completed")]
    ConnectionCancelled,

    #[error("unrecognized connection option bits")]
    InvalidConnectionOptions,

    #[error("storage operation failed")]
    StorageOperationFailure {
        #[source]
        source: sqlx::Error,
    },

    #[error("injected fault at phase {phase}")]
    InjectedFault { phase: &'static str },

    #[error("could not decode a pending-operation log row during recovery")]
    RecoveryLogCorrupt {
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn category(&self) -> Category {
        use Error::*;
        match self {
            ShardMapAlreadyExists { .. }
            | ShardMapLookupFailure { .. }
            | ShardMapDoesNotExist { .. }
            | ShardMapTypeConversionError { .. }
            | ShardMapHasShardsOrMappings
            | ShardLocationNullOrEmpty
            | ShardLocationInvalidPort
            | ShardDoesNotExist
            | ShardAlreadyExists
            | ShardHasMappings => Category::ShardMapManager,

            MappingPointAlreadyMapped => Category::ListShardMap,

            MappingRangeAlreadyMapped
            | MappingSplitPointOutOfRange
            | MappingsAreNotMergeable => Category::RangeShardMap,

            MappingNotFoundForKey
            | MappingDoesNotExist
            | MappingIsNotOffline
            | MappingIsOffline
            | MappingLockOwnerIdDoesNotMatch
            | MappingIsAlreadyLocked
            | MappingLockTokenReserved
            | ConnectionCancelled
            | InvalidConnectionOptions
            | StorageOperationFailure { .. }
            | InjectedFault { .. } => Category::General,

            RecoveryLogCorrupt { .. } => Category::Recovery,
        }
    }

    /// Wraps a classified storage fault, used once retries (§4.7) are
    /// exhausted.
    pub fn storage(source: sqlx::Error) -> Self {
        Error::StorageOperationFailure { source }
    }

    /// Wraps a failure to deserialize a pending-operation log row's JSON
    /// snapshot during recovery (§4.4). Indicates the log row was written
    /// by an incompatible version of this catalog.
    pub fn recovery_decode(source: serde_json::Error) -> Self {
        Error::RecoveryLogCorrupt { source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
