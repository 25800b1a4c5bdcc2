use std::fmt;

/// The set of key types a shard map may be created against. Stored alongside
/// the map's metadata in the GSM and used to pick the right codec at the
/// storage boundary regardless of which generic `ShardKey` wrapper the caller
/// used.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Int32,
    Int64,
    Uuid,
    Binary,
    DateTime,
    DateTimeOffset,
    TimeSpan,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeyType::Int32 => "int32",
            KeyType::Int64 => "int64",
            KeyType::Uuid => "uuid",
            KeyType::Binary => "binary",
            KeyType::DateTime => "datetime",
            KeyType::DateTimeOffset => "datetime_offset",
            KeyType::TimeSpan => "timespan",
        };
        f.write_str(s)
    }
}
