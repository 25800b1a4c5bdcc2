use crate::key_type::KeyType;
use chrono::{DateTime, TimeZone, Utc};

/// A decoded key of one of the supported types.
///
/// `DateTime`/`DateTimeOffset`/`TimeSpan` are carried as 100ns tick counts
/// rather than `chrono` types directly: ticks are the on-disk wire format
/// (§4.1) and must not drift if the host time library changes. Conversions
/// to/from `chrono::DateTime<Utc>` and `chrono::TimeDelta` are provided for
/// convenience at the façade boundary.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyValue {
    Int32(i32),
    Int64(i64),
    Uuid(uuid::Uuid),
    Binary(Vec<u8>),
    /// Ticks since the epoch.
    DateTime(i64),
    /// (ticks since the epoch, offset from UTC in minutes).
    DateTimeOffset(i64, i16),
    /// Ticks of elapsed duration.
    TimeSpan(i64),
}

/// Ticks per second, matching the 100ns tick convention this codec's wire
/// format is specified against (§4.1).
pub const TICKS_PER_SECOND: i64 = 10_000_000;

impl KeyValue {
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyValue::Int32(_) => KeyType::Int32,
            KeyValue::Int64(_) => KeyType::Int64,
            KeyValue::Uuid(_) => KeyType::Uuid,
            KeyValue::Binary(_) => KeyType::Binary,
            KeyValue::DateTime(_) => KeyType::DateTime,
            KeyValue::DateTimeOffset(_, _) => KeyType::DateTimeOffset,
            KeyValue::TimeSpan(_) => KeyType::TimeSpan,
        }
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        KeyValue::DateTime(to_ticks(dt))
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            KeyValue::DateTime(ticks) => Some(from_ticks(*ticks)),
            _ => None,
        }
    }
}

fn to_ticks(dt: DateTime<Utc>) -> i64 {
    dt.timestamp() * TICKS_PER_SECOND + i64::from(dt.timestamp_subsec_nanos()) / 100
}

fn from_ticks(ticks: i64) -> DateTime<Utc> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    Utc.timestamp_opt(secs, nanos).single().expect("tick value in range")
}
