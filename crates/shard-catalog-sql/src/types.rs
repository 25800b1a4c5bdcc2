use sqlx::postgres;
use sqlx::{Decode, Encode, Type};
use shard_catalog_codec::KeyType;

/// Defines a small C-like enum stored as a Postgres `smallint`, with the
/// integer mapping spelled out explicitly so migrations and this file never
/// drift silently.
macro_rules! smallint_enum {
    ($name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            fn to_i16(self) -> i16 {
                match self {
                    $(Self::$variant => $value),+
                }
            }

            fn from_i16(v: i16) -> Result<Self, sqlx::error::BoxDynError> {
                match v {
                    $($value => Ok(Self::$variant),)+
                    other => Err(format!("unrecognized {} discriminant {other}", stringify!($name)).into()),
                }
            }
        }

        impl Type<postgres::Postgres> for $name {
            fn type_info() -> postgres::PgTypeInfo {
                <i16 as Type<postgres::Postgres>>::type_info()
            }
            fn compatible(ty: &postgres::PgTypeInfo) -> bool {
                <i16 as Type<postgres::Postgres>>::compatible(ty)
            }
        }
        impl Encode<'_, postgres::Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
                <i16 as Encode<'_, postgres::Postgres>>::encode_by_ref(&self.to_i16(), buf)
            }
        }
        impl Decode<'_, postgres::Postgres> for $name {
            fn decode(value: postgres::PgValueRef<'_>) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <i16 as Decode<'_, postgres::Postgres>>::decode(value)?;
                Self::from_i16(raw)
            }
        }
    };
}

smallint_enum!(ShardMapKind {
    List = 0,
    Range = 1,
});

smallint_enum!(ShardStatus {
    Online = 0,
    Offline = 1,
});

smallint_enum!(MappingStatus {
    Online = 0,
    Offline = 1,
});

smallint_enum!(Opcode {
    AddShard = 0,
    UpdateShard = 1,
    RemoveShard = 2,
    AddMapping = 3,
    UpdateMapping = 4,
    RemoveMapping = 5,
    ReplaceMapping = 6,
});

/// Which Do-phases (§4.4) had committed by the time a pending operation's
/// row was last observed. Recovery uses this to skip phases that never ran.
smallint_enum!(UndoStartState {
    NoPhaseCommitted = 0,
    GlobalPreLocalCommitted = 1,
    LocalSourceCommitted = 2,
    LocalTargetCommitted = 3,
    GlobalPostLocalCommitted = 4,
});

/// Stores the key type alongside the map, as a smallint, reusing the
/// [`KeyType`] enum from the codec crate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyTypeColumn(pub KeyType);

impl Type<postgres::Postgres> for KeyTypeColumn {
    fn type_info() -> postgres::PgTypeInfo {
        <i16 as Type<postgres::Postgres>>::type_info()
    }
    fn compatible(ty: &postgres::PgTypeInfo) -> bool {
        <i16 as Type<postgres::Postgres>>::compatible(ty)
    }
}
impl Encode<'_, postgres::Postgres> for KeyTypeColumn {
    fn encode_by_ref(&self, buf: &mut postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        let v: i16 = match self.0 {
            KeyType::Int32 => 0,
            KeyType::Int64 => 1,
            KeyType::Uuid => 2,
            KeyType::Binary => 3,
            KeyType::DateTime => 4,
            KeyType::DateTimeOffset => 5,
            KeyType::TimeSpan => 6,
        };
        <i16 as Encode<'_, postgres::Postgres>>::encode_by_ref(&v, buf)
    }
}
impl Decode<'_, postgres::Postgres> for KeyTypeColumn {
    fn decode(value: postgres::PgValueRef<'_>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <i16 as Decode<'_, postgres::Postgres>>::decode(value)?;
        let kt = match raw {
            0 => KeyType::Int32,
            1 => KeyType::Int64,
            2 => KeyType::Uuid,
            3 => KeyType::Binary,
            4 => KeyType::DateTime,
            5 => KeyType::DateTimeOffset,
            6 => KeyType::TimeSpan,
            other => return Err(format!("unrecognized key type discriminant {other}").into()),
        };
        Ok(KeyTypeColumn(kt))
    }
}
