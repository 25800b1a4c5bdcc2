use sqlx::postgres;
use sqlx::{Decode, Encode, Type, TypeInfo};

/// Defines a `Uuid`-backed identifier newtype with the `sqlx::Type`,
/// `Encode`/`Decode`, `Display` and `serde` impls every catalog row id
/// needs. Mirrors the shape of a fixed-width id newtype elsewhere in this
/// codebase, generalized from a single `flowid` type to the several
/// identifier kinds the catalog tracks (shard maps, shards, mappings,
/// operations).
macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(uuid::Uuid);

        impl $name {
            pub fn new(inner: uuid::Uuid) -> Self {
                Self(inner)
            }

            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> uuid::Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.0.serialize(serializer)
            }
        }
        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                uuid::Uuid::deserialize(deserializer).map(Self)
            }
        }

        impl Type<postgres::Postgres> for $name {
            fn type_info() -> postgres::PgTypeInfo {
                <uuid::Uuid as Type<postgres::Postgres>>::type_info()
            }
            fn compatible(ty: &postgres::PgTypeInfo) -> bool {
                <uuid::Uuid as Type<postgres::Postgres>>::compatible(ty)
            }
        }
        impl sqlx::postgres::PgHasArrayType for $name {
            fn array_type_info() -> postgres::PgTypeInfo {
                <uuid::Uuid as sqlx::postgres::PgHasArrayType>::array_type_info()
            }
        }
        impl Encode<'_, postgres::Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
                <uuid::Uuid as Encode<'_, postgres::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
        impl Decode<'_, postgres::Postgres> for $name {
            fn decode(value: postgres::PgValueRef<'_>) -> Result<Self, sqlx::error::BoxDynError> {
                <uuid::Uuid as Decode<'_, postgres::Postgres>>::decode(value).map(Self)
            }
        }
    };
}

uuid_id!(ShardMapId);
uuid_id!(ShardId);
uuid_id!(MappingId);
uuid_id!(OperationId);

/// A 128-bit mapping lock owner token. The all-zero value means "unlocked";
/// the all-one value is the reserved "force unlock" sentinel, accepted only
/// by `UnlockMapping` (§9 open question).
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct LockOwnerId([u8; 16]);

impl LockOwnerId {
    pub const UNLOCKED: LockOwnerId = LockOwnerId([0u8; 16]);
    pub const FORCE: LockOwnerId = LockOwnerId([0xffu8; 16]);

    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn generate() -> Self {
        loop {
            let candidate = Self(uuid::Uuid::new_v4().into_bytes());
            if candidate != Self::UNLOCKED && candidate != Self::FORCE {
                return candidate;
            }
        }
    }

    pub fn is_unlocked(&self) -> bool {
        *self == Self::UNLOCKED
    }

    pub fn is_force(&self) -> bool {
        *self == Self::FORCE
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Display for LockOwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
impl std::fmt::Debug for LockOwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LockOwnerId({})", hex::encode(self.0))
    }
}

impl serde::Serialize for LockOwnerId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}
impl<'de> serde::Deserialize<'de> for LockOwnerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let exact: [u8; 16] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 16 bytes"))?;
        Ok(Self(exact))
    }
}

impl Type<postgres::Postgres> for LockOwnerId {
    fn type_info() -> postgres::PgTypeInfo {
        postgres::PgTypeInfo::with_name("BYTEA")
    }
    fn compatible(ty: &postgres::PgTypeInfo) -> bool {
        ty.name() == "BYTEA"
    }
}
impl Encode<'_, postgres::Postgres> for LockOwnerId {
    fn encode_by_ref(&self, buf: &mut postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        buf.extend_from_slice(&self.0);
        sqlx::encode::IsNull::No
    }
}
impl Decode<'_, postgres::Postgres> for LockOwnerId {
    fn decode(value: postgres::PgValueRef<'_>) -> Result<Self, sqlx::error::BoxDynError> {
        let bytes = <&[u8] as Decode<'_, postgres::Postgres>>::decode(value)?;
        let exact: [u8; 16] = bytes.try_into()?;
        Ok(Self(exact))
    }
}
