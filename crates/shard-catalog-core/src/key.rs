//! Bridges a caller's Rust key type to the runtime-tagged [`KeyValue`] the
//! storage and codec layers actually work with (§9 design note: the two
//! publicly-generic map wrappers and the runtime-typed core never drift
//! apart because they both go through this trait).

use shard_catalog_codec::{KeyType, KeyValue};

pub trait ShardKey: Send + Sync + Clone + 'static {
    const KEY_TYPE: KeyType;

    fn to_key_value(&self) -> KeyValue;
    fn from_key_value(value: &KeyValue) -> Option<Self>
    where
        Self: Sized;
}

impl ShardKey for i32 {
    const KEY_TYPE: KeyType = KeyType::Int32;
    fn to_key_value(&self) -> KeyValue {
        KeyValue::Int32(*self)
    }
    fn from_key_value(value: &KeyValue) -> Option<Self> {
        match value {
            KeyValue::Int32(v) => Some(*v),
            _ => None,
        }
    }
}

impl ShardKey for i64 {
    const KEY_TYPE: KeyType = KeyType::Int64;
    fn to_key_value(&self) -> KeyValue {
        KeyValue::Int64(*self)
    }
    fn from_key_value(value: &KeyValue) -> Option<Self> {
        match value {
            KeyValue::Int64(v) => Some(*v),
            _ => None,
        }
    }
}

impl ShardKey for uuid::Uuid {
    const KEY_TYPE: KeyType = KeyType::Uuid;
    fn to_key_value(&self) -> KeyValue {
        KeyValue::Uuid(*self)
    }
    fn from_key_value(value: &KeyValue) -> Option<Self> {
        match value {
            KeyValue::Uuid(v) => Some(*v),
            _ => None,
        }
    }
}

impl ShardKey for Vec<u8> {
    const KEY_TYPE: KeyType = KeyType::Binary;
    fn to_key_value(&self) -> KeyValue {
        KeyValue::Binary(self.clone())
    }
    fn from_key_value(value: &KeyValue) -> Option<Self> {
        match value {
            KeyValue::Binary(v) => Some(v.clone()),
            _ => None,
        }
    }
}
