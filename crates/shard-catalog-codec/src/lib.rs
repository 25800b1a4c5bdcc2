//! Totally-ordered, length-prefixed-free byte encoding for shard map keys.
//!
//! Every supported [`KeyType`] has an `encode`/`decode` pair such that
//! unsigned lexicographic order over the encoded bytes matches the natural
//! order of the decoded value. This is the on-disk wire format for mapping
//! regions (§4.1) and must not drift across versions.

mod codec;
mod error;
mod key_type;
mod value;

pub use codec::{decode, encode, sentinel_infinity};
pub use error::CodecError;
pub use key_type::KeyType;
pub use value::{KeyValue, TICKS_PER_SECOND};
