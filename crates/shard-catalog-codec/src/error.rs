use crate::key_type::KeyType;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("expected {expected} bytes decoding a {key_type} key, got {got}")]
    UnexpectedLength {
        key_type: KeyType,
        expected: usize,
        got: usize,
    },

    #[error("invalid {key_type} encoding: {reason}")]
    Malformed { key_type: KeyType, reason: String },
}
