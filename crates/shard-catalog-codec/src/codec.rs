use crate::error::CodecError;
use crate::key_type::KeyType;
use crate::value::KeyValue;

/// Encodes `value` into a byte string whose unsigned lexicographic order
/// matches the natural order of `value`'s type (§4.1). The type minimum
/// (`i32::MIN`/`i64::MIN`) encodes as [`sentinel_infinity`] rather than an
/// all-zero byte string, so it round-trips back out of whichever unbounded
/// range endpoint produced it.
pub fn encode(value: &KeyValue) -> Vec<u8> {
    match value {
        KeyValue::Int32(v) if *v == i32::MIN => sentinel_infinity(),
        KeyValue::Int64(v) if *v == i64::MIN => sentinel_infinity(),
        KeyValue::Int32(v) => encode_i32(*v).to_vec(),
        KeyValue::Int64(v) => encode_i64(*v).to_vec(),
        KeyValue::Uuid(v) => encode_uuid(v).to_vec(),
        KeyValue::Binary(v) => encode_binary(v),
        KeyValue::DateTime(ticks) => encode_i64(*ticks).to_vec(),
        KeyValue::DateTimeOffset(ticks, offset_minutes) => {
            let mut out = encode_i64(*ticks).to_vec();
            out.extend_from_slice(&encode_i16(*offset_minutes));
            out
        }
        KeyValue::TimeSpan(ticks) => encode_i64(*ticks).to_vec(),
    }
}

/// Decodes `bytes` as a value of `key_type`. Inverse of [`encode`], modulo
/// the binary-type trailing-zero normalization called out in §4.1.
pub fn decode(key_type: KeyType, bytes: &[u8]) -> Result<KeyValue, CodecError> {
    match key_type {
        KeyType::Int32 => Ok(KeyValue::Int32(decode_i32(key_type, bytes)?)),
        KeyType::Int64 => Ok(KeyValue::Int64(decode_i64(key_type, bytes)?)),
        KeyType::Uuid => Ok(KeyValue::Uuid(decode_uuid(bytes)?)),
        KeyType::Binary => Ok(KeyValue::Binary(bytes.to_vec())),
        KeyType::DateTime => Ok(KeyValue::DateTime(decode_i64(key_type, bytes)?)),
        KeyType::DateTimeOffset => {
            if bytes.len() != 10 {
                return Err(CodecError::UnexpectedLength {
                    key_type,
                    expected: 10,
                    got: bytes.len(),
                });
            }
            let ticks = decode_i64(key_type, &bytes[..8])?;
            let offset = decode_i16(key_type, &bytes[8..])?;
            Ok(KeyValue::DateTimeOffset(ticks, offset))
        }
        KeyType::TimeSpan => Ok(KeyValue::TimeSpan(decode_i64(key_type, bytes)?)),
    }
}

/// The sentinel encoding of negative infinity: the empty byte string.
/// Whether a given empty encoding means negative or positive infinity is
/// determined by its position (a range's low vs. high bound), not by its
/// content -- both sentinels share this same representation.
pub fn sentinel_infinity() -> Vec<u8> {
    Vec::new()
}

fn encode_i32(v: i32) -> [u8; 4] {
    ((v as u32) ^ 0x8000_0000).to_be_bytes()
}

fn decode_i32(key_type: KeyType, bytes: &[u8]) -> Result<i32, CodecError> {
    if bytes.is_empty() {
        return Ok(i32::MIN);
    }
    let arr: [u8; 4] = bytes.try_into().map_err(|_| CodecError::UnexpectedLength {
        key_type,
        expected: 4,
        got: bytes.len(),
    })?;
    Ok((u32::from_be_bytes(arr) ^ 0x8000_0000) as i32)
}

fn encode_i64(v: i64) -> [u8; 8] {
    ((v as u64) ^ 0x8000_0000_0000_0000).to_be_bytes()
}

fn decode_i64(key_type: KeyType, bytes: &[u8]) -> Result<i64, CodecError> {
    if bytes.is_empty() {
        return Ok(i64::MIN);
    }
    let arr: [u8; 8] = bytes.try_into().map_err(|_| CodecError::UnexpectedLength {
        key_type,
        expected: 8,
        got: bytes.len(),
    })?;
    Ok((u64::from_be_bytes(arr) ^ 0x8000_0000_0000_0000) as i64)
}

fn encode_i16(v: i16) -> [u8; 2] {
    ((v as u16) ^ 0x8000).to_be_bytes()
}

fn decode_i16(key_type: KeyType, bytes: &[u8]) -> Result<i16, CodecError> {
    let arr: [u8; 2] = bytes.try_into().map_err(|_| CodecError::UnexpectedLength {
        key_type,
        expected: 2,
        got: bytes.len(),
    })?;
    Ok((u16::from_be_bytes(arr) ^ 0x8000) as i16)
}

/// Reorders RFC 4122 big-endian UUID bytes into the database engine's GUID
/// sort order: the time-low, time-mid and time-hi-and-version fields are
/// byte-swapped (they're stored little-endian by the engine), while the
/// clock-sequence and node bytes are left as-is.
fn encode_uuid(uuid: &uuid::Uuid) -> [u8; 16] {
    let b = uuid.as_bytes();
    let mut out = [0u8; 16];
    out[0] = b[3];
    out[1] = b[2];
    out[2] = b[1];
    out[3] = b[0];
    out[4] = b[5];
    out[5] = b[4];
    out[6] = b[7];
    out[7] = b[6];
    out[8..16].copy_from_slice(&b[8..16]);
    out
}

fn decode_uuid(bytes: &[u8]) -> Result<uuid::Uuid, CodecError> {
    if bytes.len() != 16 {
        return Err(CodecError::UnexpectedLength {
            key_type: KeyType::Uuid,
            expected: 16,
            got: bytes.len(),
        });
    }
    let mut out = [0u8; 16];
    out[0] = bytes[3];
    out[1] = bytes[2];
    out[2] = bytes[1];
    out[3] = bytes[0];
    out[4] = bytes[5];
    out[5] = bytes[4];
    out[6] = bytes[7];
    out[7] = bytes[6];
    out[8..16].copy_from_slice(&bytes[8..16]);
    Ok(uuid::Uuid::from_bytes(out))
}

/// Binary keys encode verbatim, but trailing zero bytes are not significant
/// and are normalized away so that re-encoding a decoded value is stable.
fn encode_binary(v: &[u8]) -> Vec<u8> {
    let trimmed = v.len() - v.iter().rev().take_while(|b| **b == 0).count();
    v[..trimmed].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn order_preserving(a: KeyValue, b: KeyValue) {
        let ea = encode(&a);
        let eb = encode(&b);
        assert_eq!(
            ea.cmp(&eb),
            a.cmp(&b),
            "encode({:?})={:?} encode({:?})={:?}",
            a,
            ea,
            b,
            eb
        );
    }

    proptest! {
        #[test]
        fn int32_order_preserving(a: i32, b: i32) {
            order_preserving(KeyValue::Int32(a), KeyValue::Int32(b));
        }

        #[test]
        fn int64_order_preserving(a: i64, b: i64) {
            order_preserving(KeyValue::Int64(a), KeyValue::Int64(b));
        }

        #[test]
        fn int32_roundtrip(v: i32) {
            let encoded = encode(&KeyValue::Int32(v));
            prop_assert_eq!(decode(KeyType::Int32, &encoded).unwrap(), KeyValue::Int32(v));
        }

        #[test]
        fn int64_roundtrip(v: i64) {
            let encoded = encode(&KeyValue::Int64(v));
            prop_assert_eq!(decode(KeyType::Int64, &encoded).unwrap(), KeyValue::Int64(v));
        }

        #[test]
        fn binary_roundtrip_modulo_trailing_zeros(mut v: Vec<u8>) {
            v.truncate(64);
            let encoded = encode(&KeyValue::Binary(v.clone()));
            let decoded = decode(KeyType::Binary, &encoded).unwrap();
            let trimmed = v.len() - v.iter().rev().take_while(|b| **b == 0).count();
            prop_assert_eq!(decoded, KeyValue::Binary(v[..trimmed].to_vec()));
        }
    }

    #[test]
    fn int32_min_encodes_to_the_empty_sentinel() {
        assert_eq!(encode(&KeyValue::Int32(i32::MIN)), sentinel_infinity());
        assert_eq!(decode(KeyType::Int32, &sentinel_infinity()).unwrap(), KeyValue::Int32(i32::MIN));
    }

    #[test]
    fn int64_min_encodes_to_the_empty_sentinel() {
        assert_eq!(encode(&KeyValue::Int64(i64::MIN)), sentinel_infinity());
        assert_eq!(decode(KeyType::Int64, &sentinel_infinity()).unwrap(), KeyValue::Int64(i64::MIN));
    }

    #[test]
    fn int32_min_plus_one_still_encodes_to_near_zero_bytes() {
        // The all-zero encoding is reserved for i32::MIN + 1, the smallest
        // value that isn't itself the sentinel.
        assert_eq!(encode(&KeyValue::Int32(i32::MIN + 1)), vec![0, 0, 0, 1]);
    }

    #[test]
    fn negative_infinity_is_empty() {
        assert_eq!(sentinel_infinity(), Vec::<u8>::new());
    }

    #[test]
    fn uuid_roundtrip() {
        let id = uuid::Uuid::from_u128(0x0123456789abcdef0123456789abcdef);
        let encoded = encode(&KeyValue::Uuid(id));
        assert_eq!(encoded.len(), 16);
        assert_eq!(decode(KeyType::Uuid, &encoded).unwrap(), KeyValue::Uuid(id));
    }

    #[test]
    fn uuid_order_matches_engine_layout() {
        // Differ only in the time_low field: engine sort order should
        // reflect the byte-swapped field, not RFC4122 byte order.
        let a = uuid::Uuid::from_bytes([
            0x00, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ]);
        let b = uuid::Uuid::from_bytes([
            0x00, 0x00, 0x01, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ]);
        // RFC4122 byte order has a < b, but swapped time_low puts a > b.
        assert!(a < b);
        assert!(encode(&KeyValue::Uuid(a)) > encode(&KeyValue::Uuid(b)));
    }

    #[test]
    fn datetime_offset_compares_instant_before_offset() {
        let earlier_utc_later_offset = KeyValue::DateTimeOffset(100, 60);
        let later_utc_earlier_offset = KeyValue::DateTimeOffset(200, -60);
        order_preserving(earlier_utc_later_offset, later_utc_earlier_offset);
    }
}
