//! Script number codec.
//!
//! Bitcoin encodes integers on the stack in sign-magnitude little-endian
//! form: minimal bytes, with the most significant bit of the final byte
//! carrying the sign. Zero encodes as the empty vector.

use num_bigint::{BigInt, Sign};

use crate::error::VmError;

/// Default maximum encoded length accepted by numeric operations.
pub const MAX_SCRIPT_NUMBER_LENGTH: usize = 4;

/// Maximum encoded length accepted by the locktime operations.
pub const LOCKTIME_NUMBER_LENGTH: usize = 5;

/// Decode a script number.
///
/// With `require_minimal`, encodings with unnecessary trailing bytes (a most
/// significant byte of `0x00`/`0x80` whose sign bit could have lived on the
/// previous byte) are rejected.
pub fn decode_script_number(
    bytes: &[u8],
    require_minimal: bool,
    max_length: usize,
) -> Result<i64, VmError> {
    if bytes.len() > max_length {
        return Err(VmError::ExceededMaximumScriptNumberLength);
    }
    if bytes.is_empty() {
        return Ok(0);
    }
    let last = bytes[bytes.len() - 1];
    if require_minimal
        && last & 0x7f == 0
        && (bytes.len() == 1 || bytes[bytes.len() - 2] & 0x80 == 0)
    {
        return Err(VmError::RequiresMinimalEncoding);
    }
    let mut result: i64 = 0;
    for (index, byte) in bytes.iter().enumerate() {
        if index == bytes.len() - 1 {
            result |= i64::from(byte & 0x7f) << (8 * index);
        } else {
            result |= i64::from(*byte) << (8 * index);
        }
    }
    if last & 0x80 != 0 {
        result = -result;
    }
    Ok(result)
}

/// Encode an integer as a minimal script number.
pub fn encode_script_number(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    let mut bytes = Vec::new();
    while magnitude > 0 {
        bytes.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }
    finish_sign_magnitude(bytes, negative)
}

/// Encode an arbitrary-precision integer as a minimal script number.
///
/// Template integer literals are unbounded, so this path avoids the `i64`
/// range entirely. `0` encodes as the empty vector.
pub fn encode_bigint(value: &BigInt) -> Vec<u8> {
    let (sign, magnitude) = value.to_bytes_le();
    if sign == Sign::NoSign {
        return Vec::new();
    }
    finish_sign_magnitude(magnitude, sign == Sign::Minus)
}

fn finish_sign_magnitude(mut bytes: Vec<u8>, negative: bool) -> Vec<u8> {
    // The top magnitude bit collides with the sign bit: grow by one byte.
    if bytes.last().is_some_and(|byte| byte & 0x80 != 0) {
        bytes.push(0);
    }
    if negative {
        if let Some(last) = bytes.last_mut() {
            *last |= 0x80;
        }
    }
    bytes
}

/// Re-encode a raw stack item as the minimal script number with equal value.
///
/// Used by `OP_BIN2NUM`/`OP_NUM2BIN`, which accept non-minimal inputs of any
/// length. The sign bit of the final byte is preserved across the trim.
pub fn minimize_number_bytes(mut bytes: Vec<u8>) -> Vec<u8> {
    let Some(&last) = bytes.last() else {
        return bytes;
    };
    if last & 0x7f != 0 {
        return bytes;
    }
    if bytes.len() == 1 {
        return Vec::new();
    }
    // The final byte carries only the sign. It can be dropped unless the
    // previous byte already uses its top bit for magnitude.
    if bytes[bytes.len() - 2] & 0x80 != 0 {
        return bytes;
    }
    let sign = last & 0x80;
    for index in (1..bytes.len()).rev() {
        if bytes[index - 1] != 0 {
            if bytes[index - 1] & 0x80 != 0 {
                bytes[index] = sign;
                bytes.truncate(index + 1);
            } else {
                bytes[index - 1] |= sign;
                bytes.truncate(index);
            }
            return bytes;
        }
    }
    // All-zero magnitude is numerically zero regardless of sign.
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_basics() {
        assert_eq!(encode_script_number(0), Vec::<u8>::new());
        assert_eq!(encode_script_number(1), vec![0x01]);
        assert_eq!(encode_script_number(-1), vec![0x81]);
        assert_eq!(encode_script_number(127), vec![0x7f]);
        assert_eq!(encode_script_number(128), vec![0x80, 0x00]);
        assert_eq!(encode_script_number(-128), vec![0x80, 0x80]);
        assert_eq!(encode_script_number(256), vec![0x00, 0x01]);
        assert_eq!(encode_script_number(-32768), vec![0x00, 0x80, 0x80]);
    }

    #[test]
    fn test_encode_bigint_matches_i64_encoding() {
        for value in [0i64, 1, -1, 127, 128, -128, 255, 256, 65535, -65536] {
            assert_eq!(
                encode_bigint(&BigInt::from(value)),
                encode_script_number(value),
                "value {value}"
            );
        }
    }

    #[test]
    fn test_decode_rejects_long_encoding() {
        let five = [0x01, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            decode_script_number(&five, false, MAX_SCRIPT_NUMBER_LENGTH),
            Err(VmError::ExceededMaximumScriptNumberLength)
        );
        assert_eq!(
            decode_script_number(&five, false, LOCKTIME_NUMBER_LENGTH),
            Ok(1)
        );
    }

    #[test]
    fn test_decode_minimal_encoding() {
        assert_eq!(
            decode_script_number(&[0x01, 0x00], true, 4),
            Err(VmError::RequiresMinimalEncoding)
        );
        assert_eq!(
            decode_script_number(&[0x00], true, 4),
            Err(VmError::RequiresMinimalEncoding)
        );
        // 0x80 in the second byte is load-bearing: it holds the sign.
        assert_eq!(decode_script_number(&[0x80, 0x00], true, 4), Ok(128));
        assert_eq!(decode_script_number(&[0x01, 0x00], false, 4), Ok(1));
    }

    #[test]
    fn test_minimize_number_bytes() {
        assert_eq!(minimize_number_bytes(vec![]), Vec::<u8>::new());
        assert_eq!(minimize_number_bytes(vec![0x00]), Vec::<u8>::new());
        assert_eq!(minimize_number_bytes(vec![0x80]), Vec::<u8>::new());
        assert_eq!(minimize_number_bytes(vec![0x01, 0x00]), vec![0x01]);
        assert_eq!(minimize_number_bytes(vec![0x01, 0x80]), vec![0x81]);
        assert_eq!(
            minimize_number_bytes(vec![0x80, 0x00, 0x00]),
            vec![0x80, 0x00]
        );
        assert_eq!(
            minimize_number_bytes(vec![0x80, 0x00, 0x80]),
            vec![0x80, 0x80]
        );
    }

    proptest! {
        #[test]
        fn prop_roundtrip(value in any::<i32>()) {
            let encoded = encode_script_number(i64::from(value));
            prop_assert!(encoded.len() <= 5);
            let decoded = decode_script_number(&encoded, true, 5).unwrap();
            prop_assert_eq!(decoded, i64::from(value));
        }

        #[test]
        fn prop_minimize_preserves_value(bytes in proptest::collection::vec(any::<u8>(), 0..4)) {
            let minimized = minimize_number_bytes(bytes.clone());
            let original = decode_script_number(&bytes, false, 4).unwrap();
            let trimmed = decode_script_number(&minimized, true, 4).unwrap();
            prop_assert_eq!(original, trimmed);
        }
    }
}
