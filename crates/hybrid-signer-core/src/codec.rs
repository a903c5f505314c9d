//! Strict hex encoding and decoding.
//!
//! Every byte string that crosses a trust boundary (seeds, hashes, keys,
//! signatures typed in by a user or read from JSON) goes through
//! [`decode_hex`], which rejects anything ambiguous before cryptography runs.
//!
//! # Example
//!
//! ```
//! use hybrid_signer_core::codec::{decode_hex, encode_hex};
//!
//! let bytes = decode_hex("0xdeadbeef", Some(4)).unwrap();
//! assert_eq!(encode_hex(&bytes), "0xdeadbeef");
//! ```

use crate::error::{Error, Result};

/// Decodes a hex string, optionally prefixed with `0x` or `0X`.
///
/// When `expected_len` is given, the decoded byte length must match it.
///
/// # Errors
///
/// - [`Error::HexDecodeFailed`] for odd length or non-hex characters
/// - [`Error::InvalidLength`] when `expected_len` does not match
pub fn decode_hex(s: &str, expected_len: Option<usize>) -> Result<Vec<u8>> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);

    if digits.len() % 2 != 0 {
        return Err(Error::HexDecodeFailed(format!(
            "odd number of hex digits ({})",
            digits.len()
        )));
    }

    let bytes = hex::decode(digits)?;

    if let Some(expected) = expected_len
        && bytes.len() != expected
    {
        return Err(Error::InvalidLength {
            expected,
            actual: bytes.len(),
        });
    }

    Ok(bytes)
}

/// Decodes a hex string into a fixed-size array.
///
/// # Errors
///
/// Same as [`decode_hex`] with `expected_len = N`.
pub fn decode_hex_array<const N: usize>(s: &str) -> Result<[u8; N]> {
    let bytes = decode_hex(s, Some(N))?;
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Encodes bytes as a lowercase `0x`-prefixed hex string.
///
/// This is the exact inverse of [`decode_hex`].
#[must_use]
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_various_lengths() {
        for len in [0usize, 1, 2, 31, 32, 33, 65, 1312] {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
            let encoded = encode_hex(&bytes);
            assert_eq!(decode_hex(&encoded, Some(len)).unwrap(), bytes);
        }
    }

    #[test]
    fn empty_string_decodes_to_empty() {
        assert!(decode_hex("", None).unwrap().is_empty());
        assert!(decode_hex("0x", Some(0)).unwrap().is_empty());
    }

    #[test]
    fn accepts_missing_and_uppercase_prefix() {
        assert_eq!(decode_hex("ABcd", None).unwrap(), vec![0xab, 0xcd]);
        assert_eq!(decode_hex("0XABcd", None).unwrap(), vec![0xab, 0xcd]);
    }

    #[test]
    fn rejects_odd_length() {
        let err = decode_hex("0xabc", None).unwrap_err();
        assert!(matches!(err, Error::HexDecodeFailed(_)));
        assert!(err.is_validation());
    }

    #[test]
    fn rejects_non_hex_characters() {
        let err = decode_hex("0xzz", None).unwrap_err();
        assert!(matches!(err, Error::HexDecodeFailed(_)));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = decode_hex("0x0102", Some(3)).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidLength {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn decode_into_array() {
        let arr: [u8; 2] = decode_hex_array("0x0a0b").unwrap();
        assert_eq!(arr, [0x0a, 0x0b]);
        assert!(decode_hex_array::<3>("0x0a0b").is_err());
    }
}
