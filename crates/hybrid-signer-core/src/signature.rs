//! Classical secp256k1 ECDSA signatures in Ethereum wire format.
//!
//! This module provides the [`Signature`] type holding the classical half of
//! a hybrid signature. On-chain verifiers feed it to `ecrecover`, so it uses
//! the Ethereum layout:
//!
//! - `r`: 32-byte big-endian scalar
//! - `s`: 32-byte big-endian scalar, always in the lower half of the order
//! - `v`: recovery parameter, `27` or `28`
//!
//! Secure elements answer with `v || r || s`; software and on-chain code use
//! `r || s || v`. Both layouts are handled here.
//!
//! # Example
//!
//! ```
//! use hybrid_signer_core::Signature;
//!
//! let sig = Signature::new([1u8; 32], [2u8; 32], 27);
//! assert_eq!(sig.to_bytes().len(), 65);
//! assert_eq!(sig.recovery_id(), Some(0));
//! ```

use core::fmt;

use crate::codec::{decode_hex, encode_hex};
use crate::error::{Error, Result};

/// A secp256k1 ECDSA signature with an Ethereum recovery byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// The R component of the signature (32 bytes).
    r: [u8; 32],

    /// The S component of the signature (32 bytes).
    s: [u8; 32],

    /// The recovery parameter (`27` or `28`).
    v: u8,
}

impl Signature {
    /// The length of a serialized signature in bytes.
    pub const BYTE_LEN: usize = 65;

    /// Offset added to the raw recovery id to form `v`.
    pub const V_OFFSET: u8 = 27;

    /// Creates a new signature from raw components.
    #[must_use]
    pub const fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// Creates a signature from a 65-byte `r || s || v` slice.
    ///
    /// A raw recovery id (`0`/`1`) in the last byte is lifted to `27`/`28`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] if the slice is not exactly 65
    /// bytes or `v` is not one of `0`, `1`, `27`, `28`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::BYTE_LEN {
            return Err(Error::InvalidSignature(format!(
                "expected {} bytes, got {}",
                Self::BYTE_LEN,
                bytes.len()
            )));
        }

        let (r, s) = split_scalars(&bytes[..64]);
        Ok(Self::new(r, s, normalize_v(bytes[64])?))
    }

    /// Creates a signature from the device layout `v || r || s`.
    ///
    /// # Errors
    ///
    /// Same as [`from_bytes`](Self::from_bytes).
    pub fn from_vrs_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::BYTE_LEN {
            return Err(Error::InvalidSignature(format!(
                "expected {} bytes, got {}",
                Self::BYTE_LEN,
                bytes.len()
            )));
        }

        let (r, s) = split_scalars(&bytes[1..]);
        Ok(Self::new(r, s, normalize_v(bytes[0])?))
    }

    /// Serializes the signature to a 65-byte `r || s || v` array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut bytes = [0u8; Self::BYTE_LEN];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Returns the R component of the signature.
    #[must_use]
    pub const fn r(&self) -> &[u8; 32] {
        &self.r
    }

    /// Returns the S component of the signature.
    #[must_use]
    pub const fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// Returns the recovery parameter (v).
    #[must_use]
    pub const fn v(&self) -> u8 {
        self.v
    }

    /// Returns the raw recovery id (`v - 27`), or `None` for an invalid `v`.
    #[must_use]
    pub const fn recovery_id(&self) -> Option<u8> {
        match self.v {
            27 | 28 => Some(self.v - Self::V_OFFSET),
            _ => None,
        }
    }

    /// Encodes the signature as a hex string with `0x` prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        encode_hex(&self.to_bytes())
    }

    /// Parses a signature from a hex string.
    ///
    /// # Errors
    ///
    /// Returns a hex or length error for malformed input, or
    /// [`Error::InvalidSignature`] for a bad recovery byte.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = decode_hex(hex_str, Some(Self::BYTE_LEN))?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn split_scalars(rs: &[u8]) -> ([u8; 32], [u8; 32]) {
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&rs[..32]);
    s.copy_from_slice(&rs[32..64]);
    (r, s)
}

fn normalize_v(v: u8) -> Result<u8> {
    match v {
        0 | 1 => Ok(v + Signature::V_OFFSET),
        27 | 28 => Ok(v),
        other => Err(Error::InvalidSignature(format!(
            "invalid recovery byte {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_new() {
        let sig = Signature::new([1u8; 32], [2u8; 32], 28);

        assert_eq!(sig.r(), &[1u8; 32]);
        assert_eq!(sig.s(), &[2u8; 32]);
        assert_eq!(sig.v(), 28);
        assert_eq!(sig.recovery_id(), Some(1));
    }

    #[test]
    fn from_bytes_lifts_raw_recovery_id() {
        let mut bytes = [0u8; 65];
        bytes[0..32].copy_from_slice(&[1u8; 32]);
        bytes[32..64].copy_from_slice(&[2u8; 32]);
        bytes[64] = 1;

        let sig = Signature::from_bytes(&bytes).unwrap();
        assert_eq!(sig.v(), 28);
        assert_eq!(sig.r(), &[1u8; 32]);
    }

    #[test]
    fn device_layout_puts_v_first() {
        let mut vrs = [0u8; 65];
        vrs[0] = 27;
        vrs[1..33].copy_from_slice(&[3u8; 32]);
        vrs[33..65].copy_from_slice(&[4u8; 32]);

        let sig = Signature::from_vrs_bytes(&vrs).unwrap();
        assert_eq!(sig, Signature::new([3u8; 32], [4u8; 32], 27));
    }

    #[test]
    fn rejects_bad_v() {
        let mut bytes = [0u8; 65];
        bytes[64] = 5;
        assert!(matches!(
            Signature::from_bytes(&bytes),
            Err(Error::InvalidSignature(_))
        ));
    }

    #[test]
    fn rejects_invalid_length() {
        let result = Signature::from_bytes(&[0u8; 64]);
        assert!(matches!(result, Err(Error::InvalidSignature(_))));
    }

    #[test]
    fn hex_roundtrip() {
        let sig = Signature::new([5u8; 32], [6u8; 32], 28);
        let recovered = Signature::from_hex(&sig.to_hex()).unwrap();
        assert_eq!(sig, recovered);
        assert_eq!(format!("{sig}").len(), 132);
    }
}
