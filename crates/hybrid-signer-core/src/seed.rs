//! The 32-byte account seed.
//!
//! A [`Seed`] is supplied once per logical account and deterministically
//! derives the software classical key (and, for ML-DSA-44, the post-quantum
//! key). It is wiped from memory on drop and never printed in full.

use core::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec::decode_hex;
use crate::error::{Error, Result};

/// A 32-byte secret seed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; Seed::BYTE_LEN]);

impl Seed {
    /// The length of a seed in bytes.
    pub const BYTE_LEN: usize = 32;

    /// Wraps raw seed bytes.
    #[must_use]
    pub const fn new(bytes: [u8; Self::BYTE_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates a seed from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLength`] if the slice is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; Self::BYTE_LEN] = bytes.try_into().map_err(|_| Error::InvalidLength {
            expected: Self::BYTE_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Parses a seed from a hex string, optionally `0x`-prefixed.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed hex or a length other than 32.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let mut bytes = decode_hex(hex_str, Some(Self::BYTE_LEN))?;
        let seed = Self::from_slice(&bytes);
        bytes.zeroize();
        seed
    }

    /// Exposes the raw seed bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; Self::BYTE_LEN] {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}
