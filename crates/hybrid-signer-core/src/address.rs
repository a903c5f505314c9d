//! Ethereum address derivation from secp256k1 public keys.
//!
//! The classical half of a hybrid key is an ordinary Ethereum EOA key. Its
//! address is derived the standard way:
//!
//! 1. Take the uncompressed public key (65 bytes: `0x04 || x || y`)
//! 2. Remove the `0x04` prefix to get 64 bytes (`x || y`)
//! 3. Compute the Keccak-256 hash of the 64 bytes
//! 4. Take the last 20 bytes of the hash as the address
//!
//! Secure elements return the raw uncompressed point, so both a typed
//! [`VerifyingKey`] and raw bytes are accepted.
//!
//! # Example
//!
//! ```
//! use hybrid_signer_core::address::address_from_public_key_bytes;
//!
//! let addr = address_from_public_key_bytes(&[0u8; 64]).unwrap();
//! assert_eq!(addr.len(), 20);
//! ```

use alloy_primitives::{Address, keccak256};
use k256::ecdsa::VerifyingKey;

use crate::error::{Error, Result};

/// Length of an uncompressed SEC1 secp256k1 point.
pub const UNCOMPRESSED_POINT_LEN: usize = 65;

/// Derives the Ethereum address of a secp256k1 verifying key.
#[must_use]
pub fn address_from_verifying_key(public_key: &VerifyingKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    hash_to_address(&encoded.as_bytes()[1..])
}

/// Derives an Ethereum address from raw public key bytes.
///
/// Accepts either 65 bytes (`0x04 || x || y`) or 64 bytes (`x || y`).
///
/// # Errors
///
/// Returns [`Error::InvalidPublicKey`] if:
/// - The byte length is not 64 or 65
/// - For 65-byte input, the first byte is not `0x04`
pub fn address_from_public_key_bytes(bytes: &[u8]) -> Result<Address> {
    let xy = match bytes.len() {
        64 => bytes,
        UNCOMPRESSED_POINT_LEN => {
            if bytes[0] != 0x04 {
                return Err(Error::InvalidPublicKey(
                    "65-byte public key must start with 0x04".to_string(),
                ));
            }
            &bytes[1..]
        }
        len => {
            return Err(Error::InvalidPublicKey(format!(
                "expected 64 or 65 bytes, got {len}"
            )));
        }
    };

    Ok(hash_to_address(xy))
}

fn hash_to_address(xy: &[u8]) -> Address {
    let hash = keccak256(xy);
    Address::from_slice(&hash[12..])
}
