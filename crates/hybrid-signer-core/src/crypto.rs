//! secp256k1 ECDSA helpers for the classical half of a hybrid signature.
//!
//! This module provides:
//!
//! - Recoverable signing of a 32-byte prehash (no EIP-191 prefix)
//! - Low-S normalization of signatures produced elsewhere (secure elements)
//! - Signer recovery for low-S signatures
//!
//! # Example
//!
//! ```
//! use alloy_primitives::B256;
//! use hybrid_signer_core::crypto::{recover_address, sign_prehash};
//! use k256::ecdsa::SigningKey;
//!
//! let key = SigningKey::from_slice(&[7u8; 32]).unwrap();
//! let hash = B256::repeat_byte(0x11);
//! let sig = sign_prehash(&key, &hash).unwrap();
//! let signer = recover_address(&hash, &sig).unwrap();
//! assert_eq!(signer.len(), 20);
//! ```

use alloy_primitives::{Address, B256};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};

use crate::address::address_from_verifying_key;
use crate::error::{Error, Result};
use crate::signature::Signature;

/// Signs a 32-byte hash and returns an Ethereum-style recoverable signature.
///
/// `k256` always produces low-S signatures; the recovery id is adjusted to
/// match.
///
/// # Errors
///
/// Returns [`Error::SigningFailed`] if the signing primitive fails.
pub fn sign_prehash(key: &SigningKey, hash: &B256) -> Result<Signature> {
    let (sig, recovery_id) = key
        .sign_prehash_recoverable(hash.as_slice())
        .map_err(|e| Error::SigningFailed(e.to_string()))?;

    Ok(to_ethereum_signature(&sig, recovery_id))
}

/// Normalizes a signature to low-S form, flipping `v` when `s` is negated.
///
/// Secure elements are not guaranteed to emit low-S signatures; the EVM's
/// `ecrecover` accepts both but many account contracts reject high-S.
///
/// # Errors
///
/// Returns [`Error::InvalidSignature`] if `r` or `s` is not a valid scalar
/// or `v` is not 27/28.
pub fn normalize_s(signature: &Signature) -> Result<Signature> {
    let sig = parse_scalars(signature)?;
    let recovery_id = signature
        .recovery_id()
        .ok_or_else(|| Error::InvalidSignature("invalid recovery byte".to_string()))?;

    match sig.normalize_s() {
        Some(normalized) => {
            let flipped = RecoveryId::from_byte(recovery_id ^ 1)
                .ok_or_else(|| Error::InvalidSignature("invalid recovery id".to_string()))?;
            Ok(to_ethereum_signature(&normalized, flipped))
        }
        None => Ok(*signature),
    }
}

/// Recovers the signer's verifying key from a signature over `hash`.
///
/// Unlike `ecrecover`, high-S signatures are rejected; pass device output
/// through [`normalize_s`] first.
///
/// # Errors
///
/// Returns [`Error::InvalidSignature`] for malformed components and
/// [`Error::RecoveryFailed`] if no key can be recovered, including for
/// high-S input.
pub fn recover_verifying_key(hash: &B256, signature: &Signature) -> Result<VerifyingKey> {
    let sig = parse_scalars(signature)?;
    let recovery_id = signature
        .recovery_id()
        .and_then(RecoveryId::from_byte)
        .ok_or_else(|| Error::InvalidSignature("invalid recovery byte".to_string()))?;

    VerifyingKey::recover_from_prehash(hash.as_slice(), &sig, recovery_id)
        .map_err(|_| Error::RecoveryFailed)
}

/// Recovers the signer's Ethereum address from a low-S signature.
///
/// # Errors
///
/// Same as [`recover_verifying_key`].
pub fn recover_address(hash: &B256, signature: &Signature) -> Result<Address> {
    recover_verifying_key(hash, signature).map(|key| address_from_verifying_key(&key))
}

/// Checks that `signature` over `hash` was produced by `expected`.
///
/// # Errors
///
/// Returns [`Error::Protocol`] when the recovered signer differs, which
/// indicates the signer hashed different bytes than the host.
pub fn ensure_signer(hash: &B256, signature: &Signature, expected: Address) -> Result<()> {
    let recovered = recover_address(hash, signature)?;
    if recovered != expected {
        return Err(Error::Protocol(format!(
            "signature recovers to {recovered}, expected {expected}"
        )));
    }
    Ok(())
}

fn parse_scalars(signature: &Signature) -> Result<K256Signature> {
    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(signature.r());
    rs[32..].copy_from_slice(signature.s());
    K256Signature::from_slice(&rs)
        .map_err(|_| Error::InvalidSignature("invalid signature scalars".to_string()))
}

fn to_ethereum_signature(sig: &K256Signature, recovery_id: RecoveryId) -> Signature {
    let bytes = sig.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..64]);
    Signature::new(r, s, recovery_id.to_byte() + Signature::V_OFFSET)
}
