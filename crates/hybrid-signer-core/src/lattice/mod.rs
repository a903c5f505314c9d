//! Post-quantum backends and their on-chain encodings.
//!
//! Two lattice signature schemes back the post-quantum half of a hybrid
//! signature. They share one capability and differ only in how keys and
//! signatures are laid out for the verifying contract:
//!
//! | Backend | Public key on-chain | Signature on-chain |
//! |---|---|---|
//! | ML-DSA-44 | expanded `(aHat, tr, t1)`, see [`mldsa`] | raw, 2420 bytes |
//! | Falcon-512 | raw, 897 bytes | compact `nonce ‖ s2`, 1064 bytes, see [`falcon`] |
//!
//! # Submodules
//!
//! - [`packing`]: coefficient bit-packing into 256-bit words
//! - [`mldsa`]: ML-DSA-44 matrix expansion and NTT
//! - [`falcon`]: Falcon-512 signature decoding and compaction

pub mod falcon;
pub mod mldsa;
pub mod packing;

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use mldsa::EncodedPublicKey;

/// Length of an ML-DSA-44 signature.
pub const MLDSA44_SIGNATURE_LEN: usize = 2420;

/// The post-quantum signature scheme of a hybrid key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PqAlgorithm {
    /// ML-DSA-44 (FIPS 204), public key re-expanded for the verifier.
    #[serde(rename = "ml-dsa-44")]
    MlDsa44,
    /// Falcon-512, signatures compacted for the verifier.
    #[serde(rename = "falcon-512")]
    Falcon512,
}

impl PqAlgorithm {
    /// Returns the raw public key length in bytes.
    #[must_use]
    pub const fn public_key_len(self) -> usize {
        match self {
            Self::MlDsa44 => mldsa::PUBLIC_KEY_LEN,
            Self::Falcon512 => falcon::PUBLIC_KEY_LEN,
        }
    }

    /// Returns the length of the signature as submitted on-chain.
    ///
    /// This is also the length of the dummy signature used for gas
    /// estimation.
    #[must_use]
    pub const fn onchain_signature_len(self) -> usize {
        match self {
            Self::MlDsa44 => MLDSA44_SIGNATURE_LEN,
            Self::Falcon512 => falcon::COMPACT_SIGNATURE_LEN,
        }
    }

    /// Returns the P2 byte that selects this algorithm on a secure element.
    #[must_use]
    pub const fn device_code(self) -> u8 {
        match self {
            Self::MlDsa44 => 0x00,
            Self::Falcon512 => 0x01,
        }
    }

    /// Parses the secure-element algorithm selector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown code.
    pub fn from_device_code(code: u8) -> Result<Self> {
        match code {
            0x00 => Ok(Self::MlDsa44),
            0x01 => Ok(Self::Falcon512),
            other => Err(Error::Validation(format!(
                "unknown post-quantum algorithm code {other:#04x}"
            ))),
        }
    }

    /// Encodes a raw public key for the verifying contract.
    ///
    /// ML-DSA-44 keys are expanded and ABI-encoded; Falcon-512 keys pass
    /// through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPublicKey`] if the key has the wrong length.
    pub fn encode_public_key(self, public_key: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::MlDsa44 => Ok(EncodedPublicKey::from_public_key(public_key)?.abi_encode()),
            Self::Falcon512 => {
                if public_key.len() != falcon::PUBLIC_KEY_LEN {
                    return Err(Error::InvalidPublicKey(format!(
                        "Falcon-512 public key must be {} bytes, got {}",
                        falcon::PUBLIC_KEY_LEN,
                        public_key.len()
                    )));
                }
                Ok(public_key.to_vec())
            }
        }
    }

    /// Turns the signing primitive's raw output into the on-chain form.
    ///
    /// # Arguments
    ///
    /// * `raw` - Bytes returned by the software primitive or the device
    /// * `message_len` - Length of the signed message (Falcon only)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the raw output has the wrong shape.
    pub fn finalize_signature(self, raw: &[u8], message_len: usize) -> Result<Vec<u8>> {
        match self {
            Self::MlDsa44 => {
                if raw.len() != MLDSA44_SIGNATURE_LEN {
                    return Err(Error::Protocol(format!(
                        "ML-DSA-44 signature must be {MLDSA44_SIGNATURE_LEN} bytes, got {}",
                        raw.len()
                    )));
                }
                Ok(raw.to_vec())
            }
            Self::Falcon512 => falcon::compact_signature(raw, message_len),
        }
    }
}

impl fmt::Display for PqAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MlDsa44 => write!(f, "ML-DSA-44"),
            Self::Falcon512 => write!(f, "Falcon-512"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths() {
        assert_eq!(PqAlgorithm::MlDsa44.public_key_len(), 1312);
        assert_eq!(PqAlgorithm::Falcon512.public_key_len(), 897);
        assert_eq!(PqAlgorithm::MlDsa44.onchain_signature_len(), 2420);
        assert_eq!(PqAlgorithm::Falcon512.onchain_signature_len(), 1064);
    }

    #[test]
    fn device_code_roundtrip() {
        for alg in [PqAlgorithm::MlDsa44, PqAlgorithm::Falcon512] {
            assert_eq!(PqAlgorithm::from_device_code(alg.device_code()).unwrap(), alg);
        }
        assert!(PqAlgorithm::from_device_code(0x02).is_err());
    }

    #[test]
    fn falcon_key_passes_through() {
        let pk = vec![0x09u8; 897];
        assert_eq!(PqAlgorithm::Falcon512.encode_public_key(&pk).unwrap(), pk);
        assert!(PqAlgorithm::Falcon512.encode_public_key(&pk[1..]).is_err());
    }

    #[test]
    fn mldsa_signature_length_is_checked() {
        assert!(PqAlgorithm::MlDsa44
            .finalize_signature(&[0u8; 2420], 32)
            .is_ok());
        assert!(matches!(
            PqAlgorithm::MlDsa44.finalize_signature(&[0u8; 2419], 32),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn serde_names() {
        assert_eq!(
            serde_json::to_string(&PqAlgorithm::MlDsa44).unwrap(),
            "\"ml-dsa-44\""
        );
        assert_eq!(
            serde_json::from_str::<PqAlgorithm>("\"falcon-512\"").unwrap(),
            PqAlgorithm::Falcon512
        );
    }
}
