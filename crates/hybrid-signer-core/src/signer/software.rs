//! In-memory signers.
//!
//! Key material lives in process memory:
//!
//! - [`SoftwareClassicalSigner`]: the 32-byte seed is the secp256k1 scalar
//! - [`MlDsa44Signer`]: deterministic key generation from the same seed
//! - [`Falcon512Signer`]: random key generation, persisted as key bytes

use core::fmt;

use alloy_primitives::{Address, B256};
use fips204::ml_dsa_44;
use fips204::traits::{KeyGen, SerDes, Signer as _};
use k256::ecdsa::SigningKey;
use pqcrypto_falcon::falcon512;
use pqcrypto_traits::sign::{PublicKey as _, SecretKey as _, SignedMessage as _};

use super::{ClassicalSigner, PostQuantumSigner};
use crate::address::address_from_verifying_key;
use crate::crypto::sign_prehash;
use crate::error::{Error, Result};
use crate::lattice::PqAlgorithm;
use crate::seed::Seed;
use crate::signature::Signature;

/// A secp256k1 signer holding its key in memory.
pub struct SoftwareClassicalSigner {
    key: SigningKey,
    address: Address,
}

impl fmt::Debug for SoftwareClassicalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareClassicalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl SoftwareClassicalSigner {
    /// Uses the seed bytes directly as the private scalar.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSeed`] if the seed is zero or not below the
    /// curve order.
    pub fn from_seed(seed: &Seed) -> Result<Self> {
        let key = SigningKey::from_slice(seed.as_bytes()).map_err(|_| {
            Error::InvalidSeed("seed is not a valid secp256k1 scalar".to_string())
        })?;
        let address = address_from_verifying_key(key.verifying_key());
        Ok(Self { key, address })
    }
}

impl ClassicalSigner for SoftwareClassicalSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_hash(&self, hash: &B256) -> Result<Signature> {
        sign_prehash(&self.key, hash)
    }
}

/// An ML-DSA-44 signer with a seed-derived key.
pub struct MlDsa44Signer {
    public_key: Vec<u8>,
    private_key: ml_dsa_44::PrivateKey,
}

impl fmt::Debug for MlDsa44Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MlDsa44Signer")
            .field("public_key_len", &self.public_key.len())
            .finish_non_exhaustive()
    }
}

impl MlDsa44Signer {
    /// Derives the key pair deterministically from the seed.
    #[must_use]
    pub fn from_seed(seed: &Seed) -> Self {
        let (public_key, private_key) = ml_dsa_44::KG::keygen_from_seed(seed.as_bytes());
        Self {
            public_key: public_key.into_bytes().to_vec(),
            private_key,
        }
    }
}

impl PostQuantumSigner for MlDsa44Signer {
    fn algorithm(&self) -> PqAlgorithm {
        PqAlgorithm::MlDsa44
    }

    fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature = self
            .private_key
            .try_sign(message, &[])
            .map_err(|e| Error::SigningFailed(e.to_string()))?;
        Ok(signature.to_vec())
    }
}

/// A Falcon-512 signer.
pub struct Falcon512Signer {
    public_key: Vec<u8>,
    secret_key: falcon512::SecretKey,
}

impl fmt::Debug for Falcon512Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Falcon512Signer")
            .field("public_key_len", &self.public_key.len())
            .finish_non_exhaustive()
    }
}

impl Falcon512Signer {
    /// Generates a fresh key pair from the system RNG.
    #[must_use]
    pub fn generate() -> Self {
        let (public_key, secret_key) = falcon512::keypair();
        Self {
            public_key: public_key.as_bytes().to_vec(),
            secret_key,
        }
    }

    /// Restores a signer from stored key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPublicKey`] or [`Error::InvalidSeed`] if
    /// either key has the wrong length.
    pub fn from_key_bytes(public_key: &[u8], secret_key: &[u8]) -> Result<Self> {
        let public = falcon512::PublicKey::from_bytes(public_key)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        let secret_key = falcon512::SecretKey::from_bytes(secret_key)
            .map_err(|e| Error::InvalidSeed(format!("Falcon-512 secret key: {e}")))?;
        Ok(Self {
            public_key: public.as_bytes().to_vec(),
            secret_key,
        })
    }

    /// Exposes the secret key bytes for persistence.
    #[must_use]
    pub fn secret_key_bytes(&self) -> &[u8] {
        self.secret_key.as_bytes()
    }
}

impl PostQuantumSigner for Falcon512Signer {
    fn algorithm(&self) -> PqAlgorithm {
        PqAlgorithm::Falcon512
    }

    fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signed = falcon512::sign(message, &self.secret_key);
        PqAlgorithm::Falcon512.finalize_signature(signed.as_bytes(), message.len())
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use fips204::traits::Verifier as _;

    use super::*;
    use crate::crypto::recover_address;

    fn seed(last: u8) -> Seed {
        let mut bytes = [0u8; 32];
        bytes[31] = last;
        Seed::new(bytes)
    }

    #[test]
    fn classical_address_from_seed_one() {
        let signer = SoftwareClassicalSigner::from_seed(&seed(1)).unwrap();
        assert_eq!(
            signer.address(),
            address!("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf")
        );

        let hash = B256::repeat_byte(0x77);
        let sig = signer.sign_hash(&hash).unwrap();
        assert_eq!(recover_address(&hash, &sig).unwrap(), signer.address());
    }

    #[test]
    fn classical_rejects_zero_and_overflowing_seed() {
        assert!(matches!(
            SoftwareClassicalSigner::from_seed(&seed(0)),
            Err(Error::InvalidSeed(_))
        ));
        assert!(matches!(
            SoftwareClassicalSigner::from_seed(&Seed::new([0xFF; 32])),
            Err(Error::InvalidSeed(_))
        ));
    }

    #[test]
    fn mldsa_key_is_deterministic() {
        let a = MlDsa44Signer::from_seed(&seed(1));
        let b = MlDsa44Signer::from_seed(&seed(1));
        let c = MlDsa44Signer::from_seed(&seed(2));

        assert_eq!(a.public_key().len(), 1312);
        assert_eq!(a.public_key(), b.public_key());
        assert_ne!(a.public_key(), c.public_key());
    }

    #[test]
    fn mldsa_signature_verifies() {
        let signer = MlDsa44Signer::from_seed(&seed(3));
        let message = B256::repeat_byte(0x10);
        let sig = signer.sign(message.as_slice()).unwrap();
        assert_eq!(sig.len(), 2420);

        let pk_bytes: [u8; 1312] = signer.public_key().try_into().unwrap();
        let pk = ml_dsa_44::PublicKey::try_from_bytes(pk_bytes).unwrap();
        let sig_bytes: [u8; 2420] = sig.as_slice().try_into().unwrap();
        assert!(pk.verify(message.as_slice(), &sig_bytes, &[]));
    }

    #[test]
    fn mldsa_encoded_public_key() {
        let signer = MlDsa44Signer::from_seed(&seed(4));
        let encoded = signer.encoded_public_key().unwrap();
        // 3 head words, then the nested arrays; just check it is word aligned
        // and far larger than the raw key.
        assert_eq!(encoded.len() % 32, 0);
        assert!(encoded.len() > 20 * 32 * 32);
    }

    #[test]
    fn falcon_sign_and_restore() {
        let signer = Falcon512Signer::generate();
        assert_eq!(signer.public_key().len(), 897);

        let sig = signer.sign(&[0x42; 32]).unwrap();
        assert_eq!(sig.len(), 1064);

        let restored =
            Falcon512Signer::from_key_bytes(signer.public_key(), signer.secret_key_bytes())
                .unwrap();
        assert_eq!(restored.public_key(), signer.public_key());
        assert_eq!(restored.sign(&[0x42; 32]).unwrap().len(), 1064);
        assert_eq!(restored.encoded_public_key().unwrap(), signer.public_key());
    }

    #[test]
    fn falcon_rejects_bad_key_bytes() {
        assert!(Falcon512Signer::from_key_bytes(&[0u8; 10], &[0u8; 10]).is_err());
    }
}
