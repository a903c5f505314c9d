//! Hybrid signature assembly.
//!
//! A [`HybridSignature`] travels in the operation's `signature` field as
//! `abi.encode(bytes classical, bytes pq)`:
//!
//! ```text
//! | offset (32) | offset (32) | len (32) | classical, padded | len (32) | pq, padded |
//! ```
//!
//! # Example
//!
//! ```
//! use hybrid_signer_core::lattice::PqAlgorithm;
//! use hybrid_signer_core::signer::HybridSignature;
//!
//! let dummy = HybridSignature::dummy(PqAlgorithm::Falcon512);
//! let decoded = HybridSignature::decode(&dummy.encode()).unwrap();
//! assert_eq!(decoded.pq().len(), 1064);
//! ```

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolValue;
use tracing::debug;

use super::{ClassicalSigner, OperationSigner, PostQuantumSigner};
use crate::error::Result;
use crate::lattice::PqAlgorithm;
use crate::operation::{PackedUserOperation, operation_hash};
use crate::signature::Signature;

/// Fill byte of dummy signatures.
pub const DUMMY_BYTE: u8 = 0xFF;

/// A classical and a post-quantum signature over the same operation hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridSignature {
    classical: Vec<u8>,
    pq: Vec<u8>,
}

impl HybridSignature {
    /// Combines a classical signature with a post-quantum one.
    #[must_use]
    pub fn new(classical: &Signature, pq: Vec<u8>) -> Self {
        Self {
            classical: classical.to_bytes().to_vec(),
            pq,
        }
    }

    /// Builds a signature of the exact length a real one for `algorithm`
    /// would have, every byte set to [`DUMMY_BYTE`].
    #[must_use]
    pub fn dummy(algorithm: PqAlgorithm) -> Self {
        Self {
            classical: vec![DUMMY_BYTE; Signature::BYTE_LEN],
            pq: vec![DUMMY_BYTE; algorithm.onchain_signature_len()],
        }
    }

    /// Returns the classical half, 65 bytes `r ‖ s ‖ v`.
    #[must_use]
    pub fn classical(&self) -> &[u8] {
        &self.classical
    }

    /// Returns the post-quantum half.
    #[must_use]
    pub fn pq(&self) -> &[u8] {
        &self.pq
    }

    /// ABI-encodes as `(bytes, bytes)`.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        (
            Bytes::copy_from_slice(&self.classical),
            Bytes::copy_from_slice(&self.pq),
        )
            .abi_encode_params()
            .into()
    }

    /// Decodes an ABI-encoded `(bytes, bytes)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AbiDecodeFailed`] if `data` is not a valid
    /// encoding.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (classical, pq) = <(Bytes, Bytes)>::abi_decode_params(data)?;
        Ok(Self {
            classical: classical.to_vec(),
            pq: pq.to_vec(),
        })
    }
}

/// Pairs a classical and a post-quantum signer into an [`OperationSigner`].
pub struct HybridSigner {
    classical: Box<dyn ClassicalSigner>,
    pq: Box<dyn PostQuantumSigner>,
}

impl core::fmt::Debug for HybridSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HybridSigner")
            .field("address", &self.classical.address())
            .field("algorithm", &self.pq.algorithm())
            .finish_non_exhaustive()
    }
}

impl HybridSigner {
    /// Creates a hybrid signer from its two halves.
    #[must_use]
    pub fn new(classical: Box<dyn ClassicalSigner>, pq: Box<dyn PostQuantumSigner>) -> Self {
        Self { classical, pq }
    }

    /// Returns the classical signer's address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.classical.address()
    }

    /// Returns the post-quantum signer.
    #[must_use]
    pub fn post_quantum(&self) -> &dyn PostQuantumSigner {
        self.pq.as_ref()
    }
}

impl OperationSigner for HybridSigner {
    fn algorithm(&self) -> PqAlgorithm {
        self.pq.algorithm()
    }

    fn sign_operation(
        &self,
        op: &PackedUserOperation,
        verifying_contract: Address,
        chain_id: u64,
    ) -> Result<HybridSignature> {
        let hash = operation_hash(op, verifying_contract, chain_id);
        debug!(%hash, algorithm = %self.pq.algorithm(), "signing operation");

        let classical = self.classical.sign_hash(&hash)?;
        let pq = self.pq.sign(hash.as_slice())?;
        Ok(HybridSignature::new(&classical, pq))
    }
}
