//! Signing capabilities.
//!
//! A hybrid account is authorized by two independent signatures. Each half
//! is a capability with a software implementation ([`software`]) and a
//! secure-element implementation ([`crate::device::signer`]):
//!
//! - [`ClassicalSigner`]: secp256k1 ECDSA over a 32-byte hash
//! - [`PostQuantumSigner`]: a lattice signature over arbitrary bytes,
//!   already in the form the verifying contract expects
//!
//! [`OperationSigner`] is what the submission pipeline consumes: something
//! that turns an operation into a [`HybridSignature`].

pub mod hybrid;
pub mod software;

use alloy_primitives::{Address, B256};

use crate::error::Result;
use crate::lattice::PqAlgorithm;
use crate::operation::PackedUserOperation;
use crate::signature::Signature;

pub use hybrid::{HybridSignature, HybridSigner};
pub use software::{Falcon512Signer, MlDsa44Signer, SoftwareClassicalSigner};

/// Produces secp256k1 signatures recoverable to a fixed address.
pub trait ClassicalSigner: Send + Sync {
    /// Returns the Ethereum address the signatures recover to.
    fn address(&self) -> Address;

    /// Signs a 32-byte hash without any message prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing primitive or the device fails.
    fn sign_hash(&self, hash: &B256) -> Result<Signature>;
}

/// Produces post-quantum signatures in on-chain form.
pub trait PostQuantumSigner: Send + Sync {
    /// Returns the backend algorithm.
    fn algorithm(&self) -> PqAlgorithm;

    /// Returns the raw public key.
    fn public_key(&self) -> &[u8];

    /// Signs `message`, returning the signature the verifier consumes.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing primitive or the device fails, or
    /// the raw signature has an unexpected shape.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// Returns the public key encoded for the verifying contract.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidPublicKey`] if the key is malformed.
    fn encoded_public_key(&self) -> Result<Vec<u8>> {
        self.algorithm().encode_public_key(self.public_key())
    }
}

/// Signs whole user operations with a hybrid signature.
pub trait OperationSigner: Send + Sync {
    /// Returns the post-quantum backend, which fixes the signature length.
    fn algorithm(&self) -> PqAlgorithm;

    /// Signs the operation hash bound to `verifying_contract` and `chain_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if either half fails to sign.
    fn sign_operation(
        &self,
        op: &PackedUserOperation,
        verifying_contract: Address,
        chain_id: u64,
    ) -> Result<HybridSignature>;

    /// Returns a placeholder of the real signature's exact length.
    fn dummy_signature(&self) -> HybridSignature {
        HybridSignature::dummy(self.algorithm())
    }
}
