//! Hardware implementations of the signing capabilities.
//!
//! All signers share one [`DeviceSession`] through a [`SharedSession`].
//! Each operation locks the session for its whole command sequence, so the
//! device never sees interleaved requests from two callers, and the guard
//! is released on every exit path.

use std::sync::{Arc, Mutex, MutexGuard};

use alloy_primitives::{Address, B256};
use tracing::{debug, info};

use super::path::DerivationPath;
use super::session::DeviceSession;
use crate::crypto::ensure_signer;
use crate::error::{Error, Result};
use crate::lattice::PqAlgorithm;
use crate::operation::{PackedUserOperation, operation_hash};
use crate::signature::Signature;
use crate::signer::{ClassicalSigner, HybridSignature, OperationSigner, PostQuantumSigner};

/// A device session shared between signers.
pub type SharedSession = Arc<Mutex<DeviceSession>>;

/// Wraps a session for sharing.
#[must_use]
pub fn share(session: DeviceSession) -> SharedSession {
    Arc::new(Mutex::new(session))
}

fn lock(session: &SharedSession) -> Result<MutexGuard<'_, DeviceSession>> {
    session
        .lock()
        .map_err(|_| Error::ChannelFailed("device session lock poisoned".to_string()))
}

/// The device's classical key.
#[derive(Debug)]
pub struct DeviceClassicalSigner {
    session: SharedSession,
    path: DerivationPath,
    address: Address,
}

impl DeviceClassicalSigner {
    /// Reads the key at `path` and caches its address.
    ///
    /// # Errors
    ///
    /// Returns a device or protocol error if the key cannot be read.
    pub fn new(session: SharedSession, path: DerivationPath) -> Result<Self> {
        let address = lock(&session)?.get_address(&path)?;
        debug!(%path, %address, "device classical signer ready");
        Ok(Self {
            session,
            path,
            address,
        })
    }
}

impl ClassicalSigner for DeviceClassicalSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_hash(&self, hash: &B256) -> Result<Signature> {
        let signature = lock(&self.session)?.sign_hash(&self.path, hash)?;
        ensure_signer(hash, &signature, self.address)?;
        Ok(signature)
    }
}

/// The device's post-quantum key.
#[derive(Debug)]
pub struct DevicePostQuantumSigner {
    session: SharedSession,
    path: DerivationPath,
    algorithm: PqAlgorithm,
    public_key: Vec<u8>,
}

impl DevicePostQuantumSigner {
    /// Derives the seed for `path`, generates the key pair on-device and
    /// reads its public key.
    ///
    /// # Errors
    ///
    /// Returns a device or protocol error.
    pub fn new(session: SharedSession, path: DerivationPath, algorithm: PqAlgorithm) -> Result<Self> {
        let public_key = {
            let mut guard = lock(&session)?;
            guard.derive_seed(&path, algorithm)?;
            guard.keygen_and_read_public_key(algorithm)?
        };
        debug!(%path, %algorithm, "device post-quantum signer ready");
        Ok(Self {
            session,
            path,
            algorithm,
            public_key,
        })
    }
}

impl PostQuantumSigner for DevicePostQuantumSigner {
    fn algorithm(&self) -> PqAlgorithm {
        self.algorithm
    }

    fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let raw = {
            let mut guard = lock(&self.session)?;
            guard.ensure_seed(&self.path, self.algorithm)?;
            guard.sign(self.algorithm, message)?
        };
        self.algorithm.finalize_signature(&raw, message.len())
    }
}

/// How the device is asked to sign a whole operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningMode {
    /// Blind-sign the host-computed hash under one confirmation.
    #[default]
    HybridSign,
    /// Send the operation fields so the device recomputes and displays it.
    ClearSign,
}

/// Both halves on one device, signed under a single user confirmation.
#[derive(Debug)]
pub struct DeviceHybridSigner {
    session: SharedSession,
    path: DerivationPath,
    algorithm: PqAlgorithm,
    mode: SigningMode,
    address: Address,
    pq_public_key: Vec<u8>,
}

impl DeviceHybridSigner {
    /// Reads both public keys for `path`.
    ///
    /// # Errors
    ///
    /// Returns a device or protocol error.
    pub fn new(
        session: SharedSession,
        path: DerivationPath,
        algorithm: PqAlgorithm,
        mode: SigningMode,
    ) -> Result<Self> {
        let (address, pq_public_key) = {
            let mut guard = lock(&session)?;
            let address = guard.get_address(&path)?;
            guard.derive_seed(&path, algorithm)?;
            (address, guard.keygen_and_read_public_key(algorithm)?)
        };
        info!(%path, %address, %algorithm, ?mode, "device hybrid signer ready");
        Ok(Self {
            session,
            path,
            algorithm,
            mode,
            address,
            pq_public_key,
        })
    }

    /// Returns the classical address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Returns the raw post-quantum public key.
    #[must_use]
    pub fn pq_public_key(&self) -> &[u8] {
        &self.pq_public_key
    }
}

impl OperationSigner for DeviceHybridSigner {
    fn algorithm(&self) -> PqAlgorithm {
        self.algorithm
    }

    fn sign_operation(
        &self,
        op: &PackedUserOperation,
        verifying_contract: Address,
        chain_id: u64,
    ) -> Result<HybridSignature> {
        let hash = operation_hash(op, verifying_contract, chain_id);
        debug!(%hash, mode = ?self.mode, "device signing operation");

        let (classical, raw_pq) = {
            let mut guard = lock(&self.session)?;
            match self.mode {
                SigningMode::HybridSign => guard.hybrid_sign(&self.path, self.algorithm, &hash)?,
                SigningMode::ClearSign => guard.clear_sign_user_operation(
                    &self.path,
                    self.algorithm,
                    op,
                    verifying_contract,
                    chain_id,
                )?,
            }
        };

        // A mismatch means the device hashed different bytes than we did.
        ensure_signer(&hash, &classical, self.address)?;

        let pq = self.algorithm.finalize_signature(&raw_pq, hash.len())?;
        Ok(HybridSignature::new(&classical, pq))
    }
}
