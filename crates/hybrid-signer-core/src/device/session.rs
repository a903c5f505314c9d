//! Secure-element session and command set.
//!
//! A [`DeviceSession`] exclusively owns a [`Transport`]: every command takes
//! `&mut self`, so two requests can never be in flight at once, and the
//! transport is closed when the session drops, on every exit path.
//!
//! # Command Set
//!
//! | INS | Command | P1 | P2 |
//! |-----|---------|----|----|
//! | `0x02` | Get classical public key | 0 | 0 |
//! | `0x04` | Classical hash signing | 0 | 0 |
//! | `0x10` | Derive post-quantum seed | 0 | algorithm |
//! | `0x11` | Post-quantum key generation | 0 | algorithm |
//! | `0x12` | Read public key chunk | chunk index | algorithm |
//! | `0x13` | Streaming sign | 0 init, 1 absorb, 2 finalize | algorithm |
//! | `0x14` | Read signature chunk | chunk index | algorithm |
//! | `0x15` | Hybrid sign | 0 | algorithm |
//! | `0x16` | Clear-sign user operation | phase 0..3 | algorithm |
//!
//! Long responses are read in 255-byte chunks. Every chunk but the last
//! must be exactly 255 bytes and the last exactly the remainder.

use alloy_primitives::{Address, B256, U256, keccak256};
use tracing::{debug, trace};

use super::Transport;
use super::apdu::{Apdu, ApduResponse};
use super::path::DerivationPath;
use crate::address::{UNCOMPRESSED_POINT_LEN, address_from_public_key_bytes};
use crate::crypto::normalize_s;
use crate::error::{Error, Result};
use crate::lattice::falcon::SIGNED_MESSAGE_PREFIX_LEN;
use crate::lattice::{MLDSA44_SIGNATURE_LEN, PqAlgorithm};
use crate::operation::PackedUserOperation;
use crate::signature::Signature;

/// Class byte of every command.
pub const CLA: u8 = 0xE0;

/// Size of a full response chunk.
pub const CHUNK_SIZE: usize = 255;

/// Maximum message bytes per absorb command.
pub const ABSORB_CHUNK_SIZE: usize = 250;

/// Length of the operation hash signed by the hybrid instructions.
const HASH_LEN: usize = 32;

/// Instruction codes.
mod ins {
    pub(super) const GET_PUBLIC_KEY: u8 = 0x02;
    pub(super) const SIGN_HASH: u8 = 0x04;
    pub(super) const DERIVE_SEED: u8 = 0x10;
    pub(super) const KEYGEN: u8 = 0x11;
    pub(super) const READ_PUBLIC_KEY: u8 = 0x12;
    pub(super) const SIGN: u8 = 0x13;
    pub(super) const READ_SIGNATURE: u8 = 0x14;
    pub(super) const HYBRID_SIGN: u8 = 0x15;
    pub(super) const CLEAR_SIGN: u8 = 0x16;
}

/// P1 values of the streaming sign instruction.
mod sign_phase {
    pub(super) const INIT: u8 = 0x00;
    pub(super) const ABSORB: u8 = 0x01;
    pub(super) const FINALIZE: u8 = 0x02;
}

/// P1 values of the clear-sign instruction.
mod clear_sign_phase {
    pub(super) const PATH: u8 = 0x00;
    pub(super) const DOMAIN: u8 = 0x01;
    pub(super) const FIELDS: u8 = 0x02;
    pub(super) const CALL_DATA: u8 = 0x03;
}

/// How the total length of a chunked read is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedLength {
    /// The length is fixed by the algorithm.
    Fixed(usize),
    /// A Falcon signed message whose length header is in the first chunk.
    FalconSignedMessage { message_len: usize },
}

impl ChunkedLength {
    fn for_signature(algorithm: PqAlgorithm, message_len: usize) -> Self {
        match algorithm {
            PqAlgorithm::MlDsa44 => Self::Fixed(MLDSA44_SIGNATURE_LEN),
            PqAlgorithm::Falcon512 => Self::FalconSignedMessage { message_len },
        }
    }

    fn total(self, first_chunk: &[u8]) -> Result<usize> {
        match self {
            Self::Fixed(len) => Ok(len),
            Self::FalconSignedMessage { message_len } => {
                let [hi, lo, ..] = first_chunk else {
                    return Err(Error::Protocol(
                        "first signature chunk lacks a length header".to_string(),
                    ));
                };
                let sig_len = usize::from(u16::from_be_bytes([*hi, *lo]));
                Ok(SIGNED_MESSAGE_PREFIX_LEN + message_len + sig_len)
            }
        }
    }
}

/// An exclusive session with a secure element.
pub struct DeviceSession {
    /// The underlying transport.
    transport: Box<dyn Transport + Send>,

    /// Path and algorithm of the seed currently derived on-device.
    derived: Option<(DerivationPath, PqAlgorithm)>,

    /// Whether the transport has been released.
    closed: bool,
}

impl core::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("derived", &self.derived)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// Opens a session over the given transport.
    #[must_use]
    pub fn new(transport: Box<dyn Transport + Send>) -> Self {
        Self {
            transport,
            derived: None,
            closed: false,
        }
    }

    /// Checks if the session is open and the transport connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.closed && self.transport.is_connected()
    }

    /// Returns the path and algorithm of the seed derived in this session.
    #[must_use]
    pub fn derived_seed(&self) -> Option<(&DerivationPath, PqAlgorithm)> {
        self.derived.as_ref().map(|(path, alg)| (path, *alg))
    }

    /// Releases the transport. Further commands fail with
    /// [`Error::ChannelFailed`].
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.derived = None;
            self.transport.close();
            debug!("device session closed");
        }
    }

    /// Reads the 65-byte uncompressed secp256k1 public key at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on a device error or [`Error::Protocol`]
    /// if the key is not a 65-byte uncompressed point.
    pub fn get_public_key(&mut self, path: &DerivationPath) -> Result<Vec<u8>> {
        let key = self.transmit(ins::GET_PUBLIC_KEY, 0, 0, path.to_payload())?;
        if key.len() != UNCOMPRESSED_POINT_LEN || key[0] != 0x04 {
            return Err(Error::Protocol(format!(
                "expected a 65-byte uncompressed public key, got {} bytes",
                key.len()
            )));
        }
        Ok(key)
    }

    /// Reads the Ethereum address of the classical key at `path`.
    ///
    /// # Errors
    ///
    /// Same as [`get_public_key`](Self::get_public_key).
    pub fn get_address(&mut self, path: &DerivationPath) -> Result<Address> {
        let key = self.get_public_key(path)?;
        address_from_public_key_bytes(&key)
    }

    /// Signs a 32-byte hash with the classical key only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on a device error (including user
    /// rejection) or [`Error::Protocol`] for a malformed signature.
    pub fn sign_hash(&mut self, path: &DerivationPath, hash: &B256) -> Result<Signature> {
        let mut payload = path.to_payload();
        payload.extend_from_slice(hash.as_slice());
        let response = self.transmit(ins::SIGN_HASH, 0, 0, payload)?;
        parse_classical(&response)
    }

    /// Derives the post-quantum seed for `path` and stores it on-device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on a device error.
    pub fn derive_seed(&mut self, path: &DerivationPath, algorithm: PqAlgorithm) -> Result<()> {
        self.derived = None;
        self.transmit(ins::DERIVE_SEED, 0, algorithm.device_code(), path.to_payload())?;
        debug!(%path, %algorithm, "derived post-quantum seed");
        self.derived = Some((path.clone(), algorithm));
        Ok(())
    }

    /// Derives the seed unless this session already holds it.
    ///
    /// # Errors
    ///
    /// Same as [`derive_seed`](Self::derive_seed).
    pub fn ensure_seed(&mut self, path: &DerivationPath, algorithm: PqAlgorithm) -> Result<()> {
        match &self.derived {
            Some((current, alg)) if current == path && *alg == algorithm => Ok(()),
            _ => self.derive_seed(path, algorithm),
        }
    }

    /// Generates the post-quantum key pair from the stored seed and reads
    /// back its public key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if no seed was derived for `algorithm`
    /// in this session, [`Error::Transport`] on a device error, or
    /// [`Error::Protocol`] for a malformed chunk sequence.
    pub fn keygen_and_read_public_key(&mut self, algorithm: PqAlgorithm) -> Result<Vec<u8>> {
        self.require_seed(algorithm)?;
        self.transmit(ins::KEYGEN, 0, algorithm.device_code(), Vec::new())?;
        self.read_chunked(
            ins::READ_PUBLIC_KEY,
            algorithm,
            ChunkedLength::Fixed(algorithm.public_key_len()),
        )
    }

    /// Signs `message` with the post-quantum key through the streaming
    /// `Init → Absorb* → Finalize` state machine.
    ///
    /// Returns the raw signature: 2420 bytes for ML-DSA-44, the signed
    /// message layout for Falcon-512.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if no seed was derived or the message
    /// exceeds 65535 bytes, and device or chunking errors as
    /// [`keygen_and_read_public_key`](Self::keygen_and_read_public_key).
    pub fn sign(&mut self, algorithm: PqAlgorithm, message: &[u8]) -> Result<Vec<u8>> {
        self.require_seed(algorithm)?;
        let total = u16::try_from(message.len()).map_err(|_| {
            Error::Validation(format!("message of {} bytes is too long", message.len()))
        })?;
        let p2 = algorithm.device_code();

        self.transmit(ins::SIGN, sign_phase::INIT, p2, Vec::new())?;
        for chunk in message.chunks(ABSORB_CHUNK_SIZE) {
            self.transmit(ins::SIGN, sign_phase::ABSORB, p2, chunk.to_vec())?;
        }
        self.transmit(ins::SIGN, sign_phase::FINALIZE, p2, total.to_be_bytes().to_vec())?;
        debug!(%algorithm, message_len = message.len(), "device signing finalized");

        self.read_chunked(
            ins::READ_SIGNATURE,
            algorithm,
            ChunkedLength::for_signature(algorithm, message.len()),
        )
    }

    /// Signs `hash` with both keys under one on-device confirmation.
    ///
    /// Returns the classical signature and the raw post-quantum signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on a device error (including user
    /// rejection) or [`Error::Protocol`] for a malformed response.
    pub fn hybrid_sign(
        &mut self,
        path: &DerivationPath,
        algorithm: PqAlgorithm,
        hash: &B256,
    ) -> Result<(Signature, Vec<u8>)> {
        self.ensure_seed(path, algorithm)?;

        let mut payload = path.to_payload();
        payload.extend_from_slice(hash.as_slice());
        let response = self.transmit(ins::HYBRID_SIGN, 0, algorithm.device_code(), payload)?;
        let classical = parse_classical(&response)?;

        let pq = self.read_chunked(
            ins::READ_SIGNATURE,
            algorithm,
            ChunkedLength::for_signature(algorithm, HASH_LEN),
        )?;
        Ok((classical, pq))
    }

    /// Clear-signs a user operation.
    ///
    /// The device receives the operation fields in four phases, recomputes
    /// the operation hash, shows it to the user and signs with both keys:
    ///
    /// 1. derivation path
    /// 2. `chainId (32) ‖ verifyingContract (20) ‖ sender (20) ‖ nonce (32)`
    /// 3. the six remaining hashed fields, 32 bytes each
    /// 4. raw `callData` if it fits one command, else empty
    ///
    /// The last phase blocks until the user decides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on a device error (rejection is
    /// `0x6985`) or [`Error::Protocol`] for a malformed response.
    pub fn clear_sign_user_operation(
        &mut self,
        path: &DerivationPath,
        algorithm: PqAlgorithm,
        op: &PackedUserOperation,
        verifying_contract: Address,
        chain_id: u64,
    ) -> Result<(Signature, Vec<u8>)> {
        self.ensure_seed(path, algorithm)?;
        let p2 = algorithm.device_code();

        self.transmit(ins::CLEAR_SIGN, clear_sign_phase::PATH, p2, path.to_payload())?;

        let mut domain = Vec::with_capacity(104);
        domain.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
        domain.extend_from_slice(verifying_contract.as_slice());
        domain.extend_from_slice(op.sender.as_slice());
        domain.extend_from_slice(&op.nonce.to_be_bytes::<32>());
        self.transmit(ins::CLEAR_SIGN, clear_sign_phase::DOMAIN, p2, domain)?;

        let mut fields = Vec::with_capacity(192);
        fields.extend_from_slice(keccak256(&op.init_code).as_slice());
        fields.extend_from_slice(keccak256(&op.call_data).as_slice());
        fields.extend_from_slice(op.account_gas_limits.as_slice());
        fields.extend_from_slice(&op.pre_verification_gas.to_be_bytes::<32>());
        fields.extend_from_slice(op.gas_fees.as_slice());
        fields.extend_from_slice(keccak256(&op.paymaster_and_data).as_slice());
        self.transmit(ins::CLEAR_SIGN, clear_sign_phase::FIELDS, p2, fields)?;

        let call_data = if op.call_data.len() <= Apdu::MAX_SHORT_DATA {
            op.call_data.to_vec()
        } else {
            debug!(len = op.call_data.len(), "call data too long to display");
            Vec::new()
        };
        let response = self.transmit(ins::CLEAR_SIGN, clear_sign_phase::CALL_DATA, p2, call_data)?;
        let classical = parse_classical(&response)?;

        let pq = self.read_chunked(
            ins::READ_SIGNATURE,
            algorithm,
            ChunkedLength::for_signature(algorithm, HASH_LEN),
        )?;
        Ok((classical, pq))
    }

    fn require_seed(&self, algorithm: PqAlgorithm) -> Result<()> {
        match &self.derived {
            Some((_, alg)) if *alg == algorithm => Ok(()),
            _ => Err(Error::Validation(format!(
                "no {algorithm} seed derived in this session"
            ))),
        }
    }

    fn read_chunked(
        &mut self,
        instruction: u8,
        algorithm: PqAlgorithm,
        length: ChunkedLength,
    ) -> Result<Vec<u8>> {
        let p2 = algorithm.device_code();
        let first = self.transmit(instruction, 0, p2, Vec::new())?;
        let total = length.total(&first)?;
        let chunks = total.div_ceil(CHUNK_SIZE);
        if total == 0 || chunks > 256 {
            return Err(Error::Protocol(format!(
                "unreadable response length {total}"
            )));
        }

        let mut out = Vec::with_capacity(total);
        let mut chunk = first;
        for index in 0..chunks {
            if index > 0 {
                let p1 = u8::try_from(index)
                    .map_err(|_| Error::Protocol(format!("chunk index {index} out of range")))?;
                chunk = self.transmit(instruction, p1, p2, Vec::new())?;
            }

            let expected = (total - out.len()).min(CHUNK_SIZE);
            if chunk.len() != expected {
                return Err(Error::Protocol(format!(
                    "chunk {index} has {} bytes, expected {expected}",
                    chunk.len()
                )));
            }
            out.extend_from_slice(&chunk);
        }

        debug!(instruction, total, chunks, "chunked read complete");
        Ok(out)
    }

    fn transmit(&mut self, instruction: u8, p1: u8, p2: u8, data: Vec<u8>) -> Result<Vec<u8>> {
        if self.closed {
            return Err(Error::ChannelFailed("session is closed".to_string()));
        }

        let apdu = Apdu::new(CLA, instruction, p1, p2, data)?;
        trace!(
            ins = %format_args!("{instruction:#04x}"),
            p1,
            p2,
            lc = apdu.data().len(),
            "apdu command"
        );

        let raw = self.transport.exchange(&apdu.to_bytes())?;
        let response = ApduResponse::from_bytes(raw)?;
        trace!(
            sw = %format_args!("{:#06x}", response.status_word()),
            len = response.data().len(),
            "apdu response"
        );

        response.check()?;
        Ok(response.into_data())
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn parse_classical(response: &[u8]) -> Result<Signature> {
    let signature = Signature::from_vrs_bytes(response).map_err(|_| {
        Error::Protocol(format!(
            "expected a 65-byte v || r || s signature, got {} bytes",
            response.len()
        ))
    })?;
    normalize_s(&signature)
}
