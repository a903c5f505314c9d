//! End-to-end device protocol tests against a simulated secure element.
//!
//! The simulator speaks the full command set with software keys, so these
//! tests exercise the session, the hardware signers and the signature
//! finalization together.

// Silence unused crate dependency warnings for test binary
use alloy_sol_types as _;
use async_trait as _;
use hex as _;
#[cfg(feature = "pcsc")]
use pcsc as _;
use serde as _;
use serde_json as _;
use sha3 as _;
use thiserror as _;
use tokio as _;
use tracing as _;
use tracing_subscriber as _;
use zeroize as _;

use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, B256, Bytes, U256, address, keccak256};
use fips204::ml_dsa_44;
use fips204::traits::{SerDes as _, Verifier as _};
use hybrid_signer_core::crypto::{recover_address, sign_prehash};
use hybrid_signer_core::device::{
    self, Apdu, ApduResponse, DerivationPath, DeviceClassicalSigner, DeviceHybridSigner,
    DevicePostQuantumSigner, DeviceSession, SigningMode, Transport,
};
use hybrid_signer_core::operation::pack_u128_pair;
use hybrid_signer_core::signer::{
    ClassicalSigner as _, MlDsa44Signer, OperationSigner, PostQuantumSigner,
};
use hybrid_signer_core::{
    Error, HybridSignature, PackedUserOperation, PqAlgorithm, Result, Seed, operation_hash,
};
use k256::ecdsa::SigningKey;
use pqcrypto_falcon::falcon512;
use pqcrypto_traits::sign::{PublicKey as _, SignedMessage as _};

const SW_REJECTED: u16 = 0x6985;
const SW_CONDITIONS: u16 = 0x6986;
const SW_BAD_INS: u16 = 0x6D00;

const ENTRY_POINT: Address = address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");
const DEVICE_ADDRESS: Address = address!("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");

enum PqKey {
    MlDsa(MlDsa44Signer),
    Falcon(falcon512::PublicKey, falcon512::SecretKey),
}

impl PqKey {
    fn public_key(&self) -> Vec<u8> {
        match self {
            Self::MlDsa(signer) => signer.public_key().to_vec(),
            Self::Falcon(pk, _) => pk.as_bytes().to_vec(),
        }
    }

    /// The raw primitive output: the detached signature for ML-DSA, the
    /// signed message for Falcon.
    fn sign_raw(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::MlDsa(signer) => signer.sign(message).unwrap(),
            Self::Falcon(_, sk) => falcon512::sign(message, sk).as_bytes().to_vec(),
        }
    }
}

#[derive(Default)]
struct DeviceState {
    pq_key: Option<PqKey>,
    public_key: Vec<u8>,
    signature: Vec<u8>,
    message: Option<Vec<u8>>,
    clear_domain: Vec<u8>,
    clear_fields: Vec<u8>,
    reject: bool,
    tamper: bool,
    closed: bool,
    commands: Vec<(u8, u8, u8)>,
}

/// A secure element simulated in software.
#[derive(Clone, Default)]
struct SimulatedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl SimulatedDevice {
    fn classical_key() -> SigningKey {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        SigningKey::from_slice(&bytes).unwrap()
    }

    fn set_reject(&self, reject: bool) {
        self.state.lock().unwrap().reject = reject;
    }

    fn set_tamper(&self, tamper: bool) {
        self.state.lock().unwrap().tamper = tamper;
    }

    fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn commands(&self) -> Vec<(u8, u8, u8)> {
        self.state.lock().unwrap().commands.clone()
    }

    fn count(&self, ins: u8) -> usize {
        self.commands().iter().filter(|(i, _, _)| *i == ins).count()
    }

    fn handle(state: &mut DeviceState, apdu: &Apdu) -> (Vec<u8>, u16) {
        match (apdu.ins(), apdu.p1()) {
            (0x02, _) => {
                let key = Self::classical_key();
                let point = key.verifying_key().to_encoded_point(false);
                (point.as_bytes().to_vec(), ApduResponse::SW_SUCCESS)
            }
            (0x04, _) => {
                let (_, hash) = DerivationPath::from_payload(apdu.data()).unwrap();
                Self::confirm_classical(state, B256::from_slice(hash))
            }
            (0x10, _) => {
                let algorithm = apdu.p2();
                let seed = Seed::new(*keccak256([apdu.data(), &[algorithm]].concat()));
                state.pq_key = Some(match PqAlgorithm::from_device_code(algorithm).unwrap() {
                    PqAlgorithm::MlDsa44 => PqKey::MlDsa(MlDsa44Signer::from_seed(&seed)),
                    PqAlgorithm::Falcon512 => {
                        let (pk, sk) = falcon512::keypair();
                        PqKey::Falcon(pk, sk)
                    }
                });
                (Vec::new(), ApduResponse::SW_SUCCESS)
            }
            (0x11, _) => match &state.pq_key {
                Some(key) => {
                    state.public_key = key.public_key();
                    (Vec::new(), ApduResponse::SW_SUCCESS)
                }
                None => (Vec::new(), SW_CONDITIONS),
            },
            (0x12, index) => (chunk(&state.public_key, index), ApduResponse::SW_SUCCESS),
            (0x13, 0) => {
                state.message = Some(Vec::new());
                (Vec::new(), ApduResponse::SW_SUCCESS)
            }
            (0x13, 1) => match state.message.as_mut() {
                Some(message) => {
                    message.extend_from_slice(apdu.data());
                    (Vec::new(), ApduResponse::SW_SUCCESS)
                }
                None => (Vec::new(), SW_CONDITIONS),
            },
            (0x13, 2) => {
                let Some(message) = state.message.take() else {
                    return (Vec::new(), SW_CONDITIONS);
                };
                let declared = usize::from(u16::from_be_bytes([apdu.data()[0], apdu.data()[1]]));
                if declared != message.len() {
                    return (Vec::new(), SW_CONDITIONS);
                }
                if state.reject {
                    return (Vec::new(), SW_REJECTED);
                }
                state.signature = state.pq_key.as_ref().unwrap().sign_raw(&message);
                (Vec::new(), ApduResponse::SW_SUCCESS)
            }
            (0x14, index) => (chunk(&state.signature, index), ApduResponse::SW_SUCCESS),
            (0x15, _) => {
                let (_, hash) = DerivationPath::from_payload(apdu.data()).unwrap();
                Self::confirm_hybrid(state, B256::from_slice(hash))
            }
            (0x16, 0) => {
                state.clear_domain.clear();
                state.clear_fields.clear();
                (Vec::new(), ApduResponse::SW_SUCCESS)
            }
            (0x16, 1) => {
                state.clear_domain = apdu.data().to_vec();
                (Vec::new(), ApduResponse::SW_SUCCESS)
            }
            (0x16, 2) => {
                state.clear_fields = apdu.data().to_vec();
                (Vec::new(), ApduResponse::SW_SUCCESS)
            }
            (0x16, 3) => {
                let hash = Self::recompute_operation_hash(state);
                Self::confirm_hybrid(state, hash)
            }
            _ => (Vec::new(), SW_BAD_INS),
        }
    }

    /// Rebuilds the operation hash from the clear-sign phases.
    fn recompute_operation_hash(state: &DeviceState) -> B256 {
        let domain = &state.clear_domain;
        let (chain_id, rest) = domain.split_at(32);
        let (verifying_contract, rest) = rest.split_at(20);
        let (sender, nonce) = rest.split_at(20);

        let mut inner = vec![0u8; 12];
        inner.extend_from_slice(sender);
        inner.extend_from_slice(nonce);
        inner.extend_from_slice(&state.clear_fields);
        let inner = keccak256(inner);

        let mut outer = inner.to_vec();
        outer.extend_from_slice(&[0u8; 12]);
        outer.extend_from_slice(verifying_contract);
        outer.extend_from_slice(chain_id);
        keccak256(outer)
    }

    fn confirm_classical(state: &DeviceState, hash: B256) -> (Vec<u8>, u16) {
        if state.reject {
            return (Vec::new(), SW_REJECTED);
        }
        (vrs(&Self::signed_hash(state, hash)), ApduResponse::SW_SUCCESS)
    }

    fn confirm_hybrid(state: &mut DeviceState, hash: B256) -> (Vec<u8>, u16) {
        if state.reject {
            return (Vec::new(), SW_REJECTED);
        }
        let Some(key) = state.pq_key.as_ref() else {
            return (Vec::new(), SW_CONDITIONS);
        };
        let hash = Self::signed_hash(state, hash);
        state.signature = key.sign_raw(hash.as_slice());
        (vrs(&hash), ApduResponse::SW_SUCCESS)
    }

    fn signed_hash(state: &DeviceState, hash: B256) -> B256 {
        if state.tamper {
            keccak256(hash)
        } else {
            hash
        }
    }
}

fn vrs(hash: &B256) -> Vec<u8> {
    let signature = sign_prehash(&SimulatedDevice::classical_key(), hash).unwrap();
    let mut out = vec![signature.v()];
    out.extend_from_slice(signature.r());
    out.extend_from_slice(signature.s());
    out
}

fn chunk(buffer: &[u8], index: u8) -> Vec<u8> {
    buffer
        .chunks(255)
        .nth(usize::from(index))
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}

impl Transport for SimulatedDevice {
    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::ChannelFailed("device released".to_string()));
        }
        let apdu = Apdu::from_bytes(command)?;
        assert_eq!(apdu.cla(), 0xE0);
        state.commands.push((apdu.ins(), apdu.p1(), apdu.p2()));

        let (data, sw) = Self::handle(&mut state, &apdu);
        Ok(ApduResponse::new(data, sw).to_bytes())
    }

    fn is_connected(&self) -> bool {
        !self.state.lock().unwrap().closed
    }

    fn close(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}

fn connect() -> (device::SharedSession, SimulatedDevice) {
    let device = SimulatedDevice::default();
    let session = device::share(DeviceSession::new(Box::new(device.clone())));
    (session, device)
}

fn sample_operation() -> PackedUserOperation {
    PackedUserOperation {
        sender: address!("0x1234567890123456789012345678901234567890"),
        nonce: U256::from(3),
        call_data: Bytes::from(vec![0xAB; 68]),
        account_gas_limits: pack_u128_pair(8_000_000, 500_000),
        pre_verification_gas: U256::from(400_000),
        gas_fees: pack_u128_pair(2_000_000_000, 50_000_000_000),
        ..PackedUserOperation::default()
    }
}

fn verify_ml_dsa(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let public_key = ml_dsa_44::PublicKey::try_from_bytes(public_key.try_into().unwrap()).unwrap();
    public_key.verify(message, &signature.try_into().unwrap(), &[])
}

#[test]
fn classical_key_and_hash_signing() {
    let (session, _device) = connect();
    let signer = DeviceClassicalSigner::new(session, DerivationPath::default()).unwrap();
    assert_eq!(signer.address(), DEVICE_ADDRESS);

    let hash = keccak256(b"hello device");
    let signature = signer.sign_hash(&hash).unwrap();
    assert_eq!(recover_address(&hash, &signature).unwrap(), DEVICE_ADDRESS);
}

#[test]
fn ml_dsa_public_key_read_in_six_chunks() {
    let (session, device) = connect();
    let signer =
        DevicePostQuantumSigner::new(session, DerivationPath::default(), PqAlgorithm::MlDsa44)
            .unwrap();

    assert_eq!(signer.public_key().len(), 1312);
    assert_eq!(device.count(0x12), 6);

    let seed_path = DerivationPath::default().to_payload();
    let seed = Seed::new(*keccak256([seed_path.as_slice(), &[0]].concat()));
    assert_eq!(
        signer.public_key(),
        MlDsa44Signer::from_seed(&seed).public_key()
    );
    assert!(signer.encoded_public_key().is_ok());
}

#[test]
fn streaming_ml_dsa_signature_verifies() {
    let (session, device) = connect();
    let signer =
        DevicePostQuantumSigner::new(session, DerivationPath::default(), PqAlgorithm::MlDsa44)
            .unwrap();

    let message = vec![0x42; 700];
    let signature = signer.sign(&message).unwrap();

    assert_eq!(signature.len(), 2420);
    assert!(verify_ml_dsa(signer.public_key(), &message, &signature));
    // 700 bytes = 250 + 250 + 200
    let absorbs = device
        .commands()
        .iter()
        .filter(|(ins, p1, _)| *ins == 0x13 && *p1 == 1)
        .count();
    assert_eq!(absorbs, 3);
    // the seed from construction is reused
    assert_eq!(device.count(0x10), 1);
}

#[test]
fn streaming_falcon_signature_is_compacted() {
    let (session, _device) = connect();
    let signer =
        DevicePostQuantumSigner::new(session, DerivationPath::default(), PqAlgorithm::Falcon512)
            .unwrap();
    assert_eq!(signer.public_key().len(), 897);

    let signature = signer.sign(b"falcon over apdu").unwrap();
    assert_eq!(signature.len(), 1064);
}

#[test]
fn hybrid_sign_both_halves() {
    let (session, device) = connect();
    let signer = DeviceHybridSigner::new(
        session,
        DerivationPath::default(),
        PqAlgorithm::MlDsa44,
        SigningMode::HybridSign,
    )
    .unwrap();
    assert_eq!(signer.address(), DEVICE_ADDRESS);

    let op = sample_operation();
    let hash = operation_hash(&op, ENTRY_POINT, 11_155_111);
    let signature = signer.sign_operation(&op, ENTRY_POINT, 11_155_111).unwrap();

    let classical = hybrid_signer_core::Signature::from_bytes(signature.classical()).unwrap();
    assert_eq!(recover_address(&hash, &classical).unwrap(), DEVICE_ADDRESS);
    assert!(verify_ml_dsa(
        signer.pq_public_key(),
        hash.as_slice(),
        signature.pq()
    ));
    assert_eq!(device.count(0x15), 1);

    let decoded = HybridSignature::decode(&signature.encode()).unwrap();
    assert_eq!(decoded, signature);
}

#[test]
fn clear_sign_recomputes_operation_hash() {
    let (session, device) = connect();
    let signer = DeviceHybridSigner::new(
        session,
        DerivationPath::ethereum(2),
        PqAlgorithm::Falcon512,
        SigningMode::ClearSign,
    )
    .unwrap();

    let op = sample_operation();
    let hash = operation_hash(&op, ENTRY_POINT, 1);
    let signature = signer.sign_operation(&op, ENTRY_POINT, 1).unwrap();

    let classical = hybrid_signer_core::Signature::from_bytes(signature.classical()).unwrap();
    assert_eq!(recover_address(&hash, &classical).unwrap(), DEVICE_ADDRESS);
    assert_eq!(signature.pq().len(), 1064);

    let phases: Vec<u8> = device
        .commands()
        .iter()
        .filter(|(ins, _, _)| *ins == 0x16)
        .map(|(_, p1, _)| *p1)
        .collect();
    assert_eq!(phases, vec![0, 1, 2, 3]);
}

#[test]
fn user_rejection_is_reported() {
    let (session, device) = connect();
    let signer = DeviceHybridSigner::new(
        session,
        DerivationPath::default(),
        PqAlgorithm::MlDsa44,
        SigningMode::HybridSign,
    )
    .unwrap();

    device.set_reject(true);
    let err = signer
        .sign_operation(&sample_operation(), ENTRY_POINT, 1)
        .unwrap_err();
    assert!(err.is_user_rejection());

    // the session stays usable after a rejection
    device.set_reject(false);
    assert!(signer.sign_operation(&sample_operation(), ENTRY_POINT, 1).is_ok());
}

#[test]
fn device_signing_a_different_hash_is_caught() {
    let (session, device) = connect();
    let signer = DeviceHybridSigner::new(
        session,
        DerivationPath::default(),
        PqAlgorithm::MlDsa44,
        SigningMode::ClearSign,
    )
    .unwrap();

    device.set_tamper(true);
    let err = signer
        .sign_operation(&sample_operation(), ENTRY_POINT, 1)
        .unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[test]
fn session_released_when_last_signer_drops() {
    let (session, device) = connect();
    let signer = DeviceClassicalSigner::new(session, DerivationPath::default()).unwrap();
    assert!(!device.closed());

    drop(signer);
    assert!(device.closed());
}

#[test]
fn unknown_seed_state_is_a_device_error() {
    let device = SimulatedDevice::default();
    let mut transport = device.clone();

    // keygen without a derived seed
    let raw = transport
        .exchange(&Apdu::new(0xE0, 0x11, 0, 0, Vec::new()).unwrap().to_bytes())
        .unwrap();
    let response = ApduResponse::from_bytes(raw).unwrap();
    assert!(matches!(
        response.check(),
        Err(Error::Transport { status: SW_CONDITIONS })
    ));
}
