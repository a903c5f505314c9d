//! Hybrid Signer Core Library
//!
//! This crate signs ERC-4337 user operations for smart accounts that require
//! two signatures at once: a classical secp256k1 ECDSA signature and a
//! post-quantum lattice signature (ML-DSA-44 or Falcon-512). The account
//! stays valid as long as either scheme remains unbroken.
//!
//! # Overview
//!
//! - **Operations**: the v0.7 `PackedUserOperation` and its hash
//! - **Hybrid Signatures**: `abi.encode(bytes classical, bytes pq)`
//! - **Lattice Encodings**: public keys and signatures reshaped into the
//!   packed `uint256` form the on-chain verifiers consume
//! - **Software Signers**: seed-derived keys for tests and hot wallets
//! - **Secure-Element Integration**: an APDU command set for devices that
//!   hold both keys and sign under a single confirmation
//! - **Bundler Pipeline**: estimate, apply gas floors, sign, submit, poll
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Bundler Pipeline (async)                    │
//! │     Bundler  │  FeeOracle  │  NonceSource  │  GasPolicy     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     OperationSigner                         │
//! │   ┌──────────────────────┐    ┌──────────────────────────┐  │
//! │   │    HybridSigner      │    │    DeviceHybridSigner    │  │
//! │   │ Classical + PQ (sw)  │    │  one confirmation (hw)   │  │
//! │   └──────────────────────┘    └──────────────────────────┘  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Operation Hash │  secp256k1  │  ML-DSA-44  │  Falcon-512   │
//! ├─────────────────────────────────────────────────────────────┤
//! │           Device Session (APDU over a Transport)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ## Hashing an Operation
//!
//! ```rust
//! use hybrid_signer_core::{PackedUserOperation, operation_hash};
//! use hybrid_signer_core::config::ENTRY_POINT_V07;
//!
//! let op = PackedUserOperation::default();
//! let hash = operation_hash(&op, ENTRY_POINT_V07, 11_155_111);
//! assert_ne!(hash, hybrid_signer_core::B256::ZERO);
//! ```
//!
//! ## Signing in Software
//!
//! ```rust
//! use hybrid_signer_core::signer::{
//!     HybridSigner, MlDsa44Signer, OperationSigner, SoftwareClassicalSigner,
//! };
//! use hybrid_signer_core::config::ENTRY_POINT_V07;
//! use hybrid_signer_core::{PackedUserOperation, Seed};
//!
//! let classical = SoftwareClassicalSigner::from_seed(&Seed::new([1u8; 32]))?;
//! let pq = MlDsa44Signer::from_seed(&Seed::new([2u8; 32]));
//! let signer = HybridSigner::new(Box::new(classical), Box::new(pq));
//!
//! let signature = signer.sign_operation(&PackedUserOperation::default(), ENTRY_POINT_V07, 1)?;
//! assert_eq!(signature.pq().len(), 2420);
//! # Ok::<(), hybrid_signer_core::Error>(())
//! ```
//!
//! # Secure-Element Integration
//!
//! The [`device::Transport`] trait is the raw byte channel. A PC/SC
//! implementation ships behind the `pcsc` feature:
//!
//! ```ignore
//! use hybrid_signer_core::device::{self, DeviceHybridSigner, DeviceSession, PcscTransport, SigningMode};
//! use hybrid_signer_core::PqAlgorithm;
//!
//! let session = device::share(DeviceSession::new(Box::new(PcscTransport::connect(None)?)));
//! let signer = DeviceHybridSigner::new(
//!     session,
//!     "m/44'/60'/0'/0/0".parse()?,
//!     PqAlgorithm::MlDsa44,
//!     SigningMode::HybridSign,
//! )?;
//! ```
//!
//! # Feature Flags
//!
//! - `pcsc`: native smart-card transport via the PC/SC daemon
//!
//! # Security Considerations
//!
//! - Seeds are zeroized on drop and never printed
//! - Device signatures are checked against the expected address before use
//! - Classical signatures are normalized to low-S form
//! - Dummy signatures are all `0xFF` so they can never verify

// Modules
pub mod address;
pub mod bundler;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod device;
pub mod error;
pub mod lattice;
pub mod operation;
pub mod seed;
pub mod signature;
pub mod signer;

// Re-exports for convenience
pub use error::{Error, Result};
pub use lattice::PqAlgorithm;
pub use operation::{PackedUserOperation, operation_hash};
pub use seed::Seed;
pub use signature::Signature;
pub use signer::{HybridSignature, OperationSigner};

// Re-export commonly used alloy types
pub use alloy_primitives::{Address, B256, Bytes, U256};
