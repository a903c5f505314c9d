//! Error types for the hybrid signer library.
//!
//! This module provides a single error type [`enum@Error`] covering every
//! failure mode of the signing pipeline, from malformed input through
//! secure-element transport failures to bundler rejections.
//!
//! # Error Categories
//!
//! - **Validation errors**: malformed hex, seeds, lengths and paths. These are
//!   raised before any cryptography runs.
//! - **Transport errors**: the secure element answered with a non-success
//!   status word. The raw code is preserved; user rejection on the device is
//!   one of them (see [`Error::is_user_rejection`]).
//! - **Protocol errors**: the device or a signing primitive answered with an
//!   unexpected shape (wrong chunk length, bad sentinel byte).
//! - **Bundler errors**: gas estimation and submission failures.
//!
//! Receipt-poll exhaustion is not an error; see
//! [`ReceiptOutcome::Pending`](crate::bundler::ReceiptOutcome::Pending).
//!
//! # Example
//!
//! ```
//! use hybrid_signer_core::Error;
//!
//! let err = Error::Transport { status: 0x6985 };
//! assert!(err.is_user_rejection());
//! ```

use core::result::Result as CoreResult;

use alloy_sol_types::Error as AbiError;
use hex::FromHexError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Status word a secure element returns when the user rejects a request.
pub const SW_USER_REJECTED: u16 = 0x6985;

/// The main error type for the hybrid signer library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Generic input validation failure.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Failed to parse hex data.
    #[error("hex decoding failed: {0}")]
    HexDecodeFailed(String),

    /// A byte string had the wrong length.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// The required length.
        expected: usize,
        /// The length that was supplied.
        actual: usize,
    },

    /// The seed does not yield a usable key.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// The derivation path could not be parsed or serialized.
    #[error("invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    /// The public key is invalid or malformed.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The signature is invalid or malformed.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// ABI decoding of a signature or key blob failed.
    #[error("ABI decoding failed: {0}")]
    AbiDecodeFailed(String),

    // =========================================================================
    // Secure Element Errors
    // =========================================================================
    /// No secure element was found.
    #[error("no secure element found")]
    DeviceNotFound,

    /// Failed to connect to the secure element.
    #[error("failed to connect to secure element: {0}")]
    ConnectionFailed(String),

    /// The exchange channel itself failed (I/O, closed session, poisoned lock).
    #[error("device channel failed: {0}")]
    ChannelFailed(String),

    /// The device returned a non-success status word.
    #[error("device returned status word {status:#06x}")]
    Transport {
        /// The raw status word (`SW1 << 8 | SW2`).
        status: u16,
    },

    /// The device or a signing primitive answered with an unexpected shape.
    #[error("protocol violation: {0}")]
    Protocol(String),

    // =========================================================================
    // Cryptographic Errors
    // =========================================================================
    /// A signing primitive failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// No public key could be recovered from a classical signature.
    #[error("failed to recover signer from signature")]
    RecoveryFailed,

    // =========================================================================
    // Bundler Errors
    // =========================================================================
    /// The bundler could not estimate gas for the operation.
    #[error("gas estimation failed: {0}")]
    Estimation(String),

    /// The bundler rejected the operation.
    #[error("operation submission failed: {0}")]
    Submission(String),

    /// A collaborator RPC call failed.
    #[error("RPC call failed: {0}")]
    Rpc(String),

    // =========================================================================
    // Serialization Errors
    // =========================================================================
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    JsonError(String),
}

impl Error {
    /// Returns `true` if the device reported that the user rejected the request.
    ///
    /// Callers use this to re-prompt the user rather than retry.
    #[must_use]
    pub const fn is_user_rejection(&self) -> bool {
        matches!(self, Self::Transport { status } if *status == SW_USER_REJECTED)
    }

    /// Returns `true` for failures raised before any cryptography ran.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::HexDecodeFailed(_)
                | Self::InvalidLength { .. }
                | Self::InvalidSeed(_)
                | Self::InvalidDerivationPath(_)
                | Self::InvalidPublicKey(_)
                | Self::InvalidSignature(_)
                | Self::AbiDecodeFailed(_)
        )
    }
}

impl From<FromHexError> for Error {
    fn from(err: FromHexError) -> Self {
        Self::HexDecodeFailed(err.to_string())
    }
}

impl From<SerdeJsonError> for Error {
    fn from(err: SerdeJsonError) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<AbiError> for Error {
    fn from(err: AbiError) -> Self {
        Self::AbiDecodeFailed(err.to_string())
    }
}

/// A specialized [`Result`] type for hybrid signer operations.
pub type Result<T> = CoreResult<T, Error>;
