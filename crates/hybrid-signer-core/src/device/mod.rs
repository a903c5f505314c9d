//! Secure-element communication.
//!
//! This module talks to a secure element that holds both halves of a hybrid
//! key. The device speaks a short-APDU command set:
//!
//! - Classical key export and hash signing
//! - Post-quantum seed derivation, key generation and chunked key export
//! - A streaming `Init → Absorb* → Finalize` signing state machine
//! - Hybrid signing under a single on-device confirmation
//! - Clear-signing, where the device recomputes the operation hash itself
//!
//! # Architecture
//!
//! - [`apdu`]: command/response framing
//! - [`path`]: BIP-32 derivation paths
//! - [`session`]: [`DeviceSession`], the exclusive owner of a transport
//! - [`signer`]: hardware implementations of the signing capabilities
//!
//! # Transport Abstraction
//!
//! The [`Transport`] trait is the raw `exchange(bytes) -> bytes` channel.
//! A PC/SC implementation is available behind the `pcsc` feature; tests and
//! other hosts supply their own.
//!
//! # Example
//!
//! ```ignore
//! use hybrid_signer_core::device::{DeviceSession, DerivationPath, PcscTransport};
//!
//! let transport = PcscTransport::connect(None)?;
//! let mut session = DeviceSession::new(Box::new(transport));
//!
//! let path: DerivationPath = "m/44'/60'/0'/0/0".parse()?;
//! let public_key = session.get_public_key(&path)?;
//! ```

pub mod apdu;
pub mod path;
pub mod session;
pub mod signer;

#[cfg(feature = "pcsc")]
pub mod pcsc_transport;

pub use apdu::{Apdu, ApduResponse};
pub use path::DerivationPath;
pub use session::DeviceSession;
pub use signer::{
    DeviceClassicalSigner, DeviceHybridSigner, DevicePostQuantumSigner, SharedSession,
    SigningMode, share,
};

#[cfg(feature = "pcsc")]
pub use pcsc_transport::PcscTransport;

use crate::error::Result;

/// A byte channel to a secure element.
///
/// Exactly one request may be in flight; [`DeviceSession`] enforces this by
/// owning the transport and requiring `&mut self` for every command.
pub trait Transport {
    /// Sends a serialized command and returns the raw response, status word
    /// included.
    ///
    /// # Arguments
    ///
    /// * `command` - The serialized APDU
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ChannelFailed`] if the exchange itself fails.
    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>>;

    /// Checks if the transport is still connected.
    fn is_connected(&self) -> bool;

    /// Releases the underlying channel. Called when the session drops.
    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::Error;

    /// A mock transport for testing.
    struct MockTransport {
        responses: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
    }

    impl MockTransport {
        fn new(responses: Vec<Vec<u8>>) -> Self {
            Self {
                responses: responses.into_iter().collect(),
                sent: Vec::new(),
            }
        }
    }

    impl Transport for MockTransport {
        fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>> {
            self.sent.push(command.to_vec());
            self.responses
                .pop_front()
                .ok_or_else(|| Error::ChannelFailed("no response".to_string()))
        }

        fn is_connected(&self) -> bool {
            !self.responses.is_empty()
        }
    }

    #[test]
    fn mock_transport() {
        let mut transport = MockTransport::new(vec![vec![0x90, 0x00]]);
        assert!(transport.is_connected());

        let apdu = Apdu::new(0xE0, 0x11, 0x00, 0x00, Vec::new()).unwrap();
        let raw = transport.exchange(&apdu.to_bytes()).unwrap();
        let response = ApduResponse::from_bytes(raw).unwrap();

        assert!(response.is_success());
        assert_eq!(transport.sent, vec![vec![0xE0, 0x11, 0x00, 0x00, 0x00]]);
        assert!(!transport.is_connected());
        assert!(transport.exchange(&[]).is_err());
    }
}
