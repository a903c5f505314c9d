//! APDU command and response framing.
//!
//! # Command Structure
//!
//! ```text
//! | CLA | INS | P1 | P2 | Lc | Data |
//! |-----|-----|----|----|----|------|
//! | 1B  | 1B  | 1B | 1B | 1B | ≤255 |
//! ```
//!
//! Only short APDUs are used and the Lc byte is always present, including
//! `Lc = 0` for commands without data. Larger payloads are split by the
//! caller (see [`DeviceSession`](super::DeviceSession)).
//!
//! # Response Structure
//!
//! ```text
//! | Data | SW1 | SW2 |
//! ```
//!
//! `0x9000` is success; any other status word becomes
//! [`Error::Transport`].
//!
//! # Example
//!
//! ```
//! use hybrid_signer_core::device::{Apdu, ApduResponse};
//!
//! let apdu = Apdu::new(0xE0, 0x02, 0x00, 0x00, vec![0x00]).unwrap();
//! assert_eq!(apdu.to_bytes(), vec![0xE0, 0x02, 0x00, 0x00, 0x01, 0x00]);
//!
//! let response = ApduResponse::from_bytes(vec![0xAB, 0x90, 0x00]).unwrap();
//! assert_eq!(response.data(), &[0xAB]);
//! ```

use crate::error::{Error, Result};

/// An APDU command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    /// Class byte.
    cla: u8,

    /// Instruction byte.
    ins: u8,

    /// Parameter 1.
    p1: u8,

    /// Parameter 2.
    p2: u8,

    /// Command data.
    data: Vec<u8>,
}

impl Apdu {
    /// Maximum short APDU data length.
    pub const MAX_SHORT_DATA: usize = 255;

    /// Creates a new APDU command.
    ///
    /// # Arguments
    ///
    /// * `cla` - Class byte
    /// * `ins` - Instruction byte
    /// * `p1` - Parameter 1
    /// * `p2` - Parameter 2
    /// * `data` - Command data, at most 255 bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `data` does not fit a short APDU.
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Result<Self> {
        if data.len() > Self::MAX_SHORT_DATA {
            return Err(Error::Validation(format!(
                "APDU payload of {} bytes exceeds {}",
                data.len(),
                Self::MAX_SHORT_DATA
            )));
        }
        Ok(Self {
            cla,
            ins,
            p1,
            p2,
            data,
        })
    }

    /// Returns the class byte.
    #[must_use]
    pub const fn cla(&self) -> u8 {
        self.cla
    }

    /// Returns the instruction byte.
    #[must_use]
    pub const fn ins(&self) -> u8 {
        self.ins
    }

    /// Returns parameter 1.
    #[must_use]
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Returns parameter 2.
    #[must_use]
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Returns the command data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Serializes the APDU as `CLA ‖ INS ‖ P1 ‖ P2 ‖ Lc ‖ data`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5 + self.data.len());
        bytes.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        // Length is bounded by `new`.
        bytes.push(u8::try_from(self.data.len()).unwrap_or(u8::MAX));
        bytes.extend_from_slice(&self.data);
        bytes
    }

    /// Parses a serialized command. Used by device simulators.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the header is short or Lc disagrees
    /// with the data length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some((header, data)) = bytes.split_first_chunk::<5>() else {
            return Err(Error::Protocol(format!(
                "APDU of {} bytes is shorter than its header",
                bytes.len()
            )));
        };
        if usize::from(header[4]) != data.len() {
            return Err(Error::Protocol(format!(
                "Lc says {} bytes, found {}",
                header[4],
                data.len()
            )));
        }
        Self::new(header[0], header[1], header[2], header[3], data.to_vec())
    }
}

/// An APDU response from a secure element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    /// Response data.
    data: Vec<u8>,

    /// Status word 1.
    sw1: u8,

    /// Status word 2.
    sw2: u8,
}

impl ApduResponse {
    /// Success status word (0x9000).
    pub const SW_SUCCESS: u16 = 0x9000;

    /// Parses a raw response (`data ‖ SW1 ‖ SW2`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the response is shorter than 2 bytes.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::Protocol(format!(
                "response of {} bytes has no status word",
                bytes.len()
            )));
        }

        let sw2 = bytes.pop().unwrap_or_default();
        let sw1 = bytes.pop().unwrap_or_default();
        Ok(Self {
            data: bytes,
            sw1,
            sw2,
        })
    }

    /// Builds a response from data and a status word.
    #[must_use]
    pub fn new(data: Vec<u8>, status_word: u16) -> Self {
        let [sw1, sw2] = status_word.to_be_bytes();
        Self { data, sw1, sw2 }
    }

    /// Serializes the response as `data ‖ SW1 ‖ SW2`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.data.clone();
        bytes.extend_from_slice(&[self.sw1, self.sw2]);
        bytes
    }

    /// Returns the response data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the response and returns the data.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns the full status word as a [`u16`].
    #[must_use]
    pub const fn status_word(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Checks if the response indicates success (`SW = 0x9000`).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_word() == Self::SW_SUCCESS
    }

    /// Checks the response status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] carrying the raw status word if it is
    /// not `0x9000`.
    pub const fn check(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error::Transport {
                status: self.status_word(),
            })
        }
    }
}
