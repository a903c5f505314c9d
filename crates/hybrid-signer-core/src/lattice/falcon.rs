//! Falcon-512 signature compaction for on-chain verification.
//!
//! The signing primitive returns the NIST "signed message" layout:
//!
//! ```text
//! sigLen (2, BE) ‖ nonce (40) ‖ message (mlen) ‖ esig (sigLen)
//! ```
//!
//! where `esig[0]` is the header byte `0x29` (logn = 9). The verifier wants
//! `nonce ‖ s2` with the 512 coefficients of `s2` packed sixteen per word
//! and each word written little-endian, 1064 bytes in total.

use tracing::trace;

use super::packing::{pack_coefficients, words_to_le_bytes};
use crate::error::{Error, Result};

/// The Falcon modulus.
pub const Q: u32 = 12_289;

/// Coefficients in a Falcon-512 signature polynomial.
pub const N: usize = 512;

/// Length of the signature salt.
pub const NONCE_LEN: usize = 40;

/// Header byte of a Falcon-512 signature body (`0x20 + logn`).
pub const SIGNATURE_HEADER: u8 = 0x29;

/// Length of the compact on-chain signature.
pub const COMPACT_SIGNATURE_LEN: usize = NONCE_LEN + N * 2;

/// Length of a Falcon-512 public key.
pub const PUBLIC_KEY_LEN: usize = 897;

/// Length of the signed-message prefix (`sigLen ‖ nonce`).
pub const SIGNED_MESSAGE_PREFIX_LEN: usize = 2 + NONCE_LEN;

const PACK_BITS: usize = 16;

/// Uncompressed body length: 512 big-endian `u16` coefficients.
const RAW_BODY_LEN: usize = N * 2;

/// Converts a raw signed message into the 1064-byte compact signature.
///
/// # Arguments
///
/// * `signed_message` - Output of the signing primitive
/// * `message_len` - Length of the message embedded in it
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the buffer is truncated, the length header
/// disagrees with the buffer, the header byte is not `0x29`, or the body is
/// not a valid coefficient encoding.
pub fn compact_signature(signed_message: &[u8], message_len: usize) -> Result<Vec<u8>> {
    let esig_start = SIGNED_MESSAGE_PREFIX_LEN + message_len;
    if signed_message.len() <= esig_start {
        return Err(Error::Protocol(format!(
            "signed message of {} bytes too short for a {message_len}-byte message",
            signed_message.len()
        )));
    }

    let declared = usize::from(u16::from_be_bytes([signed_message[0], signed_message[1]]));
    let esig = &signed_message[esig_start..];
    if esig.len() != declared {
        return Err(Error::Protocol(format!(
            "signature length header says {declared} bytes, found {}",
            esig.len()
        )));
    }

    if esig[0] != SIGNATURE_HEADER {
        return Err(Error::Protocol(format!(
            "bad Falcon signature header {:#04x}",
            esig[0]
        )));
    }

    let body = &esig[1..];
    let coefficients = if body.len() == RAW_BODY_LEN {
        body.chunks_exact(2)
            .map(|pair| u32::from(u16::from_be_bytes([pair[0], pair[1]])))
            .collect::<Vec<_>>()
    } else {
        decompress(body)?
            .into_iter()
            .map(to_field_element)
            .collect::<Vec<_>>()
    };
    trace!(body_len = body.len(), "decoded Falcon signature body");

    let words = pack_coefficients(&coefficients, PACK_BITS)?;

    let mut out = Vec::with_capacity(COMPACT_SIGNATURE_LEN);
    out.extend_from_slice(&signed_message[2..SIGNED_MESSAGE_PREFIX_LEN]);
    out.extend_from_slice(&words_to_le_bytes(&words));
    Ok(out)
}

/// Decodes the Falcon compressed encoding of 512 signed coefficients.
///
/// Each coefficient is a sign bit, the low 7 bits of its magnitude, then the
/// high bits of the magnitude in unary terminated by a one bit. Unused bits
/// in the final byte, and any padding bytes, must be zero.
///
/// # Errors
///
/// Returns [`Error::Protocol`] for truncated input, a magnitude above 2047,
/// a negative zero, or non-zero padding.
pub fn decompress(body: &[u8]) -> Result<Vec<i16>> {
    let malformed = |what: &str| Error::Protocol(format!("malformed Falcon signature: {what}"));

    let mut out = Vec::with_capacity(N);
    let mut acc: u32 = 0;
    let mut acc_len: u32 = 0;
    let mut bytes = body.iter().copied();

    for _ in 0..N {
        let next = bytes.next().ok_or_else(|| malformed("truncated"))?;
        acc = (acc << 8) | u32::from(next);
        let b = acc >> acc_len;
        let negative = b & 0x80 != 0;
        let mut magnitude = b & 0x7F;

        loop {
            if acc_len == 0 {
                let next = bytes.next().ok_or_else(|| malformed("truncated"))?;
                acc = (acc << 8) | u32::from(next);
                acc_len = 8;
            }
            acc_len -= 1;
            if (acc >> acc_len) & 1 != 0 {
                break;
            }
            magnitude += 128;
            if magnitude > 2047 {
                return Err(malformed("coefficient out of range"));
            }
        }

        if negative && magnitude == 0 {
            return Err(malformed("negative zero"));
        }
        let value = i16::try_from(magnitude).map_err(|_| malformed("coefficient out of range"))?;
        out.push(if negative { -value } else { value });
    }

    if acc & ((1u32 << acc_len) - 1) != 0 {
        return Err(malformed("non-zero trailing bits"));
    }
    if bytes.any(|b| b != 0) {
        return Err(malformed("non-zero padding"));
    }
    Ok(out)
}

fn to_field_element(c: i16) -> u32 {
    if c < 0 {
        Q - u32::from(c.unsigned_abs())
    } else {
        u32::from(c.unsigned_abs())
    }
}
