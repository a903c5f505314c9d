//! ML-DSA-44 public-key expansion for on-chain verification.
//!
//! An ML-DSA-44 public key is `rho (32) ‖ t1 (4 × 320)`. Verifying on-chain
//! from that form would force the contract to run ExpandA and the forward
//! NTT on every call, so the key is expanded once off-chain into:
//!
//! - `aHat`: the 4×4 public matrix, sampled from `rho` (already NTT domain)
//! - `tr`: SHAKE256 of the raw public key, 64 bytes
//! - `t1`: each coefficient shifted left by 13 and transformed into the NTT
//!   domain
//!
//! Every polynomial is packed with 32-bit coefficient slots (eight per
//! word) and the triple is ABI-encoded as
//! `(uint256[][][] aHat, bytes tr, uint256[][] t1)`.

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolValue;
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::{Shake128, Shake256};
use tracing::debug;

use super::packing::pack_coefficients;
use crate::error::{Error, Result};

/// The ML-DSA modulus.
pub const Q: u32 = 8_380_417;

/// Coefficients per polynomial.
pub const N: usize = 256;

/// Rows of the public matrix.
pub const K: usize = 4;

/// Columns of the public matrix.
pub const L: usize = 4;

/// Length of the `rho` seed at the start of a public key.
pub const RHO_LEN: usize = 32;

/// Bytes per 10-bit packed `t1` polynomial.
pub const T1_POLY_LEN: usize = 320;

/// Length of an ML-DSA-44 public key.
pub const PUBLIC_KEY_LEN: usize = RHO_LEN + K * T1_POLY_LEN;

/// Length of the public-key hash `tr`.
pub const TR_LEN: usize = 64;

/// Dropped low bits of `t`.
const D: u32 = 13;

/// Bit width of a coefficient slot in the packed output.
const PACK_BITS: usize = 32;

/// A polynomial of [`N`] coefficients in `[0, Q)`.
pub type Poly = [u32; N];

const ZETAS: [u32; N] = compute_zetas();

/// Powers of the primitive 512th root of unity 1753 in bit-reversed order.
const fn compute_zetas() -> [u32; N] {
    let mut zetas = [0u32; N];
    let mut k = 0;
    while k < N {
        let mut exp = (k as u8).reverse_bits();
        let mut base = 1753u64;
        let mut acc = 1u64;
        while exp > 0 {
            if exp & 1 == 1 {
                acc = acc * base % Q as u64;
            }
            base = base * base % Q as u64;
            exp >>= 1;
        }
        zetas[k] = acc as u32;
        k += 1;
    }
    zetas
}

/// An expanded public key ready for ABI encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPublicKey {
    /// Packed public matrix, `K × L` polynomials of 32 words each.
    pub a_hat: Vec<Vec<Vec<U256>>>,

    /// SHAKE256 hash of the raw public key.
    pub tr: [u8; TR_LEN],

    /// Packed NTT-domain `t1 << 13`, `K` polynomials of 32 words each.
    pub t1: Vec<Vec<U256>>,
}

impl EncodedPublicKey {
    /// Expands a raw 1312-byte ML-DSA-44 public key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPublicKey`] if the key has the wrong length.
    pub fn from_public_key(public_key: &[u8]) -> Result<Self> {
        if public_key.len() != PUBLIC_KEY_LEN {
            return Err(Error::InvalidPublicKey(format!(
                "ML-DSA-44 public key must be {PUBLIC_KEY_LEN} bytes, got {}",
                public_key.len()
            )));
        }

        let mut rho = [0u8; RHO_LEN];
        rho.copy_from_slice(&public_key[..RHO_LEN]);

        let matrix = expand_a(&rho);
        let mut a_hat = Vec::with_capacity(K);
        for row in &matrix {
            let mut packed_row = Vec::with_capacity(L);
            for poly in row {
                packed_row.push(pack_coefficients(poly, PACK_BITS)?);
            }
            a_hat.push(packed_row);
        }

        let mut t1 = Vec::with_capacity(K);
        for poly in unpack_t1(&public_key[RHO_LEN..]) {
            let mut shifted = poly.map(|c| c << D);
            ntt(&mut shifted);
            t1.push(pack_coefficients(&shifted, PACK_BITS)?);
        }

        debug!(rows = K, cols = L, "expanded ML-DSA-44 public key");

        Ok(Self {
            a_hat,
            tr: public_key_hash(public_key),
            t1,
        })
    }

    /// ABI-encodes as `(uint256[][][] aHat, bytes tr, uint256[][] t1)`.
    #[must_use]
    pub fn abi_encode(&self) -> Vec<u8> {
        (
            self.a_hat.clone(),
            Bytes::copy_from_slice(&self.tr),
            self.t1.clone(),
        )
            .abi_encode_params()
    }
}

/// Computes `tr = SHAKE256(pk)` truncated to 64 bytes.
#[must_use]
pub fn public_key_hash(public_key: &[u8]) -> [u8; TR_LEN] {
    let mut hasher = Shake256::default();
    hasher.update(public_key);
    let mut tr = [0u8; TR_LEN];
    hasher.finalize_xof().read(&mut tr);
    tr
}

/// Samples the `K × L` public matrix from `rho`.
#[must_use]
pub fn expand_a(rho: &[u8; RHO_LEN]) -> [[Poly; L]; K] {
    let mut matrix = [[[0u32; N]; L]; K];
    for (i, row) in matrix.iter_mut().enumerate() {
        for (j, poly) in row.iter_mut().enumerate() {
            *poly = sample_uniform(rho, i as u8, j as u8);
        }
    }
    matrix
}

/// Rejection-samples one matrix cell `(i, j)` from SHAKE128(`rho ‖ j ‖ i`).
#[must_use]
pub fn sample_uniform(rho: &[u8; RHO_LEN], i: u8, j: u8) -> Poly {
    let mut xof = Shake128::default();
    xof.update(rho);
    xof.update(&[j, i]);
    let mut reader = xof.finalize_xof();

    let mut poly = [0u32; N];
    let mut filled = 0;
    let mut group = [0u8; 3];
    while filled < N {
        reader.read(&mut group);
        let candidate = u32::from_le_bytes([group[0], group[1], group[2], 0]) & 0x7F_FFFF;
        if candidate < Q {
            poly[filled] = candidate;
            filled += 1;
        }
    }
    poly
}

/// Forward number-theoretic transform in place, output in `[0, Q)`.
pub fn ntt(poly: &mut Poly) {
    let q = u64::from(Q);
    let mut k = 0;
    let mut len = N / 2;
    while len > 0 {
        let mut start = 0;
        while start < N {
            k += 1;
            let zeta = u64::from(ZETAS[k]);
            for j in start..start + len {
                let t = zeta * u64::from(poly[j + len]) % q;
                let a = u64::from(poly[j]);
                poly[j + len] = ((a + q - t) % q) as u32;
                poly[j] = ((a + t) % q) as u32;
            }
            start += 2 * len;
        }
        len >>= 1;
    }
}

/// Splits the `t1` region into `K` polynomials of 10-bit coefficients.
fn unpack_t1(bytes: &[u8]) -> [Poly; K] {
    let mut polys = [[0u32; N]; K];
    for (poly, chunk) in polys.iter_mut().zip(bytes.chunks_exact(T1_POLY_LEN)) {
        for (coeffs, b) in poly.chunks_exact_mut(4).zip(chunk.chunks_exact(5)) {
            let b: [u32; 5] = [b[0], b[1], b[2], b[3], b[4]].map(u32::from);
            coeffs[0] = (b[0] | (b[1] << 8)) & 0x3FF;
            coeffs[1] = ((b[1] >> 2) | (b[2] << 6)) & 0x3FF;
            coeffs[2] = ((b[2] >> 4) | (b[3] << 4)) & 0x3FF;
            coeffs[3] = ((b[3] >> 6) | (b[4] << 2)) & 0x3FF;
        }
    }
    polys
}
