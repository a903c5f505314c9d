//! Bit-packing of polynomial coefficients into 256-bit words.
//!
//! On-chain lattice verifiers read coefficients straight out of `uint256`
//! words. A polynomial of `n` coefficients, each `m` bits wide, becomes
//! `n·m/256` words where coefficient `i` lands in word `⌊i·m/256⌋` at bit
//! offset `(i mod (256/m))·m`.

use alloy_primitives::U256;

use crate::error::{Error, Result};

/// Bit width of one packed word.
pub const WORD_BITS: usize = 256;

/// Packs coefficients of width `m` bits into 256-bit words.
///
/// # Errors
///
/// Returns [`Error::Validation`] if `m` does not divide 256, the input does
/// not fill a whole number of words, or a coefficient does not fit in `m`
/// bits.
pub fn pack_coefficients(coefficients: &[u32], m: usize) -> Result<Vec<U256>> {
    let per_word = coefficients_per_word(m)?;
    if coefficients.len() % per_word != 0 {
        return Err(Error::Validation(format!(
            "{} coefficients do not fill whole {m}-bit words",
            coefficients.len()
        )));
    }

    let mut words = vec![U256::ZERO; coefficients.len() / per_word];
    for (i, &c) in coefficients.iter().enumerate() {
        if m < 32 && c >> m != 0 {
            return Err(Error::Validation(format!(
                "coefficient {c} at index {i} exceeds {m} bits"
            )));
        }
        words[i * m / WORD_BITS] |= U256::from(c) << ((i % per_word) * m);
    }
    Ok(words)
}

/// Unpacks 256-bit words into coefficients of width `m` bits.
///
/// Inverse of [`pack_coefficients`].
///
/// # Errors
///
/// Returns [`Error::Validation`] if `m` does not divide 256 or exceeds 32.
pub fn unpack_coefficients(words: &[U256], m: usize) -> Result<Vec<u32>> {
    let per_word = coefficients_per_word(m)?;
    let mask = (U256::from(1u8) << m) - U256::from(1u8);

    let mut out = Vec::with_capacity(words.len() * per_word);
    for word in words {
        for slot in 0..per_word {
            let value = (*word >> (slot * m)) & mask;
            out.push(value.to::<u32>());
        }
    }
    Ok(out)
}

/// Serializes each word as 32 bytes with the big-endian byte order
/// reversed, i.e. little-endian.
#[must_use]
pub fn words_to_le_bytes(words: &[U256]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 32);
    for word in words {
        out.extend_from_slice(&word.to_le_bytes::<32>());
    }
    out
}

fn coefficients_per_word(m: usize) -> Result<usize> {
    if m == 0 || m > 32 || WORD_BITS % m != 0 {
        return Err(Error::Validation(format!(
            "coefficient width {m} must divide 256 and be at most 32"
        )));
    }
    Ok(WORD_BITS / m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_16_bit_roundtrip() {
        let coefficients: Vec<u32> = (0..512u32).map(|i| (i * 40_503) & 0xFFFF).collect();
        let words = pack_coefficients(&coefficients, 16).unwrap();

        assert_eq!(words.len(), 32);
        assert_eq!(unpack_coefficients(&words, 16).unwrap(), coefficients);
    }

    #[test]
    fn pack_32_bit_layout() {
        let mut coefficients = vec![0u32; 256];
        coefficients[0] = 1;
        coefficients[1] = 2;
        coefficients[8] = 3;

        let words = pack_coefficients(&coefficients, 32).unwrap();
        assert_eq!(words.len(), 32);
        assert_eq!(words[0], U256::from(1u8) | (U256::from(2u8) << 32));
        assert_eq!(words[1], U256::from(3u8));
    }

    #[test]
    fn le_bytes_reverse_each_word() {
        let word = U256::from(0x0102u16);
        let bytes = words_to_le_bytes(&[word]);
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[..2], &[0x02, 0x01]);
        assert!(bytes[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_oversized_coefficient() {
        let mut coefficients = vec![0u32; 16];
        coefficients[3] = 0x1_0000;
        assert!(matches!(
            pack_coefficients(&coefficients, 16),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn rejects_bad_width_and_partial_word() {
        assert!(pack_coefficients(&[0; 256], 24).is_err());
        assert!(pack_coefficients(&[0; 15], 16).is_err());
        assert!(unpack_coefficients(&[U256::ZERO], 0).is_err());
    }
}
