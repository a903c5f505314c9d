//! BIP-32 derivation paths.
//!
//! Keys on the secure element are addressed by a derivation path. The text
//! form is `m/44'/60'/0'/0/0` (`h` is accepted for hardened components);
//! the wire form is
//!
//! ```text
//! | count (1) | component 0 (4, BE) | ... | component n-1 (4, BE) |
//! ```
//!
//! with hardened components carrying the `0x8000_0000` bit.
//!
//! # Example
//!
//! ```
//! use hybrid_signer_core::device::DerivationPath;
//!
//! let path: DerivationPath = "m/44'/60'/0'/0/0".parse().unwrap();
//! assert_eq!(path.components()[0], 0x8000_002C);
//! assert_eq!(path.to_string(), "m/44'/60'/0'/0/0");
//! ```

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::{Error, Result};

/// Hardened-derivation flag.
pub const HARDENED: u32 = 0x8000_0000;

/// Maximum number of path components the device accepts.
pub const MAX_DEPTH: usize = 10;

/// A BIP-32 derivation path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivationPath(Vec<u32>);

impl DerivationPath {
    /// Builds a path from raw components.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDerivationPath`] if there are more than
    /// [`MAX_DEPTH`] components.
    pub fn new(components: Vec<u32>) -> Result<Self> {
        if components.len() > MAX_DEPTH {
            return Err(Error::InvalidDerivationPath(format!(
                "{} components exceed the maximum depth of {MAX_DEPTH}",
                components.len()
            )));
        }
        Ok(Self(components))
    }

    /// The standard Ethereum account path `m/44'/60'/0'/0/index`.
    #[must_use]
    pub fn ethereum(index: u32) -> Self {
        Self(vec![44 | HARDENED, 60 | HARDENED, HARDENED, 0, index & !HARDENED])
    }

    /// Returns the raw components.
    #[must_use]
    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// Serializes to the device wire form.
    #[must_use]
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.0.len() * 4);
        // Depth is bounded by MAX_DEPTH.
        out.push(u8::try_from(self.0.len()).unwrap_or(u8::MAX));
        for component in &self.0 {
            out.extend_from_slice(&component.to_be_bytes());
        }
        out
    }

    /// Parses the device wire form, returning the path and the bytes after
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDerivationPath`] if the payload is truncated
    /// or too deep.
    pub fn from_payload(payload: &[u8]) -> Result<(Self, &[u8])> {
        let (&count, rest) = payload
            .split_first()
            .ok_or_else(|| Error::InvalidDerivationPath("empty payload".to_string()))?;
        let count = usize::from(count);
        if rest.len() < count * 4 {
            return Err(Error::InvalidDerivationPath(format!(
                "payload declares {count} components but has {} bytes",
                rest.len()
            )));
        }

        let (body, tail) = rest.split_at(count * 4);
        let components = body
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok((Self::new(components)?, tail))
    }
}

impl Default for DerivationPath {
    fn default() -> Self {
        Self::ethereum(0)
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('/');
        if parts.next() != Some("m") {
            return Err(Error::InvalidDerivationPath(format!(
                "path must start with 'm/': {s}"
            )));
        }

        let mut components = Vec::new();
        for part in parts {
            let (digits, hardened) = match part
                .strip_suffix('\'')
                .or_else(|| part.strip_suffix('h'))
            {
                Some(digits) => (digits, true),
                None => (part, false),
            };
            let index: u32 = digits.parse().map_err(|_| {
                Error::InvalidDerivationPath(format!("invalid component '{part}' in {s}"))
            })?;
            if index & HARDENED != 0 {
                return Err(Error::InvalidDerivationPath(format!(
                    "component {index} out of range"
                )));
            }
            components.push(if hardened { index | HARDENED } else { index });
        }

        Self::new(components)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for component in &self.0 {
            if component & HARDENED != 0 {
                write!(f, "/{}'", component & !HARDENED)?;
            } else {
                write!(f, "/{component}")?;
            }
        }
        Ok(())
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
