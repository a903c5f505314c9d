//! Gas floors for hybrid-signed operations.
//!
//! Post-quantum signatures are kilobytes long and verifying them on-chain
//! costs millions of gas. Generic bundler estimators under-price both the
//! verification step and the calldata, so estimates are corrected upward:
//!
//! - `verificationGasLimit = max(estimate, floor(algorithm))`
//! - `preVerificationGas = max(estimate × multiplier / 100, floor)`
//!
//! When estimation fails outright the floors are used as-is.

use serde::{Deserialize, Serialize};

use super::GasEstimate;
use crate::lattice::PqAlgorithm;

/// Gas limits the final operation is signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasLimits {
    /// Gas for account validation, including signature verification.
    pub verification_gas_limit: u64,
    /// Gas for the account's execution call.
    pub call_gas_limit: u64,
    /// Gas charged for calldata and bundler overhead.
    pub pre_verification_gas: u64,
}

/// Floors and multipliers applied to bundler estimates.
///
/// The defaults are placeholders until pinned against the deployed
/// verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GasPolicy {
    /// Verification gas floor for ML-DSA-44 accounts.
    pub ml_dsa44_verification_gas_floor: u64,
    /// Verification gas floor for Falcon-512 accounts.
    pub falcon512_verification_gas_floor: u64,
    /// Percentage applied to the estimated pre-verification gas.
    pub pre_verification_gas_multiplier_percent: u64,
    /// Pre-verification gas floor.
    pub pre_verification_gas_floor: u64,
    /// Call gas used when estimation fails.
    pub default_call_gas_limit: u64,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            ml_dsa44_verification_gas_floor: 8_000_000,
            falcon512_verification_gas_floor: 4_000_000,
            pre_verification_gas_multiplier_percent: 150,
            pre_verification_gas_floor: 400_000,
            default_call_gas_limit: 500_000,
        }
    }
}

impl GasPolicy {
    /// Returns the verification gas floor for `algorithm`.
    #[must_use]
    pub const fn verification_floor(&self, algorithm: PqAlgorithm) -> u64 {
        match algorithm {
            PqAlgorithm::MlDsa44 => self.ml_dsa44_verification_gas_floor,
            PqAlgorithm::Falcon512 => self.falcon512_verification_gas_floor,
        }
    }

    /// Corrects a bundler estimate upward to the floors.
    #[must_use]
    pub fn apply(&self, estimate: &GasEstimate, algorithm: PqAlgorithm) -> GasLimits {
        let scaled = estimate
            .pre_verification_gas
            .saturating_mul(self.pre_verification_gas_multiplier_percent)
            / 100;

        GasLimits {
            verification_gas_limit: estimate
                .verification_gas_limit
                .max(self.verification_floor(algorithm)),
            call_gas_limit: estimate.call_gas_limit,
            pre_verification_gas: scaled.max(self.pre_verification_gas_floor),
        }
    }

    /// Limits used when no estimate is available.
    #[must_use]
    pub const fn fallback(&self, algorithm: PqAlgorithm) -> GasLimits {
        GasLimits {
            verification_gas_limit: self.verification_floor(algorithm),
            call_gas_limit: self.default_call_gas_limit,
            pre_verification_gas: self.pre_verification_gas_floor,
        }
    }
}
