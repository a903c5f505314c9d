//! Pipeline configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//!
//! ```
//! use hybrid_signer_core::config::PipelineConfig;
//!
//! let config = PipelineConfig::from_json_str(r#"{ "chainId": 11155111 }"#).unwrap();
//! assert_eq!(config.chain_id, 11_155_111);
//! assert_eq!(config.gas.pre_verification_gas_multiplier_percent, 150);
//! ```

use std::time::Duration;

use alloy_primitives::{Address, address};
use serde::{Deserialize, Serialize};

use crate::bundler::{FeeSuggestion, GasPolicy};
use crate::error::{Error, Result};

/// The canonical v0.7 entry point.
pub const ENTRY_POINT_V07: Address = address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

const GWEI: u64 = 1_000_000_000;

/// Fees used when the fee oracle is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeeDefaults {
    /// Fee cap per gas, in wei.
    pub max_fee_per_gas: u64,
    /// Tip per gas, in wei.
    pub max_priority_fee_per_gas: u64,
}

impl Default for FeeDefaults {
    fn default() -> Self {
        Self {
            max_fee_per_gas: 50 * GWEI,
            max_priority_fee_per_gas: 2 * GWEI,
        }
    }
}

impl From<FeeDefaults> for FeeSuggestion {
    fn from(fees: FeeDefaults) -> Self {
        Self {
            max_fee_per_gas: u128::from(fees.max_fee_per_gas),
            max_priority_fee_per_gas: u128::from(fees.max_priority_fee_per_gas),
        }
    }
}

/// Receipt polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollConfig {
    /// Delay between receipt lookups.
    pub interval_ms: u64,
    /// Total time to wait before reporting the operation as pending.
    pub timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            timeout_ms: 60_000,
        }
    }
}

impl PollConfig {
    /// Delay between receipt lookups.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Total time to wait before reporting the operation as pending.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Everything [`crate::bundler::OperationPipeline`] needs besides its
/// collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Entry point the operations target.
    pub entry_point: Address,
    /// Chain the operations are signed for.
    pub chain_id: u64,
    /// Gas floors and fallback limits.
    pub gas: GasPolicy,
    /// Fees used when the fee oracle fails.
    pub fees: FeeDefaults,
    /// Receipt polling cadence.
    pub poll: PollConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            entry_point: ENTRY_POINT_V07,
            chain_id: 1,
            gas: GasPolicy::default(),
            fees: FeeDefaults::default(),
            poll: PollConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a JSON config.
    ///
    /// # Errors
    ///
    /// - [`Error::JsonError`] if the JSON is malformed
    /// - [`Error::Validation`] if a value is out of range
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the values can drive a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(Error::Validation("chainId must be non-zero".to_string()));
        }
        if self.gas.pre_verification_gas_multiplier_percent < 100 {
            return Err(Error::Validation(
                "preVerificationGasMultiplierPercent must be at least 100".to_string(),
            ));
        }
        if self.fees.max_priority_fee_per_gas > self.fees.max_fee_per_gas {
            return Err(Error::Validation(
                "maxPriorityFeePerGas exceeds maxFeePerGas".to_string(),
            ));
        }
        if self.poll.interval_ms == 0 {
            return Err(Error::Validation("poll intervalMs must be non-zero".to_string()));
        }
        Ok(())
    }
}
