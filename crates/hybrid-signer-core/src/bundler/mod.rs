//! Bundler submission.
//!
//! The pipeline depends on three collaborators, each behind an async trait
//! so hosts can plug in their own RPC client:
//!
//! - [`Bundler`]: gas estimation, submission and receipt lookup
//! - [`FeeOracle`]: current fee suggestions
//! - [`NonceSource`]: the entry point's nonce for a sender
//!
//! [`OperationPipeline`] drives them: build the operation, estimate with a
//! dummy signature, apply [`GasPolicy`] floors, sign for real, submit and
//! poll for inclusion.

pub mod gas;
pub mod pipeline;

pub use gas::{GasLimits, GasPolicy};
pub use pipeline::{OperationPipeline, OperationRequest, SignedOperation};

use alloy_primitives::aliases::U192;
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::operation::PackedUserOperation;

/// Bundler-assigned identifier of a submitted operation.
///
/// Bundlers return the operation hash, so this is the same 32 bytes the
/// account signed.
pub type OperationId = B256;

/// Gas figures returned by `eth_estimateUserOperationGas`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    /// Gas for account and paymaster validation.
    pub verification_gas_limit: u64,
    /// Gas for the account's execution call.
    pub call_gas_limit: u64,
    /// Bundler overhead charged outside execution.
    pub pre_verification_gas: u64,
}

/// Fee suggestion in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSuggestion {
    /// Fee cap per gas.
    pub max_fee_per_gas: u128,
    /// Tip per gas.
    pub max_priority_fee_per_gas: u128,
}

/// Receipt of an included operation, as returned by
/// `eth_getUserOperationReceipt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    /// Hash of the operation.
    pub user_op_hash: B256,
    /// Whether the account's execution call succeeded.
    pub success: bool,
    /// Gas consumed by the operation.
    pub actual_gas_used: U256,
    /// Wei paid for the operation.
    pub actual_gas_cost: U256,
    /// Block the bundle landed in.
    pub block_number: u64,
    /// Hash of that block.
    pub block_hash: B256,
    /// Hash of the bundle transaction.
    pub transaction_hash: B256,
}

/// Result of waiting for inclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptOutcome {
    /// The operation was included.
    Included(UserOperationReceipt),
    /// No receipt appeared before the deadline. The operation may still be
    /// included later.
    Pending(OperationId),
}

impl ReceiptOutcome {
    /// Returns the receipt if the operation was included.
    #[must_use]
    pub const fn receipt(&self) -> Option<&UserOperationReceipt> {
        match self {
            Self::Included(receipt) => Some(receipt),
            Self::Pending(_) => None,
        }
    }
}

/// An ERC-4337 bundler endpoint.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Estimates gas for `op` against `entry_point`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Estimation`] or [`crate::Error::Rpc`].
    async fn estimate_user_operation_gas(
        &self,
        op: &PackedUserOperation,
        entry_point: Address,
    ) -> Result<GasEstimate>;

    /// Submits a signed operation and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Submission`] if the bundler rejects the
    /// operation and [`crate::Error::Rpc`] if it cannot be reached.
    async fn send_user_operation(
        &self,
        op: &PackedUserOperation,
        entry_point: Address,
    ) -> Result<OperationId>;

    /// Looks up the receipt of a submitted operation. `Ok(None)` means not
    /// yet included.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Rpc`] if the lookup fails.
    async fn get_user_operation_receipt(
        &self,
        id: OperationId,
    ) -> Result<Option<UserOperationReceipt>>;
}

/// Source of fee suggestions.
#[async_trait]
pub trait FeeOracle: Send + Sync {
    /// Returns the current fee suggestion.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Rpc`] if the suggestion is unavailable.
    async fn suggested_fees(&self) -> Result<FeeSuggestion>;
}

/// Source of entry point nonces.
#[async_trait]
pub trait NonceSource: Send + Sync {
    /// Returns `getNonce(sender, key)` from the entry point.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Rpc`] if the call fails.
    async fn nonce(&self, sender: Address, key: U192) -> Result<U256>;
}
