//! Build, sign, submit and track user operations.
//!
//! # Flow
//!
//! 1. Fetch the nonce and fees, falling back to `0` and the configured
//!    defaults when the collaborators fail.
//! 2. Encode `execute(target, value, data)` as the account call.
//! 3. Estimate gas with a dummy signature of the real length, so calldata
//!    costs are priced correctly.
//! 4. Raise the estimate to the [`GasPolicy`](super::GasPolicy) floors.
//! 5. Sign the final operation and hand it to the bundler.
//! 6. Poll for a receipt until the configured timeout.

use std::sync::Arc;

use alloy_primitives::aliases::U192;
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::{SolCall, sol};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::gas::GasLimits;
use super::{Bundler, FeeOracle, FeeSuggestion, NonceSource, OperationId, ReceiptOutcome};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::operation::{PackedUserOperation, operation_hash, pack_u128_pair};
use crate::signer::{HybridSignature, OperationSigner};

sol! {
    /// The smart account's execution entry point.
    function execute(address dest, uint256 value, bytes func);
}

/// What the caller wants the account to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationRequest {
    /// The smart account.
    pub sender: Address,
    /// Contract or account the account calls.
    pub target: Address,
    /// Wei forwarded with the call.
    pub value: U256,
    /// Calldata for `target`.
    pub data: Bytes,
    /// Factory call deploying the account, empty once deployed.
    pub init_code: Bytes,
    /// Paymaster address and data, empty when the account pays.
    pub paymaster_and_data: Bytes,
    /// Entry point nonce key.
    pub nonce_key: U192,
}

impl OperationRequest {
    /// A plain call from `sender` to `target` with no value.
    #[must_use]
    pub fn call(sender: Address, target: Address, data: impl Into<Bytes>) -> Self {
        Self {
            sender,
            target,
            data: data.into(),
            ..Self::default()
        }
    }

    /// Encodes the account's `execute` call.
    #[must_use]
    pub fn encode_call_data(&self) -> Bytes {
        executeCall {
            dest: self.target,
            value: self.value,
            func: self.data.clone(),
        }
        .abi_encode()
        .into()
    }
}

/// A signed operation ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedOperation {
    /// The operation, hybrid signature included.
    pub operation: PackedUserOperation,
    /// The hash both halves signed.
    pub hash: B256,
    /// Entry point the hash is bound to.
    pub entry_point: Address,
    /// Chain the hash is bound to.
    pub chain_id: u64,
}

/// Drives an operation from request to receipt.
pub struct OperationPipeline {
    signer: Arc<dyn OperationSigner>,
    bundler: Arc<dyn Bundler>,
    fee_oracle: Arc<dyn FeeOracle>,
    nonce_source: Arc<dyn NonceSource>,
    config: PipelineConfig,
}

impl std::fmt::Debug for OperationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationPipeline")
            .field("algorithm", &self.signer.algorithm())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OperationPipeline {
    /// Creates a pipeline from its collaborators.
    #[must_use]
    pub fn new(
        signer: Arc<dyn OperationSigner>,
        bundler: Arc<dyn Bundler>,
        fee_oracle: Arc<dyn FeeOracle>,
        nonce_source: Arc<dyn NonceSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            signer,
            bundler,
            fee_oracle,
            nonce_source,
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Builds, estimates and signs an operation.
    ///
    /// Collaborator failures during nonce, fee and gas lookup are logged
    /// and replaced by defaults. Only signing failures are returned.
    ///
    /// # Errors
    ///
    /// Returns the signer's error if either signature half fails.
    pub async fn build_and_sign(&self, request: &OperationRequest) -> Result<SignedOperation> {
        let algorithm = self.signer.algorithm();
        let nonce = self.nonce(request).await;
        let fees = self.fees().await;

        let mut op = PackedUserOperation {
            sender: request.sender,
            nonce,
            init_code: request.init_code.clone(),
            call_data: request.encode_call_data(),
            paymaster_and_data: request.paymaster_and_data.clone(),
            gas_fees: pack_u128_pair(fees.max_priority_fee_per_gas, fees.max_fee_per_gas),
            ..PackedUserOperation::default()
        };
        apply_limits(&mut op, &self.config.gas.fallback(algorithm));
        op.signature = self.signer.dummy_signature().encode();

        let limits = match self
            .bundler
            .estimate_user_operation_gas(&op, self.config.entry_point)
            .await
        {
            Ok(estimate) => {
                debug!(?estimate, "bundler gas estimate");
                self.config.gas.apply(&estimate, algorithm)
            }
            Err(e) => {
                warn!("gas estimation failed, using floors: {e}");
                self.config.gas.fallback(algorithm)
            }
        };
        apply_limits(&mut op, &limits);

        let (mut op, signature) = self.sign(op).await?;
        op.signature = signature.encode();

        let hash = operation_hash(&op, self.config.entry_point, self.config.chain_id);
        info!(%hash, sender = %op.sender, nonce = %op.nonce, %algorithm, "operation signed");

        Ok(SignedOperation {
            operation: op,
            hash,
            entry_point: self.config.entry_point,
            chain_id: self.config.chain_id,
        })
    }

    /// Hands a signed operation to the bundler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Submission`] carrying the bundler's reason, or
    /// [`Error::Rpc`] unchanged when the bundler could not be reached.
    pub async fn submit(&self, signed: &SignedOperation) -> Result<OperationId> {
        let id = self
            .bundler
            .send_user_operation(&signed.operation, signed.entry_point)
            .await
            .map_err(|e| match e {
                Error::Submission(_) | Error::Rpc(_) => e,
                other => Error::Submission(other.to_string()),
            })?;

        if id != signed.hash {
            warn!(%id, hash = %signed.hash, "bundler returned a different operation id");
        }
        info!(%id, "operation submitted");
        Ok(id)
    }

    /// Polls for a receipt until one appears or the timeout elapses.
    ///
    /// Lookup errors are logged and polling continues. The last lookup
    /// happens at the deadline, never after it.
    pub async fn poll_receipt(&self, id: OperationId) -> ReceiptOutcome {
        let deadline = Instant::now() + self.config.poll.timeout();

        loop {
            match self.bundler.get_user_operation_receipt(id).await {
                Ok(Some(receipt)) => {
                    info!(
                        %id,
                        success = receipt.success,
                        block = receipt.block_number,
                        "operation included"
                    );
                    return ReceiptOutcome::Included(receipt);
                }
                Ok(None) => debug!(%id, "receipt not yet available"),
                Err(e) => warn!(%id, "receipt lookup failed: {e}"),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(%id, "no receipt before timeout");
                return ReceiptOutcome::Pending(id);
            }
            sleep(self.config.poll.interval().min(deadline - now)).await;
        }
    }

    /// Runs the whole flow for one request.
    ///
    /// # Errors
    ///
    /// Returns signing or submission errors.
    pub async fn execute(&self, request: &OperationRequest) -> Result<ReceiptOutcome> {
        let signed = self.build_and_sign(request).await?;
        let id = self.submit(&signed).await?;
        Ok(self.poll_receipt(id).await)
    }

    async fn nonce(&self, request: &OperationRequest) -> U256 {
        match self
            .nonce_source
            .nonce(request.sender, request.nonce_key)
            .await
        {
            Ok(nonce) => nonce,
            Err(e) => {
                warn!(sender = %request.sender, "nonce lookup failed, using sequence 0: {e}");
                U256::from(request.nonce_key) << 64
            }
        }
    }

    async fn fees(&self) -> FeeSuggestion {
        match self.fee_oracle.suggested_fees().await {
            Ok(fees) => fees,
            Err(e) => {
                warn!("fee oracle failed, using configured fees: {e}");
                self.config.fees.into()
            }
        }
    }

    /// Signs on the blocking pool; device signing waits on the user.
    async fn sign(&self, op: PackedUserOperation) -> Result<(PackedUserOperation, HybridSignature)> {
        let signer = Arc::clone(&self.signer);
        let entry_point = self.config.entry_point;
        let chain_id = self.config.chain_id;

        tokio::task::spawn_blocking(move || {
            let signature = signer.sign_operation(&op, entry_point, chain_id)?;
            Ok((op, signature))
        })
        .await
        .map_err(|e| Error::SigningFailed(format!("signing task failed: {e}")))?
    }
}

fn apply_limits(op: &mut PackedUserOperation, limits: &GasLimits) {
    op.account_gas_limits = pack_u128_pair(
        u128::from(limits.verification_gas_limit),
        u128::from(limits.call_gas_limit),
    );
    op.pre_verification_gas = U256::from(limits.pre_verification_gas);
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, hex};

    use super::*;

    #[test]
    fn execute_selector() {
        assert_eq!(executeCall::SELECTOR, hex!("b61d27f6"));
    }

    #[test]
    fn call_data_layout() {
        let request = OperationRequest {
            value: U256::from(7),
            ..OperationRequest::call(
                Address::ZERO,
                address!("0x00000000000000000000000000000000000000aa"),
                vec![0xde, 0xad],
            )
        };
        let data = request.encode_call_data();

        // selector, dest, value, offset, length, one padded word
        assert_eq!(data.len(), 4 + 32 * 5);
        assert_eq!(&data[..4], hex!("b61d27f6"));
        assert_eq!(data[4 + 31], 0xaa);
        assert_eq!(data[4 + 63], 7);
        assert_eq!(data[4 + 95], 0x60);
        assert_eq!(data[4 + 127], 2);
        assert_eq!(&data[4 + 128..4 + 130], [0xde, 0xad]);
    }

    #[test]
    fn limits_are_packed() {
        let mut op = PackedUserOperation::default();
        apply_limits(
            &mut op,
            &GasLimits {
                verification_gas_limit: 8_000_000,
                call_gas_limit: 500_000,
                pre_verification_gas: 400_000,
            },
        );
        assert_eq!(op.verification_gas_limit(), 8_000_000);
        assert_eq!(op.call_gas_limit(), 500_000);
        assert_eq!(op.pre_verification_gas, U256::from(400_000));
    }
}
