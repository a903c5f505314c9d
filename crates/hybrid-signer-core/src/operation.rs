//! ERC-4337 packed user operations and their canonical hash.
//!
//! A [`PackedUserOperation`] is the account-abstraction request signed by the
//! hybrid signer and relayed by a bundler. Its signing hash is computed the
//! way the v0.7 EntryPoint computes it on-chain:
//!
//! ```text
//! inner = keccak256(abi.encode(
//!     sender, nonce, keccak256(initCode), keccak256(callData),
//!     accountGasLimits, preVerificationGas, gasFees, keccak256(paymasterAndData)))
//! hash  = keccak256(abi.encode(inner, entryPoint, chainId))
//! ```
//!
//! Any deviation in field order or padding breaks verification by the
//! account contract, so the layout here is fixed.
//!
//! # Example
//!
//! ```
//! use alloy_primitives::{Address, U256};
//! use hybrid_signer_core::operation::{PackedUserOperation, operation_hash, pack_u128_pair};
//!
//! let op = PackedUserOperation {
//!     sender: Address::repeat_byte(0x11),
//!     account_gas_limits: pack_u128_pair(100_000, 200_000),
//!     ..PackedUserOperation::default()
//! };
//! let hash = operation_hash(&op, Address::ZERO, 1);
//! assert_eq!(hash, operation_hash(&op, Address::ZERO, 1));
//! ```

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

/// An ERC-4337 v0.7 user operation in its packed on-chain form.
///
/// Serializes to the camelCase JSON shape used by bundler RPCs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedUserOperation {
    /// The smart account sending the operation.
    pub sender: Address,

    /// Anti-replay nonce (192-bit key ‖ 64-bit sequence).
    pub nonce: U256,

    /// Factory address and calldata for first-time deployment, or empty.
    pub init_code: Bytes,

    /// The call the account executes.
    pub call_data: Bytes,

    /// `verificationGasLimit ‖ callGasLimit`, two 128-bit values.
    pub account_gas_limits: B256,

    /// Gas paid for calldata and bundler overhead.
    pub pre_verification_gas: U256,

    /// `maxPriorityFeePerGas ‖ maxFeePerGas`, two 128-bit values.
    pub gas_fees: B256,

    /// Paymaster address and data, or empty.
    pub paymaster_and_data: Bytes,

    /// The hybrid signature. Not covered by the hash.
    pub signature: Bytes,
}

impl PackedUserOperation {
    /// Returns the verification gas limit (high half of `account_gas_limits`).
    #[must_use]
    pub fn verification_gas_limit(&self) -> u128 {
        unpack_u128_pair(&self.account_gas_limits).0
    }

    /// Returns the call gas limit (low half of `account_gas_limits`).
    #[must_use]
    pub fn call_gas_limit(&self) -> u128 {
        unpack_u128_pair(&self.account_gas_limits).1
    }

    /// Returns the max priority fee per gas (high half of `gas_fees`).
    #[must_use]
    pub fn max_priority_fee_per_gas(&self) -> u128 {
        unpack_u128_pair(&self.gas_fees).0
    }

    /// Returns the max fee per gas (low half of `gas_fees`).
    #[must_use]
    pub fn max_fee_per_gas(&self) -> u128 {
        unpack_u128_pair(&self.gas_fees).1
    }

    /// Computes the inner hash over the operation fields alone.
    ///
    /// The three dynamic byte fields are hashed individually first so the
    /// encoded tuple is fully static.
    #[must_use]
    pub fn inner_hash(&self) -> B256 {
        let encoded = (
            self.sender,
            self.nonce,
            keccak256(&self.init_code),
            keccak256(&self.call_data),
            self.account_gas_limits,
            self.pre_verification_gas,
            self.gas_fees,
            keccak256(&self.paymaster_and_data),
        )
            .abi_encode();
        keccak256(encoded)
    }
}

/// Computes the canonical operation hash bound to a verifying contract and
/// chain.
///
/// # Arguments
///
/// * `op` - The operation; its `signature` field is ignored
/// * `verifying_contract` - The EntryPoint address
/// * `chain_id` - The chain the operation is valid on
///
/// # Returns
///
/// The 32-byte hash every signer in the hybrid scheme signs.
#[must_use]
pub fn operation_hash(op: &PackedUserOperation, verifying_contract: Address, chain_id: u64) -> B256 {
    let encoded = (op.inner_hash(), verifying_contract, U256::from(chain_id)).abi_encode();
    keccak256(encoded)
}

/// Packs two 128-bit values big-endian into one 32-byte word (`high ‖ low`).
#[must_use]
pub fn pack_u128_pair(high: u128, low: u128) -> B256 {
    let mut word = [0u8; 32];
    word[..16].copy_from_slice(&high.to_be_bytes());
    word[16..].copy_from_slice(&low.to_be_bytes());
    B256::from(word)
}

/// Splits a 32-byte word into its `(high, low)` 128-bit halves.
#[must_use]
pub fn unpack_u128_pair(word: &B256) -> (u128, u128) {
    let mut high = [0u8; 16];
    let mut low = [0u8; 16];
    high.copy_from_slice(&word[..16]);
    low.copy_from_slice(&word[16..]);
    (u128::from_be_bytes(high), u128::from_be_bytes(low))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, b256, bytes};

    use super::*;

    const ENTRY_POINT: Address = address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");
    const SEPOLIA: u64 = 11_155_111;

    fn sample_operation() -> PackedUserOperation {
        PackedUserOperation {
            sender: address!("0x1234567890123456789012345678901234567890"),
            nonce: U256::ZERO,
            account_gas_limits: pack_u128_pair(100_000, 200_000),
            pre_verification_gas: U256::from(50_000),
            gas_fees: pack_u128_pair(1_000_000_000, 2_000_000_000),
            ..PackedUserOperation::default()
        }
    }

    #[test]
    fn known_inner_hash() {
        assert_eq!(
            sample_operation().inner_hash(),
            b256!("0xaba91805b733f9ff2339a8cd87f753919b9b7330c6c5de43142c096d8965d958")
        );
    }

    #[test]
    fn known_operation_hash() {
        assert_eq!(
            operation_hash(&sample_operation(), ENTRY_POINT, SEPOLIA),
            b256!("0x2c7428a2887a79603ed4375be251d4f3a445281e124f0d783beb159d91c757bb")
        );
    }

    #[test]
    fn nonce_changes_hash() {
        let mut op = sample_operation();
        op.nonce = U256::from(1);
        assert_eq!(
            operation_hash(&op, ENTRY_POINT, SEPOLIA),
            b256!("0x0834ed73749bdabd742bd42d8457c2e73a4b82b933e2e434499b56d6cf882658")
        );
    }

    #[test]
    fn every_field_affects_hash() {
        let base = sample_operation();
        let base_hash = operation_hash(&base, ENTRY_POINT, SEPOLIA);

        let variants: Vec<PackedUserOperation> = vec![
            PackedUserOperation { sender: Address::repeat_byte(0x01), ..base.clone() },
            PackedUserOperation { nonce: U256::from(7), ..base.clone() },
            PackedUserOperation { init_code: bytes!("01"), ..base.clone() },
            PackedUserOperation { call_data: bytes!("b61d27f6"), ..base.clone() },
            PackedUserOperation { account_gas_limits: pack_u128_pair(100_001, 200_000), ..base.clone() },
            PackedUserOperation { pre_verification_gas: U256::from(50_001), ..base.clone() },
            PackedUserOperation { gas_fees: pack_u128_pair(1, 2), ..base.clone() },
            PackedUserOperation { paymaster_and_data: bytes!("ff"), ..base.clone() },
        ];

        for variant in &variants {
            assert_ne!(operation_hash(variant, ENTRY_POINT, SEPOLIA), base_hash);
        }
        assert_ne!(operation_hash(&base, Address::ZERO, SEPOLIA), base_hash);
        assert_ne!(operation_hash(&base, ENTRY_POINT, 1), base_hash);
    }

    #[test]
    fn signature_is_not_hashed() {
        let base = sample_operation();
        let signed = PackedUserOperation {
            signature: bytes!("deadbeef"),
            ..base.clone()
        };
        assert_eq!(
            operation_hash(&base, ENTRY_POINT, SEPOLIA),
            operation_hash(&signed, ENTRY_POINT, SEPOLIA)
        );
    }

    #[test]
    fn u128_pair_packing() {
        let word = pack_u128_pair(100_000, 200_000);
        assert_eq!(
            U256::from_be_bytes(word.0),
            (U256::from(100_000) << 128) | U256::from(200_000)
        );
        assert_eq!(unpack_u128_pair(&word), (100_000, 200_000));
        assert_eq!(unpack_u128_pair(&pack_u128_pair(u128::MAX, 0)), (u128::MAX, 0));
    }

    #[test]
    fn gas_accessors() {
        let op = sample_operation();
        assert_eq!(op.verification_gas_limit(), 100_000);
        assert_eq!(op.call_gas_limit(), 200_000);
        assert_eq!(op.max_priority_fee_per_gas(), 1_000_000_000);
        assert_eq!(op.max_fee_per_gas(), 2_000_000_000);
    }

    #[test]
    fn json_uses_camel_case() {
        let json = serde_json::to_value(sample_operation()).unwrap();
        assert!(json.get("accountGasLimits").is_some());
        assert!(json.get("paymasterAndData").is_some());
        assert_eq!(json["callData"], "0x");

        let back: PackedUserOperation = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample_operation());
    }
}
