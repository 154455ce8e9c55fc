//! Safe transaction types.
//!
//! A transfer moves through three shapes: the bare call
//! (`MetaTransactionData`), the full Safe transaction bound to a nonce
//! (`SafeTransactionData`), and the owner signatures collected over its
//! hash (`SafeSignature`).

use alloy::primitives::{eip191_hash_message, Address, Bytes, Signature, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of an ECDSA signature in the Safe `signatures` blob.
pub const SIGNATURE_LENGTH: usize = 65;

/// How the Safe contract performs the call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
	#[default]
	Call = 0,
	DelegateCall = 1,
}

impl OperationType {
	pub fn as_u8(self) -> u8 {
		self as u8
	}
}

impl TryFrom<u8> for OperationType {
	type Error = String;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0 => Ok(OperationType::Call),
			1 => Ok(OperationType::DelegateCall),
			other => Err(format!("Unknown operation type {}", other)),
		}
	}
}

/// A single call the Safe should perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTransactionData {
	/// Destination contract or account.
	pub to: Address,
	/// Native value sent with the call.
	pub value: U256,
	/// ABI-encoded call data.
	pub data: Bytes,
	/// Direct call or delegate call.
	pub operation: OperationType,
}

/// A Safe transaction as hashed and executed by the Safe contract.
///
/// The refund fields are always zero here: the relayer pays gas out of its
/// own balance and is not reimbursed by the Safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeTransactionData {
	pub to: Address,
	pub value: U256,
	pub data: Bytes,
	pub operation: OperationType,
	pub safe_tx_gas: U256,
	pub base_gas: U256,
	pub gas_price: U256,
	pub gas_token: Address,
	pub refund_receiver: Address,
	pub nonce: U256,
}

impl SafeTransactionData {
	/// Binds a call to a Safe nonce with no gas refund.
	pub fn new(call: MetaTransactionData, nonce: U256) -> Self {
		Self {
			to: call.to,
			value: call.value,
			data: call.data,
			operation: call.operation,
			safe_tx_gas: U256::ZERO,
			base_gas: U256::ZERO,
			gas_price: U256::ZERO,
			gas_token: Address::ZERO,
			refund_receiver: Address::ZERO,
			nonce,
		}
	}
}

/// Which digest an owner signs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningMethod {
	/// `personal_sign` over the Safe transaction hash. The Safe contract
	/// recognises these by `v > 30`.
	#[default]
	EthSign,
	/// ECDSA over the raw EIP-712 Safe transaction hash, `v` in {27, 28}.
	Eip712,
}

impl fmt::Display for SigningMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SigningMethod::EthSign => write!(f, "eth_sign"),
			SigningMethod::Eip712 => write!(f, "eip712"),
		}
	}
}

/// Errors raised while recovering the owner behind a Safe signature.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureRecoveryError {
	#[error("Signature must be {SIGNATURE_LENGTH} bytes, got {0}")]
	InvalidLength(usize),
	#[error("Unsupported signature type v={0}")]
	UnsupportedType(u8),
	#[error("Recovery failed: {0}")]
	Recovery(String),
}

/// One owner's signature in the encoding the Safe contract expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeSignature {
	/// Owner that produced the signature.
	pub signer: Address,
	/// `r || s || v`, with `v` already adjusted for the signing method.
	pub data: Bytes,
	/// Digest that was signed.
	pub method: SigningMethod,
}

impl SafeSignature {
	/// Wraps an ECDSA signature, shifting `v` by 4 for eth_sign signatures.
	pub fn from_ecdsa(signer: Address, signature: &Signature, method: SigningMethod) -> Self {
		let mut bytes = signature.as_bytes();
		if method == SigningMethod::EthSign {
			bytes[64] += 4;
		}
		Self {
			signer,
			data: Bytes::copy_from_slice(&bytes),
			method,
		}
	}

	/// Recovers the address that signed `safe_tx_hash`.
	pub fn recover(&self, safe_tx_hash: &B256) -> Result<Address, SignatureRecoveryError> {
		recover_safe_signer(&self.data, safe_tx_hash)
	}

	/// Returns true if the signature recovers to its declared signer.
	pub fn is_valid_for(&self, safe_tx_hash: &B256) -> bool {
		matches!(self.recover(safe_tx_hash), Ok(addr) if addr == self.signer)
	}
}

/// Recovers the signer of a single 65-byte ECDSA Safe signature.
///
/// Mirrors the Safe contract's `checkNSignatures`: `v` of 27/28 signs the
/// hash directly, 31/32 signs the EIP-191 prefixed hash.
pub fn recover_safe_signer(
	signature: &[u8],
	safe_tx_hash: &B256,
) -> Result<Address, SignatureRecoveryError> {
	if signature.len() != SIGNATURE_LENGTH {
		return Err(SignatureRecoveryError::InvalidLength(signature.len()));
	}

	let v = signature[64];
	let (y_parity, digest) = match v {
		27 | 28 => (v == 28, *safe_tx_hash),
		31 | 32 => (v == 32, eip191_hash_message(safe_tx_hash)),
		other => return Err(SignatureRecoveryError::UnsupportedType(other)),
	};

	let r = U256::from_be_slice(&signature[..32]);
	let s = U256::from_be_slice(&signature[32..64]);
	Signature::new(r, s, y_parity)
		.recover_address_from_prehash(&digest)
		.map_err(|e| SignatureRecoveryError::Recovery(e.to_string()))
}
