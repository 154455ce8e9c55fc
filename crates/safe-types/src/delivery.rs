//! Transaction delivery types for the relay.
//!
//! This module defines what the chain boundary hands back to the workflow:
//! chain transaction hashes, confirmation receipts with their decoded token
//! transfers, and snapshots of the Safe's on-chain state.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hash of a transaction submitted to the chain by the relayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub B256);

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for TransactionHash {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.parse::<B256>()
			.map(TransactionHash)
			.map_err(|e| format!("Invalid transaction hash '{}': {}", s, e))
	}
}

/// A token `Transfer` event observed in an execution receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
	/// Token contract that emitted the event.
	pub token: Address,
	pub from: Address,
	pub to: Address,
	pub value: U256,
}

/// Outcome reported by the Safe's own execution events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeExecutionOutcome {
	/// `ExecutionSuccess` was emitted.
	Success,
	/// `ExecutionFailure` was emitted; the inner call failed but the nonce
	/// was consumed.
	Failure,
	/// Neither event was found in the receipt.
	NotObserved,
}

/// Receipt of an executed Safe transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationReceipt {
	/// Chain transaction hash.
	pub hash: TransactionHash,
	/// Block the transaction was included in.
	pub block_number: u64,
	/// Whether the chain transaction succeeded.
	pub success: bool,
	/// Gas consumed by the relayer transaction.
	pub gas_used: u64,
	/// Safe transaction hash the owners signed, when known.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub safe_tx_hash: Option<B256>,
	/// Execution outcome reported by the Safe.
	pub safe_outcome: SafeExecutionOutcome,
	/// Token transfers emitted during execution.
	pub transfers: Vec<TransferEvent>,
}

/// Snapshot of the Safe's on-chain state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeState {
	pub address: Address,
	/// Next unused Safe nonce.
	pub nonce: U256,
	/// Number of owner signatures required.
	pub threshold: u64,
	pub owners: Vec<Address>,
	/// Value of the contract's `VERSION()`.
	pub version: String,
}

impl SafeState {
	pub fn is_owner(&self, address: &Address) -> bool {
		self.owners.contains(address)
	}
}
