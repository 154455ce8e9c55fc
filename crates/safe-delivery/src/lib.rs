//! Chain access module for the Safe transfer relay.
//!
//! This module is the relay's only view of the chain. It reads the Safe's
//! state, simulates and submits `execTransaction` through the relayer
//! account, and turns execution receipts into [`ConfirmationReceipt`]s with
//! the Safe outcome and token transfers decoded.

use async_trait::async_trait;
use safe_types::{
	Address, Bytes, ConfirmationReceipt, ImplementationRegistry, SafeState, SafeTransactionData,
	SecretString, TransactionHash, B256, U256,
};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}
/// Receipt log decoding.
pub mod logs;
/// Revert reason extraction and Safe error codes.
pub mod revert;

/// Errors that can occur during chain access.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// An RPC call or confirmation wait exceeded its time limit.
	#[error("Timeout: {0}")]
	Timeout(String),
	/// The chain rejected a call or transaction.
	#[error("Execution reverted: {reason}")]
	Reverted { reason: String },
	/// The relayer cannot pay for gas.
	#[error("Insufficient relayer funds: required {required} wei, available {available} wei")]
	InsufficientFunds { required: U256, available: U256 },
	/// A response could not be decoded.
	#[error("Decode error: {0}")]
	Decode(String),
	/// The node refused a submission; nothing was broadcast.
	#[error("Transaction rejected: {0}")]
	Rejected(String),
	/// A signed transaction was handed to the node but the send did not
	/// complete, so it may or may not be on its way to a block.
	#[error("Submission of {hash} not acknowledged: {reason}")]
	SubmissionUnknown { hash: TransactionHash, reason: String },
}

/// Connection parameters shared by delivery implementations.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
	/// Expected chain id; the relayer signs for this chain only.
	pub chain_id: u64,
	pub rpc_url: String,
	/// Upper bound for a single RPC call.
	pub rpc_timeout: Duration,
	/// Receipt polling interval.
	pub poll_interval: Duration,
	/// Upper bound for waiting on a receipt with enough confirmations.
	pub confirmation_timeout: Duration,
}

/// Trait defining the chain operations the relay needs.
///
/// Every method is bounded in time by the implementation. Submission is
/// performed only by [`DeliveryInterface::execute`]; all other methods are
/// read-only.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeliveryInterface: Send + Sync {
	/// Chain id reported by the endpoint.
	async fn chain_id(&self) -> Result<u64, DeliveryError>;

	/// Size of the code deployed at `address`.
	async fn code_size(&self, address: Address) -> Result<usize, DeliveryError>;

	/// Reads nonce, threshold, owners and version of a Safe.
	async fn safe_state(&self, safe: Address) -> Result<SafeState, DeliveryError>;

	/// Safe transaction hash as computed by the Safe contract itself.
	async fn safe_transaction_hash(
		&self,
		safe: Address,
		tx: &SafeTransactionData,
	) -> Result<B256, DeliveryError>;

	/// ERC-20 balance of `holder`.
	async fn token_balance(&self, token: Address, holder: Address) -> Result<U256, DeliveryError>;

	/// Native currency balance of `address`.
	async fn native_balance(&self, address: Address) -> Result<U256, DeliveryError>;

	/// Account that submits and pays for execution.
	fn relayer_address(&self) -> Address;

	/// Current gas price in wei.
	async fn gas_price(&self) -> Result<u128, DeliveryError>;

	/// Dry-runs `execTransaction` from the relayer and returns the gas estimate.
	///
	/// A revert surfaces as [`DeliveryError::Reverted`] with the decoded
	/// reason.
	async fn simulate_execution(
		&self,
		safe: Address,
		tx: &SafeTransactionData,
		signatures: &Bytes,
	) -> Result<u64, DeliveryError>;

	/// Submits `execTransaction` from the relayer.
	///
	/// The transaction is signed before it is sent, so a send that fails
	/// without a definite answer from the node is reported as
	/// [`DeliveryError::SubmissionUnknown`] with the transaction hash.
	async fn execute(
		&self,
		safe: Address,
		tx: &SafeTransactionData,
		signatures: &Bytes,
		gas_limit: u64,
	) -> Result<TransactionHash, DeliveryError>;

	/// Polls until the transaction has `confirmations` confirmations.
	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		safe: Address,
		confirmations: u64,
	) -> Result<ConfirmationReceipt, DeliveryError>;

	/// Receipt of a transaction, or `None` while it is pending or unknown.
	async fn get_receipt(
		&self,
		hash: &TransactionHash,
		safe: Address,
	) -> Result<Option<ConfirmationReceipt>, DeliveryError>;
}

/// Type alias for delivery factory functions.
///
/// Builds a chain client from connection settings and the relayer key.
pub type DeliveryFactory =
	fn(&ConnectionSettings, &SecretString) -> Result<Box<dyn DeliveryInterface>, DeliveryError>;

/// Registry trait for delivery implementations.
pub trait DeliveryRegistry: ImplementationRegistry<Factory = DeliveryFactory> {}

/// Get all registered delivery implementations.
pub fn get_all_implementations() -> Vec<(&'static str, DeliveryFactory)> {
	use implementations::evm::alloy;

	vec![(alloy::Registry::NAME, alloy::Registry::factory())]
}

/// Service that wraps a delivery implementation with the relay's policies.
pub struct DeliveryService {
	implementation: Box<dyn DeliveryInterface>,
	/// Confirmations required before a transfer is reported confirmed.
	min_confirmations: u64,
}

impl DeliveryService {
	pub fn new(implementation: Box<dyn DeliveryInterface>, min_confirmations: u64) -> Self {
		Self {
			implementation,
			min_confirmations,
		}
	}

	/// Direct access to the chain operations.
	pub fn chain(&self) -> &dyn DeliveryInterface {
		self.implementation.as_ref()
	}

	pub fn min_confirmations(&self) -> u64 {
		self.min_confirmations
	}

	/// Checks that the relayer can pay for `gas_limit` at the current gas
	/// price. Returns the required amount in wei.
	pub async fn ensure_relayer_funds(&self, gas_limit: u64) -> Result<U256, DeliveryError> {
		let gas_price = self.implementation.gas_price().await?;
		let required = U256::from(gas_limit) * U256::from(gas_price);
		let relayer = self.implementation.relayer_address();
		let available = self.implementation.native_balance(relayer).await?;

		tracing::debug!(
			relayer = %relayer,
			gas_limit,
			gas_price,
			%required,
			%available,
			"Checked relayer funds"
		);

		if available < required {
			return Err(DeliveryError::InsufficientFunds {
				required,
				available,
			});
		}
		Ok(required)
	}

	/// Waits for the configured number of confirmations.
	pub async fn confirm_with_default(
		&self,
		hash: &TransactionHash,
		safe: Address,
	) -> Result<ConfirmationReceipt, DeliveryError> {
		self.implementation
			.wait_for_confirmation(hash, safe, self.min_confirmations)
			.await
	}
}
