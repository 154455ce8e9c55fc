//! Core workflow of the Safe transfer relay.
//!
//! A transfer runs through four steps, each awaited before the next:
//! the payload builder encodes the token call, the transaction assembler
//! binds it to the Safe's current nonce and hashes it, the signature
//! collector gathers owner signatures, and the executor submits the result
//! through the relayer and waits for confirmation.

use safe_account::{AccountError, AccountFactory};
use safe_config::ConfigError;
use safe_delivery::{DeliveryError, DeliveryService};
use safe_types::{
	format_token_amount, truncate_hash, Address, ConfirmationReceipt, SafeExecutionOutcome,
	SafeState, SecretString, SigningMethod, TokenConfig, TransactionHash, U256,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

pub mod assembler;
pub mod builder;
pub mod executor;
pub mod hashing;
pub mod payload;
pub mod signatures;
pub mod state;

#[cfg(test)]
pub(crate) mod mock_chain;

pub use assembler::{AssembledTransaction, TransactionAssembler};
pub use builder::WorkflowBuilder;
pub use executor::Executor;
pub use hashing::{Eip712SafeHasher, SafeTxHasher};
pub use payload::{PayloadError, TransferRequest};
pub use signatures::{CollectionReport, SignatureCollector, SigningFailure};
pub use state::{SafeTransaction, StateError, TransactionState};

/// Errors that end a workflow run.
#[derive(Debug, Error)]
pub enum WorkflowError {
	/// Configuration does not match the chain or the Safe.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// Input could not be turned into a valid payload.
	#[error("Encoding error: {0}")]
	Encoding(String),
	/// RPC failure, timeout, or a submission the chain did not accept.
	#[error("Network error: {0}")]
	Network(String),
	#[error("Signing error: {0}")]
	Signing(String),
	/// The Safe or the token rejected the transaction.
	#[error("Contract reverted: {reason}")]
	ContractRevert { reason: String },
	/// A lifecycle step was attempted out of order.
	#[error("Invalid state: {0}")]
	InvalidState(String),
}

impl From<DeliveryError> for WorkflowError {
	fn from(err: DeliveryError) -> Self {
		match err {
			DeliveryError::Network(msg) => WorkflowError::Network(msg),
			DeliveryError::Timeout(msg) => WorkflowError::Network(format!("Timed out: {}", msg)),
			DeliveryError::Reverted { reason } => WorkflowError::ContractRevert { reason },
			e @ DeliveryError::InsufficientFunds { .. } => {
				WorkflowError::Network(format!("Submission failed: {}", e))
			}
			DeliveryError::Decode(msg) => {
				WorkflowError::Network(format!("Unexpected RPC response: {}", msg))
			}
			DeliveryError::Rejected(msg) => WorkflowError::Network(format!("Submission failed: {}", msg)),
			DeliveryError::SubmissionUnknown { hash, reason } => {
				WorkflowError::Network(executor::status_advice(&hash, &reason))
			}
		}
	}
}

impl From<PayloadError> for WorkflowError {
	fn from(err: PayloadError) -> Self {
		WorkflowError::Encoding(err.to_string())
	}
}

impl From<StateError> for WorkflowError {
	fn from(err: StateError) -> Self {
		match err {
			StateError::InvalidSignature { .. } | StateError::DuplicateSigner(_) => {
				WorkflowError::Signing(err.to_string())
			}
			other => WorkflowError::InvalidState(other.to_string()),
		}
	}
}

impl From<AccountError> for WorkflowError {
	fn from(err: AccountError) -> Self {
		WorkflowError::Signing(err.to_string())
	}
}

impl From<ConfigError> for WorkflowError {
	fn from(err: ConfigError) -> Self {
		WorkflowError::Configuration(err.to_string())
	}
}

/// Result of re-querying a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionStatus {
	/// Not mined yet, or unknown to the node.
	Pending,
	Confirmed { receipt: ConfirmationReceipt },
	Reverted { receipt: ConfirmationReceipt },
}

/// Snapshot of the Safe, the relayer and the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafeInfo {
	pub chain_id: u64,
	pub safe: SafeState,
	/// Version used for hashing, pinned or read from the contract.
	pub hashing_version: String,
	pub relayer: Address,
	/// Relayer native balance in wei.
	pub relayer_balance: U256,
	pub token: TokenConfig,
	/// Safe token balance in smallest units.
	pub token_balance: U256,
}

/// Transfers tokens out of one Safe.
///
/// Built by [`WorkflowBuilder`]. Owner signers are created for each
/// transfer and dropped as soon as signing is over.
pub struct TransferWorkflow {
	delivery: Arc<DeliveryService>,
	assembler: TransactionAssembler,
	owner_keys: Vec<SecretString>,
	account_factory: AccountFactory,
	signing_method: SigningMethod,
	token: TokenConfig,
	safe: Address,
	chain_id: u64,
}

impl TransferWorkflow {
	#[allow(clippy::too_many_arguments)]
	pub(crate) fn new(
		delivery: Arc<DeliveryService>,
		assembler: TransactionAssembler,
		owner_keys: Vec<SecretString>,
		account_factory: AccountFactory,
		signing_method: SigningMethod,
		token: TokenConfig,
		safe: Address,
		chain_id: u64,
	) -> Self {
		Self {
			delivery,
			assembler,
			owner_keys,
			account_factory,
			signing_method,
			token,
			safe,
			chain_id,
		}
	}

	pub fn safe(&self) -> Address {
		self.safe
	}

	pub fn token(&self) -> &TokenConfig {
		&self.token
	}

	/// Transfers tokens from the Safe to each recipient in one Safe
	/// transaction and waits for confirmation.
	#[instrument(skip_all, fields(safe = %self.safe, transfers = requests.len()))]
	pub async fn transfer(
		&self,
		requests: &[TransferRequest],
	) -> Result<ConfirmationReceipt, WorkflowError> {
		if requests.is_empty() {
			return Err(WorkflowError::Encoding("No transfers requested".to_string()));
		}
		let payloads = requests
			.iter()
			.map(|request| payload::build_transfer_payload(self.token.address, request))
			.collect::<Vec<_>>();

		let assembled = self.assembler.assemble(payloads).await?;
		let AssembledTransaction {
			mut transaction,
			safe_state,
			hasher,
		} = assembled;

		self.check_token(requests).await?;
		let before = self.recipient_balances(requests).await?;

		let collector = SignatureCollector::from_keys(
			&self.owner_keys,
			self.account_factory,
			self.signing_method,
		);
		let report = collector.collect(&mut transaction, &safe_state).await?;
		tracing::info!(
			collected = report.collected,
			failed = report.failures.len(),
			threshold = transaction.threshold(),
			"Signature collection finished"
		);

		let executor = Executor::new(self.delivery.clone(), hasher);
		let receipt = executor.execute(&mut transaction).await?;

		// The transfer is final here; a failed read must not hide the receipt.
		match self.recipient_balances(requests).await {
			Ok(after) => {
				for ((request, before), after) in requests.iter().zip(before).zip(after) {
					tracing::info!(
						recipient = %request.recipient,
						before = %format_token_amount(before, self.token.decimals),
						after = %format_token_amount(after, self.token.decimals),
						symbol = %self.token.symbol,
						"Recipient balance"
					);
				}
			}
			Err(e) => {
				tracing::warn!(
					tx_hash = %receipt.hash,
					error = %e,
					"Could not read recipient balances after execution"
				);
			}
		}

		Ok(receipt)
	}

	/// Checks the token contract and warns if the Safe cannot cover the
	/// requested total. The Safe itself enforces the balance on execution.
	async fn check_token(&self, requests: &[TransferRequest]) -> Result<(), WorkflowError> {
		let chain = self.delivery.chain();
		if chain.code_size(self.token.address).await? == 0 {
			return Err(WorkflowError::Configuration(format!(
				"No token contract deployed at {}",
				self.token.address
			)));
		}

		let total = requests
			.iter()
			.try_fold(U256::ZERO, |acc, r| acc.checked_add(r.amount))
			.ok_or_else(|| WorkflowError::Encoding("Total amount overflows 256 bits".to_string()))?;
		let available = chain.token_balance(self.token.address, self.safe).await?;
		if available < total {
			tracing::warn!(
				required = %format_token_amount(total, self.token.decimals),
				available = %format_token_amount(available, self.token.decimals),
				symbol = %self.token.symbol,
				"Safe token balance is below the requested total"
			);
		}
		Ok(())
	}

	async fn recipient_balances(&self, requests: &[TransferRequest]) -> Result<Vec<U256>, WorkflowError> {
		let mut balances = Vec::with_capacity(requests.len());
		for request in requests {
			balances.push(
				self.delivery
					.chain()
					.token_balance(self.token.address, request.recipient)
					.await?,
			);
		}
		Ok(balances)
	}

	/// Re-queries the receipt of a submitted transaction.
	#[instrument(skip_all, fields(tx_hash = %truncate_hash(&hash.0)))]
	pub async fn status(&self, hash: &TransactionHash) -> Result<TransactionStatus, WorkflowError> {
		let receipt = self.delivery.chain().get_receipt(hash, self.safe).await?;
		let status = match receipt {
			None => TransactionStatus::Pending,
			Some(receipt)
				if receipt.success && receipt.safe_outcome != SafeExecutionOutcome::Failure =>
			{
				TransactionStatus::Confirmed { receipt }
			}
			Some(receipt) => TransactionStatus::Reverted { receipt },
		};
		tracing::info!(?status, "Queried transaction status");
		Ok(status)
	}

	/// Reads the Safe, relayer and token state.
	#[instrument(skip_all, fields(safe = %self.safe))]
	pub async fn safe_info(&self) -> Result<SafeInfo, WorkflowError> {
		let (safe, version) = self.assembler.load_safe().await?;
		let chain = self.delivery.chain();
		let relayer = chain.relayer_address();

		Ok(SafeInfo {
			chain_id: self.chain_id,
			safe,
			hashing_version: version.to_string(),
			relayer,
			relayer_balance: chain.native_balance(relayer).await?,
			token: self.token.clone(),
			token_balance: chain.token_balance(self.token.address, self.safe).await?,
		})
	}
}
