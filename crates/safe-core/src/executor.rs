//! Execution of signed Safe transactions.
//!
//! The executor is the only place that submits to the chain. It dry-runs
//! `execTransaction` first, so anything the Safe would reject (missing
//! signatures, unsorted owners, insufficient token balance) surfaces as a
//! revert reason without spending relayer gas.

use crate::hashing::SafeTxHasher;
use crate::state::{SafeTransaction, TransactionState};
use crate::WorkflowError;
use safe_delivery::{DeliveryError, DeliveryService};
use safe_types::{truncate_hash, ConfirmationReceipt, SafeExecutionOutcome, TransactionHash};
use std::sync::Arc;
use tracing::instrument;

/// Headroom added on top of the gas estimate, in percent.
const GAS_LIMIT_MARGIN_PERCENT: u64 = 20;

/// Error text for a transaction whose fate is unknown.
pub(crate) fn status_advice(hash: &TransactionHash, cause: &str) -> String {
	format!(
		"Transaction {} was submitted but not confirmed ({}); check it with `safe-transfer status --tx-hash {}` before retrying",
		hash, cause, hash
	)
}

/// Gas limit for a submission given the node's estimate.
pub fn gas_limit_with_margin(estimate: u64) -> u64 {
	estimate.saturating_add(estimate / 100 * GAS_LIMIT_MARGIN_PERCENT)
}

/// Submits fully signed Safe transactions through the relayer.
pub struct Executor {
	delivery: Arc<DeliveryService>,
	hasher: Arc<dyn SafeTxHasher>,
}

impl Executor {
	pub fn new(delivery: Arc<DeliveryService>, hasher: Arc<dyn SafeTxHasher>) -> Self {
		Self { delivery, hasher }
	}

	/// Executes `transaction` and waits for the configured confirmations.
	///
	/// The transaction is submitted at most once. A submission that is not
	/// confirmed in time is reported as a network error carrying the chain
	/// transaction hash; its fate must be checked separately.
	#[instrument(skip_all, fields(safe = %transaction.safe(), nonce = %transaction.data().nonce))]
	pub async fn execute(
		&self,
		transaction: &mut SafeTransaction,
	) -> Result<ConfirmationReceipt, WorkflowError> {
		transaction.verify_signatures(self.hasher.as_ref())?;
		let safe_tx_hash = transaction.safe_tx_hash()?;
		let signatures = transaction.encoded_signatures();
		let chain = self.delivery.chain();

		let estimate = chain
			.simulate_execution(transaction.safe(), transaction.data(), &signatures)
			.await?;

		if transaction.state() != TransactionState::FullySigned {
			return Err(WorkflowError::InvalidState(format!(
				"Transaction is {} with {} of {} signatures; only fully signed transactions are submitted",
				transaction.state(),
				transaction.signature_count(),
				transaction.threshold()
			)));
		}

		let gas_limit = gas_limit_with_margin(estimate);
		self.delivery.ensure_relayer_funds(gas_limit).await?;

		let hash = match chain
			.execute(transaction.safe(), transaction.data(), &signatures, gas_limit)
			.await
		{
			Ok(hash) => hash,
			Err(DeliveryError::SubmissionUnknown { hash, reason }) => {
				transaction.mark_submitted(hash)?;
				tracing::warn!(tx_hash = %hash, %reason, "Submission not acknowledged");
				return Err(WorkflowError::Network(status_advice(&hash, &reason)));
			}
			Err(e @ (DeliveryError::Timeout(_) | DeliveryError::Network(_))) => {
				let nonce = transaction.data().nonce;
				tracing::warn!(%nonce, error = %e, "Submission not acknowledged");
				return Err(WorkflowError::Network(format!(
					"Submission of Safe transaction with nonce {} may have reached the chain ({}); check the Safe nonce with `safe-transfer info` before retrying",
					nonce, e
				)));
			}
			Err(e) => return Err(e.into()),
		};
		transaction.mark_submitted(hash)?;
		tracing::info!(
			tx_hash = %truncate_hash(&hash.0),
			safe_tx_hash = %truncate_hash(&safe_tx_hash),
			gas_limit,
			"Submitted execTransaction"
		);

		let receipt = match self.delivery.confirm_with_default(&hash, transaction.safe()).await {
			Ok(receipt) => receipt,
			Err(e @ (DeliveryError::Timeout(_) | DeliveryError::Network(_))) => {
				tracing::warn!(tx_hash = %hash, error = %e, "Confirmation not observed");
				return Err(WorkflowError::Network(status_advice(&hash, &e.to_string())));
			}
			Err(e) => return Err(e.into()),
		};

		if receipt.success && receipt.safe_outcome != SafeExecutionOutcome::Failure {
			transaction.mark_confirmed()?;
			tracing::info!(
				tx_hash = %truncate_hash(&hash.0),
				block = receipt.block_number,
				gas_used = receipt.gas_used,
				"Safe transaction confirmed"
			);
			return Ok(receipt);
		}

		transaction.mark_reverted()?;
		let reason = if receipt.success {
			format!(
				"Safe reported ExecutionFailure for {} in block {}",
				hash, receipt.block_number
			)
		} else {
			format!(
				"Transaction {} reverted in block {}",
				hash, receipt.block_number
			)
		};
		tracing::error!(tx_hash = %hash, %reason, "Safe transaction failed");
		Err(WorkflowError::ContractRevert { reason })
	}
}
