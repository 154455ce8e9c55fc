//! Owner signature collection.
//!
//! Every configured owner signs the same Safe transaction hash concurrently.
//! A failing owner is recorded and does not stop the others; what ends up in
//! the transaction is decided by the Safe's threshold at execution time.

use crate::state::{SafeTransaction, StateError};
use crate::WorkflowError;
use futures::future::join_all;
use safe_account::{AccountFactory, AccountService};
use safe_types::{truncate_hash, Address, SafeState, SecretString, SigningMethod};
use serde::Serialize;
use tracing::instrument;

/// One owner that did not contribute a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SigningFailure {
	/// Position of the owner in the configuration.
	pub index: usize,
	/// Owner address, unknown when the key itself was unusable.
	pub owner: Option<Address>,
	pub error: String,
}

/// Outcome of a collection round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
	pub collected: usize,
	pub failures: Vec<SigningFailure>,
}

/// Collects owner signatures for Safe transactions.
pub struct SignatureCollector {
	owners: Vec<(usize, AccountService)>,
	/// Owners rejected before signing started.
	rejected: Vec<SigningFailure>,
	method: SigningMethod,
}

impl SignatureCollector {
	pub fn new(owners: Vec<AccountService>, method: SigningMethod) -> Self {
		Self {
			owners: owners.into_iter().enumerate().collect(),
			rejected: Vec::new(),
			method,
		}
	}

	/// Builds one signer per configured key.
	///
	/// Keys the factory rejects are kept as failures so the remaining owners
	/// can still sign.
	pub fn from_keys(keys: &[SecretString], factory: AccountFactory, method: SigningMethod) -> Self {
		let mut owners = Vec::new();
		let mut rejected = Vec::new();

		for (index, key) in keys.iter().enumerate() {
			match factory(key) {
				Ok(account) => owners.push((index, AccountService::new(account))),
				Err(e) => {
					tracing::warn!(index, error = %e, "Owner key unusable");
					rejected.push(SigningFailure {
						index,
						owner: None,
						error: e.to_string(),
					});
				}
			}
		}

		Self {
			owners,
			rejected,
			method,
		}
	}

	pub fn method(&self) -> SigningMethod {
		self.method
	}

	/// Addresses of the usable owner signers, in configuration order.
	pub fn addresses(&self) -> Vec<Address> {
		self.owners.iter().map(|(_, owner)| owner.address()).collect()
	}

	/// Signs `transaction` with every owner of `safe_state` among the
	/// configured signers and stores the valid signatures.
	///
	/// The signers are dropped once the round is over. Fails only when no
	/// signature at all could be collected.
	#[instrument(skip_all, fields(method = %self.method))]
	pub async fn collect(
		self,
		transaction: &mut SafeTransaction,
		safe_state: &SafeState,
	) -> Result<CollectionReport, WorkflowError> {
		let SignatureCollector {
			owners,
			rejected,
			method,
		} = self;
		let hash = transaction.safe_tx_hash()?;
		let mut report = CollectionReport {
			collected: 0,
			failures: rejected,
		};

		let mut signing = Vec::new();
		for (index, owner) in &owners {
			let address = owner.address();
			if !safe_state.is_owner(&address) {
				tracing::warn!(index, owner = %address, "Configured signer is not a Safe owner");
				report.failures.push(SigningFailure {
					index: *index,
					owner: Some(address),
					error: format!("{} is not an owner of Safe {}", address, safe_state.address),
				});
				continue;
			}
			signing.push(async move {
				(*index, address, owner.sign_safe_hash(&hash, method).await)
			});
		}

		for (index, address, result) in join_all(signing).await {
			let outcome = match result {
				Ok(signature) => transaction.add_signature(signature),
				Err(e) => {
					tracing::warn!(index, owner = %address, error = %e, "Owner failed to sign");
					report.failures.push(SigningFailure {
						index,
						owner: Some(address),
						error: e.to_string(),
					});
					continue;
				}
			};

			match outcome {
				Ok(()) => {
					report.collected += 1;
					tracing::info!(
						owner = %address,
						safe_tx_hash = %truncate_hash(&hash),
						"Collected owner signature"
					);
				}
				Err(e @ (StateError::DuplicateSigner(_) | StateError::InvalidSignature { .. })) => {
					tracing::warn!(index, owner = %address, error = %e, "Signature rejected");
					report.failures.push(SigningFailure {
						index,
						owner: Some(address),
						error: e.to_string(),
					});
				}
				Err(e) => return Err(e.into()),
			}
		}
		report.failures.sort_by_key(|f| f.index);

		if report.collected == 0 {
			return Err(WorkflowError::Signing(format!(
				"No owner signatures collected ({} signer(s) failed)",
				report.failures.len()
			)));
		}
		if (transaction.signature_count() as u64) < transaction.threshold() {
			tracing::warn!(
				collected = transaction.signature_count(),
				threshold = transaction.threshold(),
				"Fewer signatures than the Safe threshold"
			);
		}
		Ok(report)
	}
}
