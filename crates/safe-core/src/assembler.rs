//! Transaction assembly.
//!
//! Binds one or more payloads to the configured Safe: checks the chain and
//! the Safe deployment, reads the Safe's live state, picks the hashing rule
//! for its version and computes the hash owners will sign.

use crate::hashing::{Eip712SafeHasher, SafeTxHasher};
use crate::state::SafeTransaction;
use crate::WorkflowError;
use alloy::sol_types::SolCall;
use safe_delivery::DeliveryService;
use safe_types::contracts::IMultiSend;
use safe_types::{
	truncate_hash, Address, Bytes, ContractNetworkConfig, MetaTransactionData, OperationType,
	SafeState, SafeTransactionData, SafeVersion, U256,
};
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Packs calls in the MultiSend format:
/// `operation (1) | to (20) | value (32) | data length (32) | data`.
pub fn encode_multisend(calls: &[MetaTransactionData]) -> Bytes {
	let mut packed = Vec::new();
	for call in calls {
		packed.push(call.operation.as_u8());
		packed.extend_from_slice(call.to.as_slice());
		packed.extend_from_slice(&call.value.to_be_bytes::<32>());
		packed.extend_from_slice(&U256::from(call.data.len()).to_be_bytes::<32>());
		packed.extend_from_slice(&call.data);
	}
	packed.into()
}

/// Unpacks calls produced by [`encode_multisend`].
pub fn decode_multisend(mut packed: &[u8]) -> Result<Vec<MetaTransactionData>, WorkflowError> {
	const HEADER: usize = 1 + 20 + 32 + 32;
	let truncated = || WorkflowError::Encoding("Truncated MultiSend batch".to_string());

	let mut calls = Vec::new();
	while !packed.is_empty() {
		if packed.len() < HEADER {
			return Err(truncated());
		}
		let operation = OperationType::try_from(packed[0]).map_err(WorkflowError::Encoding)?;
		let to = Address::from_slice(&packed[1..21]);
		let value = U256::from_be_slice(&packed[21..53]);
		// Lengths beyond 64 bits cannot be backed by the remaining input
		if packed[53..77].iter().any(|b| *b != 0) {
			return Err(truncated());
		}
		let mut len_bytes = [0u8; 8];
		len_bytes.copy_from_slice(&packed[77..85]);
		let len = usize::try_from(u64::from_be_bytes(len_bytes)).map_err(|_| truncated())?;
		let end = HEADER.checked_add(len).ok_or_else(truncated)?;
		if packed.len() < end {
			return Err(truncated());
		}

		calls.push(MetaTransactionData {
			to,
			value,
			data: Bytes::copy_from_slice(&packed[HEADER..end]),
			operation,
		});
		packed = &packed[end..];
	}
	Ok(calls)
}

/// A Safe transaction ready for signing, with the context it was built in.
pub struct AssembledTransaction {
	pub transaction: SafeTransaction,
	/// Safe state the transaction was bound to.
	pub safe_state: SafeState,
	/// Hashing rule for this Safe; used again to verify before execution.
	pub hasher: Arc<dyn SafeTxHasher>,
}

impl fmt::Debug for AssembledTransaction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AssembledTransaction")
			.field("transaction", &self.transaction)
			.field("safe_state", &self.safe_state)
			.field("hashing_version", &self.hasher.version())
			.finish()
	}
}

/// Builds Safe transactions for one Safe on one chain.
pub struct TransactionAssembler {
	delivery: Arc<DeliveryService>,
	safe: Address,
	chain_id: u64,
	/// Registry entry for the chain, required for batches.
	network: Option<ContractNetworkConfig>,
	/// Overrides the version reported by the contract.
	pinned_version: Option<SafeVersion>,
	verify_hash_onchain: bool,
}

impl TransactionAssembler {
	pub fn new(
		delivery: Arc<DeliveryService>,
		safe: Address,
		chain_id: u64,
		network: Option<ContractNetworkConfig>,
		pinned_version: Option<SafeVersion>,
		verify_hash_onchain: bool,
	) -> Self {
		Self {
			delivery,
			safe,
			chain_id,
			network,
			pinned_version,
			verify_hash_onchain,
		}
	}

	/// Combines payloads into the single call the Safe executes.
	///
	/// One payload is used as is; several become a MultiSend batch executed
	/// by delegate call into `MultiSendCallOnly`.
	pub fn combine(&self, payloads: Vec<MetaTransactionData>) -> Result<MetaTransactionData, WorkflowError> {
		let mut payloads = payloads;
		match payloads.len() {
			0 => Err(WorkflowError::Encoding("No payloads to assemble".to_string())),
			1 => Ok(payloads.remove(0)),
			count => {
				if payloads
					.iter()
					.any(|p| p.operation == OperationType::DelegateCall)
				{
					return Err(WorkflowError::Encoding(
						"MultiSendCallOnly cannot batch delegate calls".to_string(),
					));
				}
				let network = self.network.as_ref().ok_or_else(|| {
					WorkflowError::Configuration(format!(
						"No MultiSend address known for chain {}",
						self.chain_id
					))
				})?;

				let call = IMultiSend::multiSendCall {
					transactions: encode_multisend(&payloads),
				};
				tracing::debug!(count, target = %network.multi_send_call_only_address, "Batching payloads");

				Ok(MetaTransactionData {
					to: network.multi_send_call_only_address,
					value: U256::ZERO,
					data: call.abi_encode().into(),
					operation: OperationType::DelegateCall,
				})
			}
		}
	}

	/// Checks that the endpoint serves the configured chain and the Safe is
	/// deployed there.
	async fn check_deployment(&self) -> Result<(), WorkflowError> {
		let chain = self.delivery.chain();

		let reported = chain.chain_id().await?;
		if reported != self.chain_id {
			return Err(WorkflowError::Configuration(format!(
				"RPC endpoint serves chain {} but chain {} is configured",
				reported, self.chain_id
			)));
		}

		if chain.code_size(self.safe).await? == 0 {
			return Err(WorkflowError::Configuration(format!(
				"No contract deployed at Safe address {} on chain {}",
				self.safe, self.chain_id
			)));
		}
		Ok(())
	}

	/// Reads the Safe's state and the hashing rule for its version.
	pub async fn load_safe(&self) -> Result<(SafeState, SafeVersion), WorkflowError> {
		self.check_deployment().await?;

		let state = self.delivery.chain().safe_state(self.safe).await?;
		if state.threshold == 0 || state.owners.is_empty() {
			return Err(WorkflowError::Configuration(format!(
				"Safe {} has no owners or threshold set up",
				self.safe
			)));
		}

		let onchain_version = state.version.parse::<SafeVersion>().ok();
		let version = match (self.pinned_version, onchain_version) {
			(Some(pinned), Some(onchain)) if pinned != onchain => {
				tracing::warn!(%pinned, %onchain, "Pinned Safe version differs from contract");
				pinned
			}
			(Some(pinned), _) => pinned,
			(None, Some(onchain)) => onchain,
			(None, None) => {
				return Err(WorkflowError::Configuration(format!(
					"Cannot parse Safe version '{}'; pin safe.version in the configuration",
					state.version
				)))
			}
		};
		Ok((state, version))
	}

	/// Assembles payloads into a hashed Safe transaction at the Safe's
	/// current nonce.
	#[instrument(skip_all, fields(safe = %self.safe, chain_id = self.chain_id))]
	pub async fn assemble(
		&self,
		payloads: Vec<MetaTransactionData>,
	) -> Result<AssembledTransaction, WorkflowError> {
		let call = self.combine(payloads)?;
		let (safe_state, version) = self.load_safe().await?;

		let hasher: Arc<dyn SafeTxHasher> = Arc::new(Eip712SafeHasher::new(version));
		let data = SafeTransactionData::new(call, safe_state.nonce);
		let mut transaction =
			SafeTransaction::new(self.safe, self.chain_id, data, safe_state.threshold);
		let hash = transaction.compute_hash(hasher.as_ref())?;

		if self.verify_hash_onchain {
			let onchain = self
				.delivery
				.chain()
				.safe_transaction_hash(self.safe, transaction.data())
				.await?;
			if onchain != hash {
				return Err(WorkflowError::Configuration(format!(
					"Safe computes transaction hash {} but {} was computed locally for version {}",
					onchain, hash, version
				)));
			}
		}

		tracing::info!(
			safe_tx_hash = %truncate_hash(&hash),
			nonce = %safe_state.nonce,
			threshold = safe_state.threshold,
			version = %version,
			"Assembled Safe transaction"
		);

		Ok(AssembledTransaction {
			transaction,
			safe_state,
			hasher,
		})
	}
}
