//! In-memory Safe and token for workflow tests.
//!
//! Implements the chain boundary over a single Safe holding one ERC-20
//! token. Execution follows the Safe contract closely enough to matter:
//! `checkNSignatures` rules (length, ascending owners, ownership), the
//! GS013 rule for failed inner calls, nonce consumption and the events the
//! receipt decoder reads.

use crate::assembler::decode_multisend;
use crate::hashing::{Eip712SafeHasher, SafeTxHasher};
use alloy::primitives::{address, keccak256, Log};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::{Revert, SolCall, SolError, SolEvent};
use async_trait::async_trait;
use safe_delivery::logs::build_receipt;
use safe_delivery::revert::reason_from_revert_data;
use safe_delivery::{DeliveryError, DeliveryInterface};
use safe_types::contracts::{IERC20, IMultiSend, ISafe};
use safe_types::{
	builtin_networks, recover_safe_signer, Address, Bytes, ConfirmationReceipt, OperationType,
	SafeState, SafeTransactionData, SafeVersion, TransactionHash, B256, MANTA_PACIFIC_CHAIN_ID,
	SIGNATURE_LENGTH, U256,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

pub(crate) const SAFE: Address = address!("0x3C5D253E8eC05F7F75D74cDa0fB999C55007F40E");
pub(crate) const TOKEN: Address = address!("0xf417F5A458eC102B90352F697D6e2Ac3A3d2851f");
pub(crate) const RECIPIENT: Address = address!("0x82508c7cf44252f9a6d140684d8a725f03078f6e");
pub(crate) const RELAYER: Address = address!("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");

// Well-known development keys
pub(crate) const OWNER_KEY_1: &str =
	"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub(crate) const OWNER_KEY_2: &str =
	"0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub(crate) const OWNER_KEY_3: &str =
	"0x47e179ec197488593b187f80a00eb0da91f1b9d0b13f8733639f19c30a34926a";
pub(crate) const RELAYER_KEY: &str =
	"0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";
pub(crate) const OUTSIDER_KEY: &str =
	"0x7c852118294e51e653712a81e05800f419141751be58f605c371e15141b007a6";

const GAS_ESTIMATE: u64 = 95_000;

struct ChainState {
	chain_id: u64,
	code: HashSet<Address>,
	nonce: U256,
	threshold: u64,
	owners: Vec<Address>,
	version: String,
	token_balances: HashMap<Address, U256>,
	native_balances: HashMap<Address, U256>,
	gas_price: u128,
	block: u64,
	receipts: HashMap<B256, ConfirmationReceipt>,
	last_transaction: Option<TransactionHash>,
	unreachable: bool,
	corrupt_hash: bool,
	withhold_receipts: bool,
	fail_reads_after_execution: bool,
	execute_calls: usize,
}

/// Clonable handle to one in-memory chain.
#[derive(Clone)]
pub(crate) struct InMemorySafe {
	inner: Arc<Mutex<ChainState>>,
}

fn address_of(key: &str) -> Address {
	key.parse::<PrivateKeySigner>().unwrap().address()
}

fn revert(code: &str) -> DeliveryError {
	let data = Revert {
		reason: code.to_string(),
	}
	.abi_encode();
	DeliveryError::Reverted {
		reason: reason_from_revert_data(&data),
	}
}

impl InMemorySafe {
	/// Safe v1.3.0 owned by the two owner keys with threshold 2, holding
	/// 10 tokens of 6 decimals; the relayer holds 1 ether.
	pub(crate) fn two_of_two() -> Self {
		Self::with_owners(&[OWNER_KEY_1, OWNER_KEY_2], 2)
	}

	/// Same Safe owned by all three owner keys with threshold 2.
	pub(crate) fn two_of_three() -> Self {
		Self::with_owners(&[OWNER_KEY_1, OWNER_KEY_2, OWNER_KEY_3], 2)
	}

	fn with_owners(keys: &[&str], threshold: u64) -> Self {
		let state = ChainState {
			chain_id: MANTA_PACIFIC_CHAIN_ID,
			code: HashSet::from([SAFE, TOKEN]),
			nonce: U256::ZERO,
			threshold,
			owners: keys.iter().map(|key| address_of(key)).collect(),
			version: "1.3.0".to_string(),
			token_balances: HashMap::from([(SAFE, U256::from(10_000_000u64))]),
			native_balances: HashMap::from([(RELAYER, U256::from(10u64).pow(U256::from(18)))]),
			gas_price: 1_000_000_000,
			block: 100,
			receipts: HashMap::new(),
			last_transaction: None,
			unreachable: false,
			corrupt_hash: false,
			withhold_receipts: false,
			fail_reads_after_execution: false,
			execute_calls: 0,
		};
		Self {
			inner: Arc::new(Mutex::new(state)),
		}
	}

	fn state(&self) -> MutexGuard<'_, ChainState> {
		self.inner.lock().unwrap()
	}

	fn reachable(&self) -> Result<MutexGuard<'_, ChainState>, DeliveryError> {
		let state = self.state();
		if state.unreachable {
			return Err(DeliveryError::Network(
				"error sending request: connection refused".to_string(),
			));
		}
		Ok(state)
	}

	pub(crate) fn set_nonce(&self, nonce: U256) {
		self.state().nonce = nonce;
	}

	pub(crate) fn set_chain_id(&self, chain_id: u64) {
		self.state().chain_id = chain_id;
	}

	pub(crate) fn set_version(&self, version: &str) {
		self.state().version = version.to_string();
	}

	pub(crate) fn set_unreachable(&self, unreachable: bool) {
		self.state().unreachable = unreachable;
	}

	pub(crate) fn remove_code(&self, address: Address) {
		self.state().code.remove(&address);
	}

	/// Makes `getTransactionHash` disagree with the local hash.
	pub(crate) fn corrupt_onchain_hash(&self) {
		self.state().corrupt_hash = true;
	}

	/// Keeps mined transactions invisible to receipt queries.
	pub(crate) fn withhold_receipts(&self, withhold: bool) {
		self.state().withhold_receipts = withhold;
	}

	/// Times out every `balanceOf` once a transaction has been sent.
	pub(crate) fn fail_reads_after_execution(&self) {
		self.state().fail_reads_after_execution = true;
	}

	pub(crate) fn set_token_balance(&self, holder: Address, amount: U256) {
		self.state().token_balances.insert(holder, amount);
	}

	pub(crate) fn set_native_balance(&self, holder: Address, amount: U256) {
		self.state().native_balances.insert(holder, amount);
	}

	pub(crate) fn token_balance_of(&self, holder: Address) -> U256 {
		self.state()
			.token_balances
			.get(&holder)
			.copied()
			.unwrap_or_default()
	}

	pub(crate) fn nonce(&self) -> U256 {
		self.state().nonce
	}

	pub(crate) fn execute_calls(&self) -> usize {
		self.state().execute_calls
	}

	pub(crate) fn last_transaction(&self) -> Option<TransactionHash> {
		self.state().last_transaction
	}
}

impl ChainState {
	fn hasher(&self) -> Eip712SafeHasher {
		Eip712SafeHasher::new(self.version.parse().unwrap_or(SafeVersion::V1_3_0))
	}

	fn safe_tx_hash(&self, tx: &SafeTransactionData) -> B256 {
		self.hasher().hash(SAFE, self.chain_id, tx)
	}

	/// Same checks, same order, same codes as `checkNSignatures` for ECDSA
	/// signatures.
	fn check_signatures(&self, hash: &B256, signatures: &[u8]) -> Result<(), DeliveryError> {
		let required = self.threshold as usize;
		if signatures.len() < required * SIGNATURE_LENGTH {
			return Err(revert("GS020"));
		}

		let mut last_owner = Address::ZERO;
		for chunk in signatures.chunks(SIGNATURE_LENGTH).take(required) {
			let owner = recover_safe_signer(chunk, hash).map_err(|_| revert("GS026"))?;
			if owner <= last_owner || !self.owners.contains(&owner) {
				return Err(revert("GS026"));
			}
			last_owner = owner;
		}
		Ok(())
	}

	/// Runs the Safe's inner call against a copy of the token balances.
	fn run_call(
		&self,
		to: Address,
		data: &[u8],
		operation: OperationType,
		balances: &mut HashMap<Address, U256>,
		logs: &mut Vec<Log>,
	) -> bool {
		let multi_send_call_only = builtin_networks()
			.get(&MANTA_PACIFIC_CHAIN_ID)
			.map(|n| n.multi_send_call_only_address);

		match operation {
			OperationType::Call if to == TOKEN => {
				let Ok(call) = IERC20::transferCall::abi_decode(data) else {
					return false;
				};
				let from_balance = balances.get(&SAFE).copied().unwrap_or_default();
				if from_balance < call.amount {
					return false;
				}
				balances.insert(SAFE, from_balance - call.amount);
				*balances.entry(call.to).or_default() += call.amount;
				let event = IERC20::Transfer {
					from: SAFE,
					to: call.to,
					value: call.amount,
				};
				logs.push(Log {
					address: TOKEN,
					data: event.encode_log_data(),
				});
				true
			}
			OperationType::DelegateCall if Some(to) == multi_send_call_only => {
				let Ok(batch) = IMultiSend::multiSendCall::abi_decode(data) else {
					return false;
				};
				let Ok(calls) = decode_multisend(&batch.transactions) else {
					return false;
				};
				calls.iter().all(|call| {
					call.operation == OperationType::Call
						&& self.run_call(call.to, &call.data, call.operation, balances, logs)
				})
			}
			OperationType::Call => true,
			OperationType::DelegateCall => false,
		}
	}

	/// Executes `execTransaction`; on success returns the token balances
	/// and logs it would leave behind.
	fn exec_transaction(
		&self,
		tx: &SafeTransactionData,
		signatures: &[u8],
	) -> Result<(HashMap<Address, U256>, Vec<Log>), DeliveryError> {
		if tx.nonce != self.nonce {
			return Err(revert("GS026"));
		}
		let hash = self.safe_tx_hash(tx);
		self.check_signatures(&hash, signatures)?;

		let mut balances = self.token_balances.clone();
		let mut logs = Vec::new();
		if !self.run_call(tx.to, &tx.data, tx.operation, &mut balances, &mut logs) {
			// safeTxGas and gasPrice are zero, so a failed call reverts
			return Err(revert("GS013"));
		}

		let success = ISafe::ExecutionSuccess {
			txHash: hash,
			payment: U256::ZERO,
		};
		logs.push(Log {
			address: SAFE,
			data: success.encode_log_data(),
		});
		Ok((balances, logs))
	}
}

#[async_trait]
impl DeliveryInterface for InMemorySafe {
	async fn chain_id(&self) -> Result<u64, DeliveryError> {
		Ok(self.reachable()?.chain_id)
	}

	async fn code_size(&self, address: Address) -> Result<usize, DeliveryError> {
		let state = self.reachable()?;
		Ok(if state.code.contains(&address) { 2_048 } else { 0 })
	}

	async fn safe_state(&self, safe: Address) -> Result<SafeState, DeliveryError> {
		let state = self.reachable()?;
		if safe != SAFE || !state.code.contains(&SAFE) {
			return Err(DeliveryError::Decode("empty response to nonce()".to_string()));
		}
		Ok(SafeState {
			address: SAFE,
			nonce: state.nonce,
			threshold: state.threshold,
			owners: state.owners.clone(),
			version: state.version.clone(),
		})
	}

	async fn safe_transaction_hash(
		&self,
		_safe: Address,
		tx: &SafeTransactionData,
	) -> Result<B256, DeliveryError> {
		let state = self.reachable()?;
		if state.corrupt_hash {
			return Ok(keccak256(state.safe_tx_hash(tx)));
		}
		Ok(state.safe_tx_hash(tx))
	}

	async fn token_balance(&self, token: Address, holder: Address) -> Result<U256, DeliveryError> {
		let state = self.reachable()?;
		if state.fail_reads_after_execution && state.execute_calls > 0 {
			return Err(DeliveryError::Timeout("eth_call timed out".to_string()));
		}
		if token != TOKEN || !state.code.contains(&TOKEN) {
			return Err(DeliveryError::Decode("empty response to balanceOf()".to_string()));
		}
		Ok(state.token_balances.get(&holder).copied().unwrap_or_default())
	}

	async fn native_balance(&self, address: Address) -> Result<U256, DeliveryError> {
		let state = self.reachable()?;
		Ok(state.native_balances.get(&address).copied().unwrap_or_default())
	}

	fn relayer_address(&self) -> Address {
		RELAYER
	}

	async fn gas_price(&self) -> Result<u128, DeliveryError> {
		Ok(self.reachable()?.gas_price)
	}

	async fn simulate_execution(
		&self,
		_safe: Address,
		tx: &SafeTransactionData,
		signatures: &Bytes,
	) -> Result<u64, DeliveryError> {
		let state = self.reachable()?;
		state.exec_transaction(tx, signatures)?;
		Ok(GAS_ESTIMATE)
	}

	async fn execute(
		&self,
		_safe: Address,
		tx: &SafeTransactionData,
		signatures: &Bytes,
		gas_limit: u64,
	) -> Result<TransactionHash, DeliveryError> {
		let mut state = self.reachable()?;
		state.execute_calls += 1;

		let gas_price = U256::from(state.gas_price);
		let cost = U256::from(gas_limit) * gas_price;
		let relayer_balance = state.native_balances.get(&RELAYER).copied().unwrap_or_default();
		if relayer_balance < cost {
			return Err(DeliveryError::Rejected(
				"insufficient funds for gas * price + value".to_string(),
			));
		}

		state.block += 1;
		let hash = TransactionHash(keccak256(
			[state.block.to_be_bytes().as_slice(), &signatures[..]].concat(),
		));
		let gas_used = GAS_ESTIMATE - 5_000;
		state
			.native_balances
			.insert(RELAYER, relayer_balance - U256::from(gas_used) * gas_price);

		let receipt = match state.exec_transaction(tx, signatures) {
			Ok((balances, logs)) => {
				state.token_balances = balances;
				state.nonce += U256::from(1);
				build_receipt(hash, state.block, true, gas_used, &logs, SAFE)
			}
			Err(_) => build_receipt(hash, state.block, false, gas_used, &[], SAFE),
		};
		state.receipts.insert(hash.0, receipt);
		state.last_transaction = Some(hash);
		Ok(hash)
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		_safe: Address,
		_confirmations: u64,
	) -> Result<ConfirmationReceipt, DeliveryError> {
		let state = self.reachable()?;
		if state.withhold_receipts {
			return Err(DeliveryError::Timeout(format!(
				"no receipt for {} after 300s",
				hash
			)));
		}
		state
			.receipts
			.get(&hash.0)
			.cloned()
			.ok_or_else(|| DeliveryError::Network(format!("unknown transaction {}", hash)))
	}

	async fn get_receipt(
		&self,
		hash: &TransactionHash,
		_safe: Address,
	) -> Result<Option<ConfirmationReceipt>, DeliveryError> {
		let state = self.reachable()?;
		if state.withhold_receipts {
			return Ok(None);
		}
		Ok(state.receipts.get(&hash.0).cloned())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fixture_addresses() {
		assert_eq!(address_of(RELAYER_KEY), RELAYER);
		assert_ne!(address_of(OUTSIDER_KEY), address_of(OWNER_KEY_1));
		assert_ne!(address_of(OWNER_KEY_3), address_of(OUTSIDER_KEY));
		assert_eq!(InMemorySafe::two_of_three().state().owners.len(), 3);
	}

	#[tokio::test]
	async fn test_rejects_short_signatures() {
		let chain = InMemorySafe::two_of_two();
		let tx = SafeTransactionData::new(
			safe_types::MetaTransactionData {
				to: TOKEN,
				value: U256::ZERO,
				data: Bytes::new(),
				operation: OperationType::Call,
			},
			U256::ZERO,
		);

		let err = chain
			.simulate_execution(SAFE, &tx, &Bytes::from(vec![0u8; 65]))
			.await
			.unwrap_err();

		assert!(matches!(err, DeliveryError::Reverted { reason } if reason.starts_with("GS020")));
	}
}
