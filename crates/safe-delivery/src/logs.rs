//! Decoding of execution receipt logs.
//!
//! The chain receipt only says whether the relayer's transaction succeeded.
//! Whether the Safe actually performed the call, and which tokens moved, is
//! read from the logs.

use alloy::primitives::Log;
use alloy::sol_types::SolEvent;
use safe_types::contracts::{IERC20, ISafe};
use safe_types::{
	Address, ConfirmationReceipt, SafeExecutionOutcome, TransactionHash, TransferEvent, B256, U256,
};

/// Decodes an ERC-20 `Transfer` log.
///
/// Returns `None` for any other log, including ERC-721 transfers, which
/// share the topic but index the third argument.
pub fn decode_transfer_log(log: &Log) -> Option<TransferEvent> {
	let topics = log.data.topics();
	if topics.len() != 3 || topics[0] != IERC20::Transfer::SIGNATURE_HASH {
		return None;
	}
	let data = &log.data.data;
	if data.len() != 32 {
		return None;
	}

	Some(TransferEvent {
		token: log.address,
		from: Address::from_word(topics[1]),
		to: Address::from_word(topics[2]),
		value: U256::from_be_slice(data),
	})
}

/// Reads the Safe's execution outcome from the logs it emitted.
///
/// Handles both event layouts: `txHash` in the data (v1.3.0 and earlier)
/// and `txHash` as an indexed topic (v1.4.x).
pub fn decode_execution_outcome(logs: &[Log], safe: Address) -> (SafeExecutionOutcome, Option<B256>) {
	for log in logs.iter().filter(|log| log.address == safe) {
		let topics = log.data.topics();
		let outcome = match topics.first() {
			Some(topic) if *topic == ISafe::ExecutionSuccess::SIGNATURE_HASH => {
				SafeExecutionOutcome::Success
			}
			Some(topic) if *topic == ISafe::ExecutionFailure::SIGNATURE_HASH => {
				SafeExecutionOutcome::Failure
			}
			_ => continue,
		};

		let safe_tx_hash = match topics.get(1) {
			Some(indexed) => Some(*indexed),
			None => log.data.data.get(..32).map(B256::from_slice),
		};
		return (outcome, safe_tx_hash);
	}
	(SafeExecutionOutcome::NotObserved, None)
}

/// Builds a confirmation receipt from raw receipt fields.
pub fn build_receipt(
	hash: TransactionHash,
	block_number: u64,
	success: bool,
	gas_used: u64,
	logs: &[Log],
	safe: Address,
) -> ConfirmationReceipt {
	let (safe_outcome, safe_tx_hash) = decode_execution_outcome(logs, safe);
	ConfirmationReceipt {
		hash,
		block_number,
		success,
		gas_used,
		safe_tx_hash,
		safe_outcome,
		transfers: logs.iter().filter_map(decode_transfer_log).collect(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::Bytes;

	fn token() -> Address {
		Address::repeat_byte(0xf4)
	}

	fn safe() -> Address {
		Address::repeat_byte(0x3c)
	}

	fn transfer_log(from: Address, to: Address, value: u64) -> Log {
		Log::new_unchecked(
			token(),
			vec![
				IERC20::Transfer::SIGNATURE_HASH,
				from.into_word(),
				to.into_word(),
			],
			Bytes::copy_from_slice(&U256::from(value).to_be_bytes::<32>()),
		)
	}

	fn success_log(safe_tx_hash: B256) -> Log {
		let mut data = safe_tx_hash.to_vec();
		data.extend_from_slice(&[0u8; 32]);
		Log::new_unchecked(
			safe(),
			vec![ISafe::ExecutionSuccess::SIGNATURE_HASH],
			Bytes::from(data),
		)
	}

	#[test]
	fn test_decode_transfer_log() {
		let recipient = Address::repeat_byte(0x82);
		let log = transfer_log(safe(), recipient, 1_000_000);

		let event = decode_transfer_log(&log).unwrap();

		assert_eq!(event.token, token());
		assert_eq!(event.from, safe());
		assert_eq!(event.to, recipient);
		assert_eq!(event.value, U256::from(1_000_000u64));
	}

	#[test]
	fn test_decode_transfer_log_ignores_other_events() {
		let log = success_log(B256::repeat_byte(0x01));
		assert!(decode_transfer_log(&log).is_none());

		// ERC-721 style: token id indexed, no data
		let nft = Log::new_unchecked(
			token(),
			vec![
				IERC20::Transfer::SIGNATURE_HASH,
				safe().into_word(),
				Address::repeat_byte(0x82).into_word(),
				B256::with_last_byte(1),
			],
			Bytes::new(),
		);
		assert!(decode_transfer_log(&nft).is_none());
	}

	#[test]
	fn test_execution_success_with_hash_in_data() {
		let safe_tx_hash = B256::repeat_byte(0xab);
		let logs = vec![
			transfer_log(safe(), Address::repeat_byte(0x82), 5),
			success_log(safe_tx_hash),
		];

		let (outcome, hash) = decode_execution_outcome(&logs, safe());

		assert_eq!(outcome, SafeExecutionOutcome::Success);
		assert_eq!(hash, Some(safe_tx_hash));
	}

	#[test]
	fn test_execution_failure_with_indexed_hash() {
		let safe_tx_hash = B256::repeat_byte(0xcd);
		let log = Log::new_unchecked(
			safe(),
			vec![ISafe::ExecutionFailure::SIGNATURE_HASH, safe_tx_hash],
			Bytes::copy_from_slice(&[0u8; 32]),
		);

		let (outcome, hash) = decode_execution_outcome(&[log], safe());

		assert_eq!(outcome, SafeExecutionOutcome::Failure);
		assert_eq!(hash, Some(safe_tx_hash));
	}

	#[test]
	fn test_execution_event_from_other_contract_ignored() {
		let mut log = success_log(B256::repeat_byte(0x01));
		log.address = Address::repeat_byte(0x99);

		let (outcome, hash) = decode_execution_outcome(&[log], safe());

		assert_eq!(outcome, SafeExecutionOutcome::NotObserved);
		assert_eq!(hash, None);
	}

	#[test]
	fn test_build_receipt_collects_transfers() {
		let recipient = Address::repeat_byte(0x82);
		let logs = vec![
			transfer_log(safe(), recipient, 1_000_000),
			success_log(B256::repeat_byte(0xab)),
		];

		let receipt = build_receipt(
			TransactionHash(B256::repeat_byte(0x11)),
			42,
			true,
			84_000,
			&logs,
			safe(),
		);

		assert_eq!(receipt.block_number, 42);
		assert_eq!(receipt.safe_outcome, SafeExecutionOutcome::Success);
		assert_eq!(receipt.transfers.len(), 1);
		assert_eq!(receipt.transfers[0].to, recipient);
	}
}
