//! EIP-712 helpers for Safe transaction hashing.
//!
//! These helpers provide:
//! - Domain hash computation, with or without `chainId`
//! - The `SafeTx` struct hash
//! - Final digest computation (0x1901 || domainHash || structHash)
//! - A minimal ABI encoder for the static field types Safe hashing uses

use crate::transaction::SafeTransactionData;
use alloy::primitives::{keccak256, Address, B256, U256};

/// Domain used by Safe contracts from v1.3.0 on.
pub const DOMAIN_TYPE: &str = "EIP712Domain(uint256 chainId,address verifyingContract)";
/// Domain used by Safe contracts before v1.3.0.
pub const LEGACY_DOMAIN_TYPE: &str = "EIP712Domain(address verifyingContract)";
pub const SAFE_TX_TYPE: &str = "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)";

/// Compute the Safe domain separator.
///
/// `chain_id` is `None` for Safes whose domain predates chain binding.
pub fn compute_domain_hash(chain_id: Option<u64>, verifying_contract: &Address) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	match chain_id {
		Some(chain_id) => {
			enc.push_b256(&keccak256(DOMAIN_TYPE.as_bytes()));
			enc.push_u256(U256::from(chain_id));
		}
		None => enc.push_b256(&keccak256(LEGACY_DOMAIN_TYPE.as_bytes())),
	}
	enc.push_address(verifying_contract);
	keccak256(enc.finish())
}

/// Compute `hashStruct(SafeTx)`; dynamic `data` is hashed in place.
pub fn safe_tx_struct_hash(tx: &SafeTransactionData) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&keccak256(SAFE_TX_TYPE.as_bytes()));
	enc.push_address(&tx.to);
	enc.push_u256(tx.value);
	enc.push_b256(&keccak256(&tx.data));
	enc.push_u8(tx.operation.as_u8());
	enc.push_u256(tx.safe_tx_gas);
	enc.push_u256(tx.base_gas);
	enc.push_u256(tx.gas_price);
	enc.push_address(&tx.gas_token);
	enc.push_address(&tx.refund_receiver);
	enc.push_u256(tx.nonce);
	keccak256(enc.finish())
}

/// Compute the final EIP-712 digest: keccak256(0x1901 || domainHash || structHash).
pub fn compute_final_digest(domain_hash: &B256, struct_hash: &B256) -> B256 {
	let mut out = Vec::with_capacity(2 + 32 + 32);
	out.extend_from_slice(&[0x19, 0x01]);
	out.extend_from_slice(domain_hash.as_slice());
	out.extend_from_slice(struct_hash.as_slice());
	keccak256(out)
}

/// Minimal ABI encoder for static 32-byte words.
#[derive(Default)]
pub struct Eip712AbiEncoder {
	buf: Vec<u8>,
}

impl Eip712AbiEncoder {
	pub fn new() -> Self {
		Self { buf: Vec::with_capacity(32 * 11) }
	}

	pub fn push_b256(&mut self, v: &B256) {
		self.buf.extend_from_slice(v.as_slice());
	}

	pub fn push_address(&mut self, addr: &Address) {
		self.push_b256(&addr.into_word());
	}

	pub fn push_u256(&mut self, v: U256) {
		self.buf.extend_from_slice(&v.to_be_bytes::<32>());
	}

	pub fn push_u8(&mut self, v: u8) {
		self.push_u256(U256::from(v));
	}

	pub fn finish(self) -> Vec<u8> {
		self.buf
	}
}
