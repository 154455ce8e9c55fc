//! Safe transaction hashing.
//!
//! Owners sign the hash the Safe contract itself computes in
//! `getTransactionHash`. The exact rule depends on the Safe version, so it
//! sits behind [`SafeTxHasher`] and is chosen per Safe.

use safe_types::utils::{compute_domain_hash, compute_final_digest, safe_tx_struct_hash};
use safe_types::{Address, SafeTransactionData, SafeVersion, B256};

/// Computes the canonical hash of a Safe transaction.
pub trait SafeTxHasher: Send + Sync {
	/// Safe version whose hashing rule this implements.
	fn version(&self) -> SafeVersion;

	/// Hash that owners sign and the Safe verifies.
	fn hash(&self, safe: Address, chain_id: u64, tx: &SafeTransactionData) -> B256;
}

/// EIP-712 `SafeTx` hashing as implemented by Safe contracts.
///
/// Safes before v1.3.0 omit `chainId` from the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eip712SafeHasher {
	version: SafeVersion,
}

impl Eip712SafeHasher {
	pub fn new(version: SafeVersion) -> Self {
		Self { version }
	}

	/// EIP-712 domain separator of `safe`.
	pub fn domain_separator(&self, safe: Address, chain_id: u64) -> B256 {
		let chain_id = self.version.domain_has_chain_id().then_some(chain_id);
		compute_domain_hash(chain_id, &safe)
	}
}

impl SafeTxHasher for Eip712SafeHasher {
	fn version(&self) -> SafeVersion {
		self.version
	}

	fn hash(&self, safe: Address, chain_id: u64, tx: &SafeTransactionData) -> B256 {
		let domain = self.domain_separator(safe, chain_id);
		compute_final_digest(&domain, &safe_tx_struct_hash(tx))
	}
}
