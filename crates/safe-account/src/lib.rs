//! Account management module for the Safe transfer relay.
//!
//! Owner keys never leave this crate: the rest of the relay sees an owner as
//! an address plus the ability to sign a Safe transaction hash. Signer
//! backends plug in through [`AccountInterface`] and are selected by name
//! from the configuration.

use alloy::primitives::Signature;
use async_trait::async_trait;
use safe_types::{Address, ImplementationRegistry, SafeSignature, SecretString, SigningMethod, B256};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// Error that occurs when interacting with the account implementation.
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Trait defining the interface for owner signer implementations.
///
/// Implementations hold one owner's key material and produce raw ECDSA
/// signatures. Safe-specific encoding happens in [`AccountService`].
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Address controlled by this account.
	fn address(&self) -> Address;

	/// Signs a 32-byte digest directly, without any prefix.
	async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError>;

	/// Signs a message with the EIP-191 personal message prefix.
	async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError>;
}

/// Type alias for account factory functions.
///
/// Every account implementation is built from one configured secret.
pub type AccountFactory = fn(&SecretString) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
///
/// Returns a vector of (name, factory) tuples for all available account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Looks up an account factory by implementation name.
pub fn factory_for(name: &str) -> Result<AccountFactory, AccountError> {
	get_all_implementations()
		.into_iter()
		.find(|(registered, _)| *registered == name)
		.map(|(_, factory)| factory)
		.ok_or_else(|| AccountError::Implementation(format!("Unknown account implementation '{}'", name)))
}

/// One Safe owner able to sign Safe transaction hashes.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Address of the owner.
	pub fn address(&self) -> Address {
		self.implementation.address()
	}

	/// Signs a Safe transaction hash and encodes the result for the Safe's
	/// `signatures` blob.
	///
	/// The produced signature is recovered once before it is returned; a
	/// backend that signs with a different key than it reports is an error.
	pub async fn sign_safe_hash(
		&self,
		safe_tx_hash: &B256,
		method: SigningMethod,
	) -> Result<SafeSignature, AccountError> {
		let signature = match method {
			SigningMethod::EthSign => {
				self.implementation
					.sign_message(safe_tx_hash.as_slice())
					.await?
			}
			SigningMethod::Eip712 => self.implementation.sign_hash(safe_tx_hash).await?,
		};

		let address = self.address();
		let safe_signature = SafeSignature::from_ecdsa(address, &signature, method);
		match safe_signature.recover(safe_tx_hash) {
			Ok(recovered) if recovered == address => Ok(safe_signature),
			Ok(recovered) => Err(AccountError::SigningFailed(format!(
				"Signature recovers to {} instead of {}",
				recovered, address
			))),
			Err(e) => Err(AccountError::SigningFailed(e.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::local::LocalAccount;

	const OWNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const OTHER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

	/// Reports one key's address but signs with another.
	struct MismatchedAccount {
		reported: LocalAccount,
		actual: LocalAccount,
	}

	#[async_trait]
	impl AccountInterface for MismatchedAccount {
		fn address(&self) -> Address {
			self.reported.address()
		}

		async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError> {
			self.actual.sign_hash(hash).await
		}

		async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError> {
			self.actual.sign_message(message).await
		}
	}

	fn local(key: &str) -> LocalAccount {
		LocalAccount::new(&SecretString::from(key)).unwrap()
	}

	#[tokio::test]
	async fn test_sign_safe_hash_eth_sign() {
		let service = AccountService::new(Box::new(local(OWNER_KEY)));
		let hash = B256::repeat_byte(0x24);

		let sig = service
			.sign_safe_hash(&hash, SigningMethod::EthSign)
			.await
			.unwrap();

		assert_eq!(sig.signer, service.address());
		assert!(sig.data[64] > 30);
		assert!(sig.is_valid_for(&hash));
	}

	#[tokio::test]
	async fn test_sign_safe_hash_eip712() {
		let service = AccountService::new(Box::new(local(OWNER_KEY)));
		let hash = B256::repeat_byte(0x24);

		let sig = service
			.sign_safe_hash(&hash, SigningMethod::Eip712)
			.await
			.unwrap();

		assert!(sig.data[64] == 27 || sig.data[64] == 28);
		assert!(sig.is_valid_for(&hash));
	}

	#[tokio::test]
	async fn test_mismatched_backend_rejected() {
		let service = AccountService::new(Box::new(MismatchedAccount {
			reported: local(OWNER_KEY),
			actual: local(OTHER_KEY),
		}));

		let err = service
			.sign_safe_hash(&B256::repeat_byte(0x24), SigningMethod::EthSign)
			.await
			.unwrap_err();

		assert!(matches!(err, AccountError::SigningFailed(_)));
	}

	#[test]
	fn test_factory_lookup() {
		assert!(factory_for("local").is_ok());
		assert!(matches!(
			factory_for("hsm"),
			Err(AccountError::Implementation(_))
		));
	}
}
