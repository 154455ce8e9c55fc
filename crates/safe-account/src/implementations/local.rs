//! Account implementation backed by an in-memory private key.

use crate::{AccountError, AccountInterface};
use alloy::primitives::Signature;
use alloy::signers::{local::PrivateKeySigner, Signer};
use async_trait::async_trait;
use safe_types::{Address, SecretString, B256};

/// Signs with a raw secp256k1 private key held in process memory.
#[derive(Debug)]
pub struct LocalAccount {
	signer: PrivateKeySigner,
}

impl LocalAccount {
	/// Parses a hex private key, with or without the `0x` prefix.
	pub fn new(private_key: &SecretString) -> Result<Self, AccountError> {
		let signer = private_key
			.with_exposed(|key| key.trim().parse::<PrivateKeySigner>())
			.map_err(|_| AccountError::InvalidKey("Invalid private key format".to_string()))?;

		Ok(Self { signer })
	}
}

#[async_trait]
impl AccountInterface for LocalAccount {
	fn address(&self) -> Address {
		self.signer.address()
	}

	async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError> {
		self.signer
			.sign_hash(hash)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))
	}

	async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError> {
		self.signer
			.sign_message(message)
			.await
			.map_err(|e| AccountError::SigningFailed(e.to_string()))
	}
}

/// Factory function for the local account implementation.
pub fn create_account(private_key: &SecretString) -> Result<Box<dyn AccountInterface>, AccountError> {
	let account = LocalAccount::new(private_key)?;
	tracing::debug!(address = %account.address(), "Loaded local account");
	Ok(Box::new(account))
}

/// Registry for the local account implementation.
pub struct Registry;

impl safe_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = crate::AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl crate::AccountRegistry for Registry {}
