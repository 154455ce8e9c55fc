//! Builder for [`TransferWorkflow`].
//!
//! Resolves the chain client and the owner signer implementation from the
//! registries and wires them to the loaded configuration. Both can be
//! replaced, which is how tests run the workflow against an in-memory chain.

use crate::assembler::TransactionAssembler;
use crate::{TransferWorkflow, WorkflowError};
use safe_account::AccountFactory;
use safe_config::Config;
use safe_delivery::{ConnectionSettings, DeliveryInterface, DeliveryService};
use std::sync::Arc;
use std::time::Duration;

/// Chain client used unless one is injected.
pub const DEFAULT_DELIVERY: &str = "evm_alloy";

/// Builder for constructing a [`TransferWorkflow`] from configuration.
pub struct WorkflowBuilder<'a> {
	config: &'a Config,
	delivery: Option<Box<dyn DeliveryInterface>>,
	account_factory: Option<AccountFactory>,
}

impl<'a> WorkflowBuilder<'a> {
	pub fn from_config(config: &'a Config) -> Self {
		Self {
			config,
			delivery: None,
			account_factory: None,
		}
	}

	/// Uses `delivery` instead of the registered chain client.
	pub fn with_delivery(mut self, delivery: Box<dyn DeliveryInterface>) -> Self {
		self.delivery = Some(delivery);
		self
	}

	/// Uses `factory` instead of the configured signer implementation.
	pub fn with_account_factory(mut self, factory: AccountFactory) -> Self {
		self.account_factory = Some(factory);
		self
	}

	/// Connection settings derived from the configuration.
	pub fn connection_settings(config: &Config) -> ConnectionSettings {
		ConnectionSettings {
			chain_id: config.safe.chain_id,
			rpc_url: config.safe.rpc_url.clone(),
			rpc_timeout: Duration::from_secs(config.delivery.rpc_timeout_seconds),
			poll_interval: Duration::from_secs(config.delivery.poll_interval_seconds),
			confirmation_timeout: Duration::from_secs(config.delivery.confirmation_timeout_seconds),
		}
	}

	/// Builds the workflow. No network call is made here.
	pub fn build(self) -> Result<TransferWorkflow, WorkflowError> {
		let config = self.config;

		let delivery = match self.delivery {
			Some(delivery) => delivery,
			None => {
				let (name, factory) = safe_delivery::get_all_implementations()
					.into_iter()
					.find(|(name, _)| *name == DEFAULT_DELIVERY)
					.ok_or_else(|| {
						WorkflowError::Configuration(format!(
							"Delivery implementation '{}' is not registered",
							DEFAULT_DELIVERY
						))
					})?;
				let settings = Self::connection_settings(config);
				match factory(&settings, &config.relayer.private_key) {
					Ok(delivery) => {
						tracing::info!(
							component = "delivery",
							implementation = %name,
							chain_id = settings.chain_id,
							"Loaded"
						);
						delivery
					}
					Err(e) => {
						tracing::error!(
							component = "delivery",
							implementation = %name,
							error = %e,
							"Failed to create delivery implementation"
						);
						return Err(WorkflowError::Configuration(format!(
							"Failed to create delivery implementation '{}': {}",
							name, e
						)));
					}
				}
			}
		};

		let account_factory = match self.account_factory {
			Some(factory) => factory,
			None => safe_account::factory_for(&config.owners.implementation)
				.map_err(|e| WorkflowError::Configuration(e.to_string()))?,
		};
		tracing::info!(
			component = "account",
			implementation = %config.owners.implementation,
			owners = config.owners.private_keys.len(),
			signing_method = %config.owners.signing_method,
			"Loaded"
		);

		let delivery = Arc::new(DeliveryService::new(
			delivery,
			config.delivery.min_confirmations,
		));
		let assembler = TransactionAssembler::new(
			delivery.clone(),
			config.safe.address,
			config.safe.chain_id,
			config.contract_network(),
			config.safe_version()?,
			config.delivery.verify_hash_onchain,
		);

		Ok(TransferWorkflow::new(
			delivery,
			assembler,
			config.owners.private_keys.clone(),
			account_factory,
			config.owners.signing_method,
			config.token.clone(),
			config.safe.address,
			config.safe.chain_id,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mock_chain::{InMemorySafe, OWNER_KEY_1, OWNER_KEY_2, RECIPIENT, RELAYER_KEY, SAFE, TOKEN};
	use crate::TransferRequest;
	use safe_types::U256;

	fn config(rpc_url: &str, implementation: &str) -> Config {
		format!(
			r#"
[safe]
chain_id = 169
rpc_url = "{rpc_url}"
address = "{SAFE}"

[token]
address = "{TOKEN}"
symbol = "USDC"
decimals = 6

[owners]
private_keys = ["{OWNER_KEY_1}", "{OWNER_KEY_2}"]
implementation = "{implementation}"

[relayer]
private_key = "{RELAYER_KEY}"
"#
		)
		.parse()
		.unwrap()
	}

	#[test]
	fn test_connection_settings_from_config() {
		let config = config("https://pacific-rpc.manta.network/http", "local");

		let settings = WorkflowBuilder::connection_settings(&config);

		assert_eq!(settings.chain_id, 169);
		assert_eq!(settings.rpc_timeout, Duration::from_secs(30));
		assert_eq!(settings.poll_interval, Duration::from_secs(7));
		assert_eq!(settings.confirmation_timeout, Duration::from_secs(300));
	}

	#[tokio::test]
	async fn test_builds_registered_implementations() {
		let config = config("http://127.0.0.1:8545", "local");

		let workflow = WorkflowBuilder::from_config(&config).build().unwrap();

		assert_eq!(workflow.safe(), SAFE);
		assert_eq!(workflow.token().symbol, "USDC");
	}

	#[tokio::test]
	async fn test_unknown_signer_implementation() {
		let mut config = config("http://127.0.0.1:8545", "local");
		config.owners.implementation = "hsm".to_string();

		let err = WorkflowBuilder::from_config(&config)
			.build()
			.err()
			.unwrap();

		assert!(matches!(err, WorkflowError::Configuration(msg) if msg.contains("hsm")));
	}

	#[tokio::test]
	async fn test_injected_delivery_runs_transfer() {
		let config = config("http://127.0.0.1:8545", "local");
		let chain = InMemorySafe::two_of_two();

		let workflow = WorkflowBuilder::from_config(&config)
			.with_delivery(Box::new(chain.clone()))
			.build()
			.unwrap();
		let receipt = workflow
			.transfer(&[TransferRequest::new(RECIPIENT, U256::from(1_000_000u64))])
			.await
			.unwrap();

		assert!(receipt.success);
		assert_eq!(chain.token_balance_of(RECIPIENT), U256::from(1_000_000u64));
	}
}
