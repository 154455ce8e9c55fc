//! Configuration module for the Safe transfer relay.
//!
//! This module loads the relay configuration from TOML files and validates it
//! before any network or signing activity happens. Every value is supplied
//! externally; the only defaults are operational knobs such as timeouts.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files, typically to keep key
//! material apart from the rest:
//! - Use `include = ["keys.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)
//!
//! String values may reference environment variables as `${VAR}` or
//! `${VAR:-default}`.

mod loader;

use regex::Regex;
use safe_types::{
	builtin_networks, deserialize_networks, Address, ContractNetworkConfig, NetworksConfig,
	SafeVersion, SecretString, SigningMethod, TokenConfig,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Name of the signer implementation backed by raw private keys.
pub const LOCAL_SIGNER: &str = "local";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input (it may contain keys)
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// The Safe and the chain it lives on.
	pub safe: SafeConfig,
	/// Token moved by the transfer.
	pub token: TokenConfig,
	/// Owner keys that sign the Safe transaction.
	pub owners: OwnersConfig,
	/// Account that pays gas to submit the transaction.
	pub relayer: RelayerConfig,
	/// Submission and confirmation settings.
	#[serde(default)]
	pub delivery: DeliveryConfig,
	/// Extra Safe contract registry entries, keyed by chain id. Entries here
	/// take precedence over the built-in registry.
	#[serde(default, deserialize_with = "deserialize_networks")]
	pub networks: NetworksConfig,
}

/// The Safe and the chain it lives on.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SafeConfig {
	/// Chain id the Safe is deployed on.
	pub chain_id: u64,
	/// HTTP(S) JSON-RPC endpoint.
	pub rpc_url: String,
	/// Address of the Safe proxy.
	pub address: Address,
	/// Pins the Safe version used for hashing. When absent the version is
	/// read from the contract.
	#[serde(default)]
	pub version: Option<String>,
}

/// Owner signer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OwnersConfig {
	/// Owner private keys, in signing order.
	pub private_keys: Vec<SecretString>,
	/// Signer implementation that interprets `private_keys`.
	#[serde(default = "default_signer_implementation")]
	pub implementation: String,
	/// Digest the owners sign.
	#[serde(default)]
	pub signing_method: SigningMethod,
}

fn default_signer_implementation() -> String {
	LOCAL_SIGNER.to_string()
}

/// Relayer (collector) account configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayerConfig {
	pub private_key: SecretString,
}

/// Submission and confirmation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
	/// Confirmations to wait for after inclusion.
	#[serde(default = "default_confirmations")]
	pub min_confirmations: u64,
	/// Upper bound for any single RPC call.
	#[serde(default = "default_rpc_timeout_seconds")]
	pub rpc_timeout_seconds: u64,
	/// Upper bound for waiting on the execution receipt.
	#[serde(default = "default_confirmation_timeout_seconds")]
	pub confirmation_timeout_seconds: u64,
	/// Receipt polling interval.
	#[serde(default = "default_poll_interval_seconds")]
	pub poll_interval_seconds: u64,
	/// Cross-check the locally computed Safe transaction hash against the
	/// contract's `getTransactionHash`.
	#[serde(default = "default_verify_hash_onchain")]
	pub verify_hash_onchain: bool,
}

impl Default for DeliveryConfig {
	fn default() -> Self {
		Self {
			min_confirmations: default_confirmations(),
			rpc_timeout_seconds: default_rpc_timeout_seconds(),
			confirmation_timeout_seconds: default_confirmation_timeout_seconds(),
			poll_interval_seconds: default_poll_interval_seconds(),
			verify_hash_onchain: default_verify_hash_onchain(),
		}
	}
}

fn default_confirmations() -> u64 {
	1
}

fn default_rpc_timeout_seconds() -> u64 {
	30
}

fn default_confirmation_timeout_seconds() -> u64 {
	300
}

fn default_poll_interval_seconds() -> u64 {
	7
}

fn default_verify_hash_onchain() -> bool {
	true
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match (std::env::var(var_name.as_str()), default_value) {
			(Ok(v), _) => v,
			(Err(_), Some(default)) => default.to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					var_name.as_str()
				)))
			}
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let base_dir = path
			.parent()
			.filter(|p| !p.as_os_str().is_empty())
			.unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path.display())))?;
		loader.load_config(file_name).await
	}

	/// Safe contract registry entry for the configured chain.
	///
	/// Configured entries win over the built-in registry.
	pub fn contract_network(&self) -> Option<ContractNetworkConfig> {
		self.networks
			.get(&self.safe.chain_id)
			.cloned()
			.or_else(|| builtin_networks().remove(&self.safe.chain_id))
	}

	/// Pinned Safe version, if one is configured.
	pub fn safe_version(&self) -> Result<Option<SafeVersion>, ConfigError> {
		self.safe
			.version
			.as_deref()
			.map(|v| v.parse::<SafeVersion>().map_err(ConfigError::Validation))
			.transpose()
	}

	/// Validates the configuration.
	///
	/// Placeholder values (zero addresses, empty keys) are rejected here so
	/// that an unfilled template can never reach the chain.
	fn validate(&self) -> Result<(), ConfigError> {
		// Safe and chain
		if self.safe.chain_id == 0 {
			return Err(ConfigError::Validation(
				"safe.chain_id must be greater than 0".into(),
			));
		}
		let rpc_url = self.safe.rpc_url.trim();
		if rpc_url.is_empty() {
			return Err(ConfigError::Validation("safe.rpc_url cannot be empty".into()));
		}
		if !(rpc_url.starts_with("http://") || rpc_url.starts_with("https://")) {
			return Err(ConfigError::Validation(format!(
				"safe.rpc_url must be an http(s) URL, got '{}'",
				rpc_url
			)));
		}
		if self.safe.address == Address::ZERO {
			return Err(ConfigError::Validation(
				"safe.address cannot be the zero address".into(),
			));
		}
		self.safe_version()?;

		if self.contract_network().is_none() {
			return Err(ConfigError::Validation(format!(
				"No Safe contract addresses known for chain {}; add a [networks.{}] section",
				self.safe.chain_id, self.safe.chain_id
			)));
		}

		// Token
		if self.token.address == Address::ZERO {
			return Err(ConfigError::Validation(
				"token.address cannot be the zero address".into(),
			));
		}
		if self.token.address == self.safe.address {
			return Err(ConfigError::Validation(
				"token.address cannot be the Safe address".into(),
			));
		}

		// Owners
		if self.owners.private_keys.is_empty() {
			return Err(ConfigError::Validation(
				"At least one owner private key must be configured".into(),
			));
		}
		if self.owners.implementation.is_empty() {
			return Err(ConfigError::Validation(
				"owners.implementation cannot be empty".into(),
			));
		}
		let check_key_shape = self.owners.implementation == LOCAL_SIGNER;
		let normalize = |key: &SecretString| {
			SecretString::new(key.with_exposed(|k| k.trim().trim_start_matches("0x").to_lowercase()))
		};
		for (index, key) in self.owners.private_keys.iter().enumerate() {
			if key.is_blank() {
				return Err(ConfigError::Validation(format!(
					"Owner private key #{} is empty",
					index
				)));
			}
			if check_key_shape && !key.is_hex_private_key() {
				return Err(ConfigError::Validation(format!(
					"Owner private key #{} is not a 32-byte hex key",
					index
				)));
			}
			let normalized = normalize(key);
			if self.owners.private_keys[..index]
				.iter()
				.any(|earlier| normalize(earlier) == normalized)
			{
				return Err(ConfigError::Validation(format!(
					"Owner private key #{} is configured more than once",
					index
				)));
			}
		}

		// Relayer
		if self.relayer.private_key.is_blank() {
			return Err(ConfigError::Validation(
				"relayer.private_key cannot be empty".into(),
			));
		}
		if !self.relayer.private_key.is_hex_private_key() {
			return Err(ConfigError::Validation(
				"relayer.private_key is not a 32-byte hex key".into(),
			));
		}

		// Delivery
		let delivery = &self.delivery;
		if delivery.min_confirmations == 0 {
			return Err(ConfigError::Validation(
				"min_confirmations must be at least 1".into(),
			));
		}
		if delivery.min_confirmations > 100 {
			return Err(ConfigError::Validation(
				"min_confirmations cannot exceed 100".into(),
			));
		}
		if delivery.rpc_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"rpc_timeout_seconds must be greater than 0".into(),
			));
		}
		if delivery.poll_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"poll_interval_seconds must be greater than 0".into(),
			));
		}
		if delivery.confirmation_timeout_seconds < delivery.poll_interval_seconds {
			return Err(ConfigError::Validation(
				"confirmation_timeout_seconds must be at least poll_interval_seconds".into(),
			));
		}

		Ok(())
	}
}

/// Parses a configuration from a TOML string.
///
/// Environment variables are resolved first and the result is validated.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
