//! Network registry for the Safe contracts.
//!
//! The Safe contracts are deployed at different addresses per chain. This
//! module holds the auxiliary addresses the relay needs for a chain (the
//! MultiSend helpers above all) and the token configuration.

use alloy::primitives::{address, Address};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Chain id of Manta Pacific mainnet.
pub const MANTA_PACIFIC_CHAIN_ID: u64 = 169;

/// Configuration for the token being transferred.
///
/// # Fields
///
/// * `address` - The on-chain address of the token contract
/// * `symbol` - The token symbol, used for log output only
/// * `decimals` - The number of decimal places for the token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TokenConfig {
	pub address: Address,
	#[serde(default = "default_token_symbol")]
	pub symbol: String,
	#[serde(default = "default_token_decimals")]
	pub decimals: u8,
}

fn default_token_symbol() -> String {
	"TOKEN".to_string()
}

fn default_token_decimals() -> u8 {
	18
}

/// Safe auxiliary contract addresses for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ContractNetworkConfig {
	pub multi_send_address: Address,
	pub multi_send_call_only_address: Address,
	pub safe_master_copy_address: Address,
	pub safe_proxy_factory_address: Address,
	pub fallback_handler_address: Address,
	pub sign_message_lib_address: Address,
	pub create_call_address: Address,
	pub simulate_tx_accessor_address: Address,
}

/// Chain id to Safe contract addresses.
pub type NetworksConfig = HashMap<u64, ContractNetworkConfig>;

/// Returns the registry entries shipped with the relay.
pub fn builtin_networks() -> NetworksConfig {
	let mut networks = HashMap::new();
	networks.insert(
		MANTA_PACIFIC_CHAIN_ID,
		ContractNetworkConfig {
			multi_send_address: address!("0xA238CBeb142c10Ef7Ad8442C6D1f9E89e07e7761"),
			multi_send_call_only_address: address!("0x40A2aCCbd92BCA938b02010E17A5b8929b49130D"),
			safe_master_copy_address: address!("0x3E5c63644E683549055b9Be8653de26E0B4CD36E"),
			safe_proxy_factory_address: address!("0xa6B71E26C5e0845f74c812102Ca7114b6a896AB2"),
			fallback_handler_address: address!("0xf48f2B2d2a534e402487b3ee7C18c33Aec0Fe5e4"),
			sign_message_lib_address: address!("0xA65387F16B013cf2Af4605Ad8aA5ec25a2cbA3a2"),
			create_call_address: address!("0x7cbB62EaA69F79e6873cD1ecB2392971036cFAa4"),
			simulate_tx_accessor_address: address!("0x59AD6735bCd8152B84860Cb256dD9e96b85F69Da"),
		},
	);
	networks
}

/// Helper function to deserialize network entries from TOML.
///
/// TOML tables cannot have numeric keys, so chain ids arrive as strings and
/// are converted to u64 here.
///
/// # Errors
///
/// Returns a deserialization error if a chain id key is not a u64 or an
/// entry is malformed.
pub fn deserialize_networks<'de, D>(deserializer: D) -> Result<NetworksConfig, D::Error>
where
	D: Deserializer<'de>,
{
	let string_map: HashMap<String, ContractNetworkConfig> = HashMap::deserialize(deserializer)?;
	let mut result = HashMap::new();

	for (key, value) in string_map {
		let chain_id = key
			.parse::<u64>()
			.map_err(|e| serde::de::Error::custom(format!("Invalid chain_id '{}': {}", key, e)))?;
		result.insert(chain_id, value);
	}

	Ok(result)
}
