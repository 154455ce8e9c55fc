//! Common types module for the Safe transfer relay.
//!
//! This module defines the data model shared by every crate in the workspace:
//! Safe transaction payloads and signatures, confirmation receipts, the
//! per-chain contract registry, Solidity bindings and EIP-712 helpers.

/// Solidity interfaces of the Safe, token and MultiSend contracts.
pub mod contracts;
/// Transaction submission and confirmation types.
pub mod delivery;
/// Per-chain Safe contract registry and token configuration.
pub mod networks;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Zeroizing string wrapper for key material.
pub mod secret_string;
/// Safe transaction payloads, signatures and signing methods.
pub mod transaction;
/// Hashing and formatting helpers.
pub mod utils;

pub use alloy::primitives::{Address, Bytes, B256, U256};
pub use delivery::*;
pub use networks::{
	builtin_networks, deserialize_networks, ContractNetworkConfig, NetworksConfig, TokenConfig,
	MANTA_PACIFIC_CHAIN_ID,
};
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use transaction::*;
pub use utils::{format_token_amount, truncate_hash, SafeVersion};
