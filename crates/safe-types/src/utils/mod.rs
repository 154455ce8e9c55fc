//! Utility functions for hashing and display.

pub mod eip712;
pub mod formatting;
pub mod version;

pub use eip712::{
	compute_domain_hash, compute_final_digest, safe_tx_struct_hash, Eip712AbiEncoder,
	DOMAIN_TYPE, LEGACY_DOMAIN_TYPE, SAFE_TX_TYPE,
};
pub use formatting::{format_token_amount, truncate_hash};
pub use version::SafeVersion;
