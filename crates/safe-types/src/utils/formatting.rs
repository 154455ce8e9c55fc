//! String formatting utilities for log output.

use alloy::primitives::{B256, U256};

/// Shortens a 32-byte hash to its first four bytes, e.g. `0x1a2b3c4d..`.
pub fn truncate_hash(hash: &B256) -> String {
	let full = hash.to_string();
	format!("{}..", &full[..10])
}

/// Formats a raw token amount with the token's decimal places.
///
/// Trailing zeros in the fractional part are dropped, so one token with 18
/// decimals prints as "1" and 1.5 tokens as "1.5".
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
	let digits = amount.to_string();
	if decimals == 0 {
		return digits;
	}

	let decimal_places = decimals as usize;
	let padded = format!("{:0>width$}", digits, width = decimal_places + 1);
	let (integer_part, fraction) = padded.split_at(padded.len() - decimal_places);
	let fraction = fraction.trim_end_matches('0');

	if fraction.is_empty() {
		integer_part.to_string()
	} else {
		format!("{}.{}", integer_part, fraction)
	}
}
