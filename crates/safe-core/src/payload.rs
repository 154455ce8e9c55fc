//! Transfer payload construction.
//!
//! Turns user input (recipient, amount) into the ERC-20 `transfer` call the
//! Safe will perform. Everything here is pure encoding.

use alloy::sol_types::SolCall;
use safe_types::contracts::IERC20;
use safe_types::{Address, MetaTransactionData, OperationType, U256};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing or encoding a transfer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
	#[error("Invalid recipient '{input}': {reason}")]
	InvalidRecipient { input: String, reason: String },
	#[error("Invalid amount '{input}': {reason}")]
	InvalidAmount { input: String, reason: String },
	#[error("Payload is not an ERC-20 transfer: {0}")]
	NotATransfer(String),
}

/// A single token transfer: who receives how many smallest units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
	pub recipient: Address,
	pub amount: U256,
}

impl TransferRequest {
	pub fn new(recipient: Address, amount: U256) -> Self {
		Self { recipient, amount }
	}
}

/// Parses a recipient address.
///
/// Accepts 40 hex digits with or without `0x`. All-lowercase and
/// all-uppercase input is taken as is; mixed case must carry a valid EIP-55
/// checksum.
pub fn parse_recipient(input: &str) -> Result<Address, PayloadError> {
	let invalid = |reason: &str| PayloadError::InvalidRecipient {
		input: input.to_string(),
		reason: reason.to_string(),
	};

	let trimmed = input.trim();
	let body = trimmed
		.strip_prefix("0x")
		.or_else(|| trimmed.strip_prefix("0X"))
		.unwrap_or(trimmed);
	if body.len() != 40 {
		return Err(invalid("expected 40 hex digits"));
	}
	if !body.chars().all(|c| c.is_ascii_hexdigit()) {
		return Err(invalid("contains non-hex characters"));
	}

	let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
	let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
	let prefixed = format!("0x{}", body);
	let address = if has_lower && has_upper {
		Address::parse_checksummed(&prefixed, None).map_err(|_| invalid("EIP-55 checksum mismatch"))?
	} else {
		Address::from_str(&prefixed).map_err(|e| invalid(&e.to_string()))?
	};

	if address == Address::ZERO {
		return Err(invalid("zero address"));
	}
	Ok(address)
}

/// Parses an amount in the token's smallest unit, decimal or `0x` hex.
pub fn parse_amount(input: &str) -> Result<U256, PayloadError> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(PayloadError::InvalidAmount {
			input: input.to_string(),
			reason: "empty".to_string(),
		});
	}
	U256::from_str(trimmed).map_err(|e| PayloadError::InvalidAmount {
		input: input.to_string(),
		reason: e.to_string(),
	})
}

/// Parses a human-readable amount such as `1.5` and scales it by `decimals`.
pub fn parse_token_amount(input: &str, decimals: u8) -> Result<U256, PayloadError> {
	let invalid = |reason: String| PayloadError::InvalidAmount {
		input: input.to_string(),
		reason,
	};

	let trimmed = input.trim();
	let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
	if whole.is_empty() && fraction.is_empty() {
		return Err(invalid("empty".to_string()));
	}
	if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
		return Err(invalid("expected a decimal number".to_string()));
	}
	if fraction.len() > decimals as usize {
		return Err(invalid(format!(
			"more than {} decimal places",
			decimals
		)));
	}

	let parse_digits = |digits: &str| -> Result<U256, PayloadError> {
		if digits.is_empty() {
			return Ok(U256::ZERO);
		}
		U256::from_str_radix(digits, 10).map_err(|e| invalid(e.to_string()))
	};
	let overflow = || invalid("does not fit in 256 bits".to_string());

	let scale = U256::from(10u64)
		.checked_pow(U256::from(decimals))
		.ok_or_else(overflow)?;
	let fraction_scale = U256::from(10u64).pow(U256::from(decimals as usize - fraction.len()));

	parse_digits(whole)?
		.checked_mul(scale)
		.and_then(|w| {
			parse_digits(fraction)
				.ok()?
				.checked_mul(fraction_scale)
				.and_then(|f| w.checked_add(f))
		})
		.ok_or_else(overflow)
}

/// Encodes `transfer(recipient, amount)` against `token`.
pub fn build_transfer_payload(token: Address, request: &TransferRequest) -> MetaTransactionData {
	let call = IERC20::transferCall {
		to: request.recipient,
		amount: request.amount,
	};

	MetaTransactionData {
		to: token,
		value: U256::ZERO,
		data: call.abi_encode().into(),
		operation: OperationType::Call,
	}
}

/// Decodes a payload produced by [`build_transfer_payload`].
pub fn decode_transfer_payload(payload: &MetaTransactionData) -> Result<TransferRequest, PayloadError> {
	if payload.operation != OperationType::Call {
		return Err(PayloadError::NotATransfer("delegate call".to_string()));
	}
	if !payload.data.starts_with(&IERC20::transferCall::SELECTOR) {
		return Err(PayloadError::NotATransfer("unexpected selector".to_string()));
	}

	let call = IERC20::transferCall::abi_decode(&payload.data)
		.map_err(|e| PayloadError::NotATransfer(e.to_string()))?;
	Ok(TransferRequest::new(call.to, call.amount))
}
