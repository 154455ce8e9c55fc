//! Revert reasons.
//!
//! Safe contracts revert with short `GSxxx` codes. This module extracts a
//! reason from revert data or node error messages and expands known codes.

use alloy::sol_types::decode_revert_reason;

/// Safe error codes and what they mean.
const SAFE_ERROR_CODES: &[(&str, &str)] = &[
	("GS000", "Could not finish initialization"),
	("GS001", "Threshold needs to be defined"),
	("GS010", "Not enough gas to execute Safe transaction"),
	("GS011", "Could not pay gas costs with ether"),
	("GS012", "Could not pay gas costs with token"),
	("GS013", "Safe transaction failed when gasPrice and safeTxGas were 0"),
	("GS020", "Signatures data too short"),
	("GS021", "Invalid contract signature location: inside static part"),
	("GS022", "Invalid contract signature location: length not present"),
	("GS023", "Invalid contract signature location: data not complete"),
	("GS024", "Invalid contract signature provided"),
	("GS025", "Hash has not been approved"),
	("GS026", "Invalid owner provided"),
	("GS030", "Only owners can approve a hash"),
	("GS031", "Method can only be called from this contract"),
];

/// Description of a Safe error code such as `GS026`.
pub fn describe_safe_error(code: &str) -> Option<&'static str> {
	SAFE_ERROR_CODES
		.iter()
		.find(|(known, _)| *known == code)
		.map(|(_, description)| *description)
}

/// Finds the first `GSxxx` code in a reason string.
pub fn find_safe_error_code(reason: &str) -> Option<&str> {
	let bytes = reason.as_bytes();
	(0..bytes.len().saturating_sub(4)).find_map(|i| {
		let candidate = &bytes[i..i + 5];
		(candidate[0] == b'G'
			&& candidate[1] == b'S'
			&& candidate[2..].iter().all(u8::is_ascii_digit))
		.then(|| &reason[i..i + 5])
	})
}

/// Turns raw revert data into a readable reason.
pub fn reason_from_revert_data(data: &[u8]) -> String {
	if data.is_empty() {
		return "reverted without reason".to_string();
	}
	match decode_revert_reason(data) {
		Some(reason) => annotate(&reason),
		None => format!("0x{}", hex::encode(data)),
	}
}

/// Extracts the reason from a node error message such as
/// `execution reverted: GS026`.
pub fn reason_from_message(message: &str) -> String {
	let reason = message
		.split_once("reverted:")
		.map(|(_, rest)| rest.trim())
		.filter(|rest| !rest.is_empty())
		.unwrap_or(message);
	annotate(reason)
}

/// Returns true if a node error message describes a revert.
pub fn is_revert_message(message: &str) -> bool {
	message.to_ascii_lowercase().contains("revert")
}

/// Rewrites a reason carrying a Safe code as `GSxxx: description`.
fn annotate(reason: &str) -> String {
	match find_safe_error_code(reason) {
		Some(code) => match describe_safe_error(code) {
			Some(description) => format!("{}: {}", code, description),
			None => code.to_string(),
		},
		None => reason.to_string(),
	}
}
