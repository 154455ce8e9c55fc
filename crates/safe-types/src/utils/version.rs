//! Safe contract version parsing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A Safe contract version such as `1.3.0` or `1.3.0+L2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SafeVersion {
	pub major: u16,
	pub minor: u16,
	pub patch: u16,
}

impl SafeVersion {
	pub const V1_3_0: SafeVersion = SafeVersion::new(1, 3, 0);

	pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
		Self {
			major,
			minor,
			patch,
		}
	}

	/// Safe contracts bind the EIP-712 domain to the chain id from v1.3.0.
	pub fn domain_has_chain_id(&self) -> bool {
		*self >= Self::V1_3_0
	}
}

impl fmt::Display for SafeVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
	}
}

impl FromStr for SafeVersion {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		// Build metadata such as "+L2" does not change hashing.
		let core = s.trim().split('+').next().unwrap_or_default();
		let parts = core
			.split('.')
			.map(|p| p.parse::<u16>())
			.collect::<Result<Vec<_>, _>>()
			.map_err(|e| format!("Invalid Safe version '{}': {}", s, e))?;

		match parts.as_slice() {
			[major, minor, patch] => Ok(Self::new(*major, *minor, *patch)),
			[major, minor] => Ok(Self::new(*major, *minor, 0)),
			_ => Err(format!("Invalid Safe version '{}'", s)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_versions() {
		assert_eq!("1.3.0".parse::<SafeVersion>().unwrap(), SafeVersion::V1_3_0);
		assert_eq!(
			"1.4.1+L2".parse::<SafeVersion>().unwrap(),
			SafeVersion::new(1, 4, 1)
		);
		assert_eq!("1.1".parse::<SafeVersion>().unwrap(), SafeVersion::new(1, 1, 0));
		assert!("v1.3.0".parse::<SafeVersion>().is_err());
		assert!("".parse::<SafeVersion>().is_err());
	}

	#[test]
	fn test_domain_chain_binding() {
		assert!(!SafeVersion::new(1, 2, 0).domain_has_chain_id());
		assert!(SafeVersion::new(1, 3, 0).domain_has_chain_id());
		assert!(SafeVersion::new(1, 4, 1).domain_has_chain_id());
	}
}
