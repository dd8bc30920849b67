//! Storage namespaces used by the filler.

use std::str::FromStr;

/// Namespaces under which records are stored as `<namespace>:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Fulfillment progress records, keyed by source escrow address.
	Fulfillments,
	/// Raw intake payloads, keyed by source escrow address.
	Intakes,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Fulfillments => "fulfillments",
			StorageKey::Intakes => "intakes",
		}
	}

	/// Full key for `id` in this namespace.
	pub fn key(&self, id: &str) -> String {
		format!("{}:{}", self.as_str(), id)
	}

	/// Prefix shared by every key in this namespace.
	pub fn prefix(&self) -> String {
		format!("{}:", self.as_str())
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Fulfillments, Self::Intakes].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"fulfillments" => Ok(Self::Fulfillments),
			"intakes" => Ok(Self::Intakes),
			_ => Err(()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_key_layout() {
		assert_eq!(StorageKey::Fulfillments.key("0xabc"), "fulfillments:0xabc");
		assert!(StorageKey::Intakes.key("0xabc").starts_with(&StorageKey::Intakes.prefix()));
	}

	#[test]
	fn test_names_parse_back() {
		for key in StorageKey::all() {
			assert_eq!(key.as_str().parse::<StorageKey>(), Ok(key));
		}
		assert!("orders".parse::<StorageKey>().is_err());
	}
}
