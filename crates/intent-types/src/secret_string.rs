//! Key material wrapper.
//!
//! Private keys for the filler's signing accounts are loaded from
//! configuration. `SecretString` keeps them out of logs and zeroes the
//! buffer when dropped.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

const REDACTED: &str = "***REDACTED***";

/// String whose contents are redacted on display and zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
	pub fn new(value: String) -> Self {
		Self(Zeroizing::new(value))
	}

	/// Returns the raw secret. Callers must not log the result.
	pub fn expose_secret(&self) -> &str {
		&self.0
	}

	/// Runs `f` with the raw secret in scope.
	pub fn with_exposed<F, R>(&self, f: F) -> R
	where
		F: FnOnce(&str) -> R,
	{
		f(&self.0)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SecretString({})", REDACTED)
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Self::new(value.to_string())
	}
}

impl Serialize for SecretString {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(REDACTED)
	}
}

impl<'de> Deserialize<'de> for SecretString {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		String::deserialize(deserializer).map(SecretString::new)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_formatting_redacts_key() {
		let key = SecretString::from("0x59c6995e998f97a5");
		assert_eq!(format!("{}", key), REDACTED);
		assert!(!format!("{:?}", key).contains("59c6"));
	}

	#[test]
	fn test_serialization_redacts_key() {
		let key = SecretString::from("0x59c6995e998f97a5");
		assert_eq!(serde_json::to_string(&key).unwrap(), format!("\"{}\"", REDACTED));
	}

	#[test]
	fn test_deserialize_keeps_value() {
		let key: SecretString = serde_json::from_str("\"0xabc\"").unwrap();
		assert_eq!(key.expose_secret(), "0xabc");
		assert_eq!(key.with_exposed(|s| s.len()), 5);
	}
}
