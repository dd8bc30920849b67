//! Per-chain deployment settings.
//!
//! Each configured chain hosts one escrow factory, one default proof
//! verifier and a set of permit-capable tokens. Chain ids are table keys in
//! TOML and are parsed into `u64` on load.

use crate::signature::TokenDomain;
use crate::Address;
use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Opening balance minted to an account when a local ledger starts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GenesisBalance {
	pub account: Address,
	/// Base units, given as a decimal or `0x` hex string.
	#[serde(deserialize_with = "deserialize_u256")]
	pub amount: U256,
}

/// A permit-capable token deployed on one network.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenConfig {
	pub address: Address,
	/// Token name, which is also the name of its EIP-712 domain.
	pub name: String,
	pub symbol: String,
	pub decimals: u8,
	/// Fee numerator the factory owner registers for this token at startup.
	#[serde(default)]
	pub fee_numerator: Option<u64>,
	#[serde(default)]
	pub balances: Vec<GenesisBalance>,
}

/// Settings for a single chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	pub factory_address: Address,
	/// Owner of the factory's fee table and verifier setting.
	#[serde(default)]
	pub factory_owner: Option<Address>,
	/// Address the default proof verifier is deployed at.
	pub verifier_address: Address,
	/// Ledger clock at startup. Wall-clock time when omitted.
	#[serde(default)]
	pub genesis_timestamp: Option<u64>,
	#[serde(default)]
	pub tokens: Vec<TokenConfig>,
}

impl NetworkConfig {
	pub fn token(&self, address: &Address) -> Option<&TokenConfig> {
		self.tokens.iter().find(|t| &t.address == address)
	}

	/// Permit domain of `token` on `chain_id`, if the token is configured.
	pub fn token_domain(&self, chain_id: u64, token: &Address) -> Option<TokenDomain> {
		self.token(token)
			.map(|t| TokenDomain::new(t.name.clone(), chain_id, t.address))
	}
}

/// Chain id to network settings.
pub type NetworksConfig = HashMap<u64, NetworkConfig>;

/// Deserializes `[networks.<chain_id>]` tables, whose keys are strings in TOML.
pub fn deserialize_networks<'de, D>(deserializer: D) -> Result<NetworksConfig, D::Error>
where
	D: Deserializer<'de>,
{
	let string_map: HashMap<String, NetworkConfig> = HashMap::deserialize(deserializer)?;
	string_map
		.into_iter()
		.map(|(key, value)| {
			key.parse::<u64>()
				.map(|chain_id| (chain_id, value))
				.map_err(|e| serde::de::Error::custom(format!("Invalid chain_id '{}': {}", key, e)))
		})
		.collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountRepr {
	Text(String),
	Integer(u64),
}

fn deserialize_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
	D: Deserializer<'de>,
{
	match AmountRepr::deserialize(deserializer)? {
		AmountRepr::Integer(n) => Ok(U256::from(n)),
		AmountRepr::Text(s) => U256::from_str(s.trim())
			.map_err(|e| serde::de::Error::custom(format!("Invalid amount '{}': {}", s, e))),
	}
}
