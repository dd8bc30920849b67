//! Programmatic configurations for tests and local tooling.

use crate::{
	AccountConfig, Config, FillerConfig, ProofConfig, ProtocolConfig, StorageConfig,
	VerifierConfig,
};
use alloy_primitives::B256;
use intent_types::{BridgeLayout, NetworksConfig};
use std::collections::HashMap;

/// Fluent builder for [`Config`] with fast retry and proof timings.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	filler_id: String,
	salt: B256,
	max_attempts: u32,
	retry_delay_ms: u64,
	proof_poll_interval_ms: u64,
	proof_timeout_seconds: u64,
	max_concurrent: usize,
	protocol: ProtocolConfig,
	networks: NetworksConfig,
	storage: (String, toml::Value),
	account: (String, toml::Value),
	verifier: (String, toml::Value),
	proof: (String, toml::Value),
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			filler_id: "test-filler".to_string(),
			salt: B256::ZERO,
			max_attempts: 3,
			retry_delay_ms: 10,
			proof_poll_interval_ms: 10,
			proof_timeout_seconds: 5,
			max_concurrent: 4,
			protocol: ProtocolConfig::default(),
			networks: HashMap::new(),
			storage: ("memory".to_string(), empty_table()),
			account: ("local".to_string(), empty_table()),
			verifier: ("mock".to_string(), empty_table()),
			proof: ("attestation".to_string(), empty_table()),
		}
	}

	pub fn filler_id(mut self, id: impl Into<String>) -> Self {
		self.filler_id = id.into();
		self
	}

	pub fn salt(mut self, salt: B256) -> Self {
		self.salt = salt;
		self
	}

	pub fn max_attempts(mut self, attempts: u32) -> Self {
		self.max_attempts = attempts;
		self
	}

	pub fn proof_timeout_seconds(mut self, seconds: u64) -> Self {
		self.proof_timeout_seconds = seconds;
		self
	}

	pub fn bridge_layout(mut self, layout: BridgeLayout) -> Self {
		self.protocol.bridge_layout = layout;
		self
	}

	pub fn withdraw_grace_seconds(mut self, seconds: u64) -> Self {
		self.protocol.withdraw_grace_seconds = seconds;
		self
	}

	pub fn networks(mut self, networks: NetworksConfig) -> Self {
		self.networks = networks;
		self
	}

	pub fn storage(mut self, name: impl Into<String>, config: toml::Value) -> Self {
		self.storage = (name.into(), config);
		self
	}

	pub fn account(mut self, name: impl Into<String>, config: toml::Value) -> Self {
		self.account = (name.into(), config);
		self
	}

	pub fn verifier(mut self, name: impl Into<String>, config: toml::Value) -> Self {
		self.verifier = (name.into(), config);
		self
	}

	pub fn proof(mut self, name: impl Into<String>, config: toml::Value) -> Self {
		self.proof = (name.into(), config);
		self
	}

	/// Builds the configuration without running validation.
	pub fn build(self) -> Config {
		let section = |(primary, config): (String, toml::Value)| {
			let implementations = HashMap::from([(primary.clone(), config)]);
			(primary, implementations)
		};
		let (storage_primary, storage_impls) = section(self.storage);
		let (account_primary, account_impls) = section(self.account);
		let (verifier_primary, verifier_impls) = section(self.verifier);
		let (proof_primary, proof_impls) = section(self.proof);

		Config {
			filler: FillerConfig {
				id: self.filler_id,
				salt: self.salt,
				max_attempts: self.max_attempts,
				retry_delay_ms: self.retry_delay_ms,
				proof_poll_interval_ms: self.proof_poll_interval_ms,
				proof_timeout_seconds: self.proof_timeout_seconds,
				max_concurrent: self.max_concurrent,
			},
			protocol: self.protocol,
			networks: self.networks,
			storage: StorageConfig {
				primary: storage_primary,
				implementations: storage_impls,
			},
			account: AccountConfig {
				primary: account_primary,
				implementations: account_impls,
			},
			verifier: VerifierConfig {
				primary: verifier_primary,
				implementations: verifier_impls,
			},
			proof: ProofConfig {
				primary: proof_primary,
				implementations: proof_impls,
			},
			demo: None,
		}
	}
}
