//! Configuration module for the intent filler.
//!
//! Configuration is TOML. `${VAR}` and `${VAR:-default}` are substituted from
//! the environment before parsing, and the parsed structure is validated as a
//! whole so that misconfigured deployments fail at startup.
//!
//! Files may include other files with `include = ["networks.toml"]`. Every
//! top-level section must come from exactly one file.

mod loader;

#[cfg(feature = "testing")]
pub mod builders {
	pub mod config;
}

use alloy_primitives::{Address, B256, U256};
use intent_types::{networks::deserialize_networks, BridgeLayout, NetworksConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep only the message; the default rendering echoes the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level filler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub filler: FillerConfig,
	#[serde(default)]
	pub protocol: ProtocolConfig,
	#[serde(deserialize_with = "deserialize_networks")]
	pub networks: NetworksConfig,
	pub storage: StorageConfig,
	pub account: AccountConfig,
	/// Proof verifier deployed at each network's `verifier_address`.
	pub verifier: VerifierConfig,
	/// Source of fill proofs.
	pub proof: ProofConfig,
	/// Sample order signed at startup on local networks.
	pub demo: Option<DemoConfig>,
}

/// Settings of this filler instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FillerConfig {
	pub id: String,
	/// CREATE2 salt used for every escrow this filler deploys.
	pub salt: B256,
	/// Attempts per step before a fulfillment is marked failed.
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_retry_delay_ms")]
	pub retry_delay_ms: u64,
	#[serde(default = "default_proof_poll_interval_ms")]
	pub proof_poll_interval_ms: u64,
	#[serde(default = "default_proof_timeout_seconds")]
	pub proof_timeout_seconds: u64,
	/// Upper bound on fulfillments advanced at the same time.
	#[serde(default = "default_max_concurrent")]
	pub max_concurrent: usize,
}

fn default_max_attempts() -> u32 {
	3
}

fn default_retry_delay_ms() -> u64 {
	500
}

fn default_proof_poll_interval_ms() -> u64 {
	200
}

/// Returns the default proof wait of 30 seconds.
fn default_proof_timeout_seconds() -> u64 {
	30
}

fn default_max_concurrent() -> usize {
	10
}

/// Protocol parameters shared by every factory deployment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
	#[serde(default)]
	pub bridge_layout: BridgeLayout,
	/// Seconds after `fillDeadline` before a user may withdraw.
	#[serde(default = "default_withdraw_grace_seconds")]
	pub withdraw_grace_seconds: u64,
}

impl Default for ProtocolConfig {
	fn default() -> Self {
		Self {
			bridge_layout: BridgeLayout::default(),
			withdraw_grace_seconds: default_withdraw_grace_seconds(),
		}
	}
}

/// Returns the default withdraw grace period.
///
/// Five minutes past the fill deadline gives a proof that is already in
/// flight time to land before refunds open.
fn default_withdraw_grace_seconds() -> u64 {
	300
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerifierConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProofConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Order a local user signs and hands to the filler at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DemoConfig {
	/// Account implementation config of the signing user.
	pub user: toml::Value,
	pub source_chain_id: u64,
	pub destination_chain_id: u64,
	pub source_token: Address,
	pub destination_token: Address,
	pub amount: U256,
	/// Explicit destination amount, for the explicit-receive layout.
	#[serde(default)]
	pub receive_amount: Option<U256>,
	pub beneficiary: Address,
	#[serde(default = "default_demo_nonce")]
	pub nonce: U256,
	/// Seconds from the source chain's clock until the open deadline.
	#[serde(default = "default_open_window_seconds")]
	pub open_window_seconds: u32,
	/// Seconds from the source chain's clock until the fill deadline.
	#[serde(default = "default_fill_window_seconds")]
	pub fill_window_seconds: u32,
}

fn default_demo_nonce() -> U256 {
	U256::from(1u64)
}

fn default_open_window_seconds() -> u32 {
	300
}

fn default_fill_window_seconds() -> u32 {
	600
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME`, or with `default` for
/// `${VAR_NAME:-default}` when the variable is unset. Inputs are limited to
/// 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

fn check_implementations(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

impl Config {
	/// Loads a configuration file, following `include` directives relative
	/// to the file's directory.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Network settings for `chain_id`.
	pub fn network(&self, chain_id: u64) -> Option<&intent_types::NetworkConfig> {
		self.networks.get(&chain_id)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.filler.id.is_empty() {
			return Err(ConfigError::Validation("Filler ID cannot be empty".into()));
		}
		if self.filler.max_attempts == 0 {
			return Err(ConfigError::Validation(
				"max_attempts must be at least 1".into(),
			));
		}
		if self.filler.max_concurrent == 0 {
			return Err(ConfigError::Validation(
				"max_concurrent must be at least 1".into(),
			));
		}
		if self.filler.proof_poll_interval_ms == 0 {
			return Err(ConfigError::Validation(
				"proof_poll_interval_ms must be greater than 0".into(),
			));
		}

		if self.networks.len() < 2 {
			return Err(ConfigError::Validation(
				"At least 2 different networks must be configured".into(),
			));
		}
		for (chain_id, network) in &self.networks {
			if network.factory_address == Address::ZERO {
				return Err(ConfigError::Validation(format!(
					"Network {} must have a non-zero factory_address",
					chain_id
				)));
			}
			if network.verifier_address == Address::ZERO {
				return Err(ConfigError::Validation(format!(
					"Network {} must have a non-zero verifier_address",
					chain_id
				)));
			}
			if network.tokens.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Network {} must have at least 1 token configured",
					chain_id
				)));
			}
			for token in &network.tokens {
				if let Some(fee) = token.fee_numerator {
					if fee > intent_types::FEE_MULTIPLIER {
						return Err(ConfigError::Validation(format!(
							"Token {} on network {} has fee_numerator {} above {}",
							token.address,
							chain_id,
							fee,
							intent_types::FEE_MULTIPLIER
						)));
					}
				}
			}
		}

		check_implementations("storage", &self.storage.primary, &self.storage.implementations)?;
		check_implementations("account", &self.account.primary, &self.account.implementations)?;
		check_implementations(
			"verifier",
			&self.verifier.primary,
			&self.verifier.implementations,
		)?;
		check_implementations("proof", &self.proof.primary, &self.proof.implementations)?;

		if let Some(demo) = &self.demo {
			self.validate_demo(demo)?;
		}

		Ok(())
	}

	fn validate_demo(&self, demo: &DemoConfig) -> Result<(), ConfigError> {
		if demo.source_chain_id == demo.destination_chain_id {
			return Err(ConfigError::Validation(
				"Demo source and destination chains must differ".into(),
			));
		}
		for (chain_id, token) in [
			(demo.source_chain_id, demo.source_token),
			(demo.destination_chain_id, demo.destination_token),
		] {
			let network = self.networks.get(&chain_id).ok_or_else(|| {
				ConfigError::Validation(format!(
					"Demo references network {} which doesn't exist in networks config",
					chain_id
				))
			})?;
			if network.token(&token).is_none() {
				return Err(ConfigError::Validation(format!(
					"Demo token {} is not configured on network {}",
					token, chain_id
				)));
			}
		}
		if demo.open_window_seconds > demo.fill_window_seconds {
			return Err(ConfigError::Validation(
				"Demo open window cannot exceed the fill window".into(),
			));
		}
		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
