//! Assembles a [`FillerEngine`] from configuration.
//!
//! Every configured implementation is built through its registered
//! factory, and the section's `primary` entry is the one the engine uses.
//! Escrow factories are attached per configured network on the chains the
//! caller provides.

use crate::engine::FillerEngine;
use crate::proof::{self, ProofFactory, ProofService};
use crate::FillerError;
use intent_account::{AccountFactory, AccountService};
use intent_config::Config;
use intent_escrow::{ChainRegistry, EscrowFactory};
use intent_storage::{StorageFactory, StorageService};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

/// Factory functions by implementation name.
pub struct FillerFactories {
	pub storage_factories: HashMap<String, StorageFactory>,
	pub account_factories: HashMap<String, AccountFactory>,
	pub proof_factories: HashMap<String, ProofFactory>,
}

impl FillerFactories {
	/// Every implementation shipped with the workspace.
	pub fn all() -> Self {
		fn named<F>(list: Vec<(&'static str, F)>) -> HashMap<String, F> {
			list.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect()
		}
		Self {
			storage_factories: named(intent_storage::get_all_implementations()),
			account_factories: named(intent_account::get_all_implementations()),
			proof_factories: named(proof::get_all_implementations()),
		}
	}
}

/// Builds every configured implementation of one component and returns the
/// primary one.
fn load_primary<T, E: Display>(
	component: &str,
	primary: &str,
	configured: &HashMap<String, toml::Value>,
	factories: &HashMap<String, fn(&toml::Value) -> Result<T, E>>,
) -> Result<T, FillerError> {
	let mut loaded = HashMap::new();
	for (name, config) in configured {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(component, implementation = %name, error = %e, "Failed to create implementation");
				return Err(FillerError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	loaded.remove(primary).ok_or_else(|| {
		FillerError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

/// Assembles a [`FillerEngine`] from configuration.
///
/// Each component's `primary` implementation is loaded through the
/// factories in [`FillerFactories`]. The others listed in the configuration
/// are built too, so a broken entry fails the build even when unused.
pub struct FillerBuilder {
	config: Config,
}

impl FillerBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine on top of already running `chains`.
	pub async fn build(
		self,
		factories: FillerFactories,
		chains: ChainRegistry,
	) -> Result<FillerEngine, FillerError> {
		let config = self.config;

		let storage_backend = load_primary(
			"storage",
			&config.storage.primary,
			&config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));
		Self::engine(config, factories, chains, storage).await
	}

	/// Like [`build`](Self::build) but over an existing storage service.
	pub async fn build_with_storage(
		self,
		factories: FillerFactories,
		chains: ChainRegistry,
		storage: Arc<StorageService>,
	) -> Result<FillerEngine, FillerError> {
		Self::engine(self.config, factories, chains, storage).await
	}

	async fn engine(
		config: Config,
		factories: FillerFactories,
		chains: ChainRegistry,
		storage: Arc<StorageService>,
	) -> Result<FillerEngine, FillerError> {
		let account = AccountService::new(load_primary(
			"account",
			&config.account.primary,
			&config.account.implementations,
			&factories.account_factories,
		)?);
		let filler_address = account
			.get_address()
			.await
			.map_err(|e| FillerError::Config(format!("Filler account unavailable: {}", e)))?;

		let proofs = ProofService::new(load_primary(
			"proof",
			&config.proof.primary,
			&config.proof.implementations,
			&factories.proof_factories,
		)?);

		let mut escrow_factories = HashMap::new();
		for (chain_id, network) in &config.networks {
			let chain = chains
				.get(*chain_id)
				.map_err(|e| FillerError::Config(e.to_string()))?;
			let factory = EscrowFactory::at(chain, network.factory_address)
				.await
				.map_err(|e| FillerError::Config(format!("Chain {}: {}", chain_id, e)))?;
			tracing::info!(
				component = "escrow",
				chain_id = %chain_id,
				factory = %network.factory_address,
				"Loaded"
			);
			escrow_factories.insert(*chain_id, factory);
		}

		tracing::info!(filler = %filler_address, id = %config.filler.id, "Filler engine built");
		Ok(FillerEngine::new(
			config,
			storage,
			Arc::new(account),
			filler_address,
			chains,
			Arc::new(escrow_factories),
			Arc::new(proofs),
		))
	}
}
