//! Local ledgers built from the `[networks]` configuration.
//!
//! Every configured chain gets its tokens with their genesis balances, the
//! configured proof verifier and an escrow factory with its fee table.

use alloy_primitives::{Address, U256};
use intent_config::Config;
use intent_escrow::{Chain, ChainRegistry, EscrowError, EscrowFactory, FactoryDeployment, TokenInfo};
use intent_types::{current_timestamp, format_token_amount};
use intent_verifier::{ProofVerifierInterface, VerifierError, VerifierService};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevnetError {
	#[error("Network {0} needs a factory_owner to run locally")]
	MissingOwner(u64),
	#[error("Unknown verifier implementation '{0}'")]
	UnknownVerifier(String),
	#[error(transparent)]
	Verifier(#[from] VerifierError),
	#[error("Network {chain_id}: {source}")]
	Ledger {
		chain_id: u64,
		#[source]
		source: EscrowError,
	},
}

/// Builds the verifier named by `[verifier] primary`.
fn build_verifier(config: &Config) -> Result<Arc<dyn ProofVerifierInterface>, DevnetError> {
	let primary = &config.verifier.primary;
	let factory = intent_verifier::get_all_implementations()
		.into_iter()
		.find(|(name, _)| name == primary)
		.map(|(_, factory)| factory)
		.ok_or_else(|| DevnetError::UnknownVerifier(primary.clone()))?;
	let settings = config
		.verifier
		.implementations
		.get(primary)
		.ok_or_else(|| DevnetError::UnknownVerifier(primary.clone()))?;

	let implementation = factory(settings)?;
	tracing::info!(component = "verifier", implementation = %primary, "Loaded");
	Ok(Arc::new(VerifierService::new(primary.clone(), implementation)))
}

/// Starts one chain per configured network.
pub async fn launch(config: &Config) -> Result<ChainRegistry, DevnetError> {
	let verifier = build_verifier(config)?;
	let mut chains = ChainRegistry::new();

	let mut chain_ids: Vec<u64> = config.networks.keys().copied().collect();
	chain_ids.sort_unstable();
	for chain_id in chain_ids {
		let network = &config.networks[&chain_id];
		let at_chain = |source: EscrowError| DevnetError::Ledger { chain_id, source };
		let owner = network
			.factory_owner
			.ok_or(DevnetError::MissingOwner(chain_id))?;

		let genesis = network.genesis_timestamp.unwrap_or_else(current_timestamp);
		let chain = Arc::new(Chain::new(chain_id, genesis));

		for token in &network.tokens {
			let info = TokenInfo {
				name: token.name.clone(),
				symbol: token.symbol.clone(),
				decimals: token.decimals,
			};
			chain.deploy_token(token.address, info).await.map_err(at_chain)?;
			for balance in &token.balances {
				chain
					.mint(token.address, balance.account, balance.amount)
					.await
					.map_err(at_chain)?;
			}
			let supply = chain.total_supply(&token.address).await.map_err(at_chain)?;
			tracing::debug!(
				chain_id,
				token = %token.symbol,
				supply = %format_token_amount(supply, token.decimals),
				"Token deployed"
			);
		}

		chain
			.deploy_verifier(network.verifier_address, verifier.clone())
			.await
			.map_err(at_chain)?;

		let deployment = FactoryDeployment::new(owner, network.verifier_address)
			.with_layout(config.protocol.bridge_layout)
			.with_withdraw_grace(config.protocol.withdraw_grace_seconds);
		let factory = EscrowFactory::deploy(chain.clone(), network.factory_address, deployment)
			.await
			.map_err(at_chain)?;
		for token in &network.tokens {
			if let Some(fee) = token.fee_numerator {
				factory
					.set_fee_info(owner, token.address, U256::from(fee))
					.await
					.map_err(at_chain)?;
			}
		}

		tracing::info!(
			chain_id,
			genesis,
			tokens = network.tokens.len(),
			factory = %network.factory_address,
			"Chain started"
		);
		chains.insert(chain);
	}
	Ok(chains)
}

/// Logs the balance of every configured token for `accounts` and every
/// account with a genesis balance.
pub async fn log_balances(config: &Config, chains: &ChainRegistry, accounts: &[Address]) {
	let mut chain_ids: Vec<u64> = config.networks.keys().copied().collect();
	chain_ids.sort_unstable();
	for chain_id in chain_ids {
		let Ok(chain) = chains.get(chain_id) else {
			continue;
		};
		for token in &config.networks[&chain_id].tokens {
			let mut holders: Vec<Address> = token.balances.iter().map(|b| b.account).collect();
			holders.extend(accounts.iter().copied());
			holders.dedup();
			for account in holders {
				match chain.balance_of(&token.address, &account).await {
					Ok(balance) => tracing::info!(
						chain_id,
						token = %token.symbol,
						account = %account,
						balance = %format_token_amount(balance, token.decimals),
						"Balance"
					),
					Err(e) => tracing::warn!(chain_id, token = %token.symbol, error = %e, "Balance unavailable"),
				}
			}
		}
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use intent_escrow::CodeKind;
	use std::str::FromStr;

	pub(crate) const CONFIG: &str = r#"
		[filler]
		id = "devnet-filler"
		salt = "0x179f64607e1f89c65e6ac79f1a223e67e328c5634ec5dfb2df37efd965813ce8"
		retry_delay_ms = 10
		proof_poll_interval_ms = 10

		[networks.1]
		factory_address = "0xfafafafafafafafafafafafafafafafafafafafa"
		factory_owner = "0x0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f"
		verifier_address = "0xbebebebebebebebebebebebebebebebebebebebe"
		genesis_timestamp = 1700000000

		[[networks.1.tokens]]
		address = "0x1111111111111111111111111111111111111111"
		name = "Mock USDT"
		symbol = "USDT"
		decimals = 18
		balances = [
			{ account = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8", amount = "1000000000000000000000" },
		]

		[networks.2]
		factory_address = "0xfafafafafafafafafafafafafafafafafafafafa"
		factory_owner = "0x0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f"
		verifier_address = "0xbebebebebebebebebebebebebebebebebebebebe"
		genesis_timestamp = 1700000000

		[[networks.2.tokens]]
		address = "0x2222222222222222222222222222222222222222"
		name = "Mock USDT"
		symbol = "USDT"
		decimals = 18
		fee_numerator = 1
		balances = [
			{ account = "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc", amount = "1000000000000000000000" },
		]

		[storage]
		primary = "memory"
		[storage.implementations.memory]

		[account]
		primary = "local"
		[account.implementations.local]
		private_key = "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a"

		[verifier]
		primary = "attestation"
		[verifier.implementations.attestation]
		program_vkeys = ["0x00000000000000000000000000000000000000000000000000000000000000aa"]
		attesters = ["0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"]

		[proof]
		primary = "attestation"
		[proof.implementations.attestation]
		attester_private_key = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
		program_vkey = "0x00000000000000000000000000000000000000000000000000000000000000aa"

		[demo]
		source_chain_id = 1
		destination_chain_id = 2
		source_token = "0x1111111111111111111111111111111111111111"
		destination_token = "0x2222222222222222222222222222222222222222"
		amount = "0x56bc75e2d63100000"
		beneficiary = "0x3333333333333333333333333333333333333333"
		[demo.user]
		private_key = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
	"#;

	pub(crate) fn config() -> Config {
		Config::from_str(CONFIG).unwrap()
	}

	#[tokio::test]
	async fn test_launch_deploys_every_network() {
		let config = config();
		let chains = launch(&config).await.unwrap();
		assert_eq!(chains.chain_ids().len(), 2);

		let destination = chains.get(2).unwrap();
		let factory = EscrowFactory::at(destination.clone(), Address::repeat_byte(0xfa))
			.await
			.unwrap();
		let (fee, _) = factory.get_fee_info(&Address::repeat_byte(0x22)).await.unwrap();
		assert_eq!(fee, U256::from(1u64));
		assert_eq!(
			destination.code_at(&Address::repeat_byte(0xbe)).await,
			Some(CodeKind::Verifier)
		);
		assert_eq!(destination.now().await, 1_700_000_000);

		assert_eq!(
			chains
				.get(1)
				.unwrap()
				.total_supply(&Address::repeat_byte(0x11))
				.await
				.unwrap(),
			U256::from(10u128.pow(21))
		);

		let user: Address = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".parse().unwrap();
		assert_eq!(
			chains
				.get(1)
				.unwrap()
				.balance_of(&Address::repeat_byte(0x11), &user)
				.await
				.unwrap(),
			U256::from(10u128.pow(21))
		);
	}

	#[tokio::test]
	async fn test_network_without_owner_rejected() {
		let mut config = config();
		if let Some(network) = config.networks.get_mut(&2) {
			network.factory_owner = None;
		}
		assert!(matches!(
			launch(&config).await,
			Err(DevnetError::MissingOwner(2))
		));
	}

	#[tokio::test]
	async fn test_unknown_verifier_rejected() {
		let mut config = config();
		config.verifier.primary = "zk".into();
		assert!(matches!(
			launch(&config).await,
			Err(DevnetError::UnknownVerifier(name)) if name == "zk"
		));
	}
}
