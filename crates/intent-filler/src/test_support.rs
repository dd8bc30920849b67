//! Two-chain devnet shared by the filler tests.

use crate::builder::{FillerBuilder, FillerFactories};
use crate::handlers::intake::{deployable_order, expected_order_id};
use crate::FillerEngine;
use alloy_primitives::{b256, Address, Bytes, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use intent_config::builders::config::ConfigBuilder;
use intent_config::Config;
use intent_escrow::{intent_address, Chain, ChainRegistry, EscrowFactory, FactoryDeployment, TokenInfo};
use intent_storage::StorageService;
use intent_types::{
	current_timestamp, encode_bridge_data, order_signing_hash, permit_signing_hash,
	split_signature, with_intent_address, BridgeLayout, BridgeTransfer, Fulfillment,
	FulfillmentStatus, IntakePayload, NetworkConfig, NetworksConfig, Order, Permit, TokenConfig,
	ORDER_DATA_TYPE,
};
use intent_verifier::implementations::attestation::AttestationVerifier;
use std::collections::HashMap;
use std::sync::Arc;

pub const USER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const FILLER_KEY: &str = "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";
pub const ATTESTER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const STRANGER_KEY: &str = "7c852118294e51e653712a81e05800f419141751be58f605c371e15141b007a6";
const EXTRA_USER_KEYS: [&str; 4] = [
	"47e179ec197488593b187f80a00eb0da91f1b9d0b13f8733639f19c30a34926a",
	"8b3a350cf5c34c9194ca85829a2df0ec3153be0318b5e2d3348e872092edffba",
	"92db14e403b83dfe3df233f83dfa3a0d7096f21ca9b0d6d6b8d88b2b4ec1564e",
	"4bbbf85ce3377467afe5d46f804f221813b2bb87f24d81f60f1fcdbf7cbf4356",
];

pub const PROGRAM_VKEY: &str = "0x00000000000000000000000000000000000000000000000000000000000000aa";
pub const SALT: B256 = b256!("179f64607e1f89c65e6ac79f1a223e67e328c5634ec5dfb2df37efd965813ce8");

const SOURCE_CHAIN: u64 = 1;
const DESTINATION_CHAIN: u64 = 2;
const GENESIS: u64 = 1_700_000_000;
const OPEN_DEADLINE: u32 = 1_700_000_300;
const FILL_DEADLINE: u32 = 1_700_000_600;
const DESTINATION_FEE: u64 = 1;

pub fn e18(n: u128) -> U256 {
	U256::from(n * 10u128.pow(18))
}

fn key(hex: &str) -> PrivateKeySigner {
	hex.parse().unwrap()
}

pub fn user_address() -> Address {
	key(USER_KEY).address()
}

pub fn filler_address() -> Address {
	key(FILLER_KEY).address()
}

pub fn attester_address() -> Address {
	key(ATTESTER_KEY).address()
}

pub fn beneficiary() -> Address {
	Address::repeat_byte(0x33)
}

pub fn source_token() -> Address {
	Address::repeat_byte(0x11)
}

pub fn destination_token() -> Address {
	Address::repeat_byte(0x22)
}

fn factory_address() -> Address {
	Address::repeat_byte(0xfa)
}

fn factory_owner() -> Address {
	Address::repeat_byte(0x0f)
}

fn verifier_address() -> Address {
	Address::repeat_byte(0xbe)
}

fn usdt() -> TokenInfo {
	TokenInfo {
		name: "Mock USDT".into(),
		symbol: "USDT".into(),
		decimals: 18,
	}
}

fn order_for(user: Address, destination_chain_id: u64) -> Order {
	Order {
		intentAddress: Address::ZERO,
		user,
		nonce: U256::from(10001u64),
		sourceChainId: U256::from(SOURCE_CHAIN),
		openDeadline: OPEN_DEADLINE,
		fillDeadline: FILL_DEADLINE,
		orderDataType: ORDER_DATA_TYPE,
		orderData: encode_bridge_data(&BridgeTransfer {
			filler: Address::ZERO,
			source_token: source_token(),
			amount: e18(100),
			destination_chain_id: U256::from(destination_chain_id),
			destination_token: destination_token(),
			receive_amount: None,
			beneficiary: beneficiary(),
		}),
	}
}

/// Received fulfillment that never touched a ledger.
pub fn sample_fulfillment() -> Fulfillment {
	let order = order_for(user_address(), DESTINATION_CHAIN);
	let escrow = intent_address(factory_address(), &order, SALT);
	let now = current_timestamp();
	Fulfillment {
		id: Fulfillment::id_for(&escrow),
		status: FulfillmentStatus::Received,
		created_at: now,
		updated_at: now,
		order: order.clone(),
		order_signature: Bytes::from(vec![0u8; 65]),
		permit: Permit {
			owner: order.user,
			spender: escrow,
			value: e18(100),
			nonce: U256::ZERO,
			deadline: U256::from(FILL_DEADLINE),
		},
		permit_signature: Bytes::from(vec![0u8; 65]),
		source_chain_id: SOURCE_CHAIN,
		destination_chain_id: DESTINATION_CHAIN,
		source_escrow: escrow,
		destination_escrow: escrow,
		order_id: expected_order_id(&order, escrow, filler_address(), BridgeLayout::Proportional)
			.unwrap(),
		proof: None,
		last_error: None,
	}
}

/// Chains 1 and 2 with a token, an attestation verifier and a factory each.
///
/// Users hold 1000 tokens on chain 1, the filler holds 1000 on chain 2 and
/// chain 2 charges a one basis point fee.
pub struct Devnet {
	pub chains: ChainRegistry,
	users: Vec<PrivateKeySigner>,
	source: EscrowFactory,
	destination: EscrowFactory,
}

impl Devnet {
	pub async fn new() -> Self {
		let users: Vec<PrivateKeySigner> = std::iter::once(USER_KEY)
			.chain(EXTRA_USER_KEYS)
			.map(key)
			.collect();
		let verifier = Arc::new(AttestationVerifier::new(
			[PROGRAM_VKEY.parse::<B256>().unwrap()],
			[attester_address()],
		));
		let deployment = FactoryDeployment::new(factory_owner(), verifier_address());

		let mut chains = ChainRegistry::new();
		let mut factories = Vec::new();
		for (chain_id, token) in [
			(SOURCE_CHAIN, source_token()),
			(DESTINATION_CHAIN, destination_token()),
		] {
			let chain = Arc::new(Chain::new(chain_id, GENESIS));
			chain.deploy_token(token, usdt()).await.unwrap();
			chain
				.deploy_verifier(verifier_address(), verifier.clone())
				.await
				.unwrap();
			factories.push(
				EscrowFactory::deploy(chain.clone(), factory_address(), deployment.clone())
					.await
					.unwrap(),
			);
			chains.insert(chain);
		}

		let destination = factories.pop().unwrap();
		let source = factories.pop().unwrap();
		let net = Self {
			chains,
			users,
			source,
			destination,
		};
		for user in &net.users {
			net.source_chain()
				.mint(source_token(), user.address(), e18(1_000))
				.await
				.unwrap();
		}
		net.destination_chain()
			.mint(destination_token(), filler_address(), e18(1_000))
			.await
			.unwrap();
		net.destination
			.set_fee_info(factory_owner(), destination_token(), U256::from(DESTINATION_FEE))
			.await
			.unwrap();
		net
	}

	pub fn source_chain(&self) -> Arc<Chain> {
		self.chains.get(SOURCE_CHAIN).unwrap()
	}

	pub fn destination_chain(&self) -> Arc<Chain> {
		self.chains.get(DESTINATION_CHAIN).unwrap()
	}

	pub fn source_factory(&self) -> &EscrowFactory {
		&self.source
	}

	pub fn destination_factory(&self) -> &EscrowFactory {
		&self.destination
	}

	pub fn networks(&self) -> NetworksConfig {
		let network = |token: Address, fee_numerator: Option<u64>| NetworkConfig {
			factory_address: factory_address(),
			factory_owner: Some(factory_owner()),
			verifier_address: verifier_address(),
			genesis_timestamp: Some(GENESIS),
			tokens: vec![TokenConfig {
				address: token,
				name: "Mock USDT".into(),
				symbol: "USDT".into(),
				decimals: 18,
				fee_numerator,
				balances: Vec::new(),
			}],
		};
		HashMap::from([
			(SOURCE_CHAIN, network(source_token(), None)),
			(DESTINATION_CHAIN, network(destination_token(), Some(DESTINATION_FEE))),
		])
	}

	pub fn config(&self) -> Config {
		let account = toml::from_str(&format!("private_key = \"{}\"", FILLER_KEY)).unwrap();
		let proof = toml::from_str(&format!(
			"attester_private_key = \"{}\"\nprogram_vkey = \"{}\"",
			ATTESTER_KEY, PROGRAM_VKEY
		))
		.unwrap();
		ConfigBuilder::new()
			.salt(SALT)
			.networks(self.networks())
			.account("local", account)
			.proof("attestation", proof)
			.build()
	}

	pub async fn engine(&self) -> FillerEngine {
		self.engine_with(self.config()).await
	}

	pub async fn engine_with(&self, config: Config) -> FillerEngine {
		FillerBuilder::new(config)
			.build(FillerFactories::all(), self.chains.clone())
			.await
			.unwrap()
	}

	/// Engine over the records of a previous engine, as after a restart.
	pub async fn engine_with_storage(&self, storage: Arc<StorageService>) -> FillerEngine {
		FillerBuilder::new(self.config())
			.build_with_storage(FillerFactories::all(), self.chains.clone(), storage)
			.await
			.unwrap()
	}

	pub fn users(&self) -> &[PrivateKeySigner] {
		&self.users
	}

	/// The default order: 100 tokens from chain 1 to chain 2.
	pub fn order(&self) -> Order {
		self.order_from(&self.users[0])
	}

	/// The default order with `intentAddress` already set to its source
	/// escrow, the way wallets that precompute the escrow sign it.
	pub fn bound_order(&self) -> Order {
		let order = self.order();
		let escrow = intent_address(factory_address(), &order, SALT);
		with_intent_address(&order, escrow)
	}

	pub fn order_from(&self, user: &PrivateKeySigner) -> Order {
		order_for(user.address(), DESTINATION_CHAIN)
	}

	pub fn order_to(&self, destination_chain_id: u64) -> Order {
		order_for(user_address(), destination_chain_id)
	}

	fn signer_of(&self, user: &Address) -> &PrivateKeySigner {
		self.users
			.iter()
			.find(|signer| &signer.address() == user)
			.unwrap()
	}

	async fn permit(&self, order: &Order, value: U256) -> Permit {
		let chain = self.source_chain();
		Permit {
			owner: order.user,
			spender: intent_address(factory_address(), &deployable_order(order), SALT),
			value,
			nonce: chain.nonces(&source_token(), &order.user).await.unwrap(),
			deadline: U256::from(order.fillDeadline),
		}
	}

	async fn signed(&self, order: &Order, permit: Permit, signer: &PrivateKeySigner) -> IntakePayload {
		let domain = self.source_chain().token_domain(&source_token()).await.unwrap();
		let order_signature = signer
			.sign_hash_sync(&order_signing_hash(order, factory_address()))
			.unwrap();
		let permit_signature = signer
			.sign_hash_sync(&permit_signing_hash(&permit, &domain))
			.unwrap();
		IntakePayload::new(
			order,
			Bytes::from(order_signature.as_bytes().to_vec()),
			&permit,
			Bytes::from(permit_signature.as_bytes().to_vec()),
		)
	}

	/// Intake signed by the order's user.
	pub async fn intake(&self, order: &Order) -> IntakePayload {
		let permit = self.permit(order, e18(100)).await;
		self.signed(order, permit, self.signer_of(&order.user)).await
	}

	pub async fn intake_signed_by(&self, order: &Order, private_key: &str) -> IntakePayload {
		let permit = self.permit(order, e18(100)).await;
		self.signed(order, permit, &key(private_key)).await
	}

	pub async fn intake_with_permit_value(&self, order: &Order, value: u64) -> IntakePayload {
		let permit = self.permit(order, U256::from(value)).await;
		self.signed(order, permit, self.signer_of(&order.user)).await
	}

	/// The record intake would store for the default order.
	pub async fn fulfillment(&self) -> Fulfillment {
		let order = self.order();
		let decoded = self.intake(&order).await.decode().unwrap();
		let escrow = intent_address(factory_address(), &order, SALT);
		let now = current_timestamp();
		Fulfillment {
			id: Fulfillment::id_for(&escrow),
			status: FulfillmentStatus::Received,
			created_at: now,
			updated_at: now,
			order_id: expected_order_id(&order, escrow, filler_address(), BridgeLayout::Proportional)
				.unwrap(),
			order,
			order_signature: decoded.order_signature,
			permit: decoded.permit,
			permit_signature: decoded.permit_signature,
			source_chain_id: SOURCE_CHAIN,
			destination_chain_id: DESTINATION_CHAIN,
			source_escrow: escrow,
			destination_escrow: escrow,
			proof: None,
			last_error: None,
		}
	}

	/// Does by hand what the escrow handler does for `fulfillment`.
	pub async fn deploy_and_fill(&self, fulfillment: &Fulfillment) {
		let filler = filler_address();
		let source = self
			.source
			.create_intent(filler, &fulfillment.order, SALT)
			.await
			.unwrap();
		let (v, r, s) = split_signature(&fulfillment.permit_signature).unwrap();
		source
			.submit_permit(fulfillment.order_id, v, r, s)
			.await
			.unwrap();

		let destination = self
			.destination
			.create_intent(filler, &fulfillment.order, SALT)
			.await
			.unwrap();
		self.destination_chain()
			.approve(destination_token(), filler, destination.address(), e18(100))
			.await
			.unwrap();
		destination
			.fill(filler, fulfillment.order_id, &[], &[])
			.await
			.unwrap();
	}

	pub async fn destination_balance(&self, account: &Address) -> U256 {
		self.destination_chain()
			.balance_of(&destination_token(), account)
			.await
			.unwrap()
	}

	/// Moves the filler's whole destination balance away.
	pub async fn drain_filler(&self) {
		let balance = self.destination_balance(&filler_address()).await;
		self.destination_chain()
			.transfer(destination_token(), filler_address(), factory_owner(), balance)
			.await
			.unwrap();
	}
}
