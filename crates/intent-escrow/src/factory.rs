//! Deterministic escrow deployment and the shared protocol settings.
//!
//! The factory owns a versioned [`FactoryConfig`]: the fee table, the owner
//! and the default proof verifier. Escrows read a snapshot of it at the
//! moment an operation needs it.

use crate::chain::{Chain, ChainEvent, CodeKind};
use crate::escrow::{self, Escrow, EscrowState};
use crate::ledger::Ledger;
use crate::EscrowError;
use alloy_primitives::{b256, keccak256, Address, B256, U256};
use alloy_sol_types::SolValue;
use intent_types::{bridge_transfer, truncate_id, with_intent_address, BridgeLayout, Order, FEE_MULTIPLIER};
use std::collections::HashMap;
use std::sync::Arc;

/// Fee denominator.
pub const MULTIPLIER: U256 = U256::from_limbs([FEE_MULTIPLIER, 0, 0, 0]);

/// Identity of the escrow creation code, `keccak256("IntentEscrow.v1")`.
///
/// Factories with this code hash derive the same escrow address for the
/// same order and salt on every chain.
pub const ESCROW_CODE_HASH: B256 =
	b256!("c7aaf84733270b7667625592dc7175aa56f1bb9ab4860f5671d0423322ae25f1");

/// Seconds after `fillDeadline` before a user may withdraw.
pub const DEFAULT_WITHDRAW_GRACE_SECONDS: u64 = 300;

/// Address of the escrow `factory` deploys for `order` and `salt`.
///
/// `order.intentAddress` must be zero, otherwise the address matches no
/// real deployment.
pub fn intent_address(factory: Address, order: &Order, salt: B256) -> Address {
	let mut preimage = order.abi_encode();
	preimage.extend_from_slice(salt.as_slice());
	factory.create2(keccak256(preimage).0, ESCROW_CODE_HASH.0)
}

/// Owner-controlled settings, bumped to a new version on every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryConfig {
	pub version: u64,
	pub owner: Option<Address>,
	/// Fee numerators by destination token. Missing tokens pay no fee.
	pub fees: HashMap<Address, U256>,
	/// Default proof verifier for escrows without an override.
	pub verifier: Address,
}

impl FactoryConfig {
	/// `(fee numerator, MULTIPLIER)` for `token`.
	pub fn fee_info(&self, token: &Address) -> (U256, U256) {
		(self.fees.get(token).copied().unwrap_or_default(), MULTIPLIER)
	}

	fn only_owner(&self, caller: Address) -> Result<(), EscrowError> {
		match self.owner {
			Some(owner) if owner == caller => Ok(()),
			_ => Err(EscrowError::Unauthorized(caller)),
		}
	}
}

/// Deployment parameters fixed for a factory's lifetime.
#[derive(Debug, Clone)]
pub struct FactoryDeployment {
	pub owner: Address,
	pub verifier: Address,
	pub layout: BridgeLayout,
	pub withdraw_grace_seconds: u64,
}

impl FactoryDeployment {
	/// Proportional layout and the default withdraw grace.
	pub fn new(owner: Address, verifier: Address) -> Self {
		Self {
			owner,
			verifier,
			layout: BridgeLayout::default(),
			withdraw_grace_seconds: DEFAULT_WITHDRAW_GRACE_SECONDS,
		}
	}

	pub fn with_layout(mut self, layout: BridgeLayout) -> Self {
		self.layout = layout;
		self
	}

	/// Seconds after `fillDeadline` before users may withdraw.
	pub fn with_withdraw_grace(mut self, seconds: u64) -> Self {
		self.withdraw_grace_seconds = seconds;
		self
	}
}

#[derive(Debug, Clone)]
pub(crate) struct FactoryState {
	pub config: FactoryConfig,
	pub layout: BridgeLayout,
	pub withdraw_grace_seconds: u64,
}

impl FactoryState {
	pub fn write(&mut self, caller: Address) -> Result<&mut FactoryConfig, EscrowError> {
		self.config.only_owner(caller)?;
		self.config.version += 1;
		Ok(&mut self.config)
	}
}

pub(crate) fn deploy(
	ledger: &mut Ledger,
	address: Address,
	deployment: FactoryDeployment,
) -> Result<(), EscrowError> {
	if deployment.owner == Address::ZERO {
		return Err(EscrowError::InvalidOwner(Address::ZERO));
	}
	ledger.install(address, CodeKind::Factory)?;
	ledger.factories.insert(
		address,
		FactoryState {
			config: FactoryConfig {
				version: 0,
				owner: Some(deployment.owner),
				fees: HashMap::new(),
				verifier: deployment.verifier,
			},
			layout: deployment.layout,
			withdraw_grace_seconds: deployment.withdraw_grace_seconds,
		},
	);
	ledger.emit(
		address,
		ChainEvent::OwnershipTransferred {
			previous_owner: Address::ZERO,
			new_owner: deployment.owner,
		},
	);
	Ok(())
}

pub(crate) fn create_intent(
	ledger: &mut Ledger,
	factory: Address,
	caller: Address,
	order: &Order,
	salt: B256,
) -> Result<Address, EscrowError> {
	if order.intentAddress != Address::ZERO {
		return Err(EscrowError::IntentAddressSet(order.intentAddress));
	}
	let layout = ledger.factory(&factory)?.layout;
	let transfer = bridge_transfer(order, layout)?;

	let address = intent_address(factory, order, salt);
	ledger.install(address, CodeKind::Escrow)?;
	ledger.escrows.insert(
		address,
		EscrowState::new(factory, with_intent_address(order, address), transfer, salt),
	);
	escrow::initialize_filler(ledger, address, factory, caller)?;

	ledger.emit(
		factory,
		ChainEvent::IntentDeployed {
			intent_address: address,
			order: order.clone(),
		},
	);
	Ok(address)
}

/// Handle to a factory deployed on a chain.
#[derive(Clone)]
pub struct EscrowFactory {
	chain: Arc<Chain>,
	address: Address,
}

impl EscrowFactory {
	/// Installs a factory at `address` owned by `deployment.owner`.
	///
	/// Emits `OwnershipTransferred` from the zero address.
	pub async fn deploy(
		chain: Arc<Chain>,
		address: Address,
		deployment: FactoryDeployment,
	) -> Result<Self, EscrowError> {
		chain
			.transact(|ledger| deploy(ledger, address, deployment))
			.await?;
		tracing::info!(chain_id = chain.chain_id(), factory = %address, "Factory deployed");
		Ok(Self { chain, address })
	}

	/// Attaches to an existing factory.
	pub async fn at(chain: Arc<Chain>, address: Address) -> Result<Self, EscrowError> {
		match chain.code_at(&address).await {
			Some(CodeKind::Factory) => Ok(Self { chain, address }),
			_ => Err(EscrowError::NoCode(address)),
		}
	}

	pub fn address(&self) -> Address {
		self.address
	}

	pub fn chain(&self) -> &Arc<Chain> {
		&self.chain
	}

	/// Pure address derivation; see [`intent_address`].
	pub fn get_intent_address(&self, order: &Order, salt: B256) -> Address {
		intent_address(self.address, order, salt)
	}

	/// Deploys the escrow for `order`, binding `caller` as its filler.
	pub async fn create_intent(
		&self,
		caller: Address,
		order: &Order,
		salt: B256,
	) -> Result<Escrow, EscrowError> {
		let address = self
			.chain
			.transact(|ledger| create_intent(ledger, self.address, caller, order, salt))
			.await?;
		tracing::info!(
			chain_id = self.chain.chain_id(),
			escrow = %address,
			filler = %caller,
			nonce = %order.nonce,
			"Intent deployed"
		);
		Ok(Escrow::new(self.chain.clone(), address))
	}

	/// Handle to the escrow at `address`, if this factory deployed one there.
	pub async fn escrow(&self, address: Address) -> Result<Escrow, EscrowError> {
		let deployed_here = self
			.chain
			.read(|ledger| ledger.escrow(&address).map(|e| e.factory == self.address))
			.await?;
		if deployed_here {
			Ok(Escrow::new(self.chain.clone(), address))
		} else {
			Err(EscrowError::NoCode(address))
		}
	}

	/// Snapshot of the current settings.
	pub async fn config(&self) -> Result<FactoryConfig, EscrowError> {
		self.chain
			.read(|ledger| ledger.factory(&self.address).map(|f| f.config.clone()))
			.await
	}

	pub async fn owner(&self) -> Result<Option<Address>, EscrowError> {
		Ok(self.config().await?.owner)
	}

	pub async fn verifier(&self) -> Result<Address, EscrowError> {
		Ok(self.config().await?.verifier)
	}

	/// `(fee numerator, MULTIPLIER)` charged on fills paying out `token`.
	pub async fn get_fee_info(&self, token: &Address) -> Result<(U256, U256), EscrowError> {
		Ok(self.config().await?.fee_info(token))
	}

	pub async fn layout(&self) -> Result<BridgeLayout, EscrowError> {
		self.chain
			.read(|ledger| ledger.factory(&self.address).map(|f| f.layout))
			.await
	}

	/// Grace its escrows wait past `fillDeadline` before allowing a withdraw.
	pub async fn withdraw_grace_seconds(&self) -> Result<u64, EscrowError> {
		self.chain
			.read(|ledger| ledger.factory(&self.address).map(|f| f.withdraw_grace_seconds))
			.await
	}

	/// Sets the fee numerator for `token`. Owner only.
	///
	/// A numerator above [`MULTIPLIER`] is rejected with
	/// [`EscrowError::InvalidFee`]. Escrows read the fee at fill time, so the
	/// change applies to fills that have not happened yet.
	pub async fn set_fee_info(&self, caller: Address, token: Address, fee: U256) -> Result<(), EscrowError> {
		let factory = self.address;
		self.chain
			.transact(|ledger| {
				if fee > MULTIPLIER {
					return Err(EscrowError::InvalidFee(fee));
				}
				ledger.factory_mut(&factory)?.write(caller)?.fees.insert(token, fee);
				ledger.emit(factory, ChainEvent::FeeInfoUpdated { token, fee });
				Ok(())
			})
			.await?;
		tracing::info!(chain_id = self.chain.chain_id(), token = %token, fee = %fee, "Fee updated");
		Ok(())
	}

	/// Replaces the default verifier. Owner only.
	///
	/// Escrows with their own override keep it.
	pub async fn set_verifier(&self, caller: Address, verifier: Address) -> Result<(), EscrowError> {
		let factory = self.address;
		self.chain
			.transact(|ledger| {
				ledger.factory_mut(&factory)?.write(caller)?.verifier = verifier;
				ledger.emit(factory, ChainEvent::VerifierUpdated { verifier });
				Ok(())
			})
			.await?;
		tracing::info!(
			chain_id = self.chain.chain_id(),
			verifier = %truncate_id(&verifier.to_string()),
			"Verifier updated"
		);
		Ok(())
	}

	/// Hands the factory to `new_owner`. Owner only, and `new_owner` must not
	/// be the zero address.
	pub async fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<(), EscrowError> {
		if new_owner == Address::ZERO {
			return Err(EscrowError::InvalidOwner(new_owner));
		}
		self.set_owner(caller, Some(new_owner)).await
	}

	/// Leaves the factory without an owner. Settings are frozen afterwards.
	pub async fn renounce_ownership(&self, caller: Address) -> Result<(), EscrowError> {
		self.set_owner(caller, None).await
	}

	async fn set_owner(&self, caller: Address, new_owner: Option<Address>) -> Result<(), EscrowError> {
		let factory = self.address;
		self.chain
			.transact(|ledger| {
				ledger.factory_mut(&factory)?.write(caller)?.owner = new_owner;
				ledger.emit(
					factory,
					ChainEvent::OwnershipTransferred {
						previous_owner: caller,
						new_owner: new_owner.unwrap_or(Address::ZERO),
					},
				);
				Ok(())
			})
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::chain::LogEntry;
	use alloy_primitives::address;
	use intent_types::{encode_bridge_data, BridgeTransfer, ORDER_DATA_TYPE};

	pub(crate) const SALT: B256 =
		b256!("179f64607e1f89c65e6ac79f1a223e67e328c5634ec5dfb2df37efd965813ce8");

	fn owner() -> Address {
		Address::repeat_byte(0x0f)
	}

	fn sample_order() -> Order {
		Order {
			intentAddress: Address::ZERO,
			user: address!("70997970c51812dc3a010c7d01b50e0d17dc79c8"),
			nonce: U256::from(10001u64),
			sourceChainId: U256::from(1u64),
			openDeadline: 1_700_000_300,
			fillDeadline: 1_700_000_600,
			orderDataType: ORDER_DATA_TYPE,
			orderData: encode_bridge_data(&BridgeTransfer {
				filler: Address::ZERO,
				source_token: Address::repeat_byte(0x11),
				amount: U256::from(100u128 * 10u128.pow(18)),
				destination_chain_id: U256::from(2u64),
				destination_token: Address::repeat_byte(0x22),
				receive_amount: None,
				beneficiary: Address::repeat_byte(0x33),
			}),
		}
	}

	async fn factory() -> EscrowFactory {
		let chain = Arc::new(Chain::new(1, 1_700_000_000));
		EscrowFactory::deploy(
			chain,
			Address::repeat_byte(0xfa),
			FactoryDeployment::new(owner(), Address::repeat_byte(0xbe)),
		)
		.await
		.unwrap()
	}

	#[test]
	fn test_intent_address_known_vector() {
		assert_eq!(
			intent_address(Address::repeat_byte(0xfa), &sample_order(), SALT),
			address!("2fd214f83d60f0eb18879c9bc9af079bc40bc3d2")
		);
	}

	#[test]
	fn test_intent_address_depends_on_salt_and_factory() {
		let order = sample_order();
		let base = intent_address(Address::repeat_byte(0xfa), &order, SALT);
		assert_ne!(base, intent_address(Address::repeat_byte(0xfa), &order, B256::ZERO));
		assert_ne!(base, intent_address(Address::repeat_byte(0xfb), &order, SALT));
	}

	#[tokio::test]
	async fn test_create_intent_lands_at_derived_address() {
		let factory = factory().await;
		let order = sample_order();
		let predicted = factory.get_intent_address(&order, SALT);

		let escrow = factory
			.create_intent(Address::repeat_byte(0x99), &order, SALT)
			.await
			.unwrap();

		assert_eq!(escrow.address(), predicted);
		assert_eq!(factory.chain().code_at(&predicted).await, Some(CodeKind::Escrow));
		assert_eq!(escrow.order().await.unwrap().intentAddress, predicted);
		assert_eq!(
			escrow.bridge_data().await.unwrap().filler,
			Address::repeat_byte(0x99)
		);

		let deployed: Vec<LogEntry> = factory.chain().logs_for(&factory.address()).await;
		assert!(deployed.iter().any(|log| matches!(
			&log.event,
			ChainEvent::IntentDeployed { intent_address, order: logged }
				if *intent_address == predicted && *logged == order
		)));
	}

	#[tokio::test]
	async fn test_create_intent_rejects_redeploy() {
		let factory = factory().await;
		let order = sample_order();
		factory.create_intent(Address::repeat_byte(0x99), &order, SALT).await.unwrap();

		let err = factory
			.create_intent(Address::repeat_byte(0x98), &order, SALT)
			.await
			.unwrap_err();
		assert!(matches!(err, EscrowError::AlreadyDeployed(_)));

		// the stored filler was not overwritten
		let escrow = factory.escrow(factory.get_intent_address(&order, SALT)).await.unwrap();
		assert_eq!(escrow.bridge_data().await.unwrap().filler, Address::repeat_byte(0x99));
	}

	#[tokio::test]
	async fn test_create_intent_requires_zero_placeholder() {
		let factory = factory().await;
		let order = with_intent_address(&sample_order(), Address::repeat_byte(0x55));
		assert!(matches!(
			factory.create_intent(Address::repeat_byte(0x99), &order, SALT).await,
			Err(EscrowError::IntentAddressSet(_))
		));
	}

	#[tokio::test]
	async fn test_create_intent_rejects_unknown_data_type() {
		let factory = factory().await;
		let mut order = sample_order();
		order.orderDataType = B256::repeat_byte(0x01);
		let err = factory
			.create_intent(Address::repeat_byte(0x99), &order, SALT)
			.await
			.unwrap_err();
		assert!(matches!(err, EscrowError::Codec(_)));
		assert_eq!(
			factory.chain().code_at(&factory.get_intent_address(&order, SALT)).await,
			None
		);
	}

	#[tokio::test]
	async fn test_fee_table_owner_gated_and_versioned() {
		let factory = factory().await;
		let token = Address::repeat_byte(0x22);
		assert_eq!(factory.get_fee_info(&token).await.unwrap(), (U256::ZERO, MULTIPLIER));

		let stranger = Address::repeat_byte(0x77);
		assert!(matches!(
			factory.set_fee_info(stranger, token, U256::from(1u64)).await,
			Err(EscrowError::Unauthorized(a)) if a == stranger
		));
		assert_eq!(factory.config().await.unwrap().version, 0);

		factory.set_fee_info(owner(), token, U256::from(1u64)).await.unwrap();
		let config = factory.config().await.unwrap();
		assert_eq!(config.version, 1);
		assert_eq!(config.fee_info(&token), (U256::from(1u64), U256::from(10_000u64)));

		assert!(matches!(
			factory.set_fee_info(owner(), token, U256::from(10_001u64)).await,
			Err(EscrowError::InvalidFee(_))
		));
	}

	#[tokio::test]
	async fn test_verifier_setting() {
		let factory = factory().await;
		let verifier = Address::repeat_byte(0xbf);
		assert!(factory.set_verifier(Address::repeat_byte(0x77), verifier).await.is_err());

		factory.set_verifier(owner(), verifier).await.unwrap();
		assert_eq!(factory.verifier().await.unwrap(), verifier);
	}

	#[tokio::test]
	async fn test_ownership_transfer_and_renounce() {
		let factory = factory().await;
		let next = Address::repeat_byte(0x0e);

		assert!(matches!(
			factory.transfer_ownership(owner(), Address::ZERO).await,
			Err(EscrowError::InvalidOwner(_))
		));
		factory.transfer_ownership(owner(), next).await.unwrap();
		assert_eq!(factory.owner().await.unwrap(), Some(next));
		assert!(factory.set_verifier(owner(), Address::ZERO).await.is_err());

		factory.renounce_ownership(next).await.unwrap();
		assert_eq!(factory.owner().await.unwrap(), None);
		assert!(factory.set_fee_info(next, Address::ZERO, U256::ZERO).await.is_err());
	}
}
