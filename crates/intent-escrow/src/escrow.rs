//! Per-order escrow state machine.
//!
//! The same escrow code runs on both chains of an order. On the source chain
//! it is funded by the user's permit and released either to the filler by
//! `finalize_on_origin` or back to the user by `withdraw`. On the destination
//! chain it only records the filler's payout to the beneficiary.
//!
//! Every call that takes an order id recomputes it from the stored order and
//! rejects a mismatch. Guards are checked inside the same atomic call that
//! applies the transition, so retried or racing calls fail cleanly.

use crate::chain::{Chain, ChainEvent};
use crate::ledger::Ledger;
use crate::token::PermitCall;
use crate::EscrowError;
use alloy_primitives::{Address, B256, U256};
use intent_types::{encode_bridge_data, order_id, truncate_id, BridgeTransfer, Order};
use intent_verifier::ProofVerifierInterface;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle position of an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowStatus {
	Created,
	Funded,
	DestinationFulfilled,
	OriginCompleted,
	Withdrawn,
}

#[derive(Debug, Clone)]
pub(crate) struct EscrowState {
	pub factory: Address,
	pub order: Order,
	pub transfer: BridgeTransfer,
	pub salt: B256,
	filler_initialized: bool,
	verifier_override: Option<Address>,
	funded: bool,
	destination_fulfilled: bool,
	origin_completed: bool,
	withdrawn: bool,
}

impl EscrowState {
	pub fn new(factory: Address, order: Order, transfer: BridgeTransfer, salt: B256) -> Self {
		Self {
			factory,
			order,
			transfer,
			salt,
			filler_initialized: false,
			verifier_override: None,
			funded: false,
			destination_fulfilled: false,
			origin_completed: false,
			withdrawn: false,
		}
	}

	fn status(&self) -> EscrowStatus {
		if self.withdrawn {
			EscrowStatus::Withdrawn
		} else if self.origin_completed {
			EscrowStatus::OriginCompleted
		} else if self.destination_fulfilled {
			EscrowStatus::DestinationFulfilled
		} else if self.funded {
			EscrowStatus::Funded
		} else {
			EscrowStatus::Created
		}
	}

	fn check_order_id(&self, supplied: &B256) -> Result<(), EscrowError> {
		if order_id(&self.order) == *supplied {
			Ok(())
		} else {
			Err(EscrowError::InvalidOrder)
		}
	}
}

fn require_chain(ledger: &Ledger, expected: U256) -> Result<(), EscrowError> {
	if expected == U256::from(ledger.chain_id()) {
		Ok(())
	} else {
		Err(EscrowError::WrongChain {
			expected,
			actual: ledger.chain_id(),
		})
	}
}

/// Binds the filler. Only the deploying factory may call this, once.
pub(crate) fn initialize_filler(
	ledger: &mut Ledger,
	escrow: Address,
	caller: Address,
	filler: Address,
) -> Result<(), EscrowError> {
	let state = ledger.escrow_mut(&escrow)?;
	if caller != state.factory {
		return Err(EscrowError::OnlyFactory);
	}
	if state.filler_initialized {
		return Err(EscrowError::AlreadyInitialized);
	}

	state.transfer.filler = filler;
	state.order.orderData = encode_bridge_data(&state.transfer);
	state.filler_initialized = true;
	Ok(())
}

fn set_verifier(
	ledger: &mut Ledger,
	escrow: Address,
	caller: Address,
	verifier: Address,
) -> Result<(), EscrowError> {
	let factory = ledger.escrow(&escrow)?.factory;
	if ledger.factory(&factory)?.config.owner != Some(caller) {
		return Err(EscrowError::Unauthorized(caller));
	}

	let state = ledger.escrow_mut(&escrow)?;
	if state.verifier_override.is_some() {
		return Err(EscrowError::AlreadyInitialized);
	}
	state.verifier_override = Some(verifier);
	ledger.emit(escrow, ChainEvent::VerifierUpdated { verifier });
	Ok(())
}

fn submit_permit(
	ledger: &mut Ledger,
	escrow: Address,
	supplied_id: B256,
	v: u8,
	r: B256,
	s: B256,
) -> Result<(), EscrowError> {
	let state = ledger.escrow(&escrow)?.clone();
	require_chain(ledger, state.order.sourceChainId)?;
	state.check_order_id(&supplied_id)?;
	if state.origin_completed {
		return Err(EscrowError::AlreadyCompleted);
	}
	if state.withdrawn {
		return Err(EscrowError::AlreadyWithdrawn);
	}
	if state.funded {
		return Err(EscrowError::AlreadyFunded);
	}

	let token = state.transfer.source_token;
	let call = PermitCall {
		owner: state.order.user,
		spender: escrow,
		value: state.transfer.amount,
		deadline: U256::from(state.order.fillDeadline),
		v,
		r,
		s,
	};
	ledger.permit(token, &call)?;
	ledger.transfer_from(token, escrow, state.order.user, escrow, state.transfer.amount)?;

	ledger.escrow_mut(&escrow)?.funded = true;
	ledger.emit(
		escrow,
		ChainEvent::Open {
			order_id: supplied_id,
			filler: state.transfer.filler,
		},
	);
	Ok(())
}

fn fill(
	ledger: &mut Ledger,
	escrow: Address,
	caller: Address,
	supplied_id: B256,
) -> Result<U256, EscrowError> {
	let state = ledger.escrow(&escrow)?.clone();
	require_chain(ledger, state.transfer.destination_chain_id)?;
	state.check_order_id(&supplied_id)?;
	if state.destination_fulfilled {
		return Err(EscrowError::AlreadyFulfilled);
	}

	let token = state.transfer.destination_token;
	let (fee, _) = ledger.factory(&state.factory)?.config.fee_info(&token);
	let payout = state
		.transfer
		.payout(fee)
		.ok_or(EscrowError::InvalidFee(fee))?;
	ledger.transfer_from(token, escrow, caller, state.transfer.beneficiary, payout)?;

	ledger.escrow_mut(&escrow)?.destination_fulfilled = true;
	ledger.emit(escrow, ChainEvent::Completed { order_id: supplied_id });
	Ok(payout)
}

/// Checks the finalize guards and resolves the verifier to consult.
fn prepare_finalize(
	ledger: &Ledger,
	escrow: Address,
) -> Result<Arc<dyn ProofVerifierInterface>, EscrowError> {
	let state = ledger.escrow(&escrow)?;
	require_chain(ledger, state.order.sourceChainId)?;
	if state.origin_completed {
		return Err(EscrowError::AlreadyCompleted);
	}
	if state.withdrawn {
		return Err(EscrowError::AlreadyWithdrawn);
	}
	if ledger.balance_of(&state.transfer.source_token, &escrow)?.is_zero() {
		return Err(EscrowError::NothingEscrowed);
	}

	let verifier = match state.verifier_override {
		Some(verifier) => verifier,
		None => ledger.factory(&state.factory)?.config.verifier,
	};
	ledger.verifier(&verifier)
}

fn complete_finalize(ledger: &mut Ledger, escrow: Address) -> Result<U256, EscrowError> {
	let state = ledger.escrow(&escrow)?.clone();
	let token = state.transfer.source_token;
	let balance = ledger.balance_of(&token, &escrow)?;
	ledger.transfer(token, escrow, state.transfer.filler, balance)?;

	ledger.escrow_mut(&escrow)?.origin_completed = true;
	ledger.emit(
		escrow,
		ChainEvent::Completed {
			order_id: order_id(&state.order),
		},
	);
	Ok(balance)
}

fn withdraw(
	ledger: &mut Ledger,
	escrow: Address,
	caller: Address,
	supplied_id: B256,
) -> Result<U256, EscrowError> {
	let state = ledger.escrow(&escrow)?.clone();
	require_chain(ledger, state.order.sourceChainId)?;
	if caller != state.order.user {
		return Err(EscrowError::OnlyUser);
	}
	state.check_order_id(&supplied_id)?;
	if state.origin_completed {
		return Err(EscrowError::AlreadyCompleted);
	}
	if state.withdrawn {
		return Err(EscrowError::AlreadyWithdrawn);
	}

	let grace = ledger.factory(&state.factory)?.withdraw_grace_seconds;
	let unlocks_at = u64::from(state.order.fillDeadline).saturating_add(grace);
	if ledger.now() <= unlocks_at {
		return Err(EscrowError::WithdrawTooEarly {
			now: ledger.now(),
			unlocks_at,
		});
	}

	let token = state.transfer.source_token;
	let balance = ledger.balance_of(&token, &escrow)?;
	if balance.is_zero() {
		return Err(EscrowError::NothingEscrowed);
	}
	ledger.transfer(token, escrow, state.order.user, balance)?;

	ledger.escrow_mut(&escrow)?.withdrawn = true;
	ledger.emit(escrow, ChainEvent::Withdraw { order_id: supplied_id });
	Ok(balance)
}

/// Handle to an escrow deployed on a chain.
#[derive(Clone)]
pub struct Escrow {
	chain: Arc<Chain>,
	address: Address,
}

impl std::fmt::Debug for Escrow {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Escrow")
			.field("chain_id", &self.chain.chain_id())
			.field("address", &self.address)
			.finish()
	}
}

impl Escrow {
	pub(crate) fn new(chain: Arc<Chain>, address: Address) -> Self {
		Self { chain, address }
	}

	pub fn address(&self) -> Address {
		self.address
	}

	pub fn chain(&self) -> &Arc<Chain> {
		&self.chain
	}

	async fn view<R, F>(&self, f: F) -> Result<R, EscrowError>
	where
		F: FnOnce(&EscrowState) -> R,
	{
		self.chain
			.read(|ledger| ledger.escrow(&self.address).map(f))
			.await
	}

	/// The stored order, with `intentAddress` and filler bound.
	pub async fn order(&self) -> Result<Order, EscrowError> {
		self.view(|s| s.order.clone()).await
	}

	/// Decoded bridge data, including the bound filler.
	pub async fn bridge_data(&self) -> Result<BridgeTransfer, EscrowError> {
		self.view(|s| s.transfer.clone()).await
	}

	/// Identifier every id-taking call expects.
	pub async fn order_id(&self) -> Result<B256, EscrowError> {
		self.view(|s| order_id(&s.order)).await
	}

	/// Identifier `order` would have if stored here. Reads no state.
	pub fn generate_order_id(&self, order: &Order) -> B256 {
		order_id(order)
	}

	pub async fn salt(&self) -> Result<B256, EscrowError> {
		self.view(|s| s.salt).await
	}

	/// Factory that deployed this escrow.
	pub async fn intent_factory(&self) -> Result<Address, EscrowError> {
		self.view(|s| s.factory).await
	}

	/// Furthest lifecycle step this escrow has reached.
	pub async fn status(&self) -> Result<EscrowStatus, EscrowError> {
		self.view(|s| s.status()).await
	}

	pub async fn funded(&self) -> Result<bool, EscrowError> {
		self.view(|s| s.funded).await
	}

	pub async fn destination_fulfilled(&self) -> Result<bool, EscrowError> {
		self.view(|s| s.destination_fulfilled).await
	}

	pub async fn origin_completed(&self) -> Result<bool, EscrowError> {
		self.view(|s| s.origin_completed).await
	}

	pub async fn withdrawn(&self) -> Result<bool, EscrowError> {
		self.view(|s| s.withdrawn).await
	}

	/// Escrowed amount of the source token.
	pub async fn balance(&self) -> Result<U256, EscrowError> {
		let token = self.view(|s| s.transfer.source_token).await?;
		self.chain.balance_of(&token, &self.address).await
	}

	/// Verifier `finalize_on_origin` would consult right now.
	pub async fn verifier(&self) -> Result<Address, EscrowError> {
		self.chain
			.read(|ledger| -> Result<Address, EscrowError> {
				let state = ledger.escrow(&self.address)?;
				match state.verifier_override {
					Some(verifier) => Ok(verifier),
					None => Ok(ledger.factory(&state.factory)?.config.verifier),
				}
			})
			.await
	}

	/// Binds `filler` into the stored bridge data, which changes the order id.
	///
	/// Only the deploying factory may call this, and only once. The factory
	/// does so inside `createIntent`, so later calls fail with
	/// [`EscrowError::AlreadyInitialized`].
	pub async fn initialize_filler(&self, caller: Address, filler: Address) -> Result<(), EscrowError> {
		let escrow = self.address;
		self.chain
			.transact(|ledger| initialize_filler(ledger, escrow, caller, filler))
			.await
	}

	/// Pins this escrow to `verifier`. Factory owner only, once.
	pub async fn set_verifier(&self, caller: Address, verifier: Address) -> Result<(), EscrowError> {
		let escrow = self.address;
		self.chain
			.transact(|ledger| set_verifier(ledger, escrow, caller, verifier))
			.await
	}

	/// Applies the user's permit and pulls the order amount in.
	pub async fn submit_permit(&self, order_id: B256, v: u8, r: B256, s: B256) -> Result<(), EscrowError> {
		let escrow = self.address;
		self.chain
			.transact(|ledger| submit_permit(ledger, escrow, order_id, v, r, s))
			.await?;
		tracing::info!(
			chain_id = self.chain.chain_id(),
			order_id = %truncate_id(&order_id.to_string()),
			"Escrow funded"
		);
		Ok(())
	}

	/// Pays the beneficiary out of `caller`'s approved balance.
	///
	/// `origin_data` and `filler_data` are reserved extension payloads and
	/// are not interpreted.
	pub async fn fill(
		&self,
		caller: Address,
		order_id: B256,
		origin_data: &[u8],
		filler_data: &[u8],
	) -> Result<U256, EscrowError> {
		let escrow = self.address;
		let payout = self
			.chain
			.transact(|ledger| fill(ledger, escrow, caller, order_id))
			.await?;
		tracing::info!(
			chain_id = self.chain.chain_id(),
			order_id = %truncate_id(&order_id.to_string()),
			payout = %payout,
			extension_bytes = origin_data.len() + filler_data.len(),
			"Order filled"
		);
		Ok(payout)
	}

	/// Releases the escrowed balance to the filler once the verifier accepts
	/// the proof. The chain stays locked while the verifier runs.
	pub async fn finalize_on_origin(
		&self,
		program_vkey: B256,
		public_values: &[u8],
		proof_bytes: &[u8],
	) -> Result<U256, EscrowError> {
		let mut staged = self.chain.begin().await;
		let verifier = prepare_finalize(&staged.ledger, self.address)?;
		verifier
			.verify_proof(&program_vkey, public_values, proof_bytes)
			.await?;
		let released = complete_finalize(&mut staged.ledger, self.address)?;
		staged.commit();

		tracing::info!(
			chain_id = self.chain.chain_id(),
			escrow = %self.address,
			released = %released,
			"Origin completed"
		);
		Ok(released)
	}

	/// Returns the escrowed balance to the user after the grace period.
	pub async fn withdraw(&self, caller: Address, order_id: B256) -> Result<U256, EscrowError> {
		let escrow = self.address;
		let refunded = self
			.chain
			.transact(|ledger| withdraw(ledger, escrow, caller, order_id))
			.await?;
		tracing::info!(
			chain_id = self.chain.chain_id(),
			escrow = %self.address,
			refunded = %refunded,
			"Order withdrawn"
		);
		Ok(refunded)
	}
}
