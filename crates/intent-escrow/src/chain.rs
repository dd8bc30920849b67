//! Simulated host chains.
//!
//! A [`Chain`] executes state-changing calls one at a time. Each call runs
//! against a staged copy of the [`Ledger`] that replaces the live state only
//! if the call succeeds. Committed calls are mined into their own block and
//! their events appended to the chain's log.

use crate::ledger::Ledger;
use crate::token::{PermitCall, TokenInfo};
use crate::EscrowError;
use alloy_primitives::{Address, B256, U256};
use intent_types::{Order, TokenDomain};
use intent_verifier::ProofVerifierInterface;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// What kind of code lives at an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeKind {
	Token,
	Factory,
	Escrow,
	Verifier,
}

/// Notifications emitted by contracts on a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
	/// Emitted by the factory. Carries the order as submitted.
	IntentDeployed { intent_address: Address, order: Order },
	/// The source escrow pulled the user's funds.
	Open { order_id: B256, filler: Address },
	/// A fill (destination) or a finalize (source) went through.
	Completed { order_id: B256 },
	/// The user reclaimed an unfilled order.
	Withdraw { order_id: B256 },
	FeeInfoUpdated { token: Address, fee: U256 },
	VerifierUpdated { verifier: Address },
	OwnershipTransferred {
		previous_owner: Address,
		new_owner: Address,
	},
	Transfer { from: Address, to: Address, value: U256 },
	Approval {
		owner: Address,
		spender: Address,
		value: U256,
	},
}

/// An event together with where and when it was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
	pub block_number: u64,
	pub timestamp: u64,
	/// Contract that emitted the event.
	pub address: Address,
	pub event: ChainEvent,
}

struct ChainInner {
	ledger: Ledger,
	block_number: u64,
	logs: Vec<LogEntry>,
}

/// A single-writer chain.
pub struct Chain {
	chain_id: u64,
	inner: Mutex<ChainInner>,
}

/// A call in progress. Holds the chain's writer lock until dropped or
/// committed; dropping without committing discards every change.
pub(crate) struct Staged<'a> {
	guard: MutexGuard<'a, ChainInner>,
	pub ledger: Ledger,
}

impl Staged<'_> {
	/// Replaces the live state with the staged one and mines a block.
	pub fn commit(mut self) -> u64 {
		let emitted = self.ledger.take_emitted();
		let inner = &mut *self.guard;
		inner.block_number += 1;
		let (block_number, timestamp) = (inner.block_number, self.ledger.now());

		tracing::trace!(
			chain_id = self.ledger.chain_id(),
			block_number,
			events = emitted.len(),
			"Block committed"
		);
		inner
			.logs
			.extend(emitted.into_iter().map(|(address, event)| LogEntry {
				block_number,
				timestamp,
				address,
				event,
			}));
		inner.ledger = self.ledger;
		block_number
	}
}

impl Chain {
	/// Empty chain at block 0 whose clock starts at `genesis_timestamp`.
	pub fn new(chain_id: u64, genesis_timestamp: u64) -> Self {
		Self {
			chain_id,
			inner: Mutex::new(ChainInner {
				ledger: Ledger::new(chain_id, genesis_timestamp),
				block_number: 0,
				logs: Vec::new(),
			}),
		}
	}

	pub fn chain_id(&self) -> u64 {
		self.chain_id
	}

	/// Takes the writer lock and stages a copy of the state.
	pub(crate) async fn begin(&self) -> Staged<'_> {
		let guard = self.inner.lock().await;
		let ledger = guard.ledger.clone();
		Staged { guard, ledger }
	}

	/// Runs `f` as one atomic call.
	pub async fn transact<R, F>(&self, f: F) -> Result<R, EscrowError>
	where
		F: FnOnce(&mut Ledger) -> Result<R, EscrowError>,
	{
		let mut staged = self.begin().await;
		let result = f(&mut staged.ledger)?;
		staged.commit();
		Ok(result)
	}

	/// Reads the live state.
	pub async fn read<R, F>(&self, f: F) -> R
	where
		F: FnOnce(&Ledger) -> R,
	{
		let inner = self.inner.lock().await;
		f(&inner.ledger)
	}

	/// Timestamp the next call will see.
	pub async fn now(&self) -> u64 {
		self.read(|ledger| ledger.now()).await
	}

	/// Number of the last mined block. Each committed call mines one.
	pub async fn block_number(&self) -> u64 {
		self.inner.lock().await.block_number
	}

	/// Moves the clock to `timestamp` without mining a block.
	pub async fn set_timestamp(&self, timestamp: u64) {
		self.inner.lock().await.ledger.set_timestamp(timestamp);
	}

	/// Moves the clock forward and returns the new timestamp.
	pub async fn advance_time(&self, seconds: u64) -> u64 {
		let mut inner = self.inner.lock().await;
		let next = inner.ledger.now().saturating_add(seconds);
		inner.ledger.set_timestamp(next);
		next
	}

	pub async fn code_at(&self, address: &Address) -> Option<CodeKind> {
		self.read(|ledger| ledger.code_at(address)).await
	}

	/// Every log mined so far, oldest first.
	pub async fn logs(&self) -> Vec<LogEntry> {
		self.inner.lock().await.logs.clone()
	}

	/// Logs mined in blocks after `block_number`.
	pub async fn logs_since(&self, block_number: u64) -> Vec<LogEntry> {
		self.inner
			.lock()
			.await
			.logs
			.iter()
			.filter(|entry| entry.block_number > block_number)
			.cloned()
			.collect()
	}

	/// Logs emitted by `address`.
	pub async fn logs_for(&self, address: &Address) -> Vec<LogEntry> {
		self.inner
			.lock()
			.await
			.logs
			.iter()
			.filter(|entry| &entry.address == address)
			.cloned()
			.collect()
	}

	/// Installs an ERC-20 with EIP-2612 permits at `address`.
	///
	/// Fails if `address` already holds code.
	pub async fn deploy_token(&self, address: Address, info: TokenInfo) -> Result<(), EscrowError> {
		self.transact(|ledger| ledger.deploy_token(address, info)).await
	}

	/// Binds a proof verifier to `address` so factories and escrows can
	/// name it.
	pub async fn deploy_verifier(
		&self,
		address: Address,
		verifier: Arc<dyn ProofVerifierInterface>,
	) -> Result<(), EscrowError> {
		self.transact(|ledger| ledger.deploy_verifier(address, verifier))
			.await
	}

	/// Credits `amount` of `token` to `to` out of thin air.
	pub async fn mint(&self, token: Address, to: Address, amount: U256) -> Result<(), EscrowError> {
		self.transact(|ledger| ledger.mint(token, to, amount)).await
	}

	pub async fn balance_of(&self, token: &Address, account: &Address) -> Result<U256, EscrowError> {
		self.read(|ledger| ledger.balance_of(token, account)).await
	}

	pub async fn allowance(
		&self,
		token: &Address,
		owner: &Address,
		spender: &Address,
	) -> Result<U256, EscrowError> {
		self.read(|ledger| -> Result<U256, EscrowError> {
			Ok(ledger.token(token)?.allowance(owner, spender))
		})
			.await
	}

	/// Next permit nonce of `owner` on `token`.
	pub async fn nonces(&self, token: &Address, owner: &Address) -> Result<U256, EscrowError> {
		self.read(|ledger| -> Result<U256, EscrowError> { Ok(ledger.token(token)?.nonce(owner)) })
			.await
	}

	/// Amount of `token` minted on this chain so far.
	pub async fn total_supply(&self, token: &Address) -> Result<U256, EscrowError> {
		self.read(|ledger| -> Result<U256, EscrowError> { Ok(ledger.token(token)?.total_supply()) })
			.await
	}

	pub async fn token_info(&self, token: &Address) -> Result<TokenInfo, EscrowError> {
		self.read(|ledger| -> Result<TokenInfo, EscrowError> { Ok(ledger.token(token)?.info.clone()) })
			.await
	}

	/// Permit domain of a deployed token.
	pub async fn token_domain(&self, token: &Address) -> Result<TokenDomain, EscrowError> {
		let info = self.token_info(token).await?;
		Ok(TokenDomain::new(info.name, self.chain_id, *token))
	}

	/// Moves `amount` of `token` from `caller` to `to`.
	pub async fn transfer(
		&self,
		token: Address,
		caller: Address,
		to: Address,
		amount: U256,
	) -> Result<(), EscrowError> {
		self.transact(|ledger| ledger.transfer(token, caller, to, amount))
			.await
	}

	/// Sets the allowance `caller` grants `spender`, replacing any previous one.
	pub async fn approve(
		&self,
		token: Address,
		caller: Address,
		spender: Address,
		amount: U256,
	) -> Result<(), EscrowError> {
		self.transact(|ledger| ledger.approve(token, caller, spender, amount))
			.await
	}

	/// Moves funds out of `from` on `caller`'s allowance.
	pub async fn transfer_from(
		&self,
		token: Address,
		caller: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), EscrowError> {
		self.transact(|ledger| ledger.transfer_from(token, caller, from, to, amount))
			.await
	}

	/// Applies a signed EIP-2612 approval. Anyone may submit it.
	pub async fn permit(&self, token: Address, call: PermitCall) -> Result<(), EscrowError> {
		self.transact(|ledger| ledger.permit(token, &call)).await
	}
}

/// Chains by id.
#[derive(Default, Clone)]
pub struct ChainRegistry {
	chains: HashMap<u64, Arc<Chain>>,
}

impl ChainRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, chain: Arc<Chain>) {
		self.chains.insert(chain.chain_id(), chain);
	}

	/// Chain with `chain_id`, or [`EscrowError::UnknownChain`].
	pub fn get(&self, chain_id: u64) -> Result<Arc<Chain>, EscrowError> {
		self.chains
			.get(&chain_id)
			.cloned()
			.ok_or(EscrowError::UnknownChain(chain_id))
	}

	/// Registered chain ids in ascending order.
	pub fn chain_ids(&self) -> Vec<u64> {
		let mut ids: Vec<u64> = self.chains.keys().copied().collect();
		ids.sort_unstable();
		ids
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn usdt() -> TokenInfo {
		TokenInfo {
			name: "Mock USDT".into(),
			symbol: "USDT".into(),
			decimals: 18,
		}
	}

	#[tokio::test]
	async fn test_failed_call_leaves_state_unchanged() {
		let chain = Chain::new(1, 1_000);
		let token = Address::repeat_byte(0x11);
		let (alice, bob) = (Address::repeat_byte(1), Address::repeat_byte(2));
		chain.deploy_token(token, usdt()).await.unwrap();
		chain.mint(token, alice, U256::from(10u64)).await.unwrap();
		let block = chain.block_number().await;

		// the first transfer succeeds inside the call, the second fails
		let result = chain
			.transact(|ledger| {
				ledger.transfer(token, alice, bob, U256::from(6u64))?;
				ledger.transfer(token, alice, bob, U256::from(6u64))
			})
			.await;

		assert!(matches!(result, Err(EscrowError::Token(_))));
		assert_eq!(chain.balance_of(&token, &alice).await.unwrap(), U256::from(10u64));
		assert_eq!(chain.balance_of(&token, &bob).await.unwrap(), U256::ZERO);
		assert_eq!(chain.block_number().await, block);
	}

	#[tokio::test]
	async fn test_committed_call_mines_block_with_logs() {
		let chain = Chain::new(1, 1_000);
		let token = Address::repeat_byte(0x11);
		chain.deploy_token(token, usdt()).await.unwrap();
		let before = chain.block_number().await;

		chain.mint(token, Address::repeat_byte(1), U256::from(5u64)).await.unwrap();

		let logs = chain.logs_since(before).await;
		assert_eq!(logs.len(), 1);
		assert_eq!(logs[0].block_number, before + 1);
		assert_eq!(logs[0].address, token);
		assert!(matches!(logs[0].event, ChainEvent::Transfer { from, .. } if from == Address::ZERO));
	}

	#[tokio::test]
	async fn test_address_holds_code_once() {
		let chain = Chain::new(1, 1_000);
		let token = Address::repeat_byte(0x11);
		chain.deploy_token(token, usdt()).await.unwrap();

		assert_eq!(chain.code_at(&token).await, Some(CodeKind::Token));
		assert!(matches!(
			chain.deploy_token(token, usdt()).await,
			Err(EscrowError::AlreadyDeployed(a)) if a == token
		));
	}

	#[tokio::test]
	async fn test_clock_control() {
		let chain = Chain::new(1, 1_000);
		assert_eq!(chain.advance_time(30).await, 1_030);
		chain.set_timestamp(5_000).await;
		assert_eq!(chain.now().await, 5_000);
	}

	#[test]
	fn test_registry_lookup() {
		let mut registry = ChainRegistry::new();
		registry.insert(Arc::new(Chain::new(2, 0)));
		registry.insert(Arc::new(Chain::new(1, 0)));

		assert_eq!(registry.chain_ids(), vec![1, 2]);
		assert_eq!(registry.get(2).unwrap().chain_id(), 2);
		assert!(matches!(registry.get(3), Err(EscrowError::UnknownChain(3))));
	}
}
