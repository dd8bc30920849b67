//! State of one simulated chain.
//!
//! A [`Ledger`] is only ever mutated through a staged copy inside
//! [`Chain::transact`](crate::Chain::transact), so every method here may fail
//! halfway without leaving partial effects behind.

use crate::chain::{ChainEvent, CodeKind};
use crate::escrow::EscrowState;
use crate::factory::FactoryState;
use crate::token::{PermitCall, TokenInfo, TokenState};
use crate::EscrowError;
use alloy_primitives::{Address, U256};
use intent_verifier::ProofVerifierInterface;
use std::collections::HashMap;
use std::sync::Arc;

/// Every contract's storage on one chain, plus the logs emitted by the call
/// in progress.
#[derive(Clone)]
pub struct Ledger {
	chain_id: u64,
	timestamp: u64,
	code: HashMap<Address, CodeKind>,
	tokens: HashMap<Address, TokenState>,
	pub(crate) factories: HashMap<Address, FactoryState>,
	pub(crate) escrows: HashMap<Address, EscrowState>,
	verifiers: HashMap<Address, Arc<dyn ProofVerifierInterface>>,
	emitted: Vec<(Address, ChainEvent)>,
}

impl Ledger {
	pub fn new(chain_id: u64, timestamp: u64) -> Self {
		Self {
			chain_id,
			timestamp,
			code: HashMap::new(),
			tokens: HashMap::new(),
			factories: HashMap::new(),
			escrows: HashMap::new(),
			verifiers: HashMap::new(),
			emitted: Vec::new(),
		}
	}

	pub fn chain_id(&self) -> u64 {
		self.chain_id
	}

	/// Current block timestamp.
	pub fn now(&self) -> u64 {
		self.timestamp
	}

	pub(crate) fn set_timestamp(&mut self, timestamp: u64) {
		self.timestamp = timestamp;
	}

	pub fn code_at(&self, address: &Address) -> Option<CodeKind> {
		self.code.get(address).copied()
	}

	/// Places code at `address`. Fails if anything already lives there.
	pub(crate) fn install(&mut self, address: Address, kind: CodeKind) -> Result<(), EscrowError> {
		if address == Address::ZERO || self.code.contains_key(&address) {
			return Err(EscrowError::AlreadyDeployed(address));
		}
		self.code.insert(address, kind);
		Ok(())
	}

	pub(crate) fn emit(&mut self, address: Address, event: ChainEvent) {
		self.emitted.push((address, event));
	}

	pub(crate) fn take_emitted(&mut self) -> Vec<(Address, ChainEvent)> {
		std::mem::take(&mut self.emitted)
	}

	// Tokens

	pub(crate) fn deploy_token(&mut self, address: Address, info: TokenInfo) -> Result<(), EscrowError> {
		self.install(address, CodeKind::Token)?;
		self.tokens.insert(address, TokenState::new(info));
		Ok(())
	}

	pub(crate) fn token(&self, address: &Address) -> Result<&TokenState, EscrowError> {
		self.tokens.get(address).ok_or(EscrowError::NoCode(*address))
	}

	fn token_mut(&mut self, address: &Address) -> Result<&mut TokenState, EscrowError> {
		self.tokens.get_mut(address).ok_or(EscrowError::NoCode(*address))
	}

	/// Balance of `account`, zero if it never held `token`.
	pub fn balance_of(&self, token: &Address, account: &Address) -> Result<U256, EscrowError> {
		Ok(self.token(token)?.balance_of(account))
	}

	pub(crate) fn mint(&mut self, token: Address, to: Address, amount: U256) -> Result<(), EscrowError> {
		self.token_mut(&token)?.mint(to, amount)?;
		self.emit(
			token,
			ChainEvent::Transfer {
				from: Address::ZERO,
				to,
				value: amount,
			},
		);
		Ok(())
	}

	pub(crate) fn transfer(
		&mut self,
		token: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), EscrowError> {
		self.token_mut(&token)?.transfer(from, to, amount)?;
		self.emit(
			token,
			ChainEvent::Transfer {
				from,
				to,
				value: amount,
			},
		);
		Ok(())
	}

	pub(crate) fn approve(
		&mut self,
		token: Address,
		owner: Address,
		spender: Address,
		amount: U256,
	) -> Result<(), EscrowError> {
		self.token_mut(&token)?.approve(owner, spender, amount);
		self.emit(
			token,
			ChainEvent::Approval {
				owner,
				spender,
				value: amount,
			},
		);
		Ok(())
	}

	/// Moves `amount` from `from` to `to` on behalf of `spender`.
	pub(crate) fn transfer_from(
		&mut self,
		token: Address,
		spender: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), EscrowError> {
		self.token_mut(&token)?.spend_allowance(from, spender, amount)?;
		self.transfer(token, from, to, amount)
	}

	pub(crate) fn permit(&mut self, token: Address, call: &PermitCall) -> Result<(), EscrowError> {
		let (chain_id, now) = (self.chain_id, self.timestamp);
		let state = self.token_mut(&token)?;
		let separator = state.domain_separator(chain_id, &token);
		state.permit(separator, call, now)?;
		self.emit(
			token,
			ChainEvent::Approval {
				owner: call.owner,
				spender: call.spender,
				value: call.value,
			},
		);
		Ok(())
	}

	// Verifiers

	pub(crate) fn deploy_verifier(
		&mut self,
		address: Address,
		verifier: Arc<dyn ProofVerifierInterface>,
	) -> Result<(), EscrowError> {
		self.install(address, CodeKind::Verifier)?;
		self.verifiers.insert(address, verifier);
		Ok(())
	}

	pub(crate) fn verifier(&self, address: &Address) -> Result<Arc<dyn ProofVerifierInterface>, EscrowError> {
		self.verifiers
			.get(address)
			.cloned()
			.ok_or(EscrowError::MissingVerifier(*address))
	}

	// Protocol contracts

	pub(crate) fn factory(&self, address: &Address) -> Result<&FactoryState, EscrowError> {
		self.factories.get(address).ok_or(EscrowError::NoCode(*address))
	}

	pub(crate) fn factory_mut(&mut self, address: &Address) -> Result<&mut FactoryState, EscrowError> {
		self.factories
			.get_mut(address)
			.ok_or(EscrowError::NoCode(*address))
	}

	pub(crate) fn escrow(&self, address: &Address) -> Result<&EscrowState, EscrowError> {
		self.escrows.get(address).ok_or(EscrowError::NoCode(*address))
	}

	pub(crate) fn escrow_mut(&mut self, address: &Address) -> Result<&mut EscrowState, EscrowError> {
		self.escrows
			.get_mut(address)
			.ok_or(EscrowError::NoCode(*address))
	}
}
