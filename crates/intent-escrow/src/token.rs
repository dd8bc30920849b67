//! Permit-capable fungible tokens held by a ledger.
//!
//! Balances follow ERC-20 semantics and `permit` follows ERC-2612: the owner
//! signs a typed-data approval under the token's own domain, and each
//! accepted permit consumes the owner's current nonce.

use crate::ErrorKind;
use alloy_primitives::{Address, B256, U256};
use intent_types::utils::{
	compute_domain_hash, compute_final_digest, permit_struct_hash, DOMAIN_VERSION,
};
use intent_types::{recover_signer, signature_from_vrs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by token operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
	#[error("ERC20InsufficientBalance({sender}, {balance}, {needed})")]
	InsufficientBalance {
		sender: Address,
		balance: U256,
		needed: U256,
	},
	#[error("ERC20InsufficientAllowance({spender}, {allowance}, {needed})")]
	InsufficientAllowance {
		spender: Address,
		allowance: U256,
		needed: U256,
	},
	#[error("ERC20InvalidReceiver({0})")]
	InvalidReceiver(Address),
	#[error("ERC2612ExpiredSignature({deadline})")]
	ExpiredSignature { deadline: U256 },
	#[error("ERC2612InvalidSigner({signer}, {owner})")]
	InvalidSigner { signer: Address, owner: Address },
	#[error("ECDSAInvalidSignature: {0}")]
	MalformedSignature(String),
}

impl TokenError {
	/// Category the filler's retry logic keys on.
	pub fn kind(&self) -> ErrorKind {
		match self {
			TokenError::ExpiredSignature { .. } => ErrorKind::Temporal,
			TokenError::InvalidSigner { .. } | TokenError::MalformedSignature(_) => {
				ErrorKind::Signature
			},
			_ => ErrorKind::Ledger,
		}
	}
}

/// Static token metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
	pub name: String,
	pub symbol: String,
	pub decimals: u8,
}

/// Fields of an EIP-2612 permit call.
#[derive(Debug, Clone, Copy)]
pub struct PermitCall {
	pub owner: Address,
	pub spender: Address,
	pub value: U256,
	pub deadline: U256,
	pub v: u8,
	pub r: B256,
	pub s: B256,
}

#[derive(Debug, Clone)]
pub(crate) struct TokenState {
	pub info: TokenInfo,
	balances: HashMap<Address, U256>,
	allowances: HashMap<(Address, Address), U256>,
	nonces: HashMap<Address, U256>,
	total_supply: U256,
}

impl TokenState {
	pub fn new(info: TokenInfo) -> Self {
		Self {
			info,
			balances: HashMap::new(),
			allowances: HashMap::new(),
			nonces: HashMap::new(),
			total_supply: U256::ZERO,
		}
	}

	pub fn balance_of(&self, account: &Address) -> U256 {
		self.balances.get(account).copied().unwrap_or_default()
	}

	pub fn allowance(&self, owner: &Address, spender: &Address) -> U256 {
		self.allowances
			.get(&(*owner, *spender))
			.copied()
			.unwrap_or_default()
	}

	pub fn nonce(&self, owner: &Address) -> U256 {
		self.nonces.get(owner).copied().unwrap_or_default()
	}

	pub fn total_supply(&self) -> U256 {
		self.total_supply
	}

	/// Domain separator for permits on `chain_id` at `token`.
	pub fn domain_separator(&self, chain_id: u64, token: &Address) -> B256 {
		compute_domain_hash(&self.info.name, DOMAIN_VERSION, U256::from(chain_id), token)
	}

	pub fn mint(&mut self, to: Address, amount: U256) -> Result<(), TokenError> {
		if to == Address::ZERO {
			return Err(TokenError::InvalidReceiver(to));
		}
		*self.balances.entry(to).or_default() += amount;
		self.total_supply += amount;
		Ok(())
	}

	pub fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), TokenError> {
		if to == Address::ZERO {
			return Err(TokenError::InvalidReceiver(to));
		}
		let balance = self.balance_of(&from);
		if balance < amount {
			return Err(TokenError::InsufficientBalance {
				sender: from,
				balance,
				needed: amount,
			});
		}
		self.balances.insert(from, balance - amount);
		*self.balances.entry(to).or_default() += amount;
		Ok(())
	}

	pub fn approve(&mut self, owner: Address, spender: Address, amount: U256) {
		self.allowances.insert((owner, spender), amount);
	}

	/// Deducts `amount` from the allowance unless it is unlimited.
	pub fn spend_allowance(
		&mut self,
		owner: Address,
		spender: Address,
		amount: U256,
	) -> Result<(), TokenError> {
		let allowance = self.allowance(&owner, &spender);
		if allowance == U256::MAX {
			return Ok(());
		}
		if allowance < amount {
			return Err(TokenError::InsufficientAllowance {
				spender,
				allowance,
				needed: amount,
			});
		}
		self.approve(owner, spender, allowance - amount);
		Ok(())
	}

	/// Applies an EIP-2612 permit at time `now`.
	pub fn permit(
		&mut self,
		domain_separator: B256,
		call: &PermitCall,
		now: u64,
	) -> Result<(), TokenError> {
		if U256::from(now) > call.deadline {
			return Err(TokenError::ExpiredSignature {
				deadline: call.deadline,
			});
		}

		let struct_hash = permit_struct_hash(
			&call.owner,
			&call.spender,
			call.value,
			self.nonce(&call.owner),
			call.deadline,
		);
		let digest = compute_final_digest(&domain_separator, &struct_hash);
		let signature = signature_from_vrs(call.v, call.r, call.s)
			.map_err(|e| TokenError::MalformedSignature(e.to_string()))?;
		let signer = recover_signer(&digest, &signature)
			.map_err(|e| TokenError::MalformedSignature(e.to_string()))?;
		if signer != call.owner {
			return Err(TokenError::InvalidSigner {
				signer,
				owner: call.owner,
			});
		}

		*self.nonces.entry(call.owner).or_default() += U256::from(1u64);
		self.approve(call.owner, call.spender, call.value);
		Ok(())
	}
}
