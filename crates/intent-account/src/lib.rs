//! Account management for the intent filler.
//!
//! An account is a signing identity. The filler uses one to learn its own
//! address (the `caller` of every escrow call) and, in devnet tooling, to sign
//! orders and permits on behalf of users.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use intent_types::{
	order_signing_hash, permit_signing_hash, ConfigSchema, ImplementationRegistry, Order, Permit,
	Signature, TokenDomain,
};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Implementation error: {0}")]
	Implementation(String),
}

#[async_trait]
pub trait AccountInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs a 32-byte prehash without any message prefix.
	async fn sign_hash(&self, hash: &B256) -> Result<Signature, AccountError>;
}

pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Wraps an account implementation with protocol-level signing helpers.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	/// Signs the EIP-712 digest of `order` under the order domain of `factory`.
	///
	/// Returns the 65-byte `r || s || v` form carried by intake payloads.
	pub async fn sign_order(&self, order: &Order, factory: Address) -> Result<Bytes, AccountError> {
		let hash = order_signing_hash(order, factory);
		let signature = self.implementation.sign_hash(&hash).await?;
		tracing::debug!(digest = %hash, "Signed order");
		Ok(Bytes::from(signature.as_bytes().to_vec()))
	}

	/// Signs the EIP-712 digest of `permit` under the token's domain.
	pub async fn sign_permit(
		&self,
		permit: &Permit,
		domain: &TokenDomain,
	) -> Result<Bytes, AccountError> {
		let hash = permit_signing_hash(permit, domain);
		let signature = self.implementation.sign_hash(&hash).await?;
		tracing::debug!(digest = %hash, token = %domain.verifying_contract, "Signed permit");
		Ok(Bytes::from(signature.as_bytes().to_vec()))
	}
}
